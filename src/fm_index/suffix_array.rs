use crate::prg::codec::Marker;

/**
 * Suffix array construction by prefix doubling (Manber-Myers): sort
 * suffixes by their first symbol, then repeatedly double the compared
 * prefix length using the rank pairs of the previous round.
 *
 * O(n log^2 n); the PRG alphabet is sparse and unbounded (marker values can
 * be large), which rules out the byte-alphabet constructions and keeps this
 * implementation on integer ranks throughout.
 */
pub fn build_suffix_array(text: &[Marker]) -> Vec<u64> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }

    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<u64> = initial_ranks(text);
    let mut next_rank: Vec<u64> = vec![0; n];

    let mut k = 1;
    while k < n {
        let key = |i: usize| -> (u64, u64) {
            let second = if i + k < n { rank[i + k] + 1 } else { 0 };
            (rank[i], second)
        };
        sa.sort_unstable_by_key(|&i| key(i));

        next_rank[sa[0]] = 0;
        for j in 1..n {
            let bump = if key(sa[j]) != key(sa[j - 1]) { 1 } else { 0 };
            next_rank[sa[j]] = next_rank[sa[j - 1]] + bump;
        }
        std::mem::swap(&mut rank, &mut next_rank);

        if rank[sa[n - 1]] == (n - 1) as u64 {
            break;
        }
        k <<= 1;
    }

    sa.into_iter().map(|i| i as u64).collect()
}

fn initial_ranks(text: &[Marker]) -> Vec<u64> {
    let mut symbols: Vec<Marker> = text.to_vec();
    symbols.sort_unstable();
    symbols.dedup();
    text.iter()
        .map(|s| symbols.binary_search(s).unwrap() as u64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_sorted(text: &[Marker]) {
        let sa = build_suffix_array(text);
        assert_eq!(sa.len(), text.len());
        for w in sa.windows(2) {
            let a = &text[w[0] as usize..];
            let b = &text[w[1] as usize..];
            assert!(a < b, "suffixes out of order: {:?} !< {:?}", a, b);
        }
    }

    #[test]
    fn sorts_suffixes_of_plain_dna() {
        check_sorted(&[3, 2, 3, 2, 4, 0]);
    }

    #[test]
    fn sorts_suffixes_with_markers() {
        // gcgct5c6g6a6agtcct + sentinel
        let text = vec![3, 2, 3, 2, 4, 5, 2, 6, 3, 6, 1, 6, 1, 3, 4, 2, 2, 4, 0];
        check_sorted(&text);
    }

    #[test]
    fn handles_repetitive_text() {
        let mut text = vec![1u64; 64];
        text.push(0);
        check_sorted(&text);
    }

    #[test]
    fn single_symbol() {
        assert_eq!(build_suffix_array(&[0]), vec![0]);
    }
}
