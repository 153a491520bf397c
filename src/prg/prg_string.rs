use std::collections::HashMap;

use crate::prg::codec::{self, Marker};
use crate::utils::errors::{WeaverError, WeaverResult};

/// A validated linearised PRG. Construction checks the marker stream is
/// structurally sound at the symbol level; bubble-level validation (allele
/// counts, nesting) happens in the coverage graph builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrgString {
    markers: Vec<Marker>,
    /// For each even (allele) marker, the text position of its last
    /// occurrence: the site's exit point in the linear PRG.
    end_positions: HashMap<Marker, usize>,
    max_marker: Marker,
}

impl PrgString {
    pub fn new(markers: Vec<Marker>) -> WeaverResult<Self> {
        if markers.is_empty() {
            return Err(WeaverError::InvalidPrg("empty PRG".to_string()));
        }
        let mut site_counts: HashMap<Marker, usize> = HashMap::new();
        let mut end_positions: HashMap<Marker, usize> = HashMap::new();
        let mut max_marker = 0;
        for (i, &m) in markers.iter().enumerate() {
            if m == 0 {
                return Err(WeaverError::InvalidPrg(format!(
                    "symbol 0 at position {} is reserved for the FM-index sentinel",
                    i
                )));
            }
            max_marker = max_marker.max(m);
            if codec::is_site_marker(m) {
                *site_counts.entry(m).or_insert(0) += 1;
            } else if codec::is_allele_marker(m) {
                end_positions.insert(m, i);
            }
        }
        for (&site, &count) in &site_counts {
            if count != 1 {
                return Err(WeaverError::InvalidPrg(format!(
                    "site marker {} occurs {} times; sites open exactly once",
                    site, count
                )));
            }
            if !end_positions.contains_key(&(site + 1)) {
                return Err(WeaverError::InvalidPrg(format!(
                    "site {} is never closed by its allele marker {}",
                    site,
                    site + 1
                )));
            }
        }
        for &even in end_positions.keys() {
            if !site_counts.contains_key(&(even - 1)) {
                return Err(WeaverError::InvalidPrg(format!(
                    "allele marker {} has no opening site marker {}",
                    even,
                    even - 1
                )));
            }
        }
        Ok(PrgString {
            markers,
            end_positions,
            max_marker,
        })
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn max_marker(&self) -> Marker {
        self.max_marker
    }

    pub fn num_sites(&self) -> usize {
        self.end_positions.len()
    }

    /// Number of slots needed by the per-site coverage arrays, one per
    /// possible site index up to the largest used ID.
    pub fn num_site_slots(&self) -> usize {
        if self.max_marker < codec::MIN_SITE_MARKER {
            return 0;
        }
        codec::site_index(if self.max_marker % 2 == 0 {
            self.max_marker - 1
        } else {
            self.max_marker
        }) + 1
    }

    /// Whether `pos` holds the site exit point of the even marker there.
    pub fn is_site_end(&self, pos: usize) -> bool {
        let marker = self.markers[pos];
        codec::is_allele_marker(marker) && self.end_positions.get(&marker) == Some(&pos)
    }

    pub fn end_positions(&self) -> &HashMap<Marker, usize> {
        &self.end_positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prg::codec::parse_bracketed_prg;

    #[test]
    fn end_positions_map_site_exits() {
        let markers = parse_bracketed_prg("[A,C[A,G]]").unwrap(); // 5,1,6,2,7,1,8,3,8,6
        let prg = PrgString::new(markers).unwrap();
        assert_eq!(prg.end_positions()[&6], 9);
        assert_eq!(prg.end_positions()[&8], 8);
        assert!(prg.is_site_end(9));
        assert!(prg.is_site_end(8));
        assert!(!prg.is_site_end(2));
    }

    #[test]
    fn duplicate_site_markers_rejected() {
        // "[A,C]C[A,G]" with site 5 re-used for the second bubble
        let markers = vec![5, 1, 6, 2, 6, 2, 5, 1, 6, 3, 6];
        assert!(PrgString::new(markers).is_err());
    }

    #[test]
    fn unclosed_site_rejected() {
        let markers = vec![5, 1, 2, 3];
        assert!(PrgString::new(markers).is_err());
    }

    #[test]
    fn orphan_allele_marker_rejected() {
        let markers = vec![1, 6, 2, 6];
        assert!(PrgString::new(markers).is_err());
    }

    #[test]
    fn site_slots_cover_dense_numbering() {
        let prg = PrgString::new(parse_bracketed_prg("[A,C]T[G,T]").unwrap()).unwrap();
        assert_eq!(prg.num_sites(), 2);
        assert_eq!(prg.num_site_slots(), 2);
    }
}
