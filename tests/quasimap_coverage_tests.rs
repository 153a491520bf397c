//! Coverage recording over mapping equivalence classes: class selection,
//! grouped allele counts, per-base recording and seed reproducibility.

extern crate weaver_genome;

use weaver_genome::prg::codec::{encode_dna_bases, parse_numbered_prg, Marker};
use weaver_genome::prg::prg_string::PrgString;
use weaver_genome::prg::PrgInfo;
use weaver_genome::quasimap::coverage::selector::RandomInclusiveInt;
use weaver_genome::quasimap::coverage::{record_search_states, Coverage, GroupedAlleleCounts};
use weaver_genome::quasimap::quasimap_read;
use weaver_genome::quasimap::search::search_read_backwards;

/// Deterministic stand-in for the selection RNG: hands out scripted draws.
struct FixedRandom {
    values: Vec<u64>,
    next: usize,
}

impl FixedRandom {
    fn new(values: Vec<u64>) -> Self {
        FixedRandom { values, next: 0 }
    }
}

impl RandomInclusiveInt for FixedRandom {
    fn random_int_inclusive(&mut self, min: u64, max: u64) -> u64 {
        let value = self.values[self.next];
        self.next += 1;
        assert!(value >= min && value <= max);
        value
    }
}

fn prg_info(numbered: &str) -> PrgInfo {
    let prg = PrgString::new(parse_numbered_prg(numbered).unwrap()).unwrap();
    PrgInfo::from_prg_string(prg).unwrap()
}

fn record_with_draws(read: &str, info: &PrgInfo, coverage: &Coverage, draws: Vec<u64>) {
    let encoded = encode_dna_bases(read.as_bytes()).unwrap();
    let states = search_read_backwards(&encoded, info).unwrap();
    assert!(!states.is_empty());
    let mut rng = FixedRandom::new(draws);
    record_search_states(coverage, &states, read.len(), info, &mut rng).unwrap();
}

fn grouped_for_site(coverage: &Coverage, slot: usize) -> GroupedAlleleCounts {
    coverage.grouped_counts_snapshot()[slot].clone()
}

#[test]
fn multi_mapping_read_selects_one_equivalence_class() {
    // TAGT has three mapping instances with two distinct site paths:
    // within site 5 alone, or spanning sites 5 and 7
    let info = prg_info("TAG5TC6G6T6AG7T8C8CTA");

    // First class: the two instances within site 5
    let coverage = Coverage::empty_structure(&info);
    record_with_draws("TAGT", &info, &coverage, vec![1]);
    assert_eq!(
        coverage.allele_sum_counts(),
        vec![vec![1, 0, 1], vec![0, 0]]
    );

    // Second class: the instance spanning both sites
    record_with_draws("TAGT", &info, &coverage, vec![2]);
    assert_eq!(
        coverage.allele_sum_counts(),
        vec![vec![1, 0, 2], vec![1, 0]]
    );
}

#[test]
fn same_site_instances_group_alleles_together() {
    let info = prg_info("TAG5TC6G6T6AG7T8C8CTA");
    let coverage = Coverage::empty_structure(&info);
    record_with_draws("TAGT", &info, &coverage, vec![1]);

    // One read compatible with alleles 0 and 2 of site 5: one grouped
    // entry keyed by the pair
    let site5 = grouped_for_site(&coverage, 0);
    assert_eq!(site5, GroupedAlleleCounts::from([(vec![0, 2], 1)]));
    assert!(grouped_for_site(&coverage, 1).is_empty());
}

#[test]
fn spanning_class_counts_singleton_groups_per_site() {
    let info = prg_info("TAG5TC6G6T6AG7T8C8CTA");
    let coverage = Coverage::empty_structure(&info);
    record_with_draws("TAGT", &info, &coverage, vec![2]);

    assert_eq!(
        grouped_for_site(&coverage, 0),
        GroupedAlleleCounts::from([(vec![2], 1)])
    );
    assert_eq!(
        grouped_for_site(&coverage, 1),
        GroupedAlleleCounts::from([(vec![0], 1)])
    );
}

#[test]
fn encapsulated_multi_site_read_has_nonvariant_and_two_classes() {
    // CAGT maps outside any site, twice inside site 5 (once per allele)
    // and once inside site 7
    let info = prg_info("TCAGTT5TCAGTCAG6ATCAGTTTCAG6TA7ATCAGT8GTG8G");

    // Draw 1: the non-variant instance, nothing recorded
    let coverage = Coverage::empty_structure(&info);
    record_with_draws("CAGT", &info, &coverage, vec![1]);
    assert_eq!(coverage.allele_sum_counts(), vec![vec![0, 0], vec![0, 0]]);

    // Draw 2: the {site 5} class, both its alleles compatible
    record_with_draws("CAGT", &info, &coverage, vec![2]);
    assert_eq!(coverage.allele_sum_counts(), vec![vec![1, 1], vec![0, 0]]);
    assert_eq!(
        grouped_for_site(&coverage, 0),
        GroupedAlleleCounts::from([(vec![0, 1], 1)])
    );

    // Draw 3: the {site 7} class
    record_with_draws("CAGT", &info, &coverage, vec![3]);
    assert_eq!(coverage.allele_sum_counts(), vec![vec![1, 1], vec![1, 0]]);
}

#[test]
fn read_mapping_twice_within_one_allele_counts_once() {
    let info = prg_info("t5c6gcttagtacgcttagt6aa");
    let coverage = Coverage::empty_structure(&info);
    let states = search_read_backwards(
        &encode_dna_bases(b"cttagt").unwrap(),
        &info,
    )
    .unwrap();
    let interval = states[0].sa_interval;
    let mut rng = FixedRandom::new(vec![1, interval.0]);
    record_search_states(&coverage, &states, 6, &info, &mut rng).unwrap();

    assert_eq!(coverage.allele_sum_counts(), vec![vec![0, 1]]);
    // Per-base coverage exists only at the selected instance
    let total_bases: u64 = info
        .coverage_graph
        .bubble_nodes(5)
        .map(|(start, _)| {
            info.coverage_graph
                .node(start)
                .edges()
                .iter()
                .map(|&n| {
                    info.coverage_graph
                        .node(n)
                        .coverage_counts()
                        .iter()
                        .map(|&c| c as u64)
                        .sum::<u64>()
                })
                .sum()
        })
        .unwrap();
    assert_eq!(total_bases, 6);
}

#[test]
fn per_base_coverage_accumulates_over_reads() {
    let info = prg_info("gct5c6g6T6AG7T8c8cta");
    let coverage = Coverage::empty_structure(&info);
    for _ in 0..2 {
        record_with_draws("tagt", &info, &coverage, vec![1]);
    }
    // Both reads span site 5 allele 2 and site 7 allele 0
    let graph = &info.coverage_graph;
    let (start5, _) = graph.bubble_nodes(5).unwrap();
    let allele2 = graph.node(graph.node(start5).edges()[2]);
    assert_eq!(allele2.coverage_counts(), vec![2]);

    let (start7, _) = graph.bubble_nodes(7).unwrap();
    let allele0 = graph.node(graph.node(start7).edges()[0]);
    assert_eq!(allele0.coverage_counts(), vec![2]);
}

#[test]
fn identical_seeds_reproduce_identical_coverage() {
    let info = prg_info("TAG5TC6G6T6AG7T8C8CTA");
    let read = encode_dna_bases(b"TAGT").unwrap();
    for seed in [3u64, 42, 150, 2077] {
        let reference = Coverage::empty_structure(&info);
        quasimap_read(&read, &info, &reference, seed).unwrap();
        for _ in 0..3 {
            let rerun = Coverage::empty_structure(&info);
            quasimap_read(&read, &info, &rerun, seed).unwrap();
            assert_eq!(rerun.allele_sum_counts(), reference.allele_sum_counts());
            assert_eq!(
                rerun.grouped_counts_snapshot(),
                reference.grouped_counts_snapshot()
            );
        }
    }
}

#[test]
fn distinct_seeds_cover_every_equivalence_class() {
    let info = prg_info("TAG5TC6G6T6AG7T8C8CTA");
    let read = encode_dna_bases(b"TAGT").unwrap();
    let mut seen_sites: std::collections::BTreeSet<Vec<Marker>> = Default::default();
    for seed in 1..=64u64 {
        let coverage = Coverage::empty_structure(&info);
        quasimap_read(&read, &info, &coverage, seed).unwrap();
        let sums = coverage.allele_sum_counts();
        let sites: Vec<Marker> = [(5u64, &sums[0]), (7u64, &sums[1])]
            .iter()
            .filter(|(_, site)| site.iter().any(|&c| c > 0))
            .map(|(id, _)| *id)
            .collect();
        seen_sites.insert(sites);
    }
    // Both classes appear across seeds
    assert!(seen_sites.contains(&vec![5]));
    assert!(seen_sites.contains(&vec![5, 7]));
}
