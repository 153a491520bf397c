use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Binomial, NegativeBinomial, Poisson};

use crate::genotype::alleles::Allele;
use crate::genotype::genotyped_site::GenotypedSite;
use crate::genotype::model::{LevelGenotyperModel, ModelData};
use crate::genotype::probabilities::{LikelihoodStats, PmfKind};
use crate::genotype::Ploidy;
use crate::quasimap::coverage::GroupedAlleleCounts;
use crate::utils::errors::{WeaverError, WeaverResult};

/// Number of confidences backing the percentile calibration.
pub const CONF_DISTRIB_SIZE: usize = 10_000;

/// Simulation draws use a fixed seed so genotyping the same coverage
/// snapshot twice is byte-identical.
const SIMULATION_SEED: u64 = 42;

/**
 * Collects the confidence distribution used for calibration: empirical
 * confidences from the genotyped sites, topped up by simulating two-allele
 * bubbles from the fitted coverage and error model and running the same
 * likelihood code on them. Returned sorted.
 */
pub fn gtconf_distribution(
    genotyped_records: &[Option<GenotypedSite>],
    l_stats: &LikelihoodStats,
    ploidy: Ploidy,
) -> Vec<f64> {
    let empirical: Vec<f64> = genotyped_records
        .iter()
        .flatten()
        .map(|site| site.gt_conf)
        .collect();
    let mut rng = StdRng::seed_from_u64(SIMULATION_SEED);

    let mut confidences = Vec::with_capacity(CONF_DISTRIB_SIZE);
    if empirical.len() > CONF_DISTRIB_SIZE {
        while confidences.len() < CONF_DISTRIB_SIZE {
            confidences.push(empirical[rng.gen_range(0..empirical.len())]);
        }
    } else {
        confidences.extend_from_slice(&empirical);
        let simulated = simulate_confidences(
            CONF_DISTRIB_SIZE - confidences.len(),
            l_stats,
            ploidy,
            &mut rng,
        );
        confidences.extend(simulated);
    }
    confidences.sort_by(|a, b| a.partial_cmp(b).unwrap());
    confidences
}

/// Draws synthetic two-allele sites: the true allele's coverage from the
/// fitted PMF, the other allele's from a binomial error draw.
fn simulate_confidences(
    iterations: usize,
    l_stats: &LikelihoodStats,
    ploidy: Ploidy,
    rng: &mut StdRng,
) -> Vec<f64> {
    if iterations == 0 {
        return Vec::new();
    }
    let mean_cov = l_stats.mean_cov_depth;
    if mean_cov <= 0.0 {
        return Vec::new();
    }
    let error_draw = Binomial::new(l_stats.mean_pb_error, mean_cov.round() as u64).ok();

    let mut confidences = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let correct_cov = match l_stats.pmf_kind {
            PmfKind::Poisson { lambda } => match Poisson::new(lambda) {
                Ok(dist) => dist.sample(rng).round() as u64,
                Err(_) => continue,
            },
            PmfKind::NegBinom { r, p } => match NegativeBinomial::new(r, p) {
                Ok(dist) => dist.sample(rng),
                Err(_) => continue,
            },
        };
        let incorrect_cov = match &error_draw {
            Some(draw) => draw.sample(rng).round() as u64,
            None => 0,
        };

        let alleles = vec![
            Allele::new("C", vec![correct_cov], 0),
            Allele::new("A", vec![incorrect_cov], 1),
        ];
        let gp_counts: GroupedAlleleCounts =
            GroupedAlleleCounts::from([(vec![0], correct_cov), (vec![1], incorrect_cov)])
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .collect();

        let data = ModelData {
            input_alleles: alleles,
            gp_counts: &gp_counts,
            ploidy,
            l_stats,
            ignore_ref_allele: false,
        };
        // A null draw (no coverage at all) contributes confidence zero
        let confidence = LevelGenotyperModel::genotype(data)
            .map(|site| site.gt_conf)
            .unwrap_or(0.0);
        confidences.push(confidence);
    }
    confidences
}

/**
 * Assigns confidence percentiles from a sorted confidence distribution.
 * Duplicate confidences share the average of their ranks; queries between
 * known confidences interpolate linearly.
 */
pub struct Percentiler {
    entries: Vec<(f64, f64)>,
}

impl Percentiler {
    pub fn new(sorted_confidences: &[f64]) -> WeaverResult<Percentiler> {
        if sorted_confidences.len() < 2 {
            return Err(WeaverError::NotEnoughData(
                "need at least two genotype confidences for percentiles".to_string(),
            ));
        }
        let total = sorted_confidences.len() as f64;
        let mut entries: Vec<(f64, f64)> = Vec::new();
        let mut index = 0;
        while index < sorted_confidences.len() {
            let confidence = sorted_confidences[index];
            let upper = sorted_confidences.partition_point(|&c| c <= confidence);
            let low_percentile = 100.0 * (index as f64 + 1.0) / total;
            let high_percentile = 100.0 * upper as f64 / total;
            entries.push((confidence, (low_percentile + high_percentile) / 2.0));
            index = upper;
        }
        Ok(Percentiler { entries })
    }

    pub fn confidence_percentile(&self, query: f64) -> f64 {
        let position = self.entries.partition_point(|&(c, _)| c < query);
        if position == self.entries.len() {
            return 100.0;
        }
        let (confidence, percentile) = self.entries[position];
        if confidence == query {
            return percentile;
        }
        if position == 0 {
            return 0.0;
        }
        let (low_conf, low_pct) = self.entries[position - 1];
        linear_interpolation(low_conf, confidence, low_pct, percentile, query)
    }
}

fn linear_interpolation(x1: f64, x2: f64, y1: f64, y2: f64, x: f64) -> f64 {
    let slope = (y2 - y1) / (x2 - x1);
    y1 + slope * (x - x1)
}
