use std::cell::RefCell;
use std::collections::HashMap;

use statrs::function::gamma::ln_gamma;

/// A log probability mass function, memoised by argument. Arguments are
/// real-valued because diploid coverages get split fractionally.
pub trait LogPmf {
    fn log_pmf(&self, x: f64) -> f64;
}

pub struct PoissonLogPmf {
    lambda: f64,
    memo: RefCell<HashMap<u64, f64>>,
}

impl PoissonLogPmf {
    pub fn new(lambda: f64) -> Self {
        PoissonLogPmf {
            lambda,
            memo: RefCell::new(HashMap::new()),
        }
    }
}

impl LogPmf for PoissonLogPmf {
    fn log_pmf(&self, x: f64) -> f64 {
        if let Some(&cached) = self.memo.borrow().get(&x.to_bits()) {
            return cached;
        }
        let value = if self.lambda <= 0.0 {
            if x == 0.0 {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        } else {
            x * self.lambda.ln() - self.lambda - ln_gamma(x + 1.0)
        };
        self.memo.borrow_mut().insert(x.to_bits(), value);
        value
    }
}

/// Negative binomial over number of failures before `r` successes with
/// success probability `p`, continuously extended through the gamma
/// function.
pub struct NegBinomLogPmf {
    r: f64,
    p: f64,
    memo: RefCell<HashMap<u64, f64>>,
}

impl NegBinomLogPmf {
    pub fn new(r: f64, p: f64) -> Self {
        NegBinomLogPmf {
            r,
            p,
            memo: RefCell::new(HashMap::new()),
        }
    }
}

impl LogPmf for NegBinomLogPmf {
    fn log_pmf(&self, x: f64) -> f64 {
        if let Some(&cached) = self.memo.borrow().get(&x.to_bits()) {
            return cached;
        }
        let value = ln_gamma(x + self.r) - ln_gamma(x + 1.0) - ln_gamma(self.r)
            + self.r * self.p.ln()
            + x * (1.0 - self.p).ln();
        self.memo.borrow_mut().insert(x.to_bits(), value);
        value
    }
}

/// Which emission PMF the depth statistics selected, with its parameters;
/// the GCP simulation samples from the same distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PmfKind {
    Poisson { lambda: f64 },
    NegBinom { r: f64, p: f64 },
}

/**
 * Depth- and error-model quantities shared by every per-site likelihood
 * computation. Log of the per-base error rate is carried because of its
 * direct use in the likelihood formulae; `log_zero` is the canonical
 * logPMF(0) of the full-depth distribution.
 */
pub struct LikelihoodStats {
    pub mean_cov_depth: f64,
    pub var_cov_depth: f64,
    pub mean_pb_error: f64,
    pub log_mean_pb_error: f64,
    pub log_zero: f64,
    pub log_zero_half_depth: f64,
    pub log_no_zero: f64,
    pub log_no_zero_half_depth: f64,
    /// Minimum per-base count that is more likely signal than error.
    pub credible_cov_t: u64,
    pub pmf_kind: PmfKind,
    pub pmf_full_depth: Box<dyn LogPmf>,
    pub pmf_half_depth: Box<dyn LogPmf>,
}

impl LikelihoodStats {
    /**
     * Poisson when the coverage variance does not exceed the mean,
     * negative binomial (method-of-moments parameters) otherwise. The
     * half-depth distribution halves mean and variance, preserving the
     * overdispersion ratio.
     */
    pub fn make(mean_cov: f64, var_cov: f64, mean_pb_error: f64) -> LikelihoodStats {
        let (pmf_kind, pmf_full, pmf_half, log_no_zero, log_no_zero_half): (
            PmfKind,
            Box<dyn LogPmf>,
            Box<dyn LogPmf>,
            f64,
            f64,
        ) = if var_cov > mean_cov {
            let r = mean_cov.powi(2) / (var_cov - mean_cov);
            let p = r / (mean_cov + r);
            let half_mean = mean_cov / 2.0;
            let half_var = var_cov / 2.0;
            let r_half = half_mean.powi(2) / (half_var - half_mean);
            let p_half = r_half / (half_mean + r_half);
            (
                PmfKind::NegBinom { r, p },
                Box::new(NegBinomLogPmf::new(r, p)),
                Box::new(NegBinomLogPmf::new(r_half, p_half)),
                (1.0 - p.powf(r)).ln(),
                (1.0 - p_half.powf(r_half)).ln(),
            )
        } else {
            (
                PmfKind::Poisson { lambda: mean_cov },
                Box::new(PoissonLogPmf::new(mean_cov)),
                Box::new(PoissonLogPmf::new(mean_cov / 2.0)),
                (1.0 - (-mean_cov).exp()).ln(),
                (1.0 - (-mean_cov / 2.0).exp()).ln(),
            )
        };

        let credible_cov_t = find_minimum_non_error_cov(mean_pb_error, pmf_full.as_ref());
        LikelihoodStats {
            mean_cov_depth: mean_cov,
            var_cov_depth: var_cov,
            mean_pb_error,
            log_mean_pb_error: mean_pb_error.ln(),
            log_zero: pmf_full.log_pmf(0.0),
            log_zero_half_depth: pmf_half.log_pmf(0.0),
            log_no_zero,
            log_no_zero_half_depth: log_no_zero_half,
            credible_cov_t,
            pmf_kind,
            pmf_full_depth: pmf_full,
            pmf_half_depth: pmf_half,
        }
    }
}

/// Smallest k >= 1 whose probability under the coverage distribution
/// exceeds that of k sequencing errors. A degenerate distribution (zero
/// depth) would never satisfy the condition; such sites are all null
/// anyway, so the threshold defaults to 1.
fn find_minimum_non_error_cov(mean_pb_error: f64, pmf: &dyn LogPmf) -> u64 {
    let mut min_count: u64 = 1;
    loop {
        let log_pmf = pmf.log_pmf(min_count as f64);
        if !log_pmf.is_finite() || log_pmf > min_count as f64 * mean_pb_error.ln() {
            return min_count;
        }
        min_count += 1;
    }
}
