pub mod allele_extracter;
pub mod alleles;
pub mod gcp;
pub mod genotyped_site;
pub mod model;
pub mod probabilities;
pub mod runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ploidy {
    Haploid,
    Diploid,
}

impl std::str::FromStr for Ploidy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "haploid" => Ok(Ploidy::Haploid),
            "diploid" => Ok(Ploidy::Diploid),
            other => Err(format!("unknown ploidy '{}'", other)),
        }
    }
}
