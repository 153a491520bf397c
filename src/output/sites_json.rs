use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_derive::Serialize;

use crate::genotype::genotyped_site::GenotypedSite;
use crate::utils::errors::{WeaverError, WeaverResult};

/// JSON summary of the genotyped sites, one record per bubble in PRG
/// order, nested sites included.
#[derive(Serialize)]
struct SitesJson {
    sites: Vec<SiteJson>,
}

#[derive(Serialize)]
struct SiteJson {
    site_id: u64,
    pos: usize,
    alleles: Vec<String>,
    genotype: Option<Vec<usize>>,
    allele_covs: Vec<f64>,
    total_coverage: u64,
    gt_conf: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    gt_conf_percentile: Option<f64>,
    filters: Vec<String>,
}

pub fn write<P: AsRef<Path>>(
    path: P,
    genotyped_records: &[Option<GenotypedSite>],
) -> WeaverResult<()> {
    let sites = genotyped_records
        .iter()
        .flatten()
        .map(|site| SiteJson {
            site_id: site.site_id,
            pos: site.pos + 1,
            alleles: site.alleles.iter().map(|a| a.sequence.clone()).collect(),
            genotype: site.genotype.clone(),
            allele_covs: site.allele_covs.clone(),
            total_coverage: site.total_coverage,
            gt_conf: site.gt_conf,
            gt_conf_percentile: site.gt_conf_percentile,
            filters: site.filters.iter().map(|f| f.as_str().to_string()).collect(),
        })
        .collect();

    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, &SitesJson { sites })
        .map_err(|e| WeaverError::Parse(format!("cannot serialise genotyped sites: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::alleles::Allele;
    use crate::genotype::genotyped_site::SiteFilter;

    #[test]
    fn null_and_called_sites_serialise() {
        let mut called = GenotypedSite::new();
        called.site_id = 5;
        called.pos = 4;
        called.alleles = vec![Allele::new("C", vec![5], 0)];
        called.genotype = Some(vec![0]);
        called.allele_covs = vec![5.0];
        called.total_coverage = 6;
        called.gt_conf = 28.5;

        let mut nulled = GenotypedSite::new();
        nulled.site_id = 7;
        nulled.set_filter(SiteFilter::MissingDepth);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.json");
        write(&path, &[Some(called), Some(nulled)]).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(parsed["sites"][0]["site_id"], 5);
        assert_eq!(parsed["sites"][0]["pos"], 5);
        assert_eq!(parsed["sites"][0]["genotype"][0], 0);
        assert!(parsed["sites"][1]["genotype"].is_null());
        assert_eq!(parsed["sites"][1]["filters"][0], "MISSING_DEPTH");
    }
}
