pub mod coverage_json;
pub mod sites_json;
pub mod vcf;
