extern crate weaver_genome;

#[macro_use]
extern crate log;

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;

use clap::ArgMatches;
use clap_complete::generate;

use weaver_genome::cli::{build_cli, set_log_level};
use weaver_genome::fm_index::FmIndex;
use weaver_genome::genotype::runner::LevelGenotyper;
use weaver_genome::genotype::Ploidy;
use weaver_genome::output::{coverage_json, sites_json, vcf};
use weaver_genome::prg::codec::{self, Endianness};
use weaver_genome::prg::prg_string::PrgString;
use weaver_genome::prg::PrgInfo;
use weaver_genome::quasimap::coverage::Coverage;
use weaver_genome::quasimap::read_stats::ReadStats;
use weaver_genome::quasimap::quasimap_reads;
use weaver_genome::utils::errors::{WeaverError, WeaverResult};

fn main() {
    let mut app = build_cli();
    let matches = app.clone().get_matches();

    let outcome = match matches.subcommand() {
        Some(("build", m)) => {
            set_log_level(m);
            run_build(m)
        }
        Some(("genotype", m)) => {
            set_log_level(m);
            run_genotype(m)
        }
        Some(("shell-completion", m)) => {
            set_log_level(m);
            run_shell_completion(m)
        }
        _ => {
            app.print_help().unwrap();
            println!();
            return;
        }
    };

    if let Err(e) = outcome {
        error!("{}", e);
        process::exit(e.exit_code());
    }
}

fn endianness_from(m: &ArgMatches) -> Endianness {
    match m.get_one::<String>("endianness").map(|s| s.as_str()) {
        Some("big") => Endianness::Big,
        _ => Endianness::Little,
    }
}

fn run_build(m: &ArgMatches) -> WeaverResult<()> {
    let prg_path = m.get_one::<String>("prg").unwrap();
    let out_dir = PathBuf::from(m.get_one::<String>("out").unwrap());
    let endianness = endianness_from(m);
    create_dir_all(&out_dir)?;

    let markers = codec::load_prg(prg_path, endianness)?;
    let prg = PrgString::new(markers)?;
    // Building the coverage graph validates bubble structure up front
    let prg_info = PrgInfo::from_prg_string(prg)?;
    info!(
        "PRG holds {} symbols and {} variant sites",
        prg_info.prg.len(),
        prg_info.coverage_graph.num_variant_sites()
    );

    codec::write_packed_prg(out_dir.join("prg.bin"), prg_info.prg.markers(), endianness)?;
    prg_info.fm_index.write(out_dir.join("fm_index.bin"), endianness)?;
    info!("Build written to {}", out_dir.display());
    Ok(())
}

fn load_prg_info(prg_path: &Path) -> WeaverResult<PrgInfo> {
    if prg_path.is_dir() {
        let markers = codec::read_packed_prg(prg_path.join("prg.bin"), Endianness::Little)?;
        let prg = match PrgString::new(markers) {
            Ok(prg) => prg,
            // A big-endian build directory reads as garbage markers
            Err(_) => PrgString::new(codec::read_packed_prg(
                prg_path.join("prg.bin"),
                Endianness::Big,
            )?)?,
        };
        let fm_index = FmIndex::read(prg_path.join("fm_index.bin"))?;
        if fm_index.len() != prg.len() + 1 {
            return Err(WeaverError::CorruptedIndex(
                "FM-index does not match the stored PRG".to_string(),
            ));
        }
        PrgInfo::new(prg, fm_index)
    } else {
        info!("No build directory given; indexing the PRG in memory");
        let markers = codec::load_prg(prg_path, Endianness::Little)?;
        PrgInfo::from_prg_string(PrgString::new(markers)?)
    }
}

fn run_genotype(m: &ArgMatches) -> WeaverResult<()> {
    let threads = *m.get_one::<usize>("threads").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .unwrap_or_else(|e| warn!("rayon pool already initialised: {}", e));

    let out_dir = PathBuf::from(m.get_one::<String>("out").unwrap());
    create_dir_all(&out_dir)?;
    let seed = *m.get_one::<u64>("seed").unwrap();
    let ploidy: Ploidy = m
        .get_one::<String>("ploidy")
        .unwrap()
        .parse()
        .map_err(WeaverError::Parse)?;
    let run_gcp = m.get_one::<String>("gcp").map(|s| s == "on").unwrap_or(true);
    let kmer_size = *m.get_one::<usize>("kmer-size").unwrap();
    let max_read_length = *m.get_one::<usize>("max-read-length").unwrap();
    debug!(
        "kmer size {} accepted (no kmer pre-index is used); max read length {}",
        kmer_size, max_read_length
    );

    let prg_info = load_prg_info(Path::new(m.get_one::<String>("prg").unwrap()))?;
    let reads_paths: Vec<String> = m.get_many::<String>("reads").unwrap().cloned().collect();

    let coverage = Coverage::empty_structure(&prg_info);
    let mut read_stats = ReadStats::new();
    let stop = AtomicBool::new(false);
    quasimap_reads(&reads_paths, &prg_info, &coverage, &mut read_stats, seed, &stop)?;

    let grouped_counts = coverage.grouped_counts_snapshot();
    read_stats.compute_coverage_depth(&grouped_counts, &prg_info.coverage_graph.par_map);
    info!(
        "Mean coverage depth {:.2} (variance {:.2}) over {} level-0 sites, {} without coverage",
        read_stats.mean_cov_depth(),
        read_stats.var_cov_depth(),
        read_stats.num_sites_total(),
        read_stats.num_sites_no_cov()
    );

    coverage_json::write_all(&out_dir, &prg_info, &coverage)?;

    let genotyped =
        LevelGenotyper::genotype(&prg_info, &grouped_counts, &read_stats, ploidy, run_gcp)?;
    sites_json::write(out_dir.join("genotyped_sites.json"), &genotyped)?;
    let sample = m.get_one::<String>("sample").unwrap();
    vcf::write_vcf(out_dir.join("genotyped.vcf"), &prg_info, &genotyped, sample)?;

    info!("Genotyping complete; results in {}", out_dir.display());
    Ok(())
}

fn run_shell_completion(m: &ArgMatches) -> WeaverResult<()> {
    let mut file = std::fs::File::create(m.get_one::<String>("output-file").unwrap())?;
    if let Some(generator) = m.get_one::<clap_complete::Shell>("shell").copied() {
        let mut cmd = build_cli();
        info!("Generating completion script for shell {}", generator);
        let name = cmd.get_name().to_string();
        generate(generator, &mut cmd, name, &mut file);
    }
    Ok(())
}
