use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;

pub fn build_cli() -> Command {
    Command::new("weaver")
        .version(crate_version!())
        .about("Genome graph read mapper and variant genotyper over population reference graphs")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Print debug logging information"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Unless there is an error, do not print log messages"),
        )
        .subcommand(
            Command::new("build")
                .about("Index a linearised PRG: suffix array, BWT and rank supports")
                .arg(
                    Arg::new("prg")
                        .long("prg")
                        .required(true)
                        .help("PRG file: packed 64-bit integers, or text in numbered/bracketed form"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .help("Output directory for the index"),
                )
                .arg(
                    Arg::new("endianness")
                        .long("endianness")
                        .value_parser(["little", "big"])
                        .default_value("little")
                        .help("Byte order of the packed PRG and of the written index"),
                ),
        )
        .subcommand(
            Command::new("genotype")
                .about("Quasimap reads onto a built PRG and genotype every variant site")
                .arg(
                    Arg::new("prg")
                        .long("prg")
                        .required(true)
                        .help("Directory produced by 'build', or a PRG file to index on the fly"),
                )
                .arg(
                    Arg::new("reads")
                        .long("reads")
                        .required(true)
                        .value_delimiter(',')
                        .help("FASTQ file(s) with the reads to map, comma separated"),
                )
                .arg(
                    Arg::new("kmer-size")
                        .long("kmer-size")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("15")
                        .help("Kmer size a seeding pre-index would use; mapping is exact regardless"),
                )
                .arg(
                    Arg::new("max-read-length")
                        .long("max-read-length")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("150")
                        .help("Upper bound on read length, for buffer sizing"),
                )
                .arg(
                    Arg::new("ploidy")
                        .long("ploidy")
                        .value_parser(["haploid", "diploid"])
                        .default_value("haploid"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("0")
                        .help("Selection seed; 0 draws a fresh seed from the OS"),
                )
                .arg(
                    Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("gcp")
                        .long("gcp")
                        .value_parser(["on", "off"])
                        .default_value("on")
                        .help("Calibrate genotype confidences into percentiles"),
                )
                .arg(
                    Arg::new("sample")
                        .long("sample")
                        .default_value("sample")
                        .help("Sample name written to the VCF"),
                )
                .arg(Arg::new("out").long("out").required(true).help("Output directory")),
        )
        .subcommand(
            Command::new("shell-completion")
                .about("Generate a shell completion script for weaver")
                .arg(
                    Arg::new("shell")
                        .long("shell")
                        .required(true)
                        .value_parser(clap::value_parser!(clap_complete::Shell)),
                )
                .arg(
                    Arg::new("output-file")
                        .long("output-file")
                        .required(true),
                ),
        )
}

pub fn set_log_level(matches: &ArgMatches) {
    let mut log_level = LevelFilter::Info;
    if matches.get_flag("verbose") {
        log_level = LevelFilter::Debug;
    }
    if matches.get_flag("quiet") {
        log_level = LevelFilter::Error;
    }
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level);
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_filters(&std::env::var("RUST_LOG").unwrap());
    }
    if builder.try_init().is_err() {
        debug!("logger already initialised");
    }
}
