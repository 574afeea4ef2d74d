use clap::{Parser, Subcommand};
use graf::{GrafArchive, Placeholders};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "graf", version, about = "Extract files from GRAF packed archives")]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info  => Level::INFO,
            LogLevel::Warn  => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files (default output: <index>_extracted)
    Extract {
        /// Path to index.bin
        input: PathBuf,
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,
        /// Replace [platform] in file names
        #[arg(short, long)]
        platform: Option<String>,
        /// Replace [texture] in file names
        #[arg(short, long)]
        texture: Option<String>,
        /// Replace [region] in file names
        #[arg(short, long)]
        region: Option<String>,
        /// Extra replacement, KEY=VALUE for [KEY]
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_replacement)]
        replacements: Vec<(String, String)>,
        /// Only extract from these data archives (comma separated)
        #[arg(short = 'k', long = "paks", value_delimiter = ',')]
        paks: Vec<String>,
    },
    /// List archive contents
    List {
        input: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write per-archive layout reports
    Analyze {
        input: PathBuf,
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    match run(cli.command) {
        Ok(())  => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, platform, texture, region, replacements, paks } => {
            let ar = GrafArchive::load(&input)?;
            let out = output_dir.unwrap_or_else(|| default_output(&input));

            let mut placeholders: Placeholders = replacements.into_iter().collect();
            for (key, value) in [("platform", platform), ("texture", texture), ("region", region)] {
                if let Some(v) = value { placeholders.insert(key, v); }
            }

            let mut failures = 0usize;
            if paks.is_empty() {
                let report = ar.extract_all(&out, &placeholders);
                failures += print_report(&report);
            } else {
                for pak in &paks {
                    match ar.extract_from_archive(out.join(pak), &placeholders, pak) {
                        Some(report) => failures += print_report(&report),
                        None         => eprintln!("Archive \"{pak}\" not found."),
                    }
                }
            }

            if failures == 0 {
                println!("Extraction complete.");
            } else {
                println!("Extraction complete with {failures} error(s).");
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let ar = GrafArchive::load(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(ar.entries())?);
                return Ok(());
            }
            println!("{:>6} {:<14} {:>3} {:>10} {:>10} {:>10}  Name",
                     "Index", "Archive", "Lvl", "Offset", "ZLength", "Length");
            for (i, e) in ar.entries().iter().enumerate() {
                let pak = ar.archive_name(e.slot)?.unwrap_or("-");
                println!("{:>6} {:<14} {:>3} {:>10} {:>10} {:>10}  {}",
                         i, pak, e.compression_level, e.offset, e.compressed_length, e.length, e.name);
            }
        }

        // ── Analyze ──────────────────────────────────────────────────────────
        Commands::Analyze { input, output_dir } => {
            let ar = GrafArchive::load(&input)?;
            let out = output_dir.unwrap_or_else(|| default_output(&input));
            println!("Performing analysis...");
            let layouts = ar.analyze(&out)?;
            println!("Analysis of {} archive(s) written to {}", layouts.len(), out.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn default_output(input: &Path) -> PathBuf {
    let mut s = input.as_os_str().to_owned();
    s.push("_extracted");
    PathBuf::from(s)
}

fn parse_replacement(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

fn print_report(report: &graf::BatchReport) -> usize {
    if !report.failed.is_empty() {
        eprintln!("Failed to extract {} file(s):", report.failed.len());
        for f in &report.failed {
            eprintln!("  [{}] {}: {}", f.index, f.name, f.error);
        }
    }
    report.failed.len()
}
