//! xorshard CLI
//!
//! Parallel repeating-key XOR file transform

use clap::{Args, Parser, Subcommand};
use console::style;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xorshard_core::{Coordinator, Job, JobReport, JobState, StatusCode, plan_fragments};

use xorshard_cli::config::{Config, MAX_THREADS};
use xorshard_cli::progress::{JobProgress, format_bytes, format_duration, format_speed};

/// xorshard - split a file across worker threads and XOR it with a repeating key
#[derive(Parser)]
#[command(name = "xorshard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    Encrypt(TransformArgs),

    /// Decrypt a file (the same transform as encrypt)
    Decrypt(TransformArgs),

    /// Print the fragment plan for a payload size
    Plan {
        /// Payload size in bytes
        #[arg(short, long)]
        size: u64,

        /// Worker count (defaults to the configured count)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct TransformArgs {
    /// Input file
    #[arg(short = 'p', long = "input")]
    input: PathBuf,

    /// Output file (created or truncated)
    #[arg(short, long)]
    output: PathBuf,

    /// Key file
    #[arg(short, long)]
    key: PathBuf,

    /// Worker count (defaults to the configured count)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Print the BLAKE3 digest of the output
    #[arg(long)]
    digest: bool,

    /// fsync the output before exiting
    #[arg(long)]
    sync: bool,

    /// Do not show a spinner
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = cli.command
    {
        return init_config(&config_path, force);
    }

    // An explicit path must exist; the default one is created on first use
    let config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_or_init(&config_path)?
    };
    config.validate()?;

    init_logging(cli.verbose, &config.logging.level);
    tracing::debug!("Using configuration from {:?}", config_path);

    match cli.command {
        Commands::Encrypt(args) => run_transform("encrypt", &args, &config, cli.verbose),
        Commands::Decrypt(args) => run_transform("decrypt", &args, &config, cli.verbose),
        Commands::Plan { size, threads } => show_plan(size, threads, &config),
        Commands::Config {
            action: ConfigAction::Show,
        } => show_config(&config_path, &config),
        Commands::Config {
            action: ConfigAction::Init { .. },
        } => Ok(()),
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Worker count from `-j` or the config, capped like the config's own value
fn resolve_threads(requested: Option<usize>, config: &Config) -> anyhow::Result<usize> {
    let threads = requested.unwrap_or_else(|| config.effective_threads());
    if threads > MAX_THREADS {
        anyhow::bail!(
            "Worker count {} exceeds the maximum of {}",
            threads,
            MAX_THREADS
        );
    }
    Ok(threads)
}

/// Run one transform job and print its summary
fn run_transform(
    label: &str,
    args: &TransformArgs,
    config: &Config,
    verbose: bool,
) -> anyhow::Result<()> {
    let threads = resolve_threads(args.threads, config)?;
    let job = Job::new(&args.input, &args.output, &args.key, threads);

    let mut options = config.job_options();
    options.sync_output |= args.sync;
    let mut coordinator = Coordinator::new(options);

    let input_size = fs::metadata(&args.input).map(|m| m.len()).unwrap_or(0);
    let progress = if args.quiet || !console::Term::stderr().is_term() {
        JobProgress::hidden()
    } else {
        JobProgress::start(label, input_size, threads)
    };

    let result = coordinator.run(&job);

    let report = match result {
        Ok(report) => {
            progress.finish_with_message(format!("{label} complete"));
            report
        }
        Err(err) => {
            progress.abandon();
            // The state before Failed is where the job stopped
            let failed_in = coordinator
                .history()
                .iter()
                .rev()
                .nth(1)
                .copied()
                .unwrap_or(JobState::Loading);
            anyhow::bail!(
                "{} failed during {} with status {}",
                label,
                failed_in,
                StatusCode::from(&err)
            );
        }
    };

    print_summary(label, args, &report, verbose);

    if args.digest {
        let digest = digest_file(&args.output)?;
        println!("  BLAKE3:   {digest}");
    }

    Ok(())
}

fn print_summary(label: &str, args: &TransformArgs, report: &JobReport, verbose: bool) {
    let timings = &report.timings;

    println!("{} {}", style("✓").green().bold(), style(label).bold());
    println!("  Input:    {}", args.input.display());
    println!("  Output:   {}", args.output.display());
    println!("  Size:     {}", format_bytes(report.bytes));
    println!("  Key:      {} bytes", report.key_length);
    println!("  Workers:  {}", report.thread_count());
    println!(
        "  Elapsed:  {} (load {}, transform {}, write {})",
        format_duration(timings.total),
        format_duration(timings.load),
        format_duration(timings.transform),
        format_duration(timings.write)
    );
    println!("  Speed:    {}", format_speed(report.throughput()));

    if verbose {
        for worker in &report.workers {
            println!(
                "  {} [{}, {}) {} in {}",
                style(format!("worker {:>4}", worker.index)).dim(),
                worker.start,
                worker.end,
                format_bytes(worker.bytes() as u64),
                format_duration(worker.elapsed)
            );
        }
    }
}

/// BLAKE3 digest of a file, hex-encoded
fn digest_file(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path)?;
    let hash = blake3::hash(&bytes);
    Ok(hex::encode(hash.as_bytes()))
}

/// Print the fragment table for a payload
fn show_plan(size: u64, threads: Option<usize>, config: &Config) -> anyhow::Result<()> {
    let threads = resolve_threads(threads, config)?;
    let size = usize::try_from(size)
        .map_err(|_| anyhow::anyhow!("Payload size {} exceeds the address space", size))?;

    let plan = plan_fragments(size, threads)?;

    println!(
        "{} bytes across {} workers",
        style(size).bold(),
        style(threads).bold()
    );
    println!("{:>6}  {:>14}  {:>14}  {:>14}", "worker", "start", "end", "bytes");
    for range in &plan {
        println!(
            "{:>6}  {:>14}  {:>14}  {:>14}",
            range.index,
            range.start,
            range.end,
            range.len()
        );
    }

    Ok(())
}

fn show_config(path: &Path, config: &Config) -> anyhow::Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    println!("# effective threads: {}", config.effective_threads());
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
