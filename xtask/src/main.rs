//! Build automation tasks for xorshard
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "xorshard build automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all tests
    Test,

    /// Run clippy lints
    Lint,

    /// Check formatting
    Fmt,

    /// Run all CI checks
    Ci,

    /// Run criterion benchmarks
    Bench,

    /// Build the C library and generate its header
    Header,

    /// Run a fuzz target (requires cargo-fuzz and nightly)
    Fuzz {
        /// Target name, e.g. fuzz_plan_fragments
        target: String,

        /// Maximum run time in seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Generate documentation
    Doc,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => {
            run_command("cargo", &["test", "--all-features", "--workspace"])?;
        }
        Commands::Lint => {
            run_command("cargo", &["clippy", "--workspace", "--", "-D", "warnings"])?;
        }
        Commands::Fmt => {
            run_command("cargo", &["fmt", "--all", "--check"])?;
        }
        Commands::Ci => {
            println!("Running CI checks...");
            run_command("cargo", &["fmt", "--all", "--check"])?;
            run_command("cargo", &["clippy", "--workspace", "--", "-D", "warnings"])?;
            run_command("cargo", &["test", "--all-features", "--workspace"])?;
            println!("All CI checks passed!");
        }
        Commands::Bench => {
            run_command("cargo", &["bench", "-p", "xorshard-integration-tests"])?;
        }
        Commands::Header => {
            run_command("cargo", &["build", "--release", "-p", "xorshard-ffi"])?;
            println!("Header written to target/include/xorshard-ffi.h");
        }
        Commands::Fuzz { target, seconds } => {
            let max_time = format!("-max_total_time={seconds}");
            run_command(
                "cargo",
                &["+nightly", "fuzz", "run", &target, "--", &max_time],
            )?;
        }
        Commands::Doc => {
            run_command("cargo", &["doc", "--workspace", "--no-deps", "--open"])?;
        }
    }

    Ok(())
}

fn run_command(program: &str, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new(program).args(args).status()?;

    if !status.success() {
        anyhow::bail!("{} {:?} failed", program, args);
    }

    Ok(())
}
