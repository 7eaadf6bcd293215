//! judge-harness: in-container driver for one test configuration
//!
//! Invoked by the orchestrator as
//! `judge-harness [--run-only] <config> <out>` inside the sandbox workdir.
//! Logs go to stderr so captured stdout stays parseable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use judge_micro::harness::{self, HarnessOptions};

#[derive(Parser)]
#[command(name = "judge-harness", about = "Compile, run, and score one test configuration")]
struct Cli {
    /// Path to the configuration document
    config: PathBuf,
    /// Path the result document is written to
    out: PathBuf,
    /// Reuse the compiled driver when the parameter schema is unchanged
    #[arg(long)]
    run_only: bool,
    /// Compile deadline in seconds
    #[arg(long, default_value_t = 30)]
    compile_timeout_s: u64,
    /// Execution deadline in seconds
    #[arg(long, default_value_t = 10)]
    execution_timeout_s: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = HarnessOptions {
        run_only: cli.run_only,
        compile_timeout: Duration::from_secs(cli.compile_timeout_s),
        execution_timeout: Duration::from_secs(cli.execution_timeout_s),
    };

    let code = harness::execute(&cli.config, &cli.out, &options);
    ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
}
