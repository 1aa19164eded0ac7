// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmark of CPU reads out of a u-dma-buf region.
//!
//! For every power-of-two block size, each trial maps the region, then
//! alternates a cache sync ioctl with a block copy into a heap buffer until
//! the transfer size has been read. Per-trial timings go to a results file.

// UNSAFETY: raw allocation of the page-aligned scratch buffer.
#![cfg_attr(target_os = "linux", expect(unsafe_code))]

#[cfg(target_os = "linux")]
mod config;
#[cfg(target_os = "linux")]
mod report;
#[cfg(target_os = "linux")]
mod scratch;
#[cfg(target_os = "linux")]
mod sweep;
#[cfg(target_os = "linux")]
mod trial;

use cfg_if::cfg_if;
use std::process::ExitCode;

/// Exit status of a fatal error, as `exit(-1)` reports it.
const FATAL_EXIT: u8 = 255;

fn main() -> ExitCode {
    cfg_if! {
        if #[cfg(target_os = "linux")] {
            use clap::Parser;

            let opts = config::Options::parse();
            init_tracing(opts.verbose);

            if let Err(err) = run(&opts) {
                eprintln!("error: {}", err);
                for cause in err.chain().skip(1) {
                    eprintln!("caused by: {}", cause);
                }
                return ExitCode::from(FATAL_EXIT);
            }

            ExitCode::SUCCESS
        }
        else {
            eprintln!("udmabuf_bench is only supported on Linux hosts.");
            ExitCode::from(FATAL_EXIT)
        }
    }
}

#[cfg(target_os = "linux")]
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .log_internal_errors(true)
        .init();
}

#[cfg(target_os = "linux")]
fn run(opts: &config::Options) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::io::BufWriter;

    let config = opts.bench_config();
    config.validate().context("invalid configuration")?;
    tracing::debug!(?config, "benchmark configuration");

    let file = fs_err::File::create(&opts.output)?;
    let mut out = BufWriter::new(file);

    tracing::info!(
        device = %config.trial.device.display(),
        trials = config.trials,
        max_block_shift = config.max_block_shift,
        transfer_size = config.trial.transfer_size,
        "starting sweep"
    );
    let summaries = sweep::run_sweep(&config, &mut out)?;

    tracing::info!(
        output = %opts.output.display(),
        block_sizes = summaries.len(),
        "sweep complete"
    );
    Ok(())
}
