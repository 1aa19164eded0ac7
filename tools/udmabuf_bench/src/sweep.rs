// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runs the trials for every block size and writes the results.

use crate::config::BenchConfig;
use crate::report;
use crate::report::BlockSummary;
use crate::trial::TrialPlan;
use crate::trial::run_trial;
use anyhow::Context;
use std::io::Write;

/// Runs `config.trials` trials per block size, writing one results section
/// per block size to `out`.
///
/// Any trial failure aborts the sweep. Sections already written are left in
/// `out`.
pub fn run_sweep(config: &BenchConfig, out: &mut impl Write) -> anyhow::Result<Vec<BlockSummary>> {
    let transfer_size = config.trial.transfer_size;
    let mut samples = Vec::with_capacity(config.trials);
    let mut summaries = Vec::new();

    for block_size in config.block_sizes() {
        let plan = TrialPlan::new(transfer_size, block_size);
        if plan.bytes_moved() != transfer_size {
            tracing::warn!(
                block_size,
                transfer_size,
                bytes_moved = plan.bytes_moved(),
                "block size does not divide the transfer size"
            );
        }

        samples.clear();
        for trial in 0..config.trials {
            let elapsed_us = run_trial(&config.trial, block_size)
                .with_context(|| format!("trial {trial} with {block_size} byte blocks failed"))?;
            samples.push(elapsed_us);
        }

        report::write_block(out, &plan, transfer_size, &samples)
            .context("failed to write results")?;

        let summary = BlockSummary::new(&plan, transfer_size, &samples);
        tracing::info!(
            block_size,
            iterations = summary.iterations,
            min_mib_s = summary.min_mib_s,
            mean_mib_s = summary.mean_mib_s,
            max_mib_s = summary.max_mib_s,
            "block size complete"
        );
        summaries.push(summary);
    }

    out.flush().context("failed to flush results")?;
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrialConfig;
    use std::path::Path;
    use tempfile::NamedTempFile;

    const LEN: usize = 64 * 1024;

    fn backing_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0x5a; LEN]).unwrap();
        file.flush().unwrap();
        file
    }

    fn small_config(device: &Path) -> BenchConfig {
        BenchConfig {
            trial: TrialConfig {
                device: device.to_owned(),
                region_size: LEN,
                transfer_size: LEN,
                advance_sync_offset: false,
            },
            trials: 3,
            max_block_shift: 6,
        }
    }

    /// Header block sizes, and the data line count following each header.
    fn sections(text: &str) -> Vec<(usize, usize)> {
        let mut sections = Vec::new();
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("--- uDMAbuf Read Benchmark Blocksize: ") {
                let size = rest.split("Bytes").next().unwrap().parse().unwrap();
                sections.push((size, 0));
            } else if line.starts_with("Single Operation took: ") {
                sections.last_mut().unwrap().1 += 1;
            } else {
                assert!(line.is_empty(), "unexpected line {line:?}");
            }
        }
        sections
    }

    #[test]
    fn one_section_per_block_size() {
        let file = backing_file();
        let config = small_config(file.path());
        config.validate().unwrap();

        let mut out = Vec::new();
        let summaries = run_sweep(&config, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            sections(&text),
            [(1, 3), (2, 3), (4, 3), (8, 3), (16, 3), (32, 3), (64, 3)]
        );
        assert_eq!(summaries.len(), 7);
        for summary in &summaries {
            assert_eq!(summary.iterations, LEN / summary.block_size);
            assert!(summary.min_mib_s > 0.0, "{summary:?}");
            assert!(summary.min_mib_s <= summary.mean_mib_s);
            assert!(summary.mean_mib_s <= summary.max_mib_s);
        }
    }

    #[test]
    fn repeated_sweeps_have_the_same_shape() {
        let file = backing_file();
        let config = BenchConfig {
            max_block_shift: 16,
            trials: 2,
            ..small_config(file.path())
        };

        let mut first = Vec::new();
        run_sweep(&config, &mut first).unwrap();
        let mut second = Vec::new();
        run_sweep(&config, &mut second).unwrap();

        let first = sections(std::str::from_utf8(&first).unwrap());
        assert_eq!(first.len(), 17);
        assert_eq!(first, sections(std::str::from_utf8(&second).unwrap()));
    }

    #[test]
    fn missing_device_aborts_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(&dir.path().join("udmabuf0"));
        let mut out = Vec::new();
        let err = run_sweep(&config, &mut out).unwrap_err();
        assert!(out.is_empty());
        assert!(
            err.chain()
                .any(|e| e.downcast_ref::<udmabuf::ioctl::Error>().is_some()),
            "{err:?}"
        );
    }
}
