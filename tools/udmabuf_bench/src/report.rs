// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Results file sections and per-block statistics.

use crate::trial::TrialPlan;
use std::io;
use std::io::Write;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

pub fn to_mib(bytes: usize) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

/// Throughput of a trial, from the nominal transfer size rather than the
/// bytes a truncated plan actually moved.
pub fn throughput_mib_s(transfer_size: usize, elapsed_us: f64) -> f64 {
    to_mib(transfer_size) / (elapsed_us / 1.0e6)
}

pub fn per_operation_us(plan: &TrialPlan, elapsed_us: f64) -> f64 {
    elapsed_us / plan.iterations as f64
}

/// Writes the section for one block size: a header followed by one line per
/// sample.
pub fn write_block(
    out: &mut impl Write,
    plan: &TrialPlan,
    transfer_size: usize,
    samples: &[f64],
) -> io::Result<()> {
    writeln!(
        out,
        "\n\n--- uDMAbuf Read Benchmark Blocksize: {}Bytes - Transferd Each: {:.1}MiB  ---",
        plan.block_size,
        to_mib(transfer_size)
    )?;
    for &elapsed_us in samples {
        writeln!(
            out,
            "Single Operation took: {:.5} µs\t throughput: {:06.6} MiB/s",
            per_operation_us(plan, elapsed_us),
            throughput_mib_s(transfer_size, elapsed_us)
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub block_size: usize,
    pub iterations: usize,
    pub min_mib_s: f64,
    pub mean_mib_s: f64,
    pub max_mib_s: f64,
}

impl BlockSummary {
    pub fn new(plan: &TrialPlan, transfer_size: usize, samples: &[f64]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &elapsed_us in samples {
            let mib_s = throughput_mib_s(transfer_size, elapsed_us);
            min = min.min(mib_s);
            max = max.max(mib_s);
            sum += mib_s;
        }
        Self {
            block_size: plan.block_size,
            iterations: plan.iterations,
            min_mib_s: min,
            mean_mib_s: sum / samples.len() as f64,
            max_mib_s: max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn throughput_of_one_second() {
        assert_eq!(throughput_mib_s(16 * MIB, 1.0e6), 16.0);
        assert_eq!(throughput_mib_s(16 * MIB, 0.5e6), 32.0);
        assert!(throughput_mib_s(16 * MIB, 1.0) > 0.0);
    }

    #[test]
    fn section_format() {
        let plan = TrialPlan::new(16 * MIB, 1024);
        let mut out = Vec::new();
        write_block(&mut out, &plan, 16 * MIB, &[16384.0, 32768.0]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\n\n--- uDMAbuf Read Benchmark Blocksize: 1024Bytes - Transferd Each: 16.0MiB  ---\n\
             Single Operation took: 1.00000 µs\t throughput: 976.562500 MiB/s\n\
             Single Operation took: 2.00000 µs\t throughput: 488.281250 MiB/s\n"
        );
    }

    #[test]
    fn slow_trial_keeps_six_decimals() {
        let plan = TrialPlan::new(MIB, MIB);
        let mut out = Vec::new();
        write_block(&mut out, &plan, MIB, &[4.0e6]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("throughput: 0.250000 MiB/s\n"), "{text}");
    }

    #[test]
    fn summary_statistics() {
        let plan = TrialPlan::new(16 * MIB, 1024);
        let summary = BlockSummary::new(&plan, 16 * MIB, &[1.0e6, 0.5e6, 0.25e6]);
        assert_eq!(summary.block_size, 1024);
        assert_eq!(summary.iterations, 16 * 1024);
        assert_eq!(summary.min_mib_s, 16.0);
        assert_eq!(summary.max_mib_s, 64.0);
        assert_eq!(summary.mean_mib_s, 112.0 / 3.0);
    }
}
