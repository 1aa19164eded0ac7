// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command line options and the validated benchmark configuration.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;
use udmabuf::ioctl::DEFAULT_DEVICE_PATH;

const MIB: usize = 1024 * 1024;

/// Size of the u-dma-buf region that gets mapped, and of the scratch buffer.
pub const DEFAULT_REGION_SIZE: usize = 16 * MIB;
/// Bytes copied out of the region by every trial.
pub const DEFAULT_TRANSFER_SIZE: usize = 16 * MIB;
/// Trials per block size.
pub const DEFAULT_TRIALS: usize = 1000;
/// Block sizes run from `1 << 0` to `1 << DEFAULT_MAX_BLOCK_SHIFT` bytes.
pub const DEFAULT_MAX_BLOCK_SHIFT: u32 = 19;
/// Results file, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "results.txt";

/// Measures read throughput out of a u-dma-buf region, syncing the CPU cache
/// before every block copied.
#[derive(Parser)]
pub struct Options {
    /// The u-dma-buf device node.
    #[clap(long, default_value = DEFAULT_DEVICE_PATH)]
    pub device: PathBuf,

    /// The results file. Truncated on every run.
    #[clap(long, default_value = DEFAULT_OUTPUT_PATH)]
    pub output: PathBuf,

    /// Number of trials per block size.
    #[clap(long, default_value_t = DEFAULT_TRIALS)]
    pub trials: usize,

    /// Largest block size, as a power of two.
    #[clap(long, default_value_t = DEFAULT_MAX_BLOCK_SHIFT)]
    pub max_block_shift: u32,

    /// Bytes of the device region to map.
    #[clap(long, default_value_t = DEFAULT_REGION_SIZE)]
    pub region_size: usize,

    /// Bytes copied out of the region per trial.
    #[clap(long, default_value_t = DEFAULT_TRANSFER_SIZE)]
    pub transfer_size: usize,

    /// Sync the block being copied instead of always syncing the first block
    /// of the region.
    #[clap(long)]
    pub advance_sync_offset: bool,

    /// Log at debug level.
    #[clap(short, long)]
    pub verbose: bool,
}

impl Options {
    /// Builds the benchmark configuration, leaving validation to the caller.
    pub fn bench_config(&self) -> BenchConfig {
        BenchConfig {
            trial: TrialConfig {
                device: self.device.clone(),
                region_size: self.region_size,
                transfer_size: self.transfer_size,
                advance_sync_offset: self.advance_sync_offset,
            },
            trials: self.trials,
            max_block_shift: self.max_block_shift,
        }
    }
}

/// Parameters of a single trial.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    pub device: PathBuf,
    pub region_size: usize,
    pub transfer_size: usize,
    pub advance_sync_offset: bool,
}

/// Parameters of a full sweep over block sizes.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub trial: TrialConfig,
    pub trials: usize,
    pub max_block_shift: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            trial: TrialConfig {
                device: DEFAULT_DEVICE_PATH.into(),
                region_size: DEFAULT_REGION_SIZE,
                transfer_size: DEFAULT_TRANSFER_SIZE,
                advance_sync_offset: false,
            },
            trials: DEFAULT_TRIALS,
            max_block_shift: DEFAULT_MAX_BLOCK_SHIFT,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one trial per block size is required")]
    NoTrials,
    #[error("transfer size {transfer:#x} exceeds the {region:#x} byte region")]
    TransferExceedsRegion { transfer: usize, region: usize },
    #[error("block shift {0} does not fit the 32-bit sync size")]
    BlockShiftTooLarge(u32),
    #[error("largest block {block:#x} exceeds the {transfer:#x} byte transfer")]
    BlockExceedsTransfer { block: usize, transfer: usize },
    #[error("transfer size {0:#x} does not fit the 32-bit sync offset")]
    TransferExceedsSyncOffset(usize),
}

impl BenchConfig {
    /// Checks that every trial of the sweep copies within the mapped region
    /// and that every sync request can be encoded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transfer = self.trial.transfer_size;
        if self.trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if transfer > self.trial.region_size {
            return Err(ConfigError::TransferExceedsRegion {
                transfer,
                region: self.trial.region_size,
            });
        }
        if self.max_block_shift >= u32::BITS {
            return Err(ConfigError::BlockShiftTooLarge(self.max_block_shift));
        }
        let block = self.largest_block_size();
        if block > transfer {
            return Err(ConfigError::BlockExceedsTransfer { block, transfer });
        }
        if self.trial.advance_sync_offset && (transfer - 1) > u32::MAX as usize {
            return Err(ConfigError::TransferExceedsSyncOffset(transfer));
        }
        Ok(())
    }

    /// Block sizes of the sweep, smallest first.
    pub fn block_sizes(&self) -> impl Iterator<Item = usize> + use<> {
        (0..=self.max_block_shift).map(|shift| 1 << shift)
    }

    fn largest_block_size(&self) -> usize {
        1 << self.max_block_shift
    }
}
