// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A single timed trial: open and map the device, then sync and copy one
//! block at a time until the transfer size has been read.

use crate::config::TrialConfig;
use crate::scratch::ScratchBuffer;
use nix::sys::time::TimeSpec;
use nix::time::ClockId;
use std::alloc::LayoutError;
use std::mem::MaybeUninit;
use thiserror::Error;
use udmabuf::ioctl::UdmabufDevice;
use udmabuf::protocol::DmaDirection;
use udmabuf::protocol::SyncDescriptor;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("failed to acquire dma region")]
    Device(#[from] udmabuf::ioctl::Error),
    #[error("invalid scratch buffer size")]
    Scratch(#[from] LayoutError),
    #[error("failed to read CLOCK_MONOTONIC_RAW")]
    Clock(#[source] nix::Error),
}

/// How a transfer is split into blocks.
///
/// The iteration count is `transfer_size / block_size`, so a block size that
/// does not divide the transfer size moves fewer bytes than requested.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TrialPlan {
    pub block_size: usize,
    pub iterations: usize,
}

impl TrialPlan {
    pub fn new(transfer_size: usize, block_size: usize) -> Self {
        Self {
            block_size,
            iterations: transfer_size / block_size,
        }
    }

    /// Bytes actually copied by one trial.
    pub fn bytes_moved(&self) -> usize {
        self.block_size * self.iterations
    }

    /// Region offset of each block, in copy order.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + use<> {
        (0..self.bytes_moved()).step_by(self.block_size)
    }

    /// The sync issued before copying the block at `offset`.
    ///
    /// Unless `advance_sync_offset` is set, every sync covers the first block
    /// of the region, wherever the copy is.
    pub fn sync_descriptor(&self, offset: usize, advance_sync_offset: bool) -> SyncDescriptor {
        let sync_offset = if advance_sync_offset { offset as u32 } else { 0 };
        let sync_size = u32::try_from(self.block_size).unwrap_or(u32::MAX);
        SyncDescriptor::encode(sync_offset, sync_size, DmaDirection::ToDevice, true)
    }
}

fn now() -> Result<TimeSpec, TrialError> {
    nix::time::clock_gettime(ClockId::CLOCK_MONOTONIC_RAW).map_err(TrialError::Clock)
}

fn elapsed_us(start: TimeSpec, end: TimeSpec) -> f64 {
    let secs = (end.tv_sec() - start.tv_sec()) as f64;
    let nanos = (end.tv_nsec() - start.tv_nsec()) as f64;
    secs.mul_add(1.0e6, nanos / 1.0e3)
}

/// Syncs then copies each block of `plan` from `device` into the same offset
/// of `scratch`. `sync_for` supplies the descriptor for each block offset.
fn copy_blocks(
    device: &UdmabufDevice,
    scratch: &mut [MaybeUninit<u8>],
    plan: &TrialPlan,
    mut sync_for: impl FnMut(usize) -> SyncDescriptor,
) {
    let block_size = plan.block_size;
    for offset in plan.offsets() {
        let _ = device.sync(&sync_for(offset));
        device.read_into(offset, &mut scratch[offset..offset + block_size]);
    }
}

/// Runs one trial and returns the duration of the sync and copy loop in
/// microseconds.
///
/// The device and scratch buffer are acquired before the clock starts and
/// released after it stops. Sync failures do not stop the loop.
pub fn run_trial(config: &TrialConfig, block_size: usize) -> Result<f64, TrialError> {
    let plan = TrialPlan::new(config.transfer_size, block_size);
    let device = UdmabufDevice::open(&config.device, config.region_size)?;
    let mut scratch = ScratchBuffer::new(config.region_size)?;
    let scratch = scratch.as_uninit_mut();

    let start;
    if config.advance_sync_offset {
        start = now()?;
        copy_blocks(&device, scratch, &plan, |offset| plan.sync_descriptor(offset, true));
    } else {
        let desc = plan.sync_descriptor(0, false);
        start = now()?;
        copy_blocks(&device, scratch, &plan, |_| desc);
    }
    let end = now()?;

    Ok(elapsed_us(start, end))
}
