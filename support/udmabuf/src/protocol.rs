// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Definitions shared with the u-dma-buf kernel driver.

use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Ioctl type used by the u-dma-buf driver.
pub const UDMABUF_IOCTL_TYPE: u8 = b'U';

/// Ioctl number of `U_DMA_BUF_IOCTL_SET_SYNC`.
pub const UDMABUF_IOCTL_SET_SYNC: u8 = 9;

/// Granularity of the sync size field. The low four bits of a size are
/// dropped when it is packed into a [`SyncDescriptor`].
pub const SYNC_SIZE_GRANULARITY: u32 = 1 << 4;

/// Linux `enum dma_data_direction`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DmaDirection {
    /// `DMA_BIDIRECTIONAL`
    Bidirectional = 0,
    /// `DMA_TO_DEVICE`
    ToDevice = 1,
    /// `DMA_FROM_DEVICE`
    FromDevice = 2,
    /// `DMA_NONE`
    None = 3,
}

impl DmaDirection {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Bidirectional,
            1 => Self::ToDevice,
            2 => Self::FromDevice,
            _ => Self::None,
        }
    }
}

/// Argument of the `SET_SYNC` ioctl.
///
/// | bits   | field                                  |
/// |--------|----------------------------------------|
/// | 0      | for-CPU (1) or for-device (0)          |
/// | 1      | reserved                               |
/// | 3:2    | [`DmaDirection`]                       |
/// | 31:4   | size, in [`SYNC_SIZE_GRANULARITY`] units |
/// | 63:32  | offset into the region, in bytes       |
#[bitfield(u64)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct SyncDescriptor {
    /// Sync for the CPU (before CPU reads) rather than for the device.
    pub for_cpu: bool,

    _reserved: bool,

    /// Transfer direction.
    #[bits(2, default = DmaDirection::Bidirectional)]
    pub direction: DmaDirection,

    /// Size of the synced range in [`SYNC_SIZE_GRANULARITY`] units.
    #[bits(28)]
    pub size_units: u32,

    /// Byte offset of the synced range.
    pub offset: u32,
}

static_assertions::const_assert_eq!(8, size_of::<SyncDescriptor>());

impl SyncDescriptor {
    /// Packs a sync request. `size` is truncated down to a multiple of
    /// [`SYNC_SIZE_GRANULARITY`], so sizes below 16 bytes encode as zero.
    pub const fn encode(offset: u32, size: u32, direction: DmaDirection, for_cpu: bool) -> Self {
        Self::new()
            .with_for_cpu(for_cpu)
            .with_direction(direction)
            .with_size_units(size / SYNC_SIZE_GRANULARITY)
            .with_offset(offset)
    }

    /// Size of the synced range in bytes.
    pub const fn size(&self) -> u32 {
        self.size_units() * SYNC_SIZE_GRANULARITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-packed descriptor, as C users of the driver build it.
    fn c_packing(offset: u32, size: u32, direction: u8, for_cpu: bool) -> u64 {
        ((offset as u64) << 32)
            | ((size as u64 & 0xFFFF_FFF0) | ((direction as u64) << 2) | for_cpu as u64)
    }

    #[test]
    fn matches_c_packing() {
        for (offset, size) in [
            (0, 1),
            (0, 16),
            (0, 4096),
            (0x1000, 1 << 19),
            (u32::MAX, 0xFFFF_FFFF),
        ] {
            for direction in [DmaDirection::ToDevice, DmaDirection::FromDevice] {
                for for_cpu in [false, true] {
                    let desc = SyncDescriptor::encode(offset, size, direction, for_cpu);
                    assert_eq!(
                        desc.into_bits(),
                        c_packing(offset, size, direction as u8, for_cpu),
                        "{desc:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn decode_reproduces_fields() {
        let desc =
            SyncDescriptor::encode(0xdead_beef, 0x0123_4560, DmaDirection::FromDevice, false);
        assert_eq!(desc.offset(), 0xdead_beef);
        assert_eq!(desc.size(), 0x0123_4560);
        assert_eq!(desc.direction(), DmaDirection::FromDevice);
        assert!(!desc.for_cpu());

        let desc = SyncDescriptor::from_bits(desc.into_bits());
        assert_eq!(desc.offset(), 0xdead_beef);
        assert_eq!(desc.direction(), DmaDirection::FromDevice);
    }

    #[test]
    fn small_sizes_round_down() {
        for size in [1, 2, 4, 8, 15] {
            assert_eq!(
                SyncDescriptor::encode(0, size, DmaDirection::ToDevice, true).size(),
                0
            );
        }
        assert_eq!(
            SyncDescriptor::encode(0, 31, DmaDirection::ToDevice, true).size(),
            16
        );
    }

    #[test]
    fn benchmark_descriptor_layout() {
        let desc = SyncDescriptor::encode(0, 4096, DmaDirection::ToDevice, true);
        assert_eq!(desc.into_bits(), 0x1005);
        assert_eq!(desc.as_bytes(), 0x1005u64.to_ne_bytes());
    }

    #[test]
    fn every_direction_round_trips() {
        for bits in 0..4 {
            let direction = DmaDirection::from_bits(bits);
            assert_eq!(direction.into_bits(), bits);
            assert_eq!(
                SyncDescriptor::new().with_direction(direction).direction(),
                direction
            );
        }
    }
}
