// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! User-mode access to u-dma-buf devices: the packed cache-sync descriptor
//! and a handle that opens, maps and syncs a `/dev/udmabufN` region.

#![warn(missing_docs)]
// UNSAFETY: unsafe needed to map the region and make ioctl calls.
#![expect(unsafe_code)]

pub mod protocol;

#[cfg(target_os = "linux")]
pub mod ioctl;
