// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Page-aligned heap buffer that trials copy into.

use std::alloc::Layout;
use std::alloc::LayoutError;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

pub const SCRATCH_ALIGN: usize = 4096;

/// An uninitialized, [`SCRATCH_ALIGN`]-aligned heap allocation.
///
/// The contents are never touched on allocation, so the first write to each
/// page faults it in.
pub struct ScratchBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl ScratchBuffer {
    pub fn new(len: usize) -> Result<Self, LayoutError> {
        let layout = Layout::from_size_align(len.max(1), SCRATCH_ALIGN)?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).unwrap_or_else(|| std::alloc::handle_alloc_error(layout));
        Ok(Self { ptr, len, layout })
    }

    pub fn as_uninit_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        // SAFETY: the allocation is valid for `len` bytes for the lifetime of
        // self, and `MaybeUninit` permits uninitialized contents.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast(), self.len) }
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with this layout and not yet freed.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
