// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;
use std::ptr::NonNull;

/// A mapped window of device memory or registers, addressed by byte offset.
///
/// Implementations may panic on accesses outside `0..len()`; callers are
/// expected to have bounds-checked offsets against the window already.
pub trait Mmio {
    fn len(&self) -> usize;

    fn read32(&self, offset: usize) -> u32;
    fn write32(&mut self, offset: usize, value: u32);
    fn write8(&mut self, offset: usize, value: u8);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_bits32(&mut self, offset: usize, bits: u32) {
        let v = self.read32(offset);
        self.write32(offset, v | bits);
    }

    fn clear_bits32(&mut self, offset: usize, bits: u32) {
        let v = self.read32(offset);
        self.write32(offset, v & !bits);
    }
}

/// A window mapped into our address space by the platform, accessed with
/// volatile loads and stores.
#[derive(Debug)]
pub struct MmioWindow {
    base: NonNull<u8>,
    len: usize,
}

impl MmioWindow {
    /// # Safety
    ///
    /// `base` must point to `len` bytes of device memory that stay mapped
    /// for the lifetime of the returned window, and nothing else may access
    /// that memory through a Rust reference while the window exists.
    ///
    /// Returns `None` for a null or non word-aligned `base`.
    pub unsafe fn new(base: *mut u8, len: usize) -> Option<MmioWindow> {
        if base as usize % mem::align_of::<u32>() != 0 {
            return None;
        }
        NonNull::new(base).map(|base| MmioWindow { base, len })
    }

    /// Accesses must be naturally aligned and inside the window.
    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset % width == 0,
            "unaligned access of {width} bytes at {offset:#x}"
        );
        assert!(
            offset.checked_add(width).map_or(false, |end| end <= self.len),
            "access of {width} bytes at {offset:#x} outside window of {:#x}",
            self.len
        );
    }
}

impl Mmio for MmioWindow {
    fn len(&self) -> usize {
        self.len
    }

    fn read32(&self, offset: usize) -> u32 {
        self.check(offset, 4);
        // SAFETY: in bounds and aligned per `check` and `new`, mapped per the
        // contract of `new`.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .read_volatile()
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.check(offset, 4);
        // SAFETY: as for `read32`.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_volatile(value)
        }
    }

    fn write8(&mut self, offset: usize, value: u8) {
        self.check(offset, 1);
        // SAFETY: as for `read32`.
        unsafe { self.base.as_ptr().add(offset).write_volatile(value) }
    }
}
