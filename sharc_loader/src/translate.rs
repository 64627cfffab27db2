// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping of device addresses, as they appear in LDR images, onto the
//! windows the loader has mapped.

use crate::config::{PlatformConfig, WindowConfig};
use crate::{CoreId, Error};
use log::trace;
use sharc_abi::NUM_CORES;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Region {
    /// L1 of the given core
    Local(CoreId),
    /// L2
    Shared,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappedAddress {
    pub region: Region,
    /// Byte offset into the region's window
    pub offset: usize,
}

#[derive(Clone, Debug)]
pub struct AddressTranslator {
    local: [WindowConfig; NUM_CORES],
    shared: WindowConfig,
}

fn offset_in(window: &WindowConfig, address: u32) -> Option<usize> {
    let off = address.checked_sub(window.base)?;
    (off < window.size).then_some(off as usize)
}

impl AddressTranslator {
    pub fn new(cfg: &PlatformConfig) -> AddressTranslator {
        AddressTranslator {
            local: cfg.cores.map(|c| c.local),
            shared: cfg.shared,
        }
    }

    pub fn window(&self, region: Region) -> &WindowConfig {
        match region {
            Region::Local(core) => &self.local[core.index()],
            Region::Shared => &self.shared,
        }
    }

    /// Finds the window holding `address`. The core's own L1 is checked
    /// before L2; another core's L1 is never reachable.
    pub fn translate(&self, core: CoreId, address: u32) -> Result<MappedAddress, Error> {
        let local = &self.local[core.index()];
        let mapped = if let Some(offset) = offset_in(local, address) {
            MappedAddress {
                region: Region::Local(core),
                offset,
            }
        } else if let Some(offset) = offset_in(&self.shared, address) {
            MappedAddress {
                region: Region::Shared,
                offset,
            }
        } else {
            return Err(Error::UntranslatableAddress { core, address });
        };
        trace!("{core}: {address:#010x} -> {mapped:x?}");
        Ok(mapped)
    }

    /// Like [`translate`](Self::translate), but additionally requires all
    /// `len` bytes starting at `address` to lie in the same window.
    pub fn translate_span(
        &self,
        core: CoreId,
        address: u32,
        len: u32,
    ) -> Result<MappedAddress, Error> {
        let mapped = self.translate(core, address)?;
        let window = self.window(mapped.region);
        if mapped.offset as u64 + u64::from(len) > u64::from(window.size) {
            return Err(Error::SpanOutsideWindow { address, len });
        }
        Ok(mapped)
    }
}
