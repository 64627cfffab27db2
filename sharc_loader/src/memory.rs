// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mmio::Mmio;
use crate::translate::{AddressTranslator, MappedAddress, Region};
use crate::Error;
use sharc_abi::NUM_CORES;

/// Fills `count` bytes at `offset` with `byte`. Whole words are written
/// where the destination is word aligned, single bytes at either edge.
pub fn fill<M: Mmio + ?Sized>(io: &mut M, mut offset: usize, byte: u8, mut count: usize) {
    let word = u32::from_ne_bytes([byte; 4]);

    while offset % 4 != 0 && count > 0 {
        io.write8(offset, byte);
        offset += 1;
        count -= 1;
    }
    while count >= 4 {
        io.write32(offset, word);
        offset += 4;
        count -= 4;
    }
    while count > 0 {
        io.write8(offset, byte);
        offset += 1;
        count -= 1;
    }
}

/// Copies `src` to `offset`, with the same access pattern as [`fill`].
/// The source may have any alignment.
pub fn copy<M: Mmio + ?Sized>(io: &mut M, mut offset: usize, src: &[u8]) {
    let head = ((4 - offset % 4) % 4).min(src.len());
    let (head, body) = src.split_at(head);

    for &b in head {
        io.write8(offset, b);
        offset += 1;
    }
    let mut words = body.chunks_exact(4);
    for w in &mut words {
        io.write32(offset, u32::from_ne_bytes([w[0], w[1], w[2], w[3]]));
        offset += 4;
    }
    for &b in words.remainder() {
        io.write8(offset, b);
        offset += 1;
    }
}

/// The memory windows a core can be loaded through, together with the
/// translation of device addresses onto them.
pub struct MemoryMap<M> {
    translator: AddressTranslator,
    local: [M; NUM_CORES],
    shared: M,
}

impl<M: Mmio> MemoryMap<M> {
    /// Each mapping must be at least as large as the window it backs.
    pub fn new(
        translator: AddressTranslator,
        local: [M; NUM_CORES],
        shared: M,
    ) -> Result<MemoryMap<M>, Error> {
        let map = MemoryMap {
            translator,
            local,
            shared,
        };
        let regions = crate::CoreId::all()
            .map(Region::Local)
            .chain(std::iter::once(Region::Shared));
        for region in regions {
            let w = map.translator.window(region);
            if map.io(region).len() < w.size as usize {
                return Err(Error::BadWindow {
                    base: w.base,
                    size: w.size,
                });
            }
        }
        Ok(map)
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn io(&self, region: Region) -> &M {
        match region {
            Region::Local(core) => &self.local[core.index()],
            Region::Shared => &self.shared,
        }
    }

    pub fn io_mut(&mut self, region: Region) -> &mut M {
        match region {
            Region::Local(core) => &mut self.local[core.index()],
            Region::Shared => &mut self.shared,
        }
    }

    pub fn fill(&mut self, at: MappedAddress, byte: u8, count: usize) {
        fill(self.io_mut(at.region), at.offset, byte, count)
    }

    pub fn copy(&mut self, at: MappedAddress, src: &[u8]) {
        copy(self.io_mut(at.region), at.offset, src)
    }
}
