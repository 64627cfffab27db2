// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of LDR block streams, the boot format consumed by the SHARC
//! boot ROM.

use crate::memory::MemoryMap;
use crate::mmio::Mmio;
use crate::{CoreId, Error};
use log::{debug, error, trace};
use sharc_areas::{BlockHeader, BLOCK_HEADER_LEN};

/// Outcome of a successful [`load`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadReport {
    /// Target address of the last block flagged first, if any
    pub entry: Option<u32>,
    pub blocks: usize,
    pub bytes_written: usize,
}

/// A block as found by [`inspect`].
#[derive(Copy, Clone, Debug)]
pub struct BlockInfo {
    /// Offset of the block header in the stream
    pub offset: usize,
    pub header: BlockHeader,
}

/// Walks the stream, handing every well-formed block and its payload (empty
/// for fill blocks) to `visit`, up to and including the final block.
fn walk<F>(data: &[u8], mut visit: F) -> Result<(), Error>
where
    F: FnMut(usize, &BlockHeader, &[u8]) -> Result<(), Error>,
{
    let mut offset = 0;
    while offset < data.len() {
        let header = BlockHeader::read(&data[offset..])
            .ok_or(Error::TruncatedBlockHeader { offset })?;

        let code = header.code();
        if !code.has_valid_sign() {
            return Err(Error::BadBlockSignature {
                offset,
                sign: code.header_sign(),
            });
        }

        let start = offset + BLOCK_HEADER_LEN;
        let payload = start
            .checked_add(header.payload_len())
            .and_then(|end| data.get(start..end))
            .ok_or(Error::TruncatedPayload {
                offset,
                byte_count: header.byte_count(),
                remaining: data.len() - start,
            })?;

        visit(offset, &header, payload)?;

        offset = start + payload.len();
        if header.is_final() {
            return Ok(());
        }
    }
    Err(Error::MissingFinalBlock)
}

/// Writes the blocks of an LDR stream into `core`'s memory.
///
/// Blocks are applied in order as they are parsed, so a stream that turns
/// out to be malformed part way through leaves the earlier blocks written.
pub fn load<M: Mmio>(
    core: CoreId,
    data: &[u8],
    memory: &mut MemoryMap<M>,
) -> Result<LoadReport, Error> {
    let mut report = LoadReport::default();

    walk(data, |offset, header, payload| {
        trace!(
            "{offset:#08x}: {:?} addr {:#010x} count {:#x} arg {:#x}",
            header.code(),
            header.target_addr(),
            header.byte_count(),
            header.argument()
        );
        report.blocks += 1;

        if header.is_first() {
            report.entry = Some(header.target_addr());
        }
        if header.is_empty() {
            return Ok(());
        }

        let len = header.byte_count();
        let at = memory
            .translator()
            .translate_span(core, header.target_addr(), len)
            .map_err(|e| {
                error!("block at {offset:#x}: {e}");
                e
            })?;
        if header.is_fill() {
            memory.fill(at, header.fill_byte(), len as usize);
        } else {
            memory.copy(at, payload);
        }
        report.bytes_written += len as usize;
        Ok(())
    })?;

    debug!(
        "{core}: loaded {} blocks, {:#x} bytes, entry {:x?}",
        report.blocks, report.bytes_written, report.entry
    );
    Ok(report)
}

/// Parses a stream with the same checks as [`load`] but without writing
/// anything or translating any address.
pub fn inspect(data: &[u8]) -> Result<Vec<BlockInfo>, Error> {
    let mut blocks = vec![];
    walk(data, |offset, header, _| {
        blocks.push(BlockInfo {
            offset,
            header: *header,
        });
        Ok(())
    })?;
    Ok(blocks)
}
