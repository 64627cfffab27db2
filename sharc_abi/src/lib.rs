// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//! Constants shared between the secure-world SHARC loader service, its
//! normal-world clients, and the runtime running on the SHARC cores.
//!
//! A client opens a session on [`SERVICE_UUID`] and invokes one of the
//! `CMD_*` commands with four typed parameters. The parameter layouts are
//! documented on each command. Results come back as one of the `RESULT_*`
//! values.
//!
//! The DSP runtime is expected to park itself in an idle loop at
//! [`IDLE_ADDR`] whenever the loader stops it, and to answer a stop request
//! interrupt by releasing its interrupts and raising its idle flag.
#![no_std]

/// UUID of the privileged SHARC loader service
pub const SERVICE_UUID: (u32, u16, u16, [u8; 8]) = (
    0x899b_fa21,
    0x2961,
    0x443f,
    [0xa3, 0x83, 0xf6, 0x24, 0x8a, 0x53, 0xad, 0xe1],
);

pub const CORE0: u32 = 0;
pub const CORE1: u32 = 1;

/// Number of SHARC cores the service manages
pub const NUM_CORES: usize = 2;

/// Load an LDR image into a stopped core.
///
/// - param[0] (value input): core id in `.a`
/// - param[1] (memref input): image, optionally wrapped in a secure header
pub const CMD_LOAD: u32 = 0x00;

/// Start a core at the entry point of the last loaded image.
///
/// - param[0] (value input): core id in `.a`
pub const CMD_START: u32 = 0x01;

/// Stop a core and park its reset vector on the idle loop.
///
/// - param[0] (value input): core id in `.a`
pub const CMD_STOP: u32 = 0x02;

/// Check the signature of a signed image without touching any core.
///
/// - param[0] (memref input): signed image
pub const CMD_VERIFY: u32 = 0x03;

/// Reset vector used for a core with nothing (trustworthy) to run
pub const IDLE_ADDR: u32 = 0x0009_0004;

pub const RESULT_SUCCESS: u32 = 0x0000_0000;
pub const RESULT_CANCEL: u32 = 0xffff_0002;
pub const RESULT_BAD_FORMAT: u32 = 0xffff_0005;
pub const RESULT_BAD_PARAMETERS: u32 = 0xffff_0006;
pub const RESULT_BAD_STATE: u32 = 0xffff_0007;
pub const RESULT_NOT_SUPPORTED: u32 = 0xffff_000a;
pub const RESULT_NO_DATA: u32 = 0xffff_000b;
pub const RESULT_SHORT_BUFFER: u32 = 0xffff_0010;
pub const RESULT_SIGNATURE_INVALID: u32 = 0xffff_3072;
