// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secure loader and lifecycle manager for the SHARC DSP cores of an
//! ADSP-SC5xx, as seen from the secure world of the ARM core.
//!
//! Images arrive through [`pta::Service::invoke`], optionally wrapped in a
//! signed [`sharc_areas::SecureHeader`]. The header is checked by
//! [`verify::ImageVerifier`], the LDR block stream behind it is written into
//! the core's memory by [`ldr::load`], and [`lifecycle::CoreManager`]
//! sequences the reset control unit to stop and start the core.

pub mod config;
pub mod crypto;
pub mod ldr;
pub mod lifecycle;
pub mod logging;
pub mod memory;
pub mod mmio;
pub mod otp;
pub mod pta;
pub mod rcu;
pub mod sec;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod translate;
pub mod verify;
pub mod wait;

use num_derive::{FromPrimitive, ToPrimitive};
use sharc_abi::NUM_CORES;
use sharc_areas::{OtpId, SecureHeaderType};
use std::fmt;

/// A SHARC core number that has been checked against the number of cores.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CoreId(u8);

impl CoreId {
    pub const CORE0: CoreId = CoreId(sharc_abi::CORE0 as u8);
    pub const CORE1: CoreId = CoreId(sharc_abi::CORE1 as u8);

    pub fn new(raw: u32) -> Result<CoreId, Error> {
        if (raw as usize) < NUM_CORES {
            Ok(CoreId(raw as u8))
        } else {
            Err(Error::InvalidCore(raw))
        }
    }

    pub fn all() -> impl Iterator<Item = CoreId> {
        (0..NUM_CORES as u8).map(CoreId)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// 0-based SHARC number, as used to select per-core register bits.
    pub fn sharc(self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHARC{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("core id {0} is out of range")]
    InvalidCore(u32),

    #[error("unknown command {0:#x}")]
    UnknownCommand(u32),

    #[error("parameter types {got:?} do not match expected {expected:?}")]
    ParamTypes {
        expected: [pta::ParamType; 4],
        got: [pta::ParamType; 4],
    },

    #[error("device address {address:#010x} is outside every window of {core}")]
    UntranslatableAddress { core: CoreId, address: u32 },

    #[error("{len:#x} bytes at {address:#010x} run past the end of their window")]
    SpanOutsideWindow { address: u32, len: u32 },

    #[error("{0} must be stopped first")]
    CoreRunning(CoreId),

    #[error("secure header type {0:#010x} is not recognised")]
    UnknownHeaderType(u32),

    #[error("secure header type {0:?} is not supported")]
    UnsupportedHeaderType(SecureHeaderType),

    #[error("secure header does not declare an ECDSA type attribute")]
    MissingHashAttribute,

    #[error("secure header declares unsupported digest size {0}")]
    UnsupportedDigestSize(u32),

    #[error("block at offset {offset:#x} has bad header signature {sign:#04x}")]
    BadBlockSignature { offset: usize, sign: u8 },

    #[error("{0} bytes is too short for a secure header")]
    TruncatedSecureHeader(usize),

    #[error("payload length {declared:#x} + header {header:#x} != buffer {buffer:#x}")]
    PayloadLength {
        declared: u32,
        header: usize,
        buffer: usize,
    },

    #[error("incomplete block header at offset {offset:#x}")]
    TruncatedBlockHeader { offset: usize },

    #[error("block at offset {offset:#x} claims {byte_count:#x} payload bytes, only {remaining:#x} remain")]
    TruncatedPayload {
        offset: usize,
        byte_count: u32,
        remaining: usize,
    },

    #[error("image ended without a final block")]
    MissingFinalBlock,

    #[error("image digest does not match the secure header")]
    DigestMismatch,

    #[error("signature does not verify against {0:?}")]
    BadSignature(OtpId),

    #[error("{0:?} is not provisioned or has been invalidated")]
    KeyUnavailable(OtpId),

    #[error("{id:?} read back {len} bytes, expected {expected}")]
    KeyLength {
        id: OtpId,
        len: usize,
        expected: usize,
    },

    #[error("secure header layout is {0} bytes; the struct definition is broken")]
    HeaderLayout(usize),

    #[error("window {base:#010x}+{size:#x} is invalid or not fully mapped")]
    BadWindow { base: u32, size: u32 },

    #[error("struct packing error: {0}")]
    PackingError(#[from] packed_struct::PackingError),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("signing error: {0}")]
    Signing(#[from] p256::ecdsa::Error),
}

/// Result values reported to the caller of the service, one per class of
/// [`Error`].
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum ResultCode {
    Success = sharc_abi::RESULT_SUCCESS,
    Cancel = sharc_abi::RESULT_CANCEL,
    BadFormat = sharc_abi::RESULT_BAD_FORMAT,
    BadParameters = sharc_abi::RESULT_BAD_PARAMETERS,
    BadState = sharc_abi::RESULT_BAD_STATE,
    NotSupported = sharc_abi::RESULT_NOT_SUPPORTED,
    NoData = sharc_abi::RESULT_NO_DATA,
    ShortBuffer = sharc_abi::RESULT_SHORT_BUFFER,
    SignatureInvalid = sharc_abi::RESULT_SIGNATURE_INVALID,
}

impl Error {
    pub fn result_code(&self) -> ResultCode {
        match self {
            Error::InvalidCore(_)
            | Error::UnknownCommand(_)
            | Error::ParamTypes { .. }
            | Error::UntranslatableAddress { .. }
            | Error::SpanOutsideWindow { .. } => ResultCode::BadParameters,

            Error::CoreRunning(_) => ResultCode::BadState,

            Error::UnknownHeaderType(_)
            | Error::MissingHashAttribute
            | Error::UnsupportedDigestSize(_)
            | Error::BadBlockSignature { .. } => ResultCode::BadFormat,

            Error::UnsupportedHeaderType(_) => ResultCode::NotSupported,

            Error::TruncatedSecureHeader(_)
            | Error::PayloadLength { .. }
            | Error::TruncatedBlockHeader { .. }
            | Error::TruncatedPayload { .. }
            | Error::MissingFinalBlock => ResultCode::ShortBuffer,

            Error::DigestMismatch | Error::BadSignature(_) => ResultCode::SignatureInvalid,

            Error::KeyUnavailable(_) => ResultCode::NoData,

            Error::KeyLength { .. }
            | Error::HeaderLayout(_)
            | Error::BadWindow { .. }
            | Error::PackingError(_)
            | Error::Config(_)
            | Error::Signing(_) => ResultCode::Cancel,
        }
    }
}

/// Collapses a service result into the value handed back to the caller.
pub fn result_code(result: &Result<(), Error>) -> ResultCode {
    match result {
        Ok(()) => ResultCode::Success,
        Err(e) => e.result_code(),
    }
}
