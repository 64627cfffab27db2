// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-exact layouts for SHARC boot images and the SC5xx blocks the loader
//! drives. Nothing in here has behaviour beyond packing and unpacking; the
//! policy lives in `sharc_loader`.

use bitfield::bitfield;
use byteorder::LittleEndian;
use num_derive::{FromPrimitive, ToPrimitive};
use packed_struct::prelude::*;
use std::ops::Range;
use zerocopy::{AsBytes, FromBytes, Unaligned, U32};

// SC598 memory map. The L1 windows cover each core's whole L1 range,
// including the holes, so that each core needs a single translation.
pub const SHARC0_L1_BASE: u32 = 0x2824_0000;
pub const SHARC0_L1_SIZE: u32 = 0x0016_0000;
pub const SHARC1_L1_BASE: u32 = 0x28a4_0000;
pub const SHARC1_L1_SIZE: u32 = 0x0016_0000;
pub const L2_BASE: u32 = 0x2000_0000;
pub const L2_SIZE: u32 = 0x0020_0000;

pub const RCU_BASE: u32 = 0x3108_c000;
pub const RCU_SIZE: u32 = 0x1000;
pub const SEC_BASE: u32 = 0x3108_9000;
pub const SEC_SIZE: u32 = 0x1000;

/// SOFT1, used to ask SHARC0 to idle itself
pub const SHARC0_IRQ: u32 = 106;
/// SOFT2, used to ask SHARC1 to idle itself
pub const SHARC1_IRQ: u32 = 107;

/// Reset control unit register offsets and bits (SC59x layout).
pub mod rcu {
    pub const CTL: usize = 0x00;
    pub const STAT: usize = 0x04;
    pub const CRCTL: usize = 0x08;
    pub const CRSTAT: usize = 0x0c;
    pub const SRRQSTAT: usize = 0x18;
    pub const SIDIS: usize = 0x1c;
    pub const SISTAT: usize = 0x20;
    pub const BCODE: usize = 0x28;
    pub const SVECT0: usize = 0x2c;
    pub const SVECT1: usize = 0x30;
    pub const SVECT2: usize = 0x34;
    pub const MSG: usize = 0x6c;
    pub const MSG_SET: usize = 0x70;
    pub const MSG_CLR: usize = 0x74;

    pub const CTL_SYSRST: u32 = 1 << 0;

    pub const MSG_C0IDLE: u32 = 1 << 8;
    pub const MSG_C1IDLE: u32 = 1 << 9;
    pub const MSG_C2IDLE: u32 = 1 << 10;
    pub const MSG_CRR0: u32 = 1 << 12;
    pub const MSG_CRR1: u32 = 1 << 13;
    pub const MSG_CRR2: u32 = 1 << 14;
    pub const MSG_C1ACTIVATE: u32 = 1 << 19;
    pub const MSG_C2ACTIVATE: u32 = 1 << 20;

    pub const CRCTL_CRES_ARM: u32 = 1 << 0;
    pub const CRCTL_CRES_SHARC0: u32 = 1 << 1;
    pub const CRCTL_CRES_SHARC1: u32 = 1 << 2;

    // All of the per-SHARC bits below are indexed by the 0-based SHARC
    // number, not the system core number (which counts the ARM as core 0).

    pub const fn msg_idle(sharc: u32) -> u32 {
        MSG_C1IDLE << sharc
    }

    pub const fn msg_reset_request(sharc: u32) -> u32 {
        MSG_CRR1 << sharc
    }

    pub const fn msg_activate(sharc: u32) -> u32 {
        MSG_C1ACTIVATE << sharc
    }

    pub const fn core_reset(sharc: u32) -> u32 {
        CRCTL_CRES_SHARC0 << sharc
    }

    pub const fn system_interface(sharc: u32) -> u32 {
        1 << sharc
    }

    pub const fn svect(sharc: u32) -> Option<usize> {
        match sharc {
            0 => Some(SVECT1),
            1 => Some(SVECT2),
            _ => None,
        }
    }
}

/// System event controller register offsets and bits.
pub mod sec {
    pub const GCTL: usize = 0x000;
    pub const GSTAT: usize = 0x004;
    pub const RAISE: usize = 0x008;
    pub const END: usize = 0x00c;

    pub const CCTL_BASE: usize = 0x400;
    pub const CCTL_STRIDE: usize = 0x040;
    pub const SCTL_BASE: usize = 0x800;
    pub const SCTL_STRIDE: usize = 0x008;

    pub const CCTL_EN: u32 = 0x0000_0001;

    pub const SCTL_INT_EN: u32 = 0x0000_0001;
    pub const SCTL_FAULT_EN: u32 = 0x0000_0002;
    pub const SCTL_SRC_EN: u32 = 0x0000_0004;
    pub const SCTL_CTG: u32 = 0x0f00_0000;
    pub const SCTL_CTG_SHIFT: u32 = 24;

    /// The first 32 interrupt ids are private to the GIC; system event
    /// source ids start after them.
    pub const FIRST_SYSTEM_IRQ: u32 = 32;

    pub const fn sctl(source: u32) -> usize {
        SCTL_BASE + SCTL_STRIDE * source as usize
    }

    pub const fn cctl(system_core: u32) -> usize {
        CCTL_BASE + CCTL_STRIDE * system_core as usize
    }
}

pub const BLOCK_HEADER_LEN: usize = 16;

/// Header signatures accepted for LDR blocks
pub const BLOCK_HEADER_SIGNS: [u8; 3] = [0xad, 0xac, 0xab];

pub const FLAG_SAVE: u32 = 1 << 4;
pub const FLAG_AUX: u32 = 1 << 5;
pub const FLAG_FORWARD: u32 = 1 << 7;
pub const FLAG_FILL: u32 = 1 << 8;
pub const FLAG_QUICKBOOT: u32 = 1 << 9;
pub const FLAG_CALLBACK: u32 = 1 << 10;
pub const FLAG_INIT: u32 = 1 << 11;
pub const FLAG_IGNORE: u32 = 1 << 12;
pub const FLAG_INDIRECT: u32 = 1 << 13;
pub const FLAG_FIRST: u32 = 1 << 14;
pub const FLAG_FINAL: u32 = 1 << 15;

bitfield! {
    /// The first word of an LDR block header. Bit positions are those used
    /// by the SHARC boot ROM; the word itself is stored little-endian.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct BlockCode(u32);
    impl Debug;
    pub u8, code, set_code: 3, 0;
    pub save, set_save: 4;
    pub aux, set_aux: 5;
    pub forward, set_forward: 7;
    pub fill, set_fill: 8;
    pub quickboot, set_quickboot: 9;
    pub callback, set_callback: 10;
    pub init, set_init: 11;
    pub ignore, set_ignore: 12;
    pub indirect, set_indirect: 13;
    pub first, set_first: 14;
    pub last, set_last: 15;
    pub u8, header_check, set_header_check: 23, 16;
    pub u8, header_sign, set_header_sign: 31, 24;
}

impl BlockCode {
    /// Builds a block code from a header signature and any of the `FLAG_*`
    /// masks.
    pub fn new(sign: u8, flags: u32) -> BlockCode {
        BlockCode((u32::from(sign) << 24) | (flags & 0xffff))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn has_valid_sign(&self) -> bool {
        BLOCK_HEADER_SIGNS.contains(&self.header_sign())
    }
}

impl From<u32> for BlockCode {
    fn from(bits: u32) -> BlockCode {
        BlockCode(bits)
    }
}

/// LDR block header. A payload of `byte_count` bytes follows the header
/// unless this is a fill block.
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct BlockHeader {
    pub bcode: U32<LittleEndian>,
    pub target_addr: U32<LittleEndian>,
    pub byte_count: U32<LittleEndian>,
    pub argument: U32<LittleEndian>,
}

impl BlockHeader {
    pub fn new(code: BlockCode, target_addr: u32, byte_count: u32, argument: u32) -> BlockHeader {
        BlockHeader {
            bcode: U32::new(code.bits()),
            target_addr: U32::new(target_addr),
            byte_count: U32::new(byte_count),
            argument: U32::new(argument),
        }
    }

    /// Reads a header from the start of `bytes`, if there is room for one.
    pub fn read(bytes: &[u8]) -> Option<BlockHeader> {
        BlockHeader::read_from_prefix(bytes)
    }

    pub fn code(&self) -> BlockCode {
        BlockCode::from(self.bcode.get())
    }

    pub fn target_addr(&self) -> u32 {
        self.target_addr.get()
    }

    pub fn byte_count(&self) -> u32 {
        self.byte_count.get()
    }

    pub fn argument(&self) -> u32 {
        self.argument.get()
    }

    /// Fill blocks replicate the low byte of the argument.
    pub fn fill_byte(&self) -> u8 {
        self.argument.get() as u8
    }

    pub fn is_fill(&self) -> bool {
        self.code().fill()
    }

    pub fn is_first(&self) -> bool {
        self.code().first()
    }

    pub fn is_final(&self) -> bool {
        self.code().last()
    }

    /// Blocks that occupy space in the stream but write nothing.
    pub fn is_empty(&self) -> bool {
        self.code().ignore() || self.byte_count() == 0
    }

    /// Number of payload bytes following this header in the stream.
    pub fn payload_len(&self) -> usize {
        if self.is_fill() {
            0
        } else {
            self.byte_count() as usize
        }
    }
}

pub const SECURE_HEADER_LEN: usize = 256;

// Byte ranges within a secure header, for the parts that are consumed
// straight from the buffer rather than through `SecureHeader`.
pub const SECURE_HEADER_TYPE: Range<usize> = 0x00..0x04;
pub const SECURE_HEADER_SIGNATURE: Range<usize> = 0x04..0x44;
pub const SECURE_HEADER_HASH: Range<usize> = 0x44..0x64;
pub const SECURE_HEADER_PAYLOAD_LEN: Range<usize> = 0x8c..0x90;
pub const SECURE_HEADER_ATTRIBUTES: Range<usize> = 0x90..0xd0;

pub const SECURE_HEADER_ATTRIBUTE_COUNT: usize = 8;

/// Attribute id declaring the ECDSA flavour, i.e. the digest size in bits
pub const ATTR_ECDSA_TYPE: u32 = 0x8000_0003;

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum SecureHeaderType {
    /// "BLp", a signed plaintext payload
    Signed = 0x424c_7003,
    /// "BBx", an encrypted payload
    Encrypted = 0x4242_7803,
    /// "BLw", a wrapped-key payload
    Wrapped = 0x424c_7703,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PackedStruct)]
#[packed_struct(size_bytes = "8", bit_numbering = "msb0", endian = "msb")]
pub struct HeaderAttribute {
    pub id: u32,
    pub value: u32,
}

impl HeaderAttribute {
    pub fn new(id: u32, value: u32) -> HeaderAttribute {
        HeaderAttribute { id, value }
    }
}

/// Secure boot header that may precede an LDR stream. Every multi-byte
/// field is big-endian.
#[derive(Clone, Debug, Default, PackedStruct)]
#[packed_struct(size_bytes = "256", bit_numbering = "msb0", endian = "msb")]
pub struct SecureHeader {
    pub header_type: u32,

    // ECDSA signature, r then s. Always a P-256 signature, whatever digest
    // size the attributes declare.
    pub signature_r: [u8; 32],
    pub signature_s: [u8; 32],

    /// Digest of the attribute table and payload; only the first
    /// digest-size bytes are meaningful.
    pub hash: [u8; 32],

    // Only used by the encrypted formats.
    pub key: [u8; 24],
    pub iv: [u8; 16],

    /// Payload bytes following the header
    pub length: u32,

    #[packed_field(size_bytes = "8")]
    pub attr0: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr1: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr2: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr3: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr4: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr5: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr6: HeaderAttribute,
    #[packed_field(size_bytes = "8")]
    pub attr7: HeaderAttribute,

    // Split to stay within the array sizes packed_struct handles.
    pub padding0: [u8; 32],
    pub padding1: [u8; 16],
}

impl SecureHeader {
    pub fn new(header_type: SecureHeaderType, length: u32) -> SecureHeader {
        SecureHeader {
            header_type: header_type as u32,
            length,
            ..Default::default()
        }
    }

    pub fn signature(&self) -> [u8; 64] {
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.signature_r);
        sig[32..].copy_from_slice(&self.signature_s);
        sig
    }

    pub fn set_signature(&mut self, sig: &[u8; 64]) {
        self.signature_r.copy_from_slice(&sig[..32]);
        self.signature_s.copy_from_slice(&sig[32..]);
    }

    pub fn attributes(&self) -> [HeaderAttribute; SECURE_HEADER_ATTRIBUTE_COUNT] {
        [
            self.attr0, self.attr1, self.attr2, self.attr3, self.attr4, self.attr5, self.attr6,
            self.attr7,
        ]
    }

    pub fn set_attributes(&mut self, attrs: [HeaderAttribute; SECURE_HEADER_ATTRIBUTE_COUNT]) {
        [
            self.attr0, self.attr1, self.attr2, self.attr3, self.attr4, self.attr5, self.attr6,
            self.attr7,
        ] = attrs;
    }
}

/// Field ids of the OTP key/secret store.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
pub enum OtpId {
    Huk = 1,
    Rkek = 2,
    Dek = 3,
    OemPublicKey = 4,
    Pvt128Key0 = 5,
    Pvt128Key1 = 6,
    Pvt128Key2 = 7,
    Pvt128Key3 = 8,
    Ek = 9,
    SecureEmuKey0 = 10,
    SecureEmuKey1 = 11,
    PublicKey0 = 12,
    PublicKey1 = 13,
    Gp1 = 14,
    Lock = 15,
}

/// Uncompressed P-256 point, x then y, both big-endian
pub const OTP_PUBLIC_KEY_LEN: usize = 64;

/// Image verification keys, in the order they are tried
pub const IMAGE_KEY_SLOTS: [OtpId; 2] = [OtpId::PublicKey0, OtpId::PublicKey1];
