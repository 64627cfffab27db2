// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated hardware: memory that remembers what was written to it, and
//! register-level models of the RCU, SEC and OTP that record how they were
//! driven. Also image signing, for producing test images.

use crate::config::PlatformConfig;
use crate::crypto::{Crypto, HashAlgorithm, ImageHasher, RustCrypto};
use crate::lifecycle::CoreManager;
use crate::memory::MemoryMap;
use crate::mmio::Mmio;
use crate::otp::KeyStore;
use crate::pta::Service;
use crate::rcu::ResetControl;
use crate::sec::{InterruptRouter, IrqKind};
use crate::translate::AddressTranslator;
use crate::verify::ImageVerifier;
use crate::wait::Delay;
use crate::{CoreId, Error};
use p256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use packed_struct::prelude::*;
use sharc_abi::NUM_CORES;
use sharc_areas::{
    HeaderAttribute, OtpId, SecureHeader, SecureHeaderType, ATTR_ECDSA_TYPE,
    SECURE_HEADER_ATTRIBUTES, SECURE_HEADER_ATTRIBUTE_COUNT,
};
use std::cell::Cell;
use std::collections::HashMap;
use std::ops::Range;

/// Zero-initialised RAM standing in for a mapped window.
#[derive(Clone, Debug)]
pub struct RamWindow {
    bytes: Vec<u8>,
    written: Vec<bool>,
    byte_writes: usize,
    word_writes: usize,
}

impl RamWindow {
    pub fn new(len: usize) -> RamWindow {
        RamWindow {
            bytes: vec![0; len],
            written: vec![false; len],
            byte_writes: 0,
            word_writes: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn was_written(&self, offset: usize) -> bool {
        self.written.get(offset).copied().unwrap_or(false)
    }

    /// Number of distinct bytes written
    pub fn written_count(&self) -> usize {
        self.written.iter().filter(|&&w| w).count()
    }

    /// The smallest range holding every written byte
    pub fn written_range(&self) -> Option<Range<usize>> {
        let first = self.written.iter().position(|&w| w)?;
        let last = self.written.iter().rposition(|&w| w)?;
        Some(first..last + 1)
    }

    pub fn byte_writes(&self) -> usize {
        self.byte_writes
    }

    pub fn word_writes(&self) -> usize {
        self.word_writes
    }

    fn mark(&mut self, offset: usize, len: usize) {
        self.written[offset..offset + len].fill(true);
    }
}

impl Mmio for RamWindow {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read32(&self, offset: usize) -> u32 {
        let b = &self.bytes[offset..offset + 4];
        u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
    }

    fn write32(&mut self, offset: usize, value: u32) {
        assert_eq!(offset % 4, 0, "unaligned word write at {offset:#x}");
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
        self.mark(offset, 4);
        self.word_writes += 1;
    }

    fn write8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
        self.mark(offset, 1);
        self.byte_writes += 1;
    }
}

#[derive(Clone, Debug)]
struct SimKey {
    data: Vec<u8>,
    valid: bool,
}

/// An OTP key store holding whatever the test provisions.
#[derive(Clone, Debug, Default)]
pub struct SimKeyStore {
    fields: HashMap<OtpId, SimKey>,
}

impl SimKeyStore {
    pub fn provision(&mut self, id: OtpId, data: &[u8]) {
        self.fields.insert(
            id,
            SimKey {
                data: data.to_vec(),
                valid: true,
            },
        );
    }

    pub fn invalidate(&mut self, id: OtpId) {
        if let Some(key) = self.fields.get_mut(&id) {
            key.valid = false;
        }
    }

    /// Not possible with real OTP, but handy for tests.
    pub fn erase(&mut self, id: OtpId) {
        self.fields.remove(&id);
    }
}

impl KeyStore for SimKeyStore {
    fn is_written(&self, id: OtpId) -> Result<bool, Error> {
        Ok(self.fields.contains_key(&id))
    }

    fn is_valid(&self, id: OtpId) -> Result<bool, Error> {
        Ok(self.fields.get(&id).map_or(true, |k| k.valid))
    }

    fn read(&self, id: OtpId, buf: &mut [u8]) -> Result<usize, Error> {
        let data = self
            .fields
            .get(&id)
            .map(|k| k.data.as_slice())
            .unwrap_or_default();
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(data.len())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RcuEvent {
    SetResetVector(CoreId, u32),
    ClearResetStatus(CoreId),
    AssertReset(CoreId),
    DeassertReset(CoreId),
    DisableSystemInterface(CoreId),
    EnableSystemInterface(CoreId),
    RequestStop(CoreId),
    ClearStopRequest(CoreId),
    Activate(CoreId),
    Deactivate(CoreId),
}

/// When a simulated core reports, through CRSTAT, that it entered reset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResetConfirm {
    #[default]
    Immediately,
    /// After this many status polls
    AfterPolls(u32),
    Never,
}

#[derive(Debug, Default)]
struct SimCore {
    idle: Cell<bool>,
    idle_countdown: Cell<Option<u32>>,
    in_reset: bool,
    reset_status: Cell<bool>,
    reset_countdown: Cell<Option<u32>>,
    active: bool,
    vector: Option<u32>,
}

/// Counts a poll against `countdown`, raising `flag` once it runs out.
fn tick(countdown: &Cell<Option<u32>>, flag: &Cell<bool>) {
    match countdown.get() {
        Some(0) => {
            flag.set(true);
            countdown.set(None);
        }
        Some(n) => countdown.set(Some(n - 1)),
        None => (),
    }
}

/// A reset control unit driving simulated cores. A core answers a stop
/// request by going idle after a configurable number of idle polls.
#[derive(Debug, Default)]
pub struct SimRcu {
    cores: [SimCore; NUM_CORES],
    /// Polls before a stop request is answered; `None` never answers.
    idle_after: Option<u32>,
    reset_confirm: ResetConfirm,
    events: Vec<RcuEvent>,
}

impl SimRcu {
    pub fn idles_after(polls: u32) -> SimRcu {
        SimRcu {
            idle_after: Some(polls),
            ..Default::default()
        }
    }

    pub fn never_idles() -> SimRcu {
        SimRcu {
            idle_after: None,
            ..Default::default()
        }
    }

    pub fn with_reset_confirm(self, reset_confirm: ResetConfirm) -> SimRcu {
        SimRcu {
            reset_confirm,
            ..self
        }
    }

    pub fn events(&self) -> &[RcuEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn set_idle(&mut self, core: CoreId, idle: bool) {
        self.cores[core.index()].idle.set(idle);
    }

    /// Puts the core in reset behind the driver's back.
    pub fn hold_in_reset(&mut self, core: CoreId) {
        self.cores[core.index()].in_reset = true;
    }

    pub fn reset_vector(&self, core: CoreId) -> Option<u32> {
        self.cores[core.index()].vector
    }

    pub fn is_active(&self, core: CoreId) -> bool {
        self.cores[core.index()].active
    }

    fn core(&mut self, core: CoreId, event: RcuEvent) -> &mut SimCore {
        self.events.push(event);
        &mut self.cores[core.index()]
    }
}

impl ResetControl for SimRcu {
    fn set_reset_vector(&mut self, core: CoreId, addr: u32) {
        self.core(core, RcuEvent::SetResetVector(core, addr)).vector = Some(addr);
    }

    fn is_in_reset(&self, core: CoreId) -> bool {
        self.cores[core.index()].in_reset
    }

    fn is_idle(&self, core: CoreId) -> bool {
        let c = &self.cores[core.index()];
        tick(&c.idle_countdown, &c.idle);
        c.idle.get()
    }

    fn reset_status(&self, core: CoreId) -> bool {
        let c = &self.cores[core.index()];
        tick(&c.reset_countdown, &c.reset_status);
        c.reset_status.get()
    }

    fn clear_reset_status(&mut self, core: CoreId) {
        let c = self.core(core, RcuEvent::ClearResetStatus(core));
        c.reset_status.set(false);
        c.reset_countdown.set(None);
    }

    fn assert_reset(&mut self, core: CoreId) {
        let confirm = self.reset_confirm;
        let c = self.core(core, RcuEvent::AssertReset(core));
        c.in_reset = true;
        match confirm {
            ResetConfirm::Immediately => c.reset_status.set(true),
            ResetConfirm::AfterPolls(n) => c.reset_countdown.set(Some(n)),
            ResetConfirm::Never => (),
        }
    }

    fn deassert_reset(&mut self, core: CoreId) {
        self.core(core, RcuEvent::DeassertReset(core)).in_reset = false;
    }

    fn disable_system_interface(&mut self, core: CoreId) {
        self.core(core, RcuEvent::DisableSystemInterface(core));
    }

    fn enable_system_interface(&mut self, core: CoreId) {
        self.core(core, RcuEvent::EnableSystemInterface(core));
    }

    fn request_stop(&mut self, core: CoreId) {
        let idle_after = self.idle_after;
        self.core(core, RcuEvent::RequestStop(core))
            .idle_countdown
            .set(idle_after);
    }

    fn clear_stop_request(&mut self, core: CoreId) {
        self.core(core, RcuEvent::ClearStopRequest(core))
            .idle_countdown
            .set(None);
    }

    fn activate(&mut self, core: CoreId) {
        let c = self.core(core, RcuEvent::Activate(core));
        c.idle.set(false);
        c.active = true;
    }

    fn deactivate(&mut self, core: CoreId) {
        self.core(core, RcuEvent::Deactivate(core)).active = false;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SecEvent {
    Route(u32, CoreId),
    Enable(u32, IrqKind, bool),
    EnableCore(CoreId),
    Raise(u32),
}

#[derive(Debug, Default)]
pub struct SimSec {
    events: Vec<SecEvent>,
}

impl SimSec {
    pub fn events(&self) -> &[SecEvent] {
        &self.events
    }
}

impl InterruptRouter for SimSec {
    fn route_to_core(&mut self, irq: u32, core: CoreId) {
        self.events.push(SecEvent::Route(irq, core));
    }

    fn enable_source(&mut self, irq: u32, kind: IrqKind, source: bool) {
        self.events.push(SecEvent::Enable(irq, kind, source));
    }

    fn enable_core_interface(&mut self, core: CoreId) {
        self.events.push(SecEvent::EnableCore(core));
    }

    fn raise(&mut self, irq: u32) {
        self.events.push(SecEvent::Raise(irq));
    }
}

/// Keeps count instead of waiting.
#[derive(Debug, Default)]
pub struct CountingDelay {
    total_us: u64,
    calls: u32,
}

impl CountingDelay {
    pub fn total_us(&self) -> u64 {
        self.total_us
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}

impl Delay for CountingDelay {
    fn delay_us(&mut self, us: u32) {
        self.total_us += u64::from(us);
        self.calls += 1;
    }
}

pub type SimService = Service<RamWindow, RustCrypto, SimKeyStore, SimRcu, SimSec, CountingDelay>;

/// A service over simulated hardware laid out as `cfg` describes.
pub fn service(cfg: &PlatformConfig, keys: SimKeyStore, rcu: SimRcu) -> Result<SimService, Error> {
    cfg.validate()?;
    let memory = MemoryMap::new(
        AddressTranslator::new(cfg),
        cfg.cores.map(|c| RamWindow::new(c.local.size as usize)),
        RamWindow::new(cfg.shared.size as usize),
    )?;
    Ok(Service::new(
        memory,
        ImageVerifier::new(RustCrypto, keys),
        CoreManager::new(cfg, rcu, SimSec::default(), CountingDelay::default()),
    ))
}

/// A deterministic signing key; `seed` must not be 0.
pub fn signing_key(seed: u8) -> Result<SigningKey, Error> {
    Ok(SigningKey::from_slice(&[seed; 32])?)
}

/// The key as it would be provisioned in OTP: x || y.
pub fn public_key(key: &SigningKey) -> [u8; 64] {
    let point = key.verifying_key().to_encoded_point(false);
    let mut out = [0u8; 64];
    // Uncompressed: 0x04 || x || y
    out.copy_from_slice(&point.as_bytes()[1..]);
    out
}

/// Wraps `payload` in a signed secure header declaring a `digest_bits`
/// digest.
pub fn sign_image(key: &SigningKey, digest_bits: u32, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let alg = match digest_bits {
        224 => HashAlgorithm::Sha224,
        256 => HashAlgorithm::Sha256,
        v => return Err(Error::UnsupportedDigestSize(v)),
    };

    let mut header = SecureHeader::new(SecureHeaderType::Signed, payload.len() as u32);
    let mut attrs = [HeaderAttribute::default(); SECURE_HEADER_ATTRIBUTE_COUNT];
    attrs[0] = HeaderAttribute::new(ATTR_ECDSA_TYPE, digest_bits);
    header.set_attributes(attrs);

    let unsigned = header.pack()?;
    let mut hasher = RustCrypto.hash_start(alg);
    hasher.update(&unsigned[SECURE_HEADER_ATTRIBUTES]);
    hasher.update(payload);
    let digest = hasher.finish();
    header.hash[..alg.digest_len()].copy_from_slice(digest.as_bytes());

    let sig: Signature = key.sign_prehash(digest.as_bytes())?;
    let mut raw = [0u8; 64];
    raw.copy_from_slice(&sig.to_bytes());
    header.set_signature(&raw);

    let mut image = header.pack()?.to_vec();
    image.extend_from_slice(payload);
    Ok(image)
}
