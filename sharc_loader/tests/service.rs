// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use sharc_areas::{
    BlockCode, BlockHeader, OtpId, FLAG_FILL, FLAG_FINAL, FLAG_FIRST, FLAG_IGNORE,
    SECURE_HEADER_LEN,
};
use sharc_loader::config::{CoreConfig, PlatformConfig, WindowConfig};
use sharc_loader::ldr;
use sharc_loader::lifecycle::RunState;
use sharc_loader::memory::MemoryMap;
use sharc_loader::pta::Param;
use sharc_loader::sim::{self, RcuEvent, SecEvent, SimKeyStore, SimRcu, SimService};
use sharc_loader::translate::{AddressTranslator, Region};
use sharc_loader::{result_code, CoreId, Error, ResultCode};
use zerocopy::AsBytes;

const L1_0: u32 = 0x0010_0000;
const L1_1: u32 = 0x0020_0000;
const L2: u32 = 0x0080_0000;
const WINDOW: u32 = 0x1000;

fn config() -> PlatformConfig {
    PlatformConfig {
        cores: [
            CoreConfig {
                local: WindowConfig::new(L1_0, WINDOW),
                wake_irq: 106,
            },
            CoreConfig {
                local: WindowConfig::new(L1_1, WINDOW),
                wake_irq: 107,
            },
        ],
        shared: WindowConfig::new(L2, WINDOW),
        idle_poll_limit: 1000,
        reset_poll_limit: 10,
        ..Default::default()
    }
}

fn service(keys: SimKeyStore) -> SimService {
    sharc_loader::logging::init_logger(true);
    sim::service(&config(), keys, SimRcu::idles_after(5)).unwrap()
}

/// A service trusting `key` in slot 0.
fn trusting(seed: u8) -> SimService {
    let mut keys = SimKeyStore::default();
    keys.provision(
        OtpId::PublicKey0,
        &sim::public_key(&sim::signing_key(seed).unwrap()),
    );
    service(keys)
}

#[derive(Default)]
struct Ldr(Vec<u8>);

impl Ldr {
    fn block(mut self, flags: u32, addr: u32, payload: &[u8]) -> Self {
        let hdr = BlockHeader::new(
            BlockCode::new(0xad, flags),
            addr,
            payload.len() as u32,
            0,
        );
        self.0.extend_from_slice(hdr.as_bytes());
        self.0.extend_from_slice(payload);
        self
    }

    fn fill(mut self, flags: u32, addr: u32, count: u32, byte: u8) -> Self {
        let hdr = BlockHeader::new(
            BlockCode::new(0xac, flags | FLAG_FILL),
            addr,
            count,
            u32::from(byte),
        );
        self.0.extend_from_slice(hdr.as_bytes());
        self
    }

    fn signed(&self, seed: u8) -> Vec<u8> {
        sim::sign_image(&sim::signing_key(seed).unwrap(), 256, &self.0).unwrap()
    }
}

fn program() -> Ldr {
    Ldr::default()
        .block(FLAG_FIRST, L1_0 + 0x100, &[])
        .block(0, L1_0 + 0x101, &[0xde, 0xad, 0xbe, 0xef, 0x01])
        .fill(0, L2 + 0x10, 0x21, 0x5a)
        .block(FLAG_IGNORE, L1_0, &[0xff; 64])
        .block(FLAG_FINAL, L1_0 + 0x200, &[])
}

/// An unsigned stream long enough to be mistaken for a secure header.
fn unsigned() -> Ldr {
    Ldr::default()
        .block(FLAG_FIRST, L1_0 + 0x400, &[0x11; 300])
        .block(FLAG_FINAL, L1_0, &[])
}

fn value(a: u32) -> Param<'static> {
    Param::ValueInput { a, b: 0 }
}

fn load(svc: &mut SimService, core: u32, image: &[u8]) -> Result<(), Error> {
    svc.invoke(
        sharc_abi::CMD_LOAD,
        &[value(core), Param::MemrefInput(image), Param::None, Param::None],
    )
}

fn command(svc: &mut SimService, cmd: u32, core: u32) -> Result<(), Error> {
    svc.invoke(cmd, &[value(core), Param::None, Param::None, Param::None])
}

fn verify(svc: &mut SimService, image: &[u8]) -> Result<(), Error> {
    svc.invoke(
        sharc_abi::CMD_VERIFY,
        &[Param::MemrefInput(image), Param::None, Param::None, Param::None],
    )
}

fn local(svc: &SimService, core: CoreId) -> &sim::RamWindow {
    svc.memory().io(Region::Local(core))
}

#[test]
fn load_writes_exactly_the_declared_bytes() {
    let mut svc = trusting(1);
    load(&mut svc, 0, &program().signed(1)).unwrap();

    let l1 = local(&svc, CoreId::CORE0);
    assert_eq!(l1.written_range(), Some(0x101..0x106));
    assert_eq!(l1.written_count(), 5);
    assert_eq!(&l1.bytes()[0x101..0x106], &[0xde, 0xad, 0xbe, 0xef, 0x01]);

    let l2 = svc.memory().io(Region::Shared);
    assert_eq!(l2.written_range(), Some(0x10..0x31));
    assert_eq!(l2.written_count(), 0x21);
    assert!(l2.bytes()[0x10..0x31].iter().all(|&b| b == 0x5a));

    assert_eq!(local(&svc, CoreId::CORE1).written_range(), None);
    assert_eq!(
        svc.cores().entry_point(CoreId::CORE0),
        Some(L1_0 + 0x100)
    );
}

#[test]
fn verified_header_strips_to_loadable_stream() {
    let mut svc = trusting(1);
    let image = program().signed(1);
    svc.verify(&image).unwrap();
    let signed = svc.load(CoreId::CORE0, &image).unwrap();

    // The stream behind the header loads on its own, with the same result.
    let cfg = config();
    let mut memory = MemoryMap::new(
        AddressTranslator::new(&cfg),
        cfg.cores.map(|c| sim::RamWindow::new(c.local.size as usize)),
        sim::RamWindow::new(cfg.shared.size as usize),
    )
    .unwrap();
    let stripped = ldr::load(CoreId::CORE0, &image[SECURE_HEADER_LEN..], &mut memory).unwrap();

    assert_eq!(stripped, signed);
    assert_eq!(stripped.entry, Some(L1_0 + 0x100));
    assert_eq!(stripped.blocks, 5);
    for region in [
        Region::Local(CoreId::CORE0),
        Region::Local(CoreId::CORE1),
        Region::Shared,
    ] {
        let (a, b) = (memory.io(region), svc.memory().io(region));
        assert_eq!(a.bytes(), b.bytes(), "{region:?}");
        assert_eq!(a.written_range(), b.written_range(), "{region:?}");
    }
}

#[cfg(not(feature = "allow-unverified-images"))]
#[test]
fn unsigned_and_untrusted_images_are_rejected() {
    let mut svc = trusting(1);

    let err = load(&mut svc, 0, &program().0).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::ShortBuffer);
    let err = load(&mut svc, 0, &unsigned().0).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::BadFormat);

    let err = load(&mut svc, 0, &program().signed(2)).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::NoData);

    let mut image = program().signed(1);
    let last = image.len() - 20;
    image[last] ^= 1;
    let err = load(&mut svc, 0, &image).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::SignatureInvalid);

    assert_eq!(local(&svc, CoreId::CORE0).written_range(), None);
    assert_eq!(svc.cores().entry_point(CoreId::CORE0), None);
}

#[cfg(feature = "allow-unverified-images")]
#[test]
fn unsigned_images_load_when_allowed() {
    let mut svc = service(SimKeyStore::default());
    load(&mut svc, 1, &program_for(L1_1).0).unwrap();
    load(&mut svc, 0, &program().signed(2)).unwrap();
    assert_eq!(svc.cores().entry_point(CoreId::CORE0), Some(L1_0 + 0x100));
}

#[cfg(feature = "allow-unverified-images")]
fn program_for(base: u32) -> Ldr {
    Ldr::default().block(FLAG_FIRST | FLAG_FINAL, base, &[1, 2, 3])
}

#[test]
fn truncated_image_is_short_buffer() {
    let mut svc = trusting(1);
    let stream = Ldr::default()
        .block(0, L1_0, &[1; 8])
        .block(FLAG_FINAL, L1_0 + 0x40, &[2; 32]);
    let mut truncated = stream.0.clone();
    truncated.truncate(truncated.len() - 1);
    let image = sim::sign_image(&sim::signing_key(1).unwrap(), 224, &truncated).unwrap();

    let err = load(&mut svc, 0, &image).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::ShortBuffer);
    // The first block landed, the truncated one did not.
    assert_eq!(local(&svc, CoreId::CORE0).written_range(), Some(0..8));
    assert!(!local(&svc, CoreId::CORE0).was_written(0x40));
}

#[test]
fn stream_without_final_block() {
    let mut svc = trusting(1);
    let image = Ldr::default().block(FLAG_FIRST, L1_0, &[1]).signed(1);
    let err = load(&mut svc, 0, &image).unwrap_err();
    assert!(matches!(err, Error::MissingFinalBlock));
    assert_eq!(svc.cores().entry_point(CoreId::CORE0), None);
}

#[test]
fn blocks_outside_the_cores_windows() {
    let mut svc = trusting(1);
    // Core 1's L1 is not reachable when loading core 0.
    let image = Ldr::default().block(FLAG_FINAL, L1_1, &[1]).signed(1);
    let err = load(&mut svc, 0, &image).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::BadParameters);

    load(&mut svc, 1, &image).unwrap();
    assert_eq!(local(&svc, CoreId::CORE1).written_range(), Some(0..1));
}

#[test]
fn bad_parameters() {
    let mut svc = trusting(1);
    let image = program().signed(1);

    let err = load(&mut svc, 2, &image).unwrap_err();
    assert!(matches!(err, Error::InvalidCore(2)));
    assert_eq!(
        command(&mut svc, sharc_abi::CMD_START, 7)
            .unwrap_err()
            .result_code(),
        ResultCode::BadParameters
    );

    // Wrong shape
    let err = svc
        .invoke(
            sharc_abi::CMD_LOAD,
            &[value(0), Param::None, Param::None, Param::None],
        )
        .unwrap_err();
    assert!(matches!(err, Error::ParamTypes { .. }));
    let err = svc
        .invoke(
            sharc_abi::CMD_STOP,
            &[Param::MemrefInput(&image), Param::None, Param::None, Param::None],
        )
        .unwrap_err();
    assert_eq!(err.result_code(), ResultCode::BadParameters);

    assert!(matches!(
        command(&mut svc, 0x42, 0),
        Err(Error::UnknownCommand(0x42))
    ));

    // None of the above touched memory or hardware.
    assert_eq!(local(&svc, CoreId::CORE0).written_range(), None);
    assert!(svc.cores().rcu().events().is_empty());
}

#[test]
fn lifecycle() {
    let mut svc = trusting(1);
    load(&mut svc, 0, &program().signed(1)).unwrap();

    command(&mut svc, sharc_abi::CMD_START, 0).unwrap();
    assert_eq!(svc.run_state(CoreId::CORE0), RunState::Running);
    assert_eq!(
        svc.cores().rcu().reset_vector(CoreId::CORE0),
        Some(L1_0 + 0x100)
    );
    assert!(svc.cores().rcu().is_active(CoreId::CORE0));

    // No loading over a running core
    let err = load(&mut svc, 0, &program().signed(1)).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::BadState);
    assert_eq!(result_code(&Err(err)), ResultCode::BadState);

    // Start again is a no-op
    let events = svc.cores().rcu().events().len();
    command(&mut svc, sharc_abi::CMD_START, 0).unwrap();
    assert_eq!(svc.cores().rcu().events().len(), events);

    command(&mut svc, sharc_abi::CMD_STOP, 0).unwrap();
    assert_eq!(svc.run_state(CoreId::CORE0), RunState::Stopped);
    assert_eq!(
        svc.cores().rcu().reset_vector(CoreId::CORE0),
        Some(sharc_abi::IDLE_ADDR)
    );
    assert!(!svc.cores().rcu().is_active(CoreId::CORE0));
    assert!(svc
        .cores()
        .sec()
        .events()
        .contains(&SecEvent::Raise(106)));

    // Stop again is a no-op
    let rcu = svc.cores().rcu().events().len();
    let sec = svc.cores().sec().events().len();
    command(&mut svc, sharc_abi::CMD_STOP, 0).unwrap();
    assert_eq!(svc.cores().rcu().events().len(), rcu);
    assert_eq!(svc.cores().sec().events().len(), sec);

    // A restart without a fresh load parks the core.
    command(&mut svc, sharc_abi::CMD_START, 0).unwrap();
    assert_eq!(
        svc.cores().rcu().reset_vector(CoreId::CORE0),
        Some(sharc_abi::IDLE_ADDR)
    );
}

#[test]
fn start_without_load_never_uses_zero() {
    let mut svc = trusting(1);
    command(&mut svc, sharc_abi::CMD_START, 1).unwrap();
    let vectors: Vec<u32> = svc
        .cores()
        .rcu()
        .events()
        .iter()
        .filter_map(|e| match e {
            RcuEvent::SetResetVector(_, addr) => Some(*addr),
            _ => None,
        })
        .collect();
    assert_eq!(vectors, [sharc_abi::IDLE_ADDR]);
}

#[test]
fn verify_has_no_side_effects() {
    let mut svc = trusting(1);
    let image = program().signed(1);
    verify(&mut svc, &image).unwrap();
    assert_eq!(local(&svc, CoreId::CORE0).written_range(), None);
    assert_eq!(svc.cores().entry_point(CoreId::CORE0), None);
    assert!(svc.cores().rcu().events().is_empty());

    let err = verify(&mut svc, &unsigned().0).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::BadFormat);
    let err = verify(&mut svc, &program().0).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::ShortBuffer);
}

#[test]
fn second_key_slot() {
    let mut keys = SimKeyStore::default();
    keys.provision(
        OtpId::PublicKey0,
        &sim::public_key(&sim::signing_key(1).unwrap()),
    );
    keys.provision(
        OtpId::PublicKey1,
        &sim::public_key(&sim::signing_key(2).unwrap()),
    );
    let mut svc = service(keys);

    verify(&mut svc, &program().signed(1)).unwrap();
    verify(&mut svc, &program().signed(2)).unwrap();
    let err = verify(&mut svc, &program().signed(3)).unwrap_err();
    assert!(matches!(err, Error::BadSignature(OtpId::PublicKey1)));
}

#[test]
fn config_from_toml_drives_the_service() {
    let cfg = PlatformConfig::from_toml(
        r#"
        idle-poll-limit = 10
        [[cores]]
        local = { base = 0x100000, size = 0x1000 }
        wake-irq = 106
        [[cores]]
        local = { base = 0x200000, size = 0x1000 }
        wake-irq = 107
        [shared]
        base = 0x800000
        size = 0x1000
        "#,
    )
    .unwrap();
    assert_eq!(cfg.cores, config().cores);

    let mut svc = sim::service(&cfg, SimKeyStore::default(), SimRcu::never_idles()).unwrap();
    command(&mut svc, sharc_abi::CMD_START, 0).unwrap();
    command(&mut svc, sharc_abi::CMD_STOP, 0).unwrap();
    assert_eq!(svc.run_state(CoreId::CORE0), RunState::Stopped);
    assert!(svc.cores().delay().total_us() >= 10);
}
