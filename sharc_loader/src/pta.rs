// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The command interface of the loader service.

use crate::crypto::Crypto;
use crate::ldr::{self, LoadReport};
use crate::lifecycle::{CoreManager, RunState};
use crate::memory::MemoryMap;
use crate::mmio::Mmio;
use crate::otp::KeyStore;
use crate::rcu::ResetControl;
use crate::sec::InterruptRouter;
use crate::verify::{self, ImageVerifier};
use crate::wait::Delay;
use crate::{CoreId, Error};
use log::{debug, info, warn};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
pub enum Command {
    Load = sharc_abi::CMD_LOAD,
    Start = sharc_abi::CMD_START,
    Stop = sharc_abi::CMD_STOP,
    Verify = sharc_abi::CMD_VERIFY,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamType {
    None,
    ValueInput,
    ValueOutput,
    ValueInout,
    MemrefInput,
    MemrefOutput,
    MemrefInout,
}

/// One of the four parameters passed with a command.
#[derive(Debug)]
pub enum Param<'a> {
    None,
    ValueInput { a: u32, b: u32 },
    ValueOutput { a: u32, b: u32 },
    ValueInout { a: u32, b: u32 },
    MemrefInput(&'a [u8]),
    MemrefOutput(&'a mut [u8]),
    MemrefInout(&'a mut [u8]),
}

impl Param<'_> {
    pub fn param_type(&self) -> ParamType {
        match self {
            Param::None => ParamType::None,
            Param::ValueInput { .. } => ParamType::ValueInput,
            Param::ValueOutput { .. } => ParamType::ValueOutput,
            Param::ValueInout { .. } => ParamType::ValueInout,
            Param::MemrefInput(_) => ParamType::MemrefInput,
            Param::MemrefOutput(_) => ParamType::MemrefOutput,
            Param::MemrefInout(_) => ParamType::MemrefInout,
        }
    }
}

fn check_types(params: &[Param<'_>; 4], expected: [ParamType; 4]) -> Result<(), Error> {
    let got = [
        params[0].param_type(),
        params[1].param_type(),
        params[2].param_type(),
        params[3].param_type(),
    ];
    if got != expected {
        return Err(Error::ParamTypes { expected, got });
    }
    Ok(())
}

fn core_param(param: &Param<'_>) -> Result<CoreId, Error> {
    match param {
        Param::ValueInput { a, .. } => CoreId::new(*a),
        _ => Err(Error::InvalidCore(u32::MAX)),
    }
}

fn image_param<'a>(param: &Param<'a>) -> &'a [u8] {
    match param {
        Param::MemrefInput(image) => *image,
        _ => &[],
    }
}

/// The loader service: everything needed to load, verify, start and stop
/// the SHARC cores.
pub struct Service<M, C, K, R, I, D> {
    memory: MemoryMap<M>,
    verifier: ImageVerifier<C, K>,
    cores: CoreManager<R, I, D>,
}

impl<M, C, K, R, I, D> Service<M, C, K, R, I, D>
where
    M: Mmio,
    C: Crypto,
    K: KeyStore,
    R: ResetControl,
    I: InterruptRouter,
    D: Delay,
{
    pub fn new(
        memory: MemoryMap<M>,
        verifier: ImageVerifier<C, K>,
        cores: CoreManager<R, I, D>,
    ) -> Self {
        Service {
            memory,
            verifier,
            cores,
        }
    }

    pub fn memory(&self) -> &MemoryMap<M> {
        &self.memory
    }

    pub fn verifier(&self) -> &ImageVerifier<C, K> {
        &self.verifier
    }

    pub fn cores(&self) -> &CoreManager<R, I, D> {
        &self.cores
    }

    /// Entry point for a command. Parameter types are checked before
    /// anything else happens.
    pub fn invoke(&mut self, cmd: u32, params: &[Param<'_>; 4]) -> Result<(), Error> {
        let Some(cmd) = Command::from_u32(cmd) else {
            debug!("unknown command {cmd:#x}");
            return Err(Error::UnknownCommand(cmd));
        };
        use ParamType::{MemrefInput, None, ValueInput};

        match cmd {
            Command::Load => {
                check_types(params, [ValueInput, MemrefInput, None, None])?;
                let core = core_param(&params[0])?;
                self.load(core, image_param(&params[1])).map(|_| ())
            }
            Command::Start => {
                check_types(params, [ValueInput, None, None, None])?;
                self.start(core_param(&params[0])?)
            }
            Command::Stop => {
                check_types(params, [ValueInput, None, None, None])?;
                self.stop(core_param(&params[0])?)
            }
            Command::Verify => {
                check_types(params, [MemrefInput, None, None, None])?;
                self.verify(image_param(&params[0]))
            }
        }
    }

    /// Loads `image` into a stopped core. A signed image has its signature
    /// checked and its secure header stripped; anything else is rejected
    /// unless built with `allow-unverified-images`.
    pub fn load(&mut self, core: CoreId, image: &[u8]) -> Result<LoadReport, Error> {
        let Service {
            memory,
            verifier,
            cores,
        } = self;

        let report = cores.load(core, || {
            let stream = match verify::check_secure_header(image) {
                Ok(signed) => {
                    if cfg!(feature = "allow-unverified-images") {
                        warn!("{core}: not verifying signed image");
                    } else {
                        verifier.verify_signed(&signed)?;
                    }
                    signed.payload
                }
                Err(e) if cfg!(feature = "allow-unverified-images") => {
                    warn!("{core}: loading image without secure header ({e})");
                    image
                }
                Err(e) => return Err(e),
            };
            ldr::load(core, stream, memory)
        })?;

        info!("{core}: image loaded");
        Ok(report)
    }

    pub fn start(&mut self, core: CoreId) -> Result<(), Error> {
        self.cores.start(core)
    }

    pub fn stop(&mut self, core: CoreId) -> Result<(), Error> {
        self.cores.stop(core)
    }

    pub fn verify(&self, image: &[u8]) -> Result<(), Error> {
        self.verifier.verify(image)
    }

    pub fn run_state(&self, core: CoreId) -> RunState {
        self.cores.run_state(core)
    }
}
