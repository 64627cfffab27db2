// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mmio::Mmio;
use crate::CoreId;
use log::error;
use sharc_areas::sec;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IrqKind {
    Interrupt,
    Fault,
}

/// The system event controller, used to interrupt a SHARC core.
pub trait InterruptRouter {
    fn route_to_core(&mut self, irq: u32, core: CoreId);
    fn enable_source(&mut self, irq: u32, kind: IrqKind, source: bool);
    fn enable_core_interface(&mut self, core: CoreId);
    fn raise(&mut self, irq: u32);
}

pub struct Sec<M> {
    regs: M,
}

/// System core numbers count the ARM as core 0.
fn system_core(core: CoreId) -> u32 {
    core.sharc() + 1
}

impl<M: Mmio> Sec<M> {
    pub fn new(regs: M) -> Self {
        Sec { regs }
    }

    pub fn regs(&self) -> &M {
        &self.regs
    }
}

impl<M: Mmio> InterruptRouter for Sec<M> {
    fn route_to_core(&mut self, irq: u32, core: CoreId) {
        let sctl = sec::sctl(irq);
        let mut v = self.regs.read32(sctl) & !sec::SCTL_CTG;
        v |= (system_core(core) << sec::SCTL_CTG_SHIFT) & sec::SCTL_CTG;
        self.regs.write32(sctl, v);
    }

    fn enable_source(&mut self, irq: u32, kind: IrqKind, source: bool) {
        let mut set = match kind {
            IrqKind::Interrupt => sec::SCTL_INT_EN,
            IrqKind::Fault => sec::SCTL_FAULT_EN,
        };
        if source {
            set |= sec::SCTL_SRC_EN;
        }
        self.regs.set_bits32(sec::sctl(irq), set);
    }

    fn enable_core_interface(&mut self, core: CoreId) {
        self.regs.set_bits32(sec::cctl(system_core(core)), sec::CCTL_EN);
    }

    fn raise(&mut self, irq: u32) {
        match irq.checked_sub(sec::FIRST_SYSTEM_IRQ) {
            Some(sid) => self.regs.write32(sec::RAISE, sid),
            None => error!("irq {irq} is not a system event source"),
        }
    }
}
