// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mmio::Mmio;
use crate::CoreId;
use sharc_areas::rcu;

/// The reset control unit, as far as the SHARC cores are concerned.
pub trait ResetControl {
    fn set_reset_vector(&mut self, core: CoreId, addr: u32);

    /// Reset asserted via CRCTL
    fn is_in_reset(&self, core: CoreId) -> bool;
    /// Idle flag raised by the core's runtime
    fn is_idle(&self, core: CoreId) -> bool;
    /// Reset confirmed via CRSTAT
    fn reset_status(&self, core: CoreId) -> bool;
    fn clear_reset_status(&mut self, core: CoreId);

    fn assert_reset(&mut self, core: CoreId);
    fn deassert_reset(&mut self, core: CoreId);
    fn disable_system_interface(&mut self, core: CoreId);
    fn enable_system_interface(&mut self, core: CoreId);

    /// Flag the core's runtime checks on a stop interrupt
    fn request_stop(&mut self, core: CoreId);
    fn clear_stop_request(&mut self, core: CoreId);

    /// Clears the idle flag and tells the runtime it has been started.
    fn activate(&mut self, core: CoreId);
    fn deactivate(&mut self, core: CoreId);
}

pub struct Rcu<M> {
    regs: M,
}

impl<M: Mmio> Rcu<M> {
    pub fn new(regs: M) -> Self {
        Rcu { regs }
    }

    pub fn regs(&self) -> &M {
        &self.regs
    }

    fn msg(&self) -> u32 {
        self.regs.read32(rcu::MSG)
    }
}

impl<M: Mmio> ResetControl for Rcu<M> {
    fn set_reset_vector(&mut self, core: CoreId, addr: u32) {
        if let Some(svect) = rcu::svect(core.sharc()) {
            self.regs.write32(svect, addr);
        }
    }

    fn is_in_reset(&self, core: CoreId) -> bool {
        self.regs.read32(rcu::CRCTL) & rcu::core_reset(core.sharc()) != 0
    }

    fn is_idle(&self, core: CoreId) -> bool {
        self.msg() & rcu::msg_idle(core.sharc()) != 0
    }

    fn reset_status(&self, core: CoreId) -> bool {
        self.regs.read32(rcu::CRSTAT) & rcu::core_reset(core.sharc()) != 0
    }

    fn clear_reset_status(&mut self, core: CoreId) {
        // W1C
        self.regs.write32(rcu::CRSTAT, rcu::core_reset(core.sharc()));
    }

    fn assert_reset(&mut self, core: CoreId) {
        self.regs.set_bits32(rcu::CRCTL, rcu::core_reset(core.sharc()));
    }

    fn deassert_reset(&mut self, core: CoreId) {
        self.regs.clear_bits32(rcu::CRCTL, rcu::core_reset(core.sharc()));
    }

    fn disable_system_interface(&mut self, core: CoreId) {
        self.regs.set_bits32(rcu::SIDIS, rcu::system_interface(core.sharc()));
    }

    fn enable_system_interface(&mut self, core: CoreId) {
        self.regs.clear_bits32(rcu::SIDIS, rcu::system_interface(core.sharc()));
    }

    fn request_stop(&mut self, core: CoreId) {
        self.regs.write32(rcu::MSG_SET, rcu::msg_reset_request(core.sharc()));
    }

    fn clear_stop_request(&mut self, core: CoreId) {
        self.regs.write32(rcu::MSG_CLR, rcu::msg_reset_request(core.sharc()));
    }

    fn activate(&mut self, core: CoreId) {
        self.regs.write32(rcu::MSG_CLR, rcu::msg_idle(core.sharc()));
        self.regs.write32(rcu::MSG_SET, rcu::msg_activate(core.sharc()));
    }

    fn deactivate(&mut self, core: CoreId) {
        self.regs.write32(rcu::MSG_CLR, rcu::msg_activate(core.sharc()));
    }
}
