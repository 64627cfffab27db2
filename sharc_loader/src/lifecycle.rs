// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-core state and the start/stop/reset sequences.
//!
//! A core is only ever started at an entry point recorded by a load that
//! completed since the core was last stopped. Without one it is started at
//! the idle address, where the runtime parks itself.

use crate::config::PlatformConfig;
use crate::ldr::LoadReport;
use crate::rcu::ResetControl;
use crate::sec::{InterruptRouter, IrqKind};
use crate::wait::{self, Delay};
use crate::{CoreId, Error};
use log::{debug, error, info, warn};
use sharc_abi::NUM_CORES;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    Stopped,
    Running,
}

#[derive(Copy, Clone, Debug)]
struct CoreState {
    run_state: RunState,
    entry: Option<u32>,
    wake_irq: u32,
}

pub struct CoreManager<R, I, D> {
    rcu: R,
    sec: I,
    delay: D,
    cores: [CoreState; NUM_CORES],
    idle_addr: u32,
    idle_poll_limit: u32,
    reset_poll_limit: u32,
    settle_us: u32,
}

impl<R: ResetControl, I: InterruptRouter, D: Delay> CoreManager<R, I, D> {
    /// All cores start out considered stopped, with nothing loaded.
    pub fn new(cfg: &PlatformConfig, rcu: R, sec: I, delay: D) -> Self {
        CoreManager {
            rcu,
            sec,
            delay,
            cores: cfg.cores.map(|c| CoreState {
                run_state: RunState::Stopped,
                entry: None,
                wake_irq: c.wake_irq,
            }),
            idle_addr: cfg.idle_addr,
            idle_poll_limit: cfg.idle_poll_limit,
            reset_poll_limit: cfg.reset_poll_limit,
            settle_us: cfg.settle_us,
        }
    }

    pub fn run_state(&self, core: CoreId) -> RunState {
        self.cores[core.index()].run_state
    }

    pub fn entry_point(&self, core: CoreId) -> Option<u32> {
        self.cores[core.index()].entry
    }

    pub fn rcu(&self) -> &R {
        &self.rcu
    }

    pub fn sec(&self) -> &I {
        &self.sec
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Runs `write`, which puts an image into the core's memory, and records
    /// the entry point it reports. Refused while the core is running. Any
    /// previously recorded entry point is forgotten first, so a failed load
    /// leaves none.
    pub fn load<F>(&mut self, core: CoreId, write: F) -> Result<LoadReport, Error>
    where
        F: FnOnce() -> Result<LoadReport, Error>,
    {
        let state = &mut self.cores[core.index()];
        if state.run_state == RunState::Running {
            return Err(Error::CoreRunning(core));
        }
        state.entry = None;

        let report = write()?;
        state.entry = report.entry;
        Ok(report)
    }

    pub fn start(&mut self, core: CoreId) -> Result<(), Error> {
        let state = self.cores[core.index()];
        if state.run_state == RunState::Running {
            debug!("{core} already running");
            return Ok(());
        }

        let vector = match state.entry {
            Some(entry) => entry,
            None => {
                warn!(
                    "{core} has no image loaded; starting it at idle {:#010x}",
                    self.idle_addr
                );
                self.idle_addr
            }
        };
        debug!("{core}: reset vector {vector:#010x}");
        self.rcu.set_reset_vector(core, vector);
        self.reset(core);
        self.rcu.activate(core);

        self.cores[core.index()].run_state = RunState::Running;
        info!("{core} started");
        Ok(())
    }

    pub fn stop(&mut self, core: CoreId) -> Result<(), Error> {
        if self.cores[core.index()].run_state == RunState::Stopped {
            debug!("{core} already stopped");
            return Ok(());
        }

        self.rcu.set_reset_vector(core, self.idle_addr);
        let state = &mut self.cores[core.index()];
        state.entry = None;

        if self.rcu.is_in_reset(core) {
            debug!("{core} is held in reset");
            state.run_state = RunState::Stopped;
            return Ok(());
        }

        if !self.rcu.is_idle(core) {
            let irq = state.wake_irq;
            debug!("{core}: requesting stop via irq {irq}");
            self.rcu.request_stop(core);
            self.sec.route_to_core(irq, core);
            self.sec.enable_source(irq, IrqKind::Interrupt, true);
            self.sec.enable_core_interface(core);
            self.sec.raise(irq);
        }

        let rcu = &self.rcu;
        if !wait::until(&mut self.delay, self.idle_poll_limit, 1, || {
            rcu.is_idle(core)
        }) {
            error!("timeout waiting for {core} to idle");
        }

        self.rcu.clear_stop_request(core);
        self.rcu.deactivate(core);
        self.reset(core);

        self.cores[core.index()].run_state = RunState::Stopped;
        info!("{core} stopped");
        Ok(())
    }

    /// Pulses the core's reset with its system interface disabled, so that
    /// it has no bus transactions in flight while entering reset.
    fn reset(&mut self, core: CoreId) {
        self.rcu.clear_reset_status(core);
        self.rcu.disable_system_interface(core);
        self.delay.delay_us(self.settle_us);

        self.rcu.assert_reset(core);
        let rcu = &self.rcu;
        if !wait::until(&mut self.delay, self.reset_poll_limit, 1, || {
            rcu.reset_status(core)
        }) {
            error!("timeout waiting for {core} to enter reset");
        }

        self.rcu.enable_system_interface(core);
        self.delay.delay_us(self.settle_us);
        self.rcu.deassert_reset(core);
        self.delay.delay_us(self.settle_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CountingDelay, RcuEvent, ResetConfirm, SecEvent, SimRcu, SimSec};

    type Manager = CoreManager<SimRcu, SimSec, CountingDelay>;

    fn manager(rcu: SimRcu) -> Manager {
        let cfg = PlatformConfig {
            idle_poll_limit: 100,
            reset_poll_limit: 10,
            ..Default::default()
        };
        CoreManager::new(&cfg, rcu, SimSec::default(), CountingDelay::default())
    }

    fn loaded(m: &mut Manager, core: CoreId, entry: u32) {
        m.load(core, || {
            Ok(LoadReport {
                entry: Some(entry),
                ..Default::default()
            })
        })
        .unwrap();
    }

    #[test]
    fn start_uses_loaded_entry() {
        let mut m = manager(SimRcu::default());
        loaded(&mut m, CoreId::CORE1, 0x0030_0000);
        m.start(CoreId::CORE1).unwrap();

        assert_eq!(m.run_state(CoreId::CORE1), RunState::Running);
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Stopped);
        let c = CoreId::CORE1;
        assert_eq!(
            m.rcu().events(),
            [
                RcuEvent::SetResetVector(c, 0x0030_0000),
                RcuEvent::ClearResetStatus(c),
                RcuEvent::DisableSystemInterface(c),
                RcuEvent::AssertReset(c),
                RcuEvent::EnableSystemInterface(c),
                RcuEvent::DeassertReset(c),
                RcuEvent::Activate(c),
            ]
        );
        assert!(m.sec().events().is_empty());
        assert!(m.delay().total_us() >= 150);

        // Already running
        let before = m.rcu().events().len();
        m.start(CoreId::CORE1).unwrap();
        assert_eq!(m.rcu().events().len(), before);
    }

    #[test]
    fn start_without_load_idles() {
        let mut m = manager(SimRcu::default());
        m.start(CoreId::CORE0).unwrap();
        assert_eq!(
            m.rcu().events()[0],
            RcuEvent::SetResetVector(CoreId::CORE0, sharc_abi::IDLE_ADDR)
        );
    }

    #[test]
    fn load_is_refused_while_running() {
        let mut m = manager(SimRcu::default());
        m.start(CoreId::CORE0).unwrap();
        let mut called = false;
        let err = m
            .load(CoreId::CORE0, || {
                called = true;
                Ok(LoadReport::default())
            })
            .unwrap_err();
        assert!(!called);
        assert_eq!(err.result_code(), crate::ResultCode::BadState);

        // The other core is unaffected.
        loaded(&mut m, CoreId::CORE1, 0x10);
        assert_eq!(m.entry_point(CoreId::CORE1), Some(0x10));
    }

    #[test]
    fn failed_load_forgets_entry() {
        let mut m = manager(SimRcu::default());
        loaded(&mut m, CoreId::CORE0, 0x10);
        assert!(m
            .load(CoreId::CORE0, || Err(Error::MissingFinalBlock))
            .is_err());
        assert_eq!(m.entry_point(CoreId::CORE0), None);
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Stopped);
    }

    #[test]
    fn stop_interrupts_busy_core() {
        let mut m = manager(SimRcu::idles_after(3));
        loaded(&mut m, CoreId::CORE1, 0x40);
        m.start(CoreId::CORE1).unwrap();
        m.rcu_events_clear();

        m.stop(CoreId::CORE1).unwrap();
        let c = CoreId::CORE1;
        assert_eq!(m.run_state(c), RunState::Stopped);
        assert_eq!(m.entry_point(c), None);
        assert_eq!(
            m.sec().events(),
            [
                SecEvent::Route(107, c),
                SecEvent::Enable(107, IrqKind::Interrupt, true),
                SecEvent::EnableCore(c),
                SecEvent::Raise(107),
            ]
        );
        assert_eq!(
            m.rcu().events(),
            [
                RcuEvent::SetResetVector(c, sharc_abi::IDLE_ADDR),
                RcuEvent::RequestStop(c),
                RcuEvent::ClearStopRequest(c),
                RcuEvent::Deactivate(c),
                RcuEvent::ClearResetStatus(c),
                RcuEvent::DisableSystemInterface(c),
                RcuEvent::AssertReset(c),
                RcuEvent::EnableSystemInterface(c),
                RcuEvent::DeassertReset(c),
            ]
        );
    }

    #[test]
    fn stop_of_idle_core_sends_no_interrupt() {
        let mut m = manager(SimRcu::default());
        m.start(CoreId::CORE0).unwrap();
        m.rcu_events_clear();
        m.rcu_mut().set_idle(CoreId::CORE0, true);

        m.stop(CoreId::CORE0).unwrap();
        assert!(m.sec().events().is_empty());
        assert!(!m.rcu().events().contains(&RcuEvent::RequestStop(CoreId::CORE0)));
        assert!(m.rcu().events().contains(&RcuEvent::Deactivate(CoreId::CORE0)));
    }

    #[test]
    fn stop_timeout_still_resets() {
        let mut m = manager(SimRcu::never_idles());
        m.start(CoreId::CORE0).unwrap();
        let waited = m.delay().total_us();

        m.stop(CoreId::CORE0).unwrap();
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Stopped);
        assert!(m.delay().total_us() - waited >= 100);
        let events = m.rcu().events();
        assert_eq!(events.last(), Some(&RcuEvent::DeassertReset(CoreId::CORE0)));
        assert!(events.contains(&RcuEvent::ClearStopRequest(CoreId::CORE0)));
    }

    #[test]
    fn slow_reset_confirmation_is_waited_for() {
        let mut m = manager(SimRcu::default().with_reset_confirm(ResetConfirm::AfterPolls(3)));
        m.start(CoreId::CORE0).unwrap();
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Running);
        assert_eq!(m.delay().total_us(), 3 * 50 + 3);
    }

    #[test]
    fn start_without_reset_confirmation_carries_on() {
        let mut m = manager(SimRcu::default().with_reset_confirm(ResetConfirm::Never));
        m.start(CoreId::CORE1).unwrap();

        let c = CoreId::CORE1;
        assert_eq!(m.run_state(c), RunState::Running);
        // The whole reset poll budget is spent between assert and release.
        assert_eq!(m.delay().total_us(), 3 * 50 + 10);
        assert_eq!(
            &m.rcu().events()[3..],
            [
                RcuEvent::AssertReset(c),
                RcuEvent::EnableSystemInterface(c),
                RcuEvent::DeassertReset(c),
                RcuEvent::Activate(c),
            ]
        );
        assert!(m.rcu().is_active(c));
    }

    #[test]
    fn stop_without_reset_confirmation_carries_on() {
        let mut m = manager(SimRcu::never_idles().with_reset_confirm(ResetConfirm::Never));
        m.start(CoreId::CORE0).unwrap();
        m.rcu_events_clear();
        let waited = m.delay().total_us();

        m.stop(CoreId::CORE0).unwrap();
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Stopped);
        // Idle budget, then settle times plus the reset poll budget.
        assert_eq!(m.delay().total_us() - waited, 100 + 3 * 50 + 10);
        assert_eq!(
            m.rcu().events().last(),
            Some(&RcuEvent::DeassertReset(CoreId::CORE0))
        );
        assert!(!m.rcu().is_active(CoreId::CORE0));
    }

    #[test]
    fn stop_of_core_in_reset() {
        let mut m = manager(SimRcu::default());
        m.start(CoreId::CORE0).unwrap();
        m.rcu_events_clear();
        m.rcu_mut().hold_in_reset(CoreId::CORE0);

        m.stop(CoreId::CORE0).unwrap();
        assert_eq!(m.run_state(CoreId::CORE0), RunState::Stopped);
        assert_eq!(
            m.rcu().events(),
            [RcuEvent::SetResetVector(CoreId::CORE0, sharc_abi::IDLE_ADDR)]
        );
        assert!(m.sec().events().is_empty());
    }

    #[test]
    fn second_stop_touches_nothing() {
        let mut m = manager(SimRcu::idles_after(1));
        m.start(CoreId::CORE0).unwrap();
        m.stop(CoreId::CORE0).unwrap();
        let rcu = m.rcu().events().len();
        let sec = m.sec().events().len();

        m.stop(CoreId::CORE0).unwrap();
        assert_eq!(m.rcu().events().len(), rcu);
        assert_eq!(m.sec().events().len(), sec);
    }

    #[test]
    fn restart_after_stop_goes_to_idle() {
        let mut m = manager(SimRcu::idles_after(1));
        loaded(&mut m, CoreId::CORE0, 0x1234);
        m.start(CoreId::CORE0).unwrap();
        m.stop(CoreId::CORE0).unwrap();
        m.rcu_events_clear();

        m.start(CoreId::CORE0).unwrap();
        assert_eq!(
            m.rcu().events()[0],
            RcuEvent::SetResetVector(CoreId::CORE0, sharc_abi::IDLE_ADDR)
        );
    }

    impl Manager {
        fn rcu_mut(&mut self) -> &mut SimRcu {
            &mut self.rcu
        }

        fn rcu_events_clear(&mut self) {
            self.rcu.clear_events()
        }
    }
}
