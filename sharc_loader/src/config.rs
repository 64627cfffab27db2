// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{CoreId, Error};
use serde::Deserialize;
use sharc_abi::NUM_CORES;
use sharc_areas::{
    L2_BASE, L2_SIZE, SHARC0_IRQ, SHARC0_L1_BASE, SHARC0_L1_SIZE, SHARC1_IRQ, SHARC1_L1_BASE,
    SHARC1_L1_SIZE,
};

/// A range of device addresses, `base..base + size`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WindowConfig {
    pub base: u32,
    pub size: u32,
}

impl WindowConfig {
    pub const fn new(base: u32, size: u32) -> WindowConfig {
        WindowConfig { base, size }
    }

    /// One past the last address, widened so that windows ending at 4 GiB
    /// can be described.
    pub fn end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }

    fn overlaps(&self, other: &WindowConfig) -> bool {
        u64::from(self.base) < other.end() && u64::from(other.base) < self.end()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoreConfig {
    /// The core's private L1 window
    pub local: WindowConfig,
    /// Soft interrupt used to ask the core to idle itself
    pub wake_irq: u32,
}

/// Everything about the SoC that the loader needs to know. The defaults
/// describe an ADSP-SC598.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlatformConfig {
    pub cores: [CoreConfig; NUM_CORES],
    /// L2, reachable by every core
    pub shared: WindowConfig,
    pub idle_addr: u32,
    /// Number of 1us polls to wait for a core to idle itself when stopping
    pub idle_poll_limit: u32,
    /// Number of 1us polls to wait for reset status after asserting reset
    pub reset_poll_limit: u32,
    pub settle_us: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            cores: [
                CoreConfig {
                    local: WindowConfig::new(SHARC0_L1_BASE, SHARC0_L1_SIZE),
                    wake_irq: SHARC0_IRQ,
                },
                CoreConfig {
                    local: WindowConfig::new(SHARC1_L1_BASE, SHARC1_L1_SIZE),
                    wake_irq: SHARC1_IRQ,
                },
            ],
            shared: WindowConfig::new(L2_BASE, L2_SIZE),
            idle_addr: sharc_abi::IDLE_ADDR,
            idle_poll_limit: 10_000_000,
            reset_poll_limit: 1_000_000,
            settle_us: 50,
        }
    }
}

impl PlatformConfig {
    pub fn from_toml(s: &str) -> Result<PlatformConfig, Error> {
        let cfg: PlatformConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn core(&self, core: CoreId) -> &CoreConfig {
        &self.cores[core.index()]
    }

    /// Every window must be non-empty, fit below 4 GiB, and be disjoint from
    /// every other window.
    pub fn validate(&self) -> Result<(), Error> {
        let windows: Vec<WindowConfig> = self
            .cores
            .iter()
            .map(|c| c.local)
            .chain(std::iter::once(self.shared))
            .collect();

        for (i, w) in windows.iter().enumerate() {
            let bad = Error::BadWindow {
                base: w.base,
                size: w.size,
            };
            if w.size == 0 || w.end() > 1 << 32 {
                return Err(bad);
            }
            if windows[..i].iter().any(|other| other.overlaps(w)) {
                return Err(bad);
            }
        }
        Ok(())
    }
}
