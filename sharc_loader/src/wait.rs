// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::{Duration, Instant};

pub trait Delay {
    fn delay_us(&mut self, us: u32);
}

/// Busy-waits on the monotonic clock.
#[derive(Debug, Default)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    fn delay_us(&mut self, us: u32) {
        let deadline = Instant::now() + Duration::from_micros(u64::from(us));
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// Polls `done` up to `limit` times, `interval_us` apart. Returns whether
/// it came true.
pub fn until<D, F>(delay: &mut D, limit: u32, interval_us: u32, mut done: F) -> bool
where
    D: Delay + ?Sized,
    F: FnMut() -> bool,
{
    for _ in 0..limit {
        if done() {
            return true;
        }
        delay.delay_us(interval_us);
    }
    done()
}
