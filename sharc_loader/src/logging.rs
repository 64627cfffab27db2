// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write as _;

/// Initializes a logger that pretty-prints the loader's logging. Only the
/// first call has any effect.
pub fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format(|buf, record| {
            let mut level_style = buf.style();

            level_style.set_color(match record.level() {
                log::Level::Info => env_logger::fmt::Color::Cyan,
                log::Level::Trace => env_logger::fmt::Color::Blue,
                log::Level::Warn => env_logger::fmt::Color::Yellow,
                log::Level::Error => env_logger::fmt::Color::Red,
                log::Level::Debug => env_logger::fmt::Color::Green,
            });

            writeln!(
                buf,
                "{: <5} | {: <24} | {}",
                level_style.value(record.level()),
                record.module_path().unwrap_or_default(),
                record.args().to_string().replace('\n', "\n      | ")
            )
        })
        .filter(
            Some("sharc_loader"),
            if verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Info
            },
        );
    // Someone else got there first, which is fine.
    let _ = builder.try_init();
}
