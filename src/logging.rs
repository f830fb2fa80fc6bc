// ODM Core - OverDrive audiobook download client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Tracing setup for binaries
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary. `RUST_LOG` wins over the verbosity flag.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity flag
pub fn default_directive(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install a stderr fmt subscriber
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive(verbose).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
