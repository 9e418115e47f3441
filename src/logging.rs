// SPDX-License-Identifier: GPL-3.0-only

//! Logging setup for hosts embedding the render core

/// Install a `tracing` subscriber for the process.
///
/// The `RUST_LOG` environment variable takes precedence; otherwise
/// `default_directive` is used (e.g. `"warn"` or `"yanbao_camera=debug"`).
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .try_init();
}
