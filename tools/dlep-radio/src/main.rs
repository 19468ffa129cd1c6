// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DLEP radio-side agent.
//!
//! Loads the radio configuration, runs the event loop, and exports
//! per-neighbor link metrics to the attached router. First Ctrl-C tears
//! the peer session down gracefully; a second one stops the loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use dlep::admin::AdminCommand;
use dlep::config::DlepConfig;
use dlep::engine::Runtime;
use dlep::logging::init_console_logger;

#[derive(Parser)]
#[command(name = "dlep-radio", version, about = "DLEP radio-side agent")]
struct Args {
    /// Radio configuration file.
    #[arg(short, long, default_value = "dlep-radio.conf")]
    config: PathBuf,

    /// Override the DEBUG_FLAGS word (hex, e.g. 0x1ff).
    #[arg(long)]
    debug_flags: Option<String>,

    /// Log level: error, warn, info, debug.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        _ => log::LevelFilter::Info,
    };
    init_console_logger(level);

    let mut cfg = match DlepConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("dlep-radio: {err}");
            std::process::exit(1);
        }
    };

    if let Some(flags) = args.debug_flags.as_deref() {
        let hex = flags.trim_start_matches("0x").trim_start_matches("0X");
        match u32::from_str_radix(hex, 16) {
            Ok(mask) => cfg.debug_flags = mask,
            Err(_) => eprintln!("dlep-radio: ignoring bad --debug-flags '{flags}'"),
        }
    }

    log::info!("dlep-radio {} starting", dlep::VERSION);
    log::info!("{cfg}");

    let (runtime, handle) = match Runtime::new(cfg) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("dlep-radio: {err}");
            std::process::exit(1);
        }
    };

    let interrupts = Arc::new(AtomicUsize::new(0));
    {
        let handle = handle.clone();
        let interrupts = Arc::clone(&interrupts);
        let result = ctrlc::set_handler(move || {
            match interrupts.fetch_add(1, Ordering::SeqCst) {
                0 => {
                    log::info!("interrupt: terminating the peer session");
                    handle.send(AdminCommand::Stop);
                }
                _ => {
                    log::info!("interrupt: stopping the loop");
                    handle.shutdown();
                }
            }
        });
        if let Err(err) = result {
            log::warn!("no interrupt handler: {err}");
        }
    }

    // Give a graceful Stop a moment to finish before a lone Ctrl-C exits.
    {
        let handle = handle.clone();
        let interrupts = Arc::clone(&interrupts);
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_millis(500));
            if interrupts.load(Ordering::SeqCst) > 0 {
                std::thread::sleep(Duration::from_secs(2));
                handle.shutdown();
                break;
            }
        });
    }

    if let Err(err) = runtime.run() {
        eprintln!("dlep-radio: {err}");
        std::process::exit(1);
    }
}
