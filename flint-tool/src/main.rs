// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for firmware module images.
//!
//! Runs the update engine against a simulated device (RAM-backed internal and
//! serial flash) so images can be checked before they reach hardware.
//!
//! Usage:
//!   flint-tool layout
//!   flint-tool inspect system-part1.bin
//!   flint-tool validate system-part2.bin --install system-part1.bin
//!   flint-tool apply user-part.bin --output user-slot.bin

mod cli;
mod commands;
mod sim;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    cli::run(args)
}
