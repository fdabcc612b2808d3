// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use flint_common::layout::{Platform, DEFAULT_PLATFORM_ID};
use flint_common::validator::ValidationOptions;

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "flint-tool")]
#[command(about = "Inspect, validate and apply firmware modules")]
pub struct Cli {
    /// Platform ID reported by the simulated device
    #[arg(long, default_value_t = DEFAULT_PLATFORM_ID)]
    pub platform_id: u16,

    /// Log engine activity at debug level
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Simulated device contents shared by `validate` and `apply`.
#[derive(Args)]
pub struct DeviceArgs {
    /// Module image to pre-install in its slot (repeatable)
    #[arg(long = "install", value_name = "FILE")]
    pub installs: Vec<PathBuf>,

    /// Treat dependencies that are not installed as satisfied
    #[arg(long)]
    pub deps_optional: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print media regions, protected ranges and module slots
    Layout,

    /// Decode a module image and check its stored CRC
    Inspect {
        /// Module image file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Stage an image on the simulated device and run every check
    Validate {
        /// Module image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,

        /// Also check that installed modules still accept this one
        #[arg(long)]
        full_deps: bool,
    },

    /// Run a complete update session and install the image
    Apply {
        /// Module image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,

        /// Write the destination slot contents here after applying
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let platform = Platform {
        platform_id: cli.platform_id,
        ..Platform::DEFAULT
    };

    match cli.command {
        Commands::Layout => commands::layout(&platform),
        Commands::Inspect { file } => commands::inspect(&file),
        Commands::Validate {
            file,
            device,
            full_deps,
        } => {
            let options = ValidationOptions {
                integrity: true,
                dependencies_optional: device.deps_optional,
                full_dependencies: full_deps,
            };
            commands::validate(&platform, &file, &device.installs, options)
        }
        Commands::Apply {
            file,
            device,
            output,
        } => commands::apply(
            &platform,
            &file,
            &device.installs,
            device.deps_optional,
            output.as_deref(),
        ),
    }
}
