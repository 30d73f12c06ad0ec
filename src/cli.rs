//! Command-line interface definition using clap

use crate::config::Config;
use crate::transport::TransportKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Robot controller client: telemetry monitor and firmware updater
#[derive(Parser, Debug)]
#[command(name = "robolink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: robolink.toml next to the executable)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print events and add-on statuses until Ctrl-C
    Monitor {
        #[command(flatten)]
        target: TargetArgs,

        /// Ask the device to flash its identity colours before connecting
        #[arg(long)]
        verify: bool,
    },

    /// Check whether a firmware update is available
    OtaCheck {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check, download and install a firmware update
    OtaUpdate {
        #[command(flatten)]
        target: TargetArgs,

        /// Install without asking for confirmation
        #[arg(long)]
        yes: bool,
    },
}

/// Connection overrides shared by every subcommand
#[derive(Args, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Transport to use (network or wireless)
    #[arg(long, value_name = "KIND")]
    pub transport: Option<TransportKind>,

    /// Device address (IP address or ws:// URL for network)
    #[arg(long, value_name = "ADDR")]
    pub target: Option<String>,
}

impl TargetArgs {
    /// Apply the overrides on top of the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(kind) = self.transport {
            config.connection.transport = kind;
        }
        if let Some(target) = &self.target {
            config.connection.target = target.clone();
        }
    }
}

impl Command {
    pub fn target(&self) -> &TargetArgs {
        match self {
            Self::Monitor { target, .. }
            | Self::OtaCheck { target }
            | Self::OtaUpdate { target, .. } => target,
        }
    }
}
