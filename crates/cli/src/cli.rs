use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nw_client::{ConnectOptions, SubscribeOptions};
use serde::{Deserialize, Serialize};

/// nw: publish and subscribe over a NATS WebSocket listener.
#[derive(Debug, Parser)]
#[command(name = "nw", version, about)]
pub struct Cli {
    /// TOML file with `[connection]` and `[subscribe]` tables.
    #[arg(long, global = true, env = "NW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server URL (overrides the config file).
    #[arg(long, global = true, env = "NATS_URL")]
    pub url: Option<String>,

    /// Client name reported to the server.
    #[arg(long, global = true)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish one message, wait for the server to acknowledge it, and exit.
    Pub {
        subject: String,
        /// Message body (empty if omitted).
        #[arg(default_value = "")]
        data: String,
    },
    /// Print messages on a subject until Ctrl-C or `--count` messages.
    Sub {
        subject: String,
        /// Queue group to join.
        #[arg(long)]
        queue: Option<String>,
        /// Exit after this many messages.
        #[arg(long)]
        count: Option<u64>,
    },
}

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default)]
    pub connection: ConnectOptions,
    #[serde(default)]
    pub subscribe: SubscribeOptions,
}

impl CliConfig {
    /// Read the config file if one was given; defaults otherwise.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
    }
}

impl Cli {
    /// Connection options: config file first, then command-line flags on top.
    pub fn connect_options(&self, config: &CliConfig) -> ConnectOptions {
        let mut opts = config.connection.clone();
        if let Some(url) = &self.url {
            opts = opts.url(url.clone());
        }
        if let Some(name) = &self.name {
            opts = opts.name(name.clone());
        }
        opts
    }
}
