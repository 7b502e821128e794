//! Command-line interface definitions using clap
//!
//! 不带子命令时默认启动 HTTP 服务。

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Deeplinker - deferred deep-link attribution service
#[derive(Parser)]
#[command(name = "deeplinker")]
#[command(version)]
#[command(about = "Deferred deep-link resolution and install attribution", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Manage links
    Link {
        #[command(subcommand)]
        action: LinkCommands,
    },

    /// Run one attribution sweep batch and print the report
    Sweep,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Register or replace a link
    ///
    /// Usage: link add [CODE] --web <URL> --ios-store <URL> ...
    /// - If CODE is omitted, a random code is generated
    Add(LinkAddArgs),

    /// Show a registered link
    Show {
        /// Link code
        code: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct LinkAddArgs {
    /// Link code (random when omitted)
    pub code: Option<String>,

    /// Web destination (desktop and web fallback)
    #[arg(long = "web")]
    pub web_url: Option<String>,

    /// App Store URL
    #[arg(long = "ios-store")]
    pub ios_store_url: Option<String>,

    /// Play Store URL
    #[arg(long = "android-store")]
    pub android_store_url: Option<String>,

    /// iOS app scheme or universal-link base
    #[arg(long = "ios-app")]
    pub ios_app_url: Option<String>,

    /// Android app scheme or app-link base
    #[arg(long = "android-app")]
    pub android_app_url: Option<String>,

    /// In-app path delivered after install
    #[arg(long)]
    pub deep_path: Option<String>,

    #[arg(long)]
    pub campaign: Option<String>,

    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate a sample configuration file
    Generate {
        /// Output file path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },
}
