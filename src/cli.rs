use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replace learned vocabulary in an HTML page
    Run {
        /// Input HTML file
        #[arg(short, long)]
        input: PathBuf,

        /// Output HTML file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Download the vocabulary before replacing
        #[arg(long)]
        refresh: bool,
    },

    /// Page-load hook: replace vocabulary only when auto-run is enabled
    Open {
        /// Input HTML file
        #[arg(short, long)]
        input: PathBuf,

        /// Output HTML file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download the vocabulary list now
    Refresh,

    /// Set the WaniKani API key
    SetApiKey {
        /// Key to store; prompts when omitted
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Turn automatic replacement on page load on or off
    AutoRun {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Show the stored state
    Status,

    /// Look a word or phrase up in the stored vocabulary
    Lookup {
        /// Word or phrase
        phrase: String,
    },

    /// Delete the stored vocabulary
    Clear,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Destination (default: wanikanify.toml)
        #[arg(short, long, default_value = "wanikanify.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
