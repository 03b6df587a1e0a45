use clap::{Parser, Subcommand};
use clap_complete::Shell;

use keeper_core::VERSION;

/// keeperd - envelope-encryption engine and key rotation for a secrets store
#[derive(Parser)]
#[command(name = "keeperd")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "KEEPER_CONFIG")]
    pub config: Option<String>,

    /// Path to the SQLite store
    #[arg(short, long, global = true, env = "KEEPER_STORE")]
    pub store: Option<String>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new master key
    Keygen {
        /// Write the key to this file instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<String>,

        /// Encrypt the keyfile with an age passphrase
        #[arg(long, requires = "out")]
        encrypt: bool,
    },

    /// Bootstrap the key ledger, rotating if the active version is due
    Rotate {
        /// Rotate even if the active version is still current
        #[arg(long)]
        force: bool,
    },

    /// Show key versions and rotation status
    Status,

    /// Keep running and rotate whenever the active version becomes stale
    Watch {
        /// Stop after this many checks
        #[arg(long, value_name = "N")]
        max_checks: Option<u64>,
    },

    /// Store a new secret
    Put {
        /// Owning user ID
        #[arg(short, long, env = "KEEPER_OWNER")]
        owner: i64,

        /// Secret name
        #[arg(value_name = "NAME")]
        name: String,

        /// Secret kind (login, text, binary, card)
        #[arg(short, long, default_value = "text")]
        kind: String,

        /// Secret value (read from stdin if omitted)
        #[arg(long, conflicts_with = "file")]
        value: Option<String>,

        /// Read the secret value from a file
        #[arg(long, value_name = "PATH")]
        file: Option<String>,
    },

    /// Print a secret's value
    Get {
        /// Owning user ID
        #[arg(short, long, env = "KEEPER_OWNER")]
        owner: i64,

        /// Secret name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// List an owner's secret names
    List {
        /// Owning user ID
        #[arg(short, long, env = "KEEPER_OWNER")]
        owner: i64,
    },

    /// Delete a secret
    Delete {
        /// Owning user ID
        #[arg(short, long, env = "KEEPER_OWNER")]
        owner: i64,

        /// Secret name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}
