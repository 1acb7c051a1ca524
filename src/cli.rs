use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Silica - server-side forms with transactional array fields
#[derive(Parser, Debug, Clone)]
#[command(name = "silica", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SILICA_CONFIG", default_value = "silica.toml")]
    pub config: PathBuf,

    /// Database URL, overrides `persistence.url`
    #[arg(long, env = "SILICA_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the data schema and UI schema of a form
    Schema {
        /// Form name
        form: String,
    },
    /// Submit posted data to a form and reconcile its array fields
    Submit {
        /// Form name
        form: String,
        /// File with the posted data, `-` for stdin
        #[arg(short, long, default_value = "-")]
        data: PathBuf,
        /// Identifier of the record the form edits
        #[arg(short, long)]
        instance: Option<String>,
        /// Read the data as `application/x-www-form-urlencoded` instead of JSON
        #[arg(long)]
        urlencoded: bool,
    },
    /// List the records of a collection
    Records {
        /// Collection name
        collection: String,
    },
    /// Apply pending database migrations
    Migrate,
}
