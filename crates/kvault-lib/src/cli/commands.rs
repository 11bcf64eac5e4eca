use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kvault - incremental file backup into a single embedded store
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Config file (default: <config dir>/kvault/config.toml, if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Collection inside the store (default: "files")
    #[arg(long, value_name = "NAME")]
    pub collection: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Back up every file selected by a manifest
    ///
    /// Each manifest line is a glob relative to the manifest's directory.
    /// Lines starting with '!' remove earlier matches. Files whose stored
    /// snapshot is recent enough are skipped.
    Backup {
        /// Manifest file (default: ~/.backup)
        #[arg(long, short = 'f', value_name = "MANIFEST")]
        manifest: Option<PathBuf>,

        /// Store file
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        /// Maximum number of files processed at once (default: 20)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Compression level, 0 (store) to 9 (default: 9)
        #[arg(long, value_name = "LEVEL")]
        compress: Option<u32>,

        /// Skip files modified less than this many seconds after their stored snapshot (default: 1)
        #[arg(long, value_name = "SECS")]
        max_age: Option<u64>,
    },

    /// Restore every stored file under an output directory
    Restore {
        /// Output directory; stored paths are recreated beneath it
        #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Store file
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        /// Maximum number of files written at once (default: 20)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Decompress and write in separately bounded stages joined by bounded queues
        #[arg(long)]
        streaming: bool,

        /// Maximum number of entries decompressed at once with --streaming (default: 4)
        #[arg(long, value_name = "N")]
        decoders: Option<usize>,

        /// Entries buffered between streaming stages (default: 64)
        #[arg(long, value_name = "N")]
        queue_capacity: Option<usize>,
    },

    /// List stored files
    Ls {
        /// Store file
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        /// Show size and modification time
        #[arg(long, short)]
        long: bool,
    },
}
