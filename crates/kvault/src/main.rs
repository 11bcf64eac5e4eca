mod output;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use kvault_lib::cli::{Cli, Commands};
use kvault_lib::pool::fd_headroom;
use kvault_lib::{
    backup_paths, list_entries, restore_all, select, Config, RestoreOptions, RunReport, SetupError,
    Store,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use output::ConsoleObserver;

/// Exit status when every file succeeded.
const SUCCESS: u8 = 0;
/// Exit status when the run completed but at least one file failed.
const PARTIAL_FAILURE: u8 = 2;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logger with specified or default log level
    let env = match cli.log_level {
        Some(ref log_level) => Env::default().filter_or("RUST_LOG", log_level),
        None => Env::default().filter_or("RUST_LOG", "warn"),
    };
    env_logger::init_from_env(env);

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default().with_context(|| "Failed to load default config")?,
    };
    if let Some(collection) = cli.collection {
        config.store.collection = collection;
    }

    let report = match cli.command {
        Commands::Backup {
            manifest,
            db,
            workers,
            compress,
            max_age,
        } => {
            apply_db(&mut config, db);
            if let Some(manifest) = manifest {
                config.backup.manifest = manifest;
            }
            if let Some(workers) = workers {
                config.backup.workers = workers;
            }
            if let Some(level) = compress {
                config.backup.compression = level;
            }
            if let Some(max_age) = max_age {
                config.backup.max_age = max_age;
            }
            cmd_backup(&config)?
        }
        Commands::Restore {
            output,
            db,
            workers,
            streaming,
            decoders,
            queue_capacity,
        } => {
            apply_db(&mut config, db);
            if let Some(workers) = workers {
                config.restore.workers = workers;
            }
            if streaming {
                config.restore.streaming = true;
            }
            if let Some(decoders) = decoders {
                config.restore.decoders = decoders;
            }
            if let Some(capacity) = queue_capacity {
                config.restore.queue_capacity = capacity;
            }
            cmd_restore(&config, &output)?
        }
        Commands::Ls { db, long } => {
            apply_db(&mut config, db);
            cmd_ls(&config, long)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    if !report.is_success() {
        output::print_failures(&report);
    }
    Ok(ExitCode::from(exit_status(&report)))
}

/// Exit status for a run that finished. Fatal errors exit with 1 through `main`'s `Err`.
fn exit_status(report: &RunReport) -> u8 {
    if report.is_success() {
        SUCCESS
    } else {
        PARTIAL_FAILURE
    }
}

fn apply_db(config: &mut Config, db: Option<PathBuf>) {
    if db.is_some() {
        config.store.path = db;
    }
}

/// Store path from flags or config; restore and ls also require it to exist.
fn store_path(config: &Config, must_exist: bool) -> Result<PathBuf, SetupError> {
    let path = config.store_path().ok_or(SetupError::MissingStorePath)?;
    if must_exist && !path.is_file() {
        return Err(SetupError::StoreNotFound(path));
    }
    Ok(path)
}

/// Files a restore can hold open at once: one per writer, plus one per
/// decoder when streaming.
fn restore_open_files(options: &RestoreOptions) -> usize {
    if options.streaming {
        options.workers + options.decoders
    } else {
        options.workers
    }
}

fn raise_fd_limit(open_files: usize) {
    match fd_headroom(open_files) {
        Some(limit) => debug!("open-file limit: {}", limit),
        None => warn!("open-file limit unknown; large worker counts may run out of descriptors"),
    }
}

fn open_existing(config: &Config) -> Result<Store> {
    let db = store_path(config, true)?;
    Store::open_existing(&db, &config.store.collection)
        .with_context(|| format!("Failed to open store {}", db.display()))
}

fn cmd_backup(config: &Config) -> Result<RunReport> {
    let options = config.backup_options()?;
    let manifest = config.manifest_path();
    if !manifest.is_file() {
        return Err(SetupError::ManifestNotFound(manifest).into());
    }
    let db = store_path(config, false)?;
    raise_fd_limit(options.workers);

    let store = Store::open(&db, &config.store.collection)
        .with_context(|| format!("Failed to open store {}", db.display()))?;
    store
        .ensure_collection()
        .with_context(|| format!("Failed to create collection '{}'", store.collection()))?;

    let paths = select(&manifest)
        .with_context(|| format!("Failed to resolve manifest {}", manifest.display()))?;
    info!(
        "{} file(s) selected from {}",
        paths.len(),
        manifest.display()
    );

    let report = backup_paths(&store, &paths, &options, &ConsoleObserver)?;
    output::print_backup_summary(&report);
    Ok(report)
}

fn cmd_restore(config: &Config, output_dir: &Path) -> Result<RunReport> {
    let options = config.restore_options()?;
    let store = open_existing(config)?;
    raise_fd_limit(restore_open_files(&options));

    let report = restore_all(&store, output_dir, &options, &ConsoleObserver)?;
    output::print_restore_summary(&report);
    Ok(report)
}

fn cmd_ls(config: &Config, long: bool) -> Result<()> {
    let store = open_existing(config)?;
    let entries = list_entries(&store)
        .with_context(|| format!("Failed to list collection '{}'", store.collection()))?;

    for entry in &entries {
        println!("{}", output::format_entry(entry, long));
    }
    Ok(())
}
