use std::path::PathBuf;

use clap::Parser;
use kvault_lib::cli::{Cli, Commands};

#[test]
fn test_backup_defaults() {
    let cli = Cli::parse_from(["kvault", "backup"]);
    assert_eq!(cli.log_level, None);
    assert_eq!(cli.collection, None);
    assert_eq!(
        cli.command,
        Commands::Backup {
            manifest: None,
            db: None,
            workers: None,
            compress: None,
            max_age: None,
        }
    );
}

#[test]
fn test_backup_flags() {
    let cli = Cli::parse_from([
        "kvault",
        "--collection",
        "laptop",
        "--log-level",
        "debug",
        "backup",
        "-f",
        "/etc/kvault.list",
        "--db",
        "/var/backups/files.redb",
        "--workers",
        "4",
        "--compress",
        "0",
        "--max-age",
        "60",
    ]);
    assert_eq!(cli.collection.as_deref(), Some("laptop"));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    assert_eq!(
        cli.command,
        Commands::Backup {
            manifest: Some(PathBuf::from("/etc/kvault.list")),
            db: Some(PathBuf::from("/var/backups/files.redb")),
            workers: Some(4),
            compress: Some(0),
            max_age: Some(60),
        }
    );
}

#[test]
fn test_restore_defaults_to_current_dir() {
    let cli = Cli::parse_from(["kvault", "restore", "--db", "files.redb"]);
    assert_eq!(
        cli.command,
        Commands::Restore {
            output: PathBuf::from("."),
            db: Some(PathBuf::from("files.redb")),
            workers: None,
            streaming: false,
            decoders: None,
            queue_capacity: None,
        }
    );
}

#[test]
fn test_restore_streaming() {
    let cli = Cli::parse_from([
        "kvault",
        "restore",
        "-o",
        "/tmp/out",
        "--streaming",
        "--decoders",
        "2",
        "--queue-capacity",
        "8",
    ]);
    match cli.command {
        Commands::Restore {
            output,
            streaming,
            decoders,
            queue_capacity,
            ..
        } => {
            assert_eq!(output, PathBuf::from("/tmp/out"));
            assert!(streaming);
            assert_eq!(decoders, Some(2));
            assert_eq!(queue_capacity, Some(8));
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_ls_long() {
    let cli = Cli::parse_from(["kvault", "--config", "kv.toml", "ls", "--long"]);
    assert_eq!(cli.config, Some(PathBuf::from("kv.toml")));
    assert_eq!(
        cli.command,
        Commands::Ls {
            db: None,
            long: true,
        }
    );
}

#[test]
fn test_rejects_non_numeric_workers() {
    assert!(Cli::try_parse_from(["kvault", "backup", "--workers", "many"]).is_err());
}

#[test]
fn test_command_is_required() {
    assert!(Cli::try_parse_from(["kvault"]).is_err());
}
