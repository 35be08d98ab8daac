//! Tests for the add and run subcommands.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_add() {
    match parse(&["mdm", "add", "https://example.com/watch?v=1"]) {
        CliCommand::Add { url } => assert_eq!(url, "https://example.com/watch?v=1"),
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_run_defaults() {
    match parse(&["mdm", "run"]) {
        CliCommand::Run { jobs, download_dir } => {
            assert!(jobs.is_none());
            assert!(download_dir.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_jobs() {
    match parse(&["mdm", "run", "--jobs", "4"]) {
        CliCommand::Run { jobs, .. } => assert_eq!(jobs, Some(4)),
        _ => panic!("expected Run with --jobs 4"),
    }
}

#[test]
fn cli_parse_run_download_dir() {
    match parse(&["mdm", "run", "--download-dir", "/media/videos"]) {
        CliCommand::Run { download_dir, .. } => {
            assert_eq!(
                download_dir.as_deref(),
                Some(std::path::Path::new("/media/videos"))
            );
        }
        _ => panic!("expected Run with --download-dir"),
    }
}
