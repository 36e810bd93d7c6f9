//! Command-line arguments of the `asset-relinker` binary.

use crate::services::ReportFormat;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Find and relink missing external files of a scene manifest.
#[derive(Debug, Parser)]
#[command(name = "asset-relinker", version, about = "Find and relink missing asset files")]
pub struct Cli {
    /// Directory holding `Relink Settings.yaml`.
    #[arg(long, global = true, default_value = "Relink Data")]
    pub config_dir: Utf8PathBuf,

    /// Log at debug level.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Write the log file as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the missing references of a manifest.
    Scan {
        #[arg(long)]
        manifest: Utf8PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Search a directory tree for missing files and relink them.
    Relink {
        #[arg(long)]
        manifest: Utf8PathBuf,

        /// Root of the search; defaults to the configured search directory.
        #[arg(long)]
        search_dir: Option<String>,

        /// Write relinked paths back to the manifest.
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Drop images whose files are missing from the manifest.
    RemoveMissing {
        #[arg(long)]
        manifest: Utf8PathBuf,

        /// Only count what would be removed.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Optional report of the references still missing.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Report file; the extension is replaced to match `--format`.
    #[arg(long = "report")]
    pub path: Option<Utf8PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relink_subcommand() {
        let cli = Cli::parse_from([
            "asset-relinker",
            "relink",
            "--manifest",
            "scene.yaml",
            "--search-dir",
            "/mnt/assets",
            "--save",
            "--report",
            "missing",
            "--format",
            "csv",
        ]);

        match cli.command {
            Command::Relink {
                manifest,
                search_dir,
                save,
                report,
            } => {
                assert_eq!(manifest, Utf8PathBuf::from("scene.yaml"));
                assert_eq!(search_dir.as_deref(), Some("/mnt/assets"));
                assert!(save);
                assert_eq!(report.path, Some(Utf8PathBuf::from("missing")));
                assert_eq!(report.format, ReportFormat::Csv);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config_dir, Utf8PathBuf::from("Relink Data"));
    }

    #[test]
    fn parses_scan_with_defaults() {
        let cli = Cli::parse_from(["asset-relinker", "--debug", "scan", "--manifest", "scene.yaml"]);

        assert!(cli.debug);
        match cli.command {
            Command::Scan { report, .. } => {
                assert_eq!(report.path, None);
                assert_eq!(report.format, ReportFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn accepts_txt_alias() {
        let cli = Cli::parse_from([
            "asset-relinker",
            "scan",
            "--manifest",
            "scene.yaml",
            "--format",
            "txt",
        ]);
        assert!(matches!(
            cli.command,
            Command::Scan {
                report: ReportArgs {
                    format: ReportFormat::Text,
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn remove_missing_requires_manifest() {
        assert!(Cli::try_parse_from(["asset-relinker", "remove-missing"]).is_err());
    }
}
