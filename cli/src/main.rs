//! distbackup - Command-line interface for the backup staging engine.
//!
//! Prepares backup and restore runs, runs pending jobs on this machine,
//! reconciles the job queue and verifies finished runs. Every subcommand can
//! be re-run safely; work that is already done is never scheduled again.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use distbackup_engine::{
    include_binary, prepare_backup, prepare_restore, reconcile, run_pending, verify_backup, verify_restore, Catalog,
    ChecksumAlgorithm, CompletionCheck, Direction, JobOutcome, JobQueue, ManifestId, PreparedRun,
    ProgressCallback, ReconcileReport, Settings, ShellRunner, StagingLayout, VerificationReport,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// distbackup - Split a directory tree into independently runnable backup jobs
#[derive(Parser, Debug)]
#[command(name = "distbackup")]
#[command(version = "0.1.0")]
#[command(about = "Stage, run and verify directory-level backups and restores")]
struct Args {
    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Settings file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Checksum algorithm for sidecars: md5, sha256, or blake3
    #[arg(long, value_name = "ALGORITHM", global = true)]
    checksum: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up a directory tree into a staging directory
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Restore a staged backup into a new root
    Restore {
        #[command(subcommand)]
        action: RestoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Write the catalog, manifests and one pending job per directory
    Prepare {
        /// Directory tree to back up
        #[arg(long, value_name = "PATH")]
        source: PathBuf,
        /// Empty or missing staging directory
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
        /// Run the jobs here right after preparing
        #[arg(long)]
        run: bool,
        /// Copy this executable into the staging directory
        #[arg(long)]
        include_binary: bool,
    },
    /// Run pending jobs on this machine, then reconcile
    Run {
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
    /// Promote finished jobs and report what remains
    Check {
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
    /// Verify every checksum of the backup
    Verify {
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum RestoreAction {
    /// Create the destination skeleton and one pending job per directory
    Prepare {
        /// Staging directory of a backup
        #[arg(long, value_name = "PATH")]
        source: PathBuf,
        /// Empty or missing directory to restore into
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
        /// Run the jobs here right after preparing
        #[arg(long)]
        run: bool,
    },
    /// Run pending jobs on this machine, then reconcile
    Run {
        #[arg(long, value_name = "PATH")]
        source: PathBuf,
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
    /// Promote finished jobs and report what remains
    Check {
        #[arg(long, value_name = "PATH")]
        source: PathBuf,
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
    /// Check that every recorded entry exists in the destination
    Verify {
        #[arg(long, value_name = "PATH")]
        source: PathBuf,
        #[arg(long, value_name = "PATH")]
        destination: PathBuf,
    },
}

/// How a successful invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// Verification found problems, or jobs are still pending after a run
    Incomplete,
}

/// CLI implementation of ProgressCallback, printing to stderr
struct CliProgress {
    verbose: bool,
    start_time: Instant,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_reconcile_started(&self, direction: Direction, total: usize) {
        eprintln!("Checking {} {} jobs...", total, direction);
    }

    fn on_job_checked(&self, id: &ManifestId, outcome: &JobOutcome) {
        if !self.verbose {
            return;
        }
        match outcome {
            JobOutcome::Promoted => eprintln!("  [done]    {}", id),
            JobOutcome::AlreadyDone => eprintln!("  [skip]    {}", id),
            JobOutcome::Incomplete { missing } => {
                eprintln!("  [pending] {} (missing {})", id, missing.display())
            }
            JobOutcome::Vanished => eprintln!("  [gone]    {}", id),
        }
    }

    fn on_reconcile_completed(&self, report: &ReconcileReport) {
        eprintln!();
        eprintln!("Check complete in {}", Self::format_duration(self.start_time.elapsed()));
        eprintln!("  Moved to done: {}", report.promoted);
        eprintln!("  Already done:  {}", report.already_done);
        eprintln!("  Remaining:     {}", report.remaining);
    }

    fn on_job_started(&self, id: &ManifestId) {
        if self.verbose {
            eprintln!("Running {}", id);
        }
    }

    fn on_job_finished(&self, id: &ManifestId, success: bool) {
        if !success {
            eprintln!("Job {} failed", id);
        }
    }
}

/// Initialize logging; `RUST_LOG` wins over the verbosity flag
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse arguments, run the command and exit with 0 (ok), 1 (incomplete or
/// failed verification) or 2 (error)
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(Outcome::Success) => 0,
        Ok(Outcome::Incomplete) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// The algorithm named by `--checksum`, if given
fn requested_checksum(args: &Args) -> anyhow::Result<Option<ChecksumAlgorithm>> {
    args.checksum
        .as_deref()
        .map(|name| {
            name.parse::<ChecksumAlgorithm>()
                .map_err(|e| anyhow!("Invalid checksum algorithm: {}", e))
        })
        .transpose()
}

/// Settings from the optional file, overridden by command-line flags
fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if args.verbose {
        settings.verbose = true;
    }
    if let Some(algorithm) = requested_checksum(args)? {
        settings.checksum = algorithm;
    }
    Ok(settings)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> anyhow::Result<Outcome> {
    let settings = load_settings(args)?;
    let requested = requested_checksum(args)?;
    tracing::debug!(?settings, "settings loaded");
    let progress = CliProgress::new(settings.verbose);

    match &args.command {
        Command::Backup { action } => match action {
            BackupAction::Prepare {
                source,
                destination,
                run,
                include_binary: with_binary,
            } => {
                let prepared =
                    prepare_backup(source, destination, &settings).context("Backup preparation failed")?;
                report_prepared(&prepared, Direction::Backup);
                if *with_binary {
                    let exe = std::env::current_exe().context("Cannot locate the running executable")?;
                    let copied = include_binary(&prepared.backup, &exe, settings.checksum)
                        .context("Copying the executable failed")?;
                    println!("  Binary: {}", copied.display());
                }
                if *run {
                    run_and_check(&prepared, &backup_check(settings.checksum), &settings, &progress)
                } else {
                    Ok(Outcome::Success)
                }
            }
            BackupAction::Run { destination } => {
                let (prepared, algorithm) = open_backup(destination, requested, &settings)?;
                run_and_check(&prepared, &backup_check(algorithm), &settings, &progress)
            }
            BackupAction::Check { destination } => {
                let (prepared, algorithm) = open_backup(destination, requested, &settings)?;
                check(&prepared, &backup_check(algorithm), &progress)?;
                Ok(Outcome::Success)
            }
            BackupAction::Verify { destination } => {
                let (prepared, algorithm) = open_backup(destination, requested, &settings)?;
                let report = verify_backup(&prepared.backup, algorithm).context("Backup verification failed")?;
                Ok(report_verification(&report))
            }
        },
        Command::Restore { action } => match action {
            RestoreAction::Prepare {
                source,
                destination,
                run,
            } => {
                let prepared =
                    prepare_restore(source, destination, &settings).context("Restore preparation failed")?;
                report_prepared(&prepared, Direction::Restore);
                if *run {
                    run_and_check(&prepared, &restore_check(destination), &settings, &progress)
                } else {
                    Ok(Outcome::Success)
                }
            }
            RestoreAction::Run { source, destination } => {
                let prepared = open_restore(source, destination)?;
                run_and_check(&prepared, &restore_check(destination), &settings, &progress)
            }
            RestoreAction::Check { source, destination } => {
                let prepared = open_restore(source, destination)?;
                check(&prepared, &restore_check(destination), &progress)?;
                Ok(Outcome::Success)
            }
            RestoreAction::Verify { source, destination } => {
                let report = verify_restore(&StagingLayout::new(source), destination)
                    .context("Restore verification failed")?;
                Ok(report_verification(&report))
            }
        },
    }
}

fn backup_check(algorithm: ChecksumAlgorithm) -> CompletionCheck {
    CompletionCheck::Backup { algorithm }
}

fn restore_check(destination: &Path) -> CompletionCheck {
    CompletionCheck::Restore {
        destination_root: destination.to_path_buf(),
    }
}

/// Reopen a prepared backup from its staging directory, together with the
/// sidecar algorithm it was prepared with
fn open_backup(
    destination: &Path,
    requested: Option<ChecksumAlgorithm>,
    settings: &Settings,
) -> anyhow::Result<(PreparedRun, ChecksumAlgorithm)> {
    distbackup_engine::fs_ops::require_directory(destination)?;
    let backup = StagingLayout::new(destination);
    let catalog_path = backup.catalog_path();
    let catalog = Catalog::load(&catalog_path)?;
    let algorithm = catalog.resolve_checksum(&catalog_path, requested, settings.checksum)?;
    let queue = JobQueue::open(&backup);
    let prepared = PreparedRun {
        backup,
        queue,
        catalog,
        jobs: Vec::new(),
        directories_created: 0,
        destination: None,
    };
    Ok((prepared, algorithm))
}

/// Reopen a prepared restore from the backup and the restore destination
fn open_restore(source: &Path, destination: &Path) -> anyhow::Result<PreparedRun> {
    distbackup_engine::fs_ops::require_directory(source)?;
    distbackup_engine::fs_ops::require_directory(destination)?;
    let backup = StagingLayout::new(source);
    let catalog = Catalog::load(&backup.catalog_path())?;
    let queue = JobQueue::open(&StagingLayout::new(destination));
    Ok(PreparedRun {
        backup,
        queue,
        catalog,
        jobs: Vec::new(),
        directories_created: 0,
        destination: Some(destination.to_path_buf()),
    })
}

fn report_prepared(prepared: &PreparedRun, direction: Direction) {
    println!("Prepared {} {} jobs", prepared.jobs.len(), direction);
    if direction == Direction::Restore {
        println!("  Directories created: {}", prepared.directories_created);
    }
    println!("  Pending jobs: {}", prepared.queue.pending_dir().display());
}

fn check(
    prepared: &PreparedRun,
    completion: &CompletionCheck,
    progress: &CliProgress,
) -> anyhow::Result<ReconcileReport> {
    let report = reconcile(
        &prepared.catalog,
        &prepared.backup,
        &prepared.queue,
        completion,
        Some(progress),
    )
    .context("Reconcile failed")?;
    println!("{} moved to done, {} remaining", report.promoted, report.remaining);
    Ok(report)
}

fn run_and_check(
    prepared: &PreparedRun,
    completion: &CompletionCheck,
    settings: &Settings,
    progress: &CliProgress,
) -> anyhow::Result<Outcome> {
    let runner = ShellRunner::new(settings.shell.clone(), settings.verbose);
    let summary = run_pending(&prepared.queue, &runner, Some(progress)).context("Running jobs failed")?;
    if !summary.failed.is_empty() {
        eprintln!("{} of {} jobs failed", summary.failed.len(), summary.total());
    }

    let report = check(prepared, completion, progress)?;
    if report.is_complete() {
        Ok(Outcome::Success)
    } else {
        Ok(Outcome::Incomplete)
    }
}

fn report_verification(report: &VerificationReport) -> Outcome {
    for failure in &report.failures {
        eprintln!("  FAILED {}", failure);
    }
    if report.is_success() {
        println!("All {} checks passed", report.checked);
        Outcome::Success
    } else {
        println!("{} of {} checks failed", report.failures.len(), report.checked);
        Outcome::Incomplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(command: Command) -> Args {
        Args {
            verbose: false,
            config: None,
            checksum: None,
            command,
        }
    }

    fn source_tree(dir: &TempDir) -> PathBuf {
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("a")).expect("Failed to create source");
        std::fs::write(source.join("a").join("x.txt"), "hello").expect("Failed to write file");
        source
    }

    fn prepare_backup_args(source: &Path, destination: &Path) -> Args {
        args(Command::Backup {
            action: BackupAction::Prepare {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                run: false,
                include_binary: false,
            },
        })
    }

    /// Stand in for workers: write every archive with a sidecar.
    fn fake_archives(staging: &Path, algorithm: ChecksumAlgorithm) {
        let layout = StagingLayout::new(staging);
        let catalog = Catalog::load(&layout.catalog_path()).expect("Failed to load catalog");
        for id in catalog.manifest_refs() {
            let archive = layout.archive_path(id);
            std::fs::write(&archive, format!("archive of {}", id)).expect("Failed to write archive");
            distbackup_engine::generate_sidecar(&archive, algorithm).expect("Failed to write sidecar");
        }
    }

    #[test]
    fn test_cli_parses_nested_subcommands() {
        let args = Args::try_parse_from([
            "distbackup",
            "restore",
            "check",
            "--source",
            "/backup",
            "--destination",
            "/dst",
            "--checksum",
            "sha256",
        ])
        .expect("Failed to parse");

        assert_eq!(args.checksum.as_deref(), Some("sha256"));
        match args.command {
            Command::Restore {
                action: RestoreAction::Check { source, destination },
            } => {
                assert_eq!(source, PathBuf::from("/backup"));
                assert_eq!(destination, PathBuf::from("/dst"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_backup_prepare_and_check() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");

        let result = run_cli(&prepare_backup_args(&source, &staging));
        assert_eq!(result.expect("Prepare should succeed"), Outcome::Success);
        assert!(staging.join("catalog.txt").is_file());

        let check = args(Command::Backup {
            action: BackupAction::Check {
                destination: staging.clone(),
            },
        });
        assert_eq!(run_cli(&check).expect("Check should succeed"), Outcome::Success);
    }

    #[test]
    fn test_cli_verify_unrun_backup_is_incomplete() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");
        run_cli(&prepare_backup_args(&source, &staging)).expect("Prepare should succeed");

        let verify = args(Command::Backup {
            action: BackupAction::Verify { destination: staging },
        });
        assert_eq!(run_cli(&verify).expect("Verify should run"), Outcome::Incomplete);
    }

    #[test]
    fn test_cli_restore_prepare_creates_skeleton() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");
        run_cli(&prepare_backup_args(&source, &staging)).expect("Prepare should succeed");

        let destination = dir.path().join("dst");
        let restore = args(Command::Restore {
            action: RestoreAction::Prepare {
                source: staging,
                destination: destination.clone(),
                run: false,
            },
        });
        assert_eq!(run_cli(&restore).expect("Restore prepare should succeed"), Outcome::Success);
        assert!(destination.join("a").is_dir());
        assert!(destination.join(".backup_jobs").join("pending").is_dir());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = run_cli(&prepare_backup_args(
            Path::new("/nonexistent/path"),
            &dir.path().join("backup"),
        ));
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_invalid_checksum_algorithm() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let mut args = prepare_backup_args(&source, &dir.path().join("backup"));
        args.checksum = Some("crc32".to_string());

        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should reject unknown algorithm");
        assert!(!dir.path().join("backup").exists(), "nothing should be written");
    }

    #[test]
    fn test_cli_settings_file_and_overrides() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("distbackup.toml");
        std::fs::write(&config, "checksum = \"sha256\"\nshell = \"sh\"\n").expect("Failed to write config");

        let mut args = args(Command::Backup {
            action: BackupAction::Check {
                destination: dir.path().to_path_buf(),
            },
        });
        args.config = Some(config);
        let settings = load_settings(&args).expect("Failed to load settings");
        assert_eq!(settings.checksum, ChecksumAlgorithm::Sha256);
        assert_eq!(settings.shell, "sh");
        assert!(!settings.verbose);

        args.checksum = Some("blake3".to_string());
        args.verbose = true;
        let settings = load_settings(&args).expect("Failed to load settings");
        assert_eq!(settings.checksum, ChecksumAlgorithm::Blake3);
        assert!(settings.verbose);
    }

    #[test]
    fn test_cli_uses_checksum_recorded_at_prepare() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");
        let mut prepare = prepare_backup_args(&source, &staging);
        prepare.checksum = Some("sha256".to_string());
        run_cli(&prepare).expect("Prepare should succeed");
        fake_archives(&staging, ChecksumAlgorithm::Sha256);

        let check = args(Command::Backup {
            action: BackupAction::Check {
                destination: staging.clone(),
            },
        });
        assert_eq!(run_cli(&check).expect("Check should succeed"), Outcome::Success);
        let queue = JobQueue::open(&StagingLayout::new(&staging));
        assert!(queue.pending().expect("Failed to list pending").is_empty());

        let verify = args(Command::Backup {
            action: BackupAction::Verify {
                destination: staging.clone(),
            },
        });
        assert_eq!(run_cli(&verify).expect("Verify should run"), Outcome::Success);
    }

    #[test]
    fn test_cli_rejects_conflicting_checksum() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");
        let mut prepare = prepare_backup_args(&source, &staging);
        prepare.checksum = Some("sha256".to_string());
        run_cli(&prepare).expect("Prepare should succeed");

        let mut verify = args(Command::Backup {
            action: BackupAction::Verify {
                destination: staging,
            },
        });
        verify.checksum = Some("md5".to_string());
        let err = run_cli(&verify).expect_err("Conflicting checksum should fail");
        assert!(
            err.chain().any(|cause| cause.to_string().contains("sha256")),
            "unexpected error: {:#}",
            err
        );
    }

    #[test]
    fn test_cli_prepare_includes_binary() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = source_tree(&dir);
        let staging = dir.path().join("backup");
        let prepare = args(Command::Backup {
            action: BackupAction::Prepare {
                source,
                destination: staging.clone(),
                run: false,
                include_binary: true,
            },
        });
        assert_eq!(run_cli(&prepare).expect("Prepare should succeed"), Outcome::Success);

        let exe = std::env::current_exe().expect("Failed to locate test executable");
        let copied = staging.join(exe.file_name().expect("Executable has no file name"));
        assert!(copied.is_file());
        assert!(distbackup_engine::verify_sidecar(&copied, ChecksumAlgorithm::Md5));
    }

    #[test]
    fn test_cli_check_without_catalog_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let check = args(Command::Backup {
            action: BackupAction::Check {
                destination: dir.path().to_path_buf(),
            },
        });
        assert!(run_cli(&check).is_err());
    }
}
