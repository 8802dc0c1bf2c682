// crates/netharvest-cli/src/main.rs
// ============================================================================
// Module: Netharvest CLI Entry Point
// Description: Command dispatcher for runs, batches, discovery, and stores.
// Purpose: Wire settings, stores, vault, and engine into operator commands.
// Dependencies: clap, netharvest-config, netharvest-core, netharvest-engine,
// netharvest-ssh, netharvest-store-sqlite, netharvest-vault, tokio
// ============================================================================

//! ## Overview
//! The `netharvest` binary drives the collection core: single-job runs,
//! batches, credential discovery, vault and history operations. Exit codes
//! follow the collector contract: 0 when everything succeeded, 1 when any
//! device or job failed (partial included), 2 for configuration errors.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use netharvest_config::ConfigError;
use netharvest_config::Settings;
use netharvest_config::load_batch;
use netharvest_config::load_jobs_dir;
use netharvest_config::load_settings;
use netharvest_core::BatchReport;
use netharvest_core::CancelToken;
use netharvest_core::CredentialId;
use netharvest_core::DeviceFilter;
use netharvest_core::JobReport;
use netharvest_core::JobSlug;
use netharvest_core::RunId;
use netharvest_core::RunKey;
use netharvest_core::RunStatus;
use netharvest_engine::BatchExecution;
use netharvest_engine::BatchRunner;
use netharvest_engine::BufferedProgress;
use netharvest_engine::CredentialResolver;
use netharvest_engine::DiscoveryConfig;
use netharvest_engine::DiscoveryEngine;
use netharvest_engine::JobRunner;
use netharvest_engine::resolve_devices;
use netharvest_ssh::Ssh2Connector;
use netharvest_store_sqlite::SqliteHistoryStore;
use netharvest_store_sqlite::SqliteInventoryStore;
use netharvest_store_sqlite::SqliteTemplateStore;
use netharvest_vault::NewCredential;
use netharvest_vault::Vault;
use netharvest_vault::VaultError;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "netharvest", version, about = "Network-device data collector")]
struct Cli {
    /// Path to the settings file (defaults to the data directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

/// CLI commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one job by slug.
    Run {
        /// Job slug.
        slug: String,
        /// Resolve and print the device set without contacting devices.
        #[arg(long)]
        resolve_only: bool,
        /// Run-wide credential override (credential id).
        #[arg(long)]
        credential: Option<u64>,
    },
    /// Execute a batch descriptor by name.
    Batch {
        /// Batch name (file `<name>.yaml` under the batch directory).
        name: String,
    },
    /// Probe credentials against devices and pin the working ones.
    Discover {
        /// Maximum devices probed concurrently.
        #[arg(long, default_value_t = 8)]
        rate_cap: usize,
        /// Per-probe timeout in seconds.
        #[arg(long, default_value_t = 15)]
        timeout_secs: u64,
        /// Skip devices verified within this many hours.
        #[arg(long)]
        skip_recent_hours: Option<u64>,
    },
    /// Job descriptor operations.
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Run history operations.
    #[command(subcommand)]
    History(HistoryCommand),
    /// Vault operations.
    #[command(subcommand)]
    Vault(VaultCommand),
    /// Template store operations.
    #[command(subcommand)]
    Templates(TemplatesCommand),
}

/// Job descriptor subcommands.
#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// List loaded jobs.
    List,
    /// Validate every descriptor in the jobs directory.
    Check,
}

/// History subcommands.
#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List runs, newest first.
    Runs {
        /// Filter by job slug.
        #[arg(long)]
        job: Option<String>,
        /// Maximum rows.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one run and its captures.
    Show {
        /// Numeric run id.
        run_id: u64,
    },
}

/// Vault subcommands.
#[derive(Subcommand, Debug)]
enum VaultCommand {
    /// Initialize a fresh vault.
    Init,
    /// Store a credential.
    Add {
        /// Short name.
        name: String,
        /// Login username.
        #[arg(long)]
        username: String,
        /// Password (omit to be prompted).
        #[arg(long)]
        password: Option<String>,
        /// Path to a private key file (PEM).
        #[arg(long)]
        key_file: Option<PathBuf>,
        /// Make this the store default.
        #[arg(long)]
        default: bool,
    },
    /// List credential metadata.
    List,
}

/// Template store subcommands.
#[derive(Subcommand, Debug)]
enum TemplatesCommand {
    /// Import one template body from a file.
    Import {
        /// Template identifier, e.g. `cisco_ios_show_ip_arp`.
        identifier: String,
        /// Path to the template body.
        file: PathBuf,
    },
}

// ============================================================================
// SECTION: CLI Errors
// ============================================================================

/// Errors surfaced to the operator with their exit class.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration problems: bad descriptors, unreachable stores.
    #[error("{0}")]
    Config(String),
    /// Execution finished with failures (exit 1).
    #[error("{0}")]
    Failed(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<VaultError> for CliError {
    fn from(err: VaultError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<netharvest_store_sqlite::SqliteStoreError> for CliError {
    fn from(err: netharvest_store_sqlite::SqliteStoreError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<netharvest_core::StoreError> for CliError {
    fn from(err: netharvest_core::StoreError) -> Self {
        Self::Config(err.to_string())
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match resolve_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    init_logging(&settings);

    match dispatch(cli.command, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Failed(message)) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
        Err(CliError::Config(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

/// Loads settings from the explicit path or the default location.
fn resolve_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| netharvest_config::default_data_dir().join("netharvest.toml"));
    load_settings(&path)
}

/// Installs the tracing subscriber once per process.
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Routes one parsed command.
async fn dispatch(command: Command, settings: &Settings) -> Result<(), CliError> {
    match command {
        Command::Run {
            slug,
            resolve_only,
            credential,
        } => run_job(settings, &slug, resolve_only, credential).await,
        Command::Batch {
            name,
        } => run_batch(settings, &name).await,
        Command::Discover {
            rate_cap,
            timeout_secs,
            skip_recent_hours,
        } => run_discovery(settings, rate_cap, timeout_secs, skip_recent_hours).await,
        Command::Jobs(command) => jobs_command(settings, &command),
        Command::History(command) => history_command(settings, &command),
        Command::Vault(command) => vault_command(settings, command),
        Command::Templates(command) => templates_command(settings, &command),
    }
}

// ============================================================================
// SECTION: Engine Wiring
// ============================================================================

/// Opens every store and builds the job runner.
fn build_runner(
    settings: &Settings,
    vault: Arc<Vault>,
    override_id: Option<CredentialId>,
    progress: Arc<dyn netharvest_core::ProgressSink>,
) -> Result<JobRunner, CliError> {
    let inventory = Arc::new(SqliteInventoryStore::open(&settings.inventory_db)?);
    let templates = Arc::new(SqliteTemplateStore::open(&settings.templates_db)?);
    let history = Arc::new(SqliteHistoryStore::open(&settings.history_db)?);
    Ok(JobRunner {
        inventory,
        templates,
        history,
        credentials: CredentialResolver::new(vault, override_id),
        connector: Arc::new(Ssh2Connector::new()),
        capture_root: settings.capture_root.clone(),
        progress,
    })
}

/// Opens and unlocks the vault for commands that need secrets.
fn unlocked_vault(settings: &Settings) -> Result<Arc<Vault>, CliError> {
    let vault = Vault::open(&settings.vault_db)?;
    unlock_in_place(settings, &vault)?;
    Ok(Arc::new(vault))
}

/// Reads one line from stdin after a stderr prompt.
fn prompt_secret(prompt: &str) -> Result<String, CliError> {
    eprint!("{prompt}");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| CliError::Config(format!("reading stdin: {err}")))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Spawns a progress drainer that logs per-device completions.
fn spawn_progress_logger() -> Arc<BufferedProgress> {
    let (sink, mut receiver) = BufferedProgress::channel();
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            info!(
                "[{}/{}] {} {} ({} ms): {}",
                event.index,
                event.total,
                event.outcome.device_name,
                match event.outcome.disposition {
                    netharvest_core::DeviceDisposition::Success => "ok",
                    netharvest_core::DeviceDisposition::Failed => "failed",
                    netharvest_core::DeviceDisposition::Skipped => "skipped",
                },
                event.outcome.duration_ms,
                event.outcome.reason()
            );
        }
    });
    Arc::new(sink)
}

// ============================================================================
// SECTION: Run / Batch / Discovery
// ============================================================================

/// Executes one job end to end.
async fn run_job(
    settings: &Settings,
    slug: &str,
    resolve_only: bool,
    credential: Option<u64>,
) -> Result<(), CliError> {
    let slug = JobSlug::parse(slug).map_err(|err| CliError::Config(err.to_string()))?;
    let jobs = load_jobs_dir(&settings.jobs_dir)?;
    let job = netharvest_config::find_job(&jobs, &slug)
        .ok_or_else(|| CliError::Config(format!("no job descriptor for slug {slug}")))?
        .clone();

    if resolve_only {
        let inventory = SqliteInventoryStore::open(&settings.inventory_db)?;
        let devices = resolve_devices(&inventory, &job.slug, &job.filter)
            .map_err(|err| CliError::Config(err.to_string()))?;
        for device in &devices {
            println!("{}\t{}\t{}", device.site_name, device.name, device.primary_address);
        }
        println!("{} device(s)", devices.len());
        return Ok(());
    }

    let override_id = credential
        .map(|raw| {
            CredentialId::from_raw(raw)
                .ok_or_else(|| CliError::Config("credential id must be >= 1".to_string()))
        })
        .transpose()?;
    let vault = unlocked_vault(settings)?;
    let runner = build_runner(settings, vault, override_id, spawn_progress_logger())?;
    let report = runner.run(&job, &CancelToken::new()).await;
    print_job_report(&report);
    exit_for_status(report.status)
}

/// Executes one batch descriptor.
async fn run_batch(settings: &Settings, name: &str) -> Result<(), CliError> {
    let jobs = load_jobs_dir(&settings.jobs_dir)?;
    let plan = load_batch(&settings.batches_dir.join(format!("{name}.yaml")), &jobs)?;
    let members: Vec<_> = plan
        .jobs
        .iter()
        .filter_map(|slug| netharvest_config::find_job(&jobs, slug).cloned())
        .collect();

    let vault = unlocked_vault(settings)?;
    let runner = build_runner(settings, vault, None, spawn_progress_logger())?;
    let batch_runner = BatchRunner {
        runner,
    };
    let execution = BatchExecution {
        name: plan.name.clone(),
        jobs: members,
        stop_on_failure: plan.stop_on_failure,
        inter_job_pause: plan.inter_job_pause,
        max_concurrent_jobs: plan.max_concurrent_jobs,
    };
    let report = batch_runner.run(&execution, &CancelToken::new()).await;
    print_batch_report(&report);
    if report.jobs_failed > 0 || report.jobs_cancelled > 0 || report.jobs_partial > 0 {
        return Err(CliError::Failed("batch finished with failures".to_string()));
    }
    Ok(())
}

/// Probes credentials against all active devices.
async fn run_discovery(
    settings: &Settings,
    rate_cap: usize,
    timeout_secs: u64,
    skip_recent_hours: Option<u64>,
) -> Result<(), CliError> {
    let vault = unlocked_vault(settings)?;
    let candidates = netharvest_core::CredentialSource::all_credentials(vault.as_ref())
        .map_err(|err| CliError::Config(err.to_string()))?;
    if candidates.is_empty() {
        return Err(CliError::Config("vault holds no credentials to try".to_string()));
    }

    let inventory = Arc::new(SqliteInventoryStore::open(&settings.inventory_db)?);
    let slug = JobSlug::parse("discovery").map_err(|err| CliError::Config(err.to_string()))?;
    let devices = resolve_devices(inventory.as_ref(), &slug, &DeviceFilter::default())
        .map_err(|err| CliError::Config(err.to_string()))?;

    let engine = DiscoveryEngine {
        inventory,
        connector: Arc::new(Ssh2Connector::new()),
    };
    let config = DiscoveryConfig {
        rate_cap,
        probe_timeout: Duration::from_secs(timeout_secs.max(1)),
        skip_recent: skip_recent_hours.map(|h| Duration::from_secs(h * 3_600)),
    };
    let report = engine.sweep(devices, candidates, &config, &CancelToken::new()).await;
    println!(
        "pinned={} untested={} unreachable={} skipped={}",
        report.pinned, report.failed_untested, report.failed_unreachable, report.skipped_recent
    );
    for result in &report.results {
        println!(
            "{}\t{:?}\ttried={}\t{}",
            result.device_name,
            result.disposition,
            result.candidates_tried,
            result.error.as_deref().unwrap_or("-")
        );
    }
    if report.failed_untested > 0 || report.failed_unreachable > 0 {
        return Err(CliError::Failed("discovery finished with failures".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Jobs / History
// ============================================================================

/// Job listing and validation.
fn jobs_command(settings: &Settings, command: &JobsCommand) -> Result<(), CliError> {
    match command {
        JobsCommand::List => {
            let jobs = load_jobs_dir(&settings.jobs_dir)?;
            for job in &jobs {
                println!(
                    "{}\t{}\t{}\t{}",
                    job.slug,
                    job.capture_kind.as_str(),
                    if job.enabled { "enabled" } else { "disabled" },
                    job.primary_command()
                );
            }
            println!("{} job(s)", jobs.len());
            Ok(())
        }
        JobsCommand::Check => {
            let jobs = load_jobs_dir(&settings.jobs_dir)?;
            println!("{} descriptor(s) valid", jobs.len());
            Ok(())
        }
    }
}

/// Run history queries.
fn history_command(settings: &Settings, command: &HistoryCommand) -> Result<(), CliError> {
    let history = SqliteHistoryStore::open(&settings.history_db)?;
    match command {
        HistoryCommand::Runs {
            job,
            limit,
        } => {
            let slug = job
                .as_deref()
                .map(JobSlug::parse)
                .transpose()
                .map_err(|err| CliError::Config(err.to_string()))?;
            let rows = netharvest_core::HistoryStore::runs(&history, slug.as_ref(), *limit)?;
            for run in &rows {
                println!(
                    "{}\t{}\t{}\ttotal={} ok={} failed={} skipped={}",
                    run.id,
                    run.job_slug,
                    run.status.as_str(),
                    run.counts.total,
                    run.counts.success,
                    run.counts.failed,
                    run.counts.skipped
                );
            }
            Ok(())
        }
        HistoryCommand::Show {
            run_id,
        } => {
            let id = RunId::from_raw(*run_id)
                .ok_or_else(|| CliError::Config("run id must be >= 1".to_string()))?;
            let run = netharvest_core::HistoryStore::run(&history, &RunKey::Id(id))?
                .ok_or_else(|| CliError::Config(format!("no run {run_id}")))?;
            println!(
                "run {} job={} status={} started={:?} completed={:?}",
                run.id,
                run.job_slug,
                run.status.as_str(),
                run.started_at,
                run.completed_at
            );
            let captures = netharvest_core::HistoryStore::captures(&history, id)?;
            for capture in &captures {
                println!(
                    "  {}\t{}\t{} bytes\tscore={}",
                    capture.device_name,
                    capture.path.display(),
                    capture.size_bytes,
                    capture.score.map_or_else(|| "-".to_string(), |s| s.to_string())
                );
            }
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Vault / Templates
// ============================================================================

/// Vault lifecycle and credential storage.
fn vault_command(settings: &Settings, command: VaultCommand) -> Result<(), CliError> {
    let vault = Vault::open(&settings.vault_db)?;
    match command {
        VaultCommand::Init => {
            let password = prompt_secret("new vault password: ")?;
            vault.init(&password)?;
            println!("vault initialized at {}", vault.path().display());
            Ok(())
        }
        VaultCommand::Add {
            name,
            username,
            password,
            key_file,
            default,
        } => {
            unlock_in_place(settings, &vault)?;
            let password = match password {
                Some(password) => Some(password),
                None if key_file.is_none() => Some(prompt_secret("credential password: ")?),
                None => None,
            };
            let private_key = key_file
                .map(|path| {
                    std::fs::read_to_string(&path).map_err(|err| {
                        CliError::Config(format!("reading {}: {err}", path.display()))
                    })
                })
                .transpose()?;
            let id = vault.add_credential(NewCredential {
                name,
                username,
                password,
                private_key,
                key_passphrase: None,
                is_default: default,
            })?;
            println!("stored credential {id}");
            Ok(())
        }
        VaultCommand::List => {
            for summary in vault.list()? {
                println!(
                    "{}\t{}\t{}\t{}{}",
                    summary.id,
                    summary.name,
                    summary.username,
                    if summary.has_password { "password" } else { "key" },
                    if summary.is_default { "\t(default)" } else { "" }
                );
            }
            Ok(())
        }
    }
}

/// Unlocks an already-open vault handle.
fn unlock_in_place(settings: &Settings, vault: &Vault) -> Result<(), CliError> {
    if settings.allow_env_unlock && std::env::var(netharvest_vault::VAULT_PASSWORD_ENV).is_ok() {
        vault.unlock_from_env()?;
    } else {
        let password = prompt_secret("vault password: ")?;
        vault.unlock(&password)?;
    }
    Ok(())
}

/// Template imports into the read-only store.
fn templates_command(settings: &Settings, command: &TemplatesCommand) -> Result<(), CliError> {
    match command {
        TemplatesCommand::Import {
            identifier,
            file,
        } => {
            let body = std::fs::read_to_string(file)
                .map_err(|err| CliError::Config(format!("reading {}: {err}", file.display())))?;
            let store = SqliteTemplateStore::open(&settings.templates_db)?;
            let changed = store.import(identifier, &body)?;
            println!(
                "{} {identifier}",
                if changed { "imported" } else { "unchanged" }
            );
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

/// Prints the per-device summary of one run.
fn print_job_report(report: &JobReport) {
    for outcome in &report.outcomes {
        println!(
            "{}\t{}\t{}\t{}",
            outcome.device_name,
            match outcome.disposition {
                netharvest_core::DeviceDisposition::Success => "ok",
                netharvest_core::DeviceDisposition::Failed => "failed",
                netharvest_core::DeviceDisposition::Skipped => "skipped",
            },
            outcome.duration_ms,
            outcome.reason()
        );
    }
    println!(
        "run {}: {} total={} ok={} failed={} skipped={} ({} ms)",
        report.run_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        report.status.as_str(),
        report.counts.total,
        report.counts.success,
        report.counts.failed,
        report.counts.skipped,
        report.duration_ms
    );
}

/// Prints the aggregate summary of one batch.
fn print_batch_report(report: &BatchReport) {
    for job in &report.jobs {
        println!(
            "{}\t{}\ttotal={} ok={} failed={} skipped={}",
            job.slug,
            job.status.as_str(),
            job.counts.total,
            job.counts.success,
            job.counts.failed,
            job.counts.skipped
        );
    }
    println!(
        "batch: attempted={} ok={} partial={} failed={} cancelled={} ({} ms)",
        report.jobs_attempted,
        report.jobs_succeeded,
        report.jobs_partial,
        report.jobs_failed,
        report.jobs_cancelled,
        report.duration_ms
    );
}

/// Maps a final run status onto the exit contract.
fn exit_for_status(status: RunStatus) -> Result<(), CliError> {
    match status {
        RunStatus::Success => Ok(()),
        RunStatus::Partial | RunStatus::Failed | RunStatus::Running | RunStatus::Cancelled => {
            Err(CliError::Failed(format!("run finished with status {}", status.as_str())))
        }
    }
}
