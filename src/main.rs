mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::events::EventBus;
use rf_core::{JobId, JobStatus, RecordingId};
use rf_pipeline::status::{self, JobSummary, StepSummary};
use rf_pipeline::{DbTriggerQueue, ExecutorRegistry, Orchestrator};
use rf_store::{keys, ArtifactStore, FsArtifactStore};
use rf_worker::context::{ensure_storage_root, open_database};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "recforge=trace,rf_pipeline=trace,rf_worker=trace,rf_providers=debug,rf_av=debug,rf_db=debug".to_string()
        } else {
            "recforge=info,rf_pipeline=info,rf_worker=info,rf_providers=info,rf_av=info,rf_db=warn".to_string()
        }
    });

    // Logs go to stderr so command output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Start => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(rf_worker::start(config))?;
            Ok(())
        }
        Commands::Submit {
            upload_ref,
            recording,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(submit(config_path, &upload_ref, recording.as_deref()))
        }
        Commands::Import { file, recording } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(import(config_path, &file, recording.as_deref()))
        }
        Commands::Status { job, status, json } => match job {
            Some(job) => show_job(config_path, &job, json),
            None => list_jobs(config_path, status.as_deref(), json),
        },
        Commands::Steps { job, json } => show_steps(config_path, &job, json),
        Commands::Retry { job } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(retry(config_path, &job))
        }
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate { file } => validate_config(file.as_deref().or(config_path)),
        Commands::Version => {
            println!("recforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// An orchestrator for control commands: it queues triggers but never runs
/// stages, so it needs no executors.
fn control_plane(config: &Config) -> Result<Orchestrator> {
    let db = open_database(config)?;
    let queue = Arc::new(DbTriggerQueue::new(db.clone()));
    Ok(Orchestrator::new(
        db,
        ExecutorRegistry::new(),
        queue,
        Arc::new(EventBus::default()),
    ))
}

fn parse_recording(recording: Option<&str>) -> Result<RecordingId> {
    match recording {
        Some(id) => Ok(id.parse::<RecordingId>()?),
        None => Ok(RecordingId::new()),
    }
}

async fn submit(config_path: Option<&Path>, upload_ref: &str, recording: Option<&str>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let orchestrator = control_plane(&config)?;
    let recording_id = parse_recording(recording)?;

    let (job, created) = orchestrator.submit(recording_id, upload_ref).await?;
    if created {
        println!("Queued job {} for recording {}", job.id, job.recording_id);
    } else {
        println!("Recording {} already has job {} ({})", job.recording_id, job.id, job.status);
    }
    Ok(())
}

async fn import(config_path: Option<&Path>, file: &Path, recording: Option<&str>) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Input file name is not valid UTF-8: {:?}", file))?;

    let config = Config::load_or_default(config_path);
    ensure_storage_root(&config.storage.root)?;
    let store = FsArtifactStore::new(config.storage.root.clone());

    let recording_id = parse_recording(recording)?;
    let key = keys::upload(recording_id, file_name);
    store.put_file(&key, file).await?;
    println!("Stored {} as {}", file.display(), key);

    let orchestrator = control_plane(&config)?;
    let (job, created) = orchestrator.submit(recording_id, &key).await?;
    if created {
        println!("Queued job {} for recording {}", job.id, recording_id);
    } else {
        println!("Recording {} already has job {} ({})", recording_id, job.id, job.status);
    }
    Ok(())
}

async fn retry(config_path: Option<&Path>, job: &str) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let orchestrator = control_plane(&config)?;
    let job_id: JobId = job.parse()?;

    let job = orchestrator.retry_job(job_id).await?;
    println!(
        "Retrying job {} from {} (round {})",
        job.id, job.current_stage, job.retry_round
    );
    Ok(())
}

fn show_job(config_path: Option<&Path>, job: &str, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = open_database(&config)?;
    let summary = status::get_job(&db, job.parse::<JobId>()?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_job(&summary);
    }
    Ok(())
}

fn list_jobs(config_path: Option<&Path>, status_filter: Option<&str>, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = open_database(&config)?;
    let filter: Option<JobStatus> = status_filter.map(str::parse::<JobStatus>).transpose()?;
    let jobs = status::list_jobs(&db, filter, 0, 100)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{}  {:<10} {:<14} {:>3.0}%",
            job.id,
            job.status,
            job.current_stage,
            job.progress * 100.0
        );
    }
    Ok(())
}

fn show_steps(config_path: Option<&Path>, job: &str, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = open_database(&config)?;
    let steps = status::get_steps(&db, job.parse::<JobId>()?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
    } else {
        for step in &steps {
            print_step(step);
        }
    }
    Ok(())
}

fn print_job(job: &JobSummary) {
    println!("Job:       {}", job.id);
    println!("Recording: {}", job.recording_id);
    println!("Status:    {}", job.status);
    println!("Stage:     {} ({:.0}%)", job.current_stage, job.progress * 100.0);
    if job.retry_round > 1 {
        println!("Round:     {}", job.retry_round);
    }
    if let Some(ref error) = job.error_message {
        println!("Error:     {error}");
    }
    println!("Created:   {}", job.created_at);
    if let Some(ref completed) = job.completed_at {
        println!("Completed: {completed}");
    }
}

fn print_step(step: &StepSummary) {
    print!(
        "{:<14} r{} #{} {:<10}",
        step.stage, step.retry_round, step.attempt, step.status
    );
    if let Some(ms) = step.duration_ms {
        print!(" {ms}ms");
    }
    if let Some(ref output) = step.output_ref {
        print!(" -> {output}");
    }
    if let (Some(kind), Some(detail)) = (step.error_kind, step.error_detail.as_deref()) {
        print!(" [{kind}] {detail}");
    }
    println!();
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Convert and ExtractAudio will fail until they are installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let mut config = Config::from_json(&contents)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::load_or_default(None)
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration loaded with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {warning}");
        }
    }
    println!("  Database: {}", config.database.path.display());
    println!("  Artifacts: {}", config.storage.root.display());
    println!("  Workers: {}", config.worker.concurrency);
    println!(
        "  Retry: {} attempts, {}ms base delay, {}ms cap",
        config.retry.max_attempts, config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    Ok(())
}
