use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use vsum::config::{self, VsumConfig};
use vsum::db::Database;
use vsum::generate::OllamaGenerator;
use vsum::jobs::poll::{CancelFlag, PollOutcome};
use vsum::jobs::{Job, JobController};
use vsum::models::{self, ModelRegistry, OllamaClient};
use vsum::output::json::{self as json_out, RenderedVersion};
use vsum::output::table;
use vsum::render::parse_summary;
use vsum::versions::VersionStore;

#[derive(Parser)]
#[command(name = "vsum", version, about = "Video summaries: background generation, versioned storage, structured rendering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to database file (default: ~/.vsum/vsum.db)
    #[arg(long, global = true, env = "VSUM_DB")]
    db: Option<PathBuf>,

    /// Path to config file (default: ~/.vsum/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ollama base URL (overrides VSUM_OLLAMA_URL and config)
    #[arg(long, global = true)]
    ollama_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate summaries for one or more videos and wait for them
    Generate {
        /// Video paths or glob patterns
        #[arg(required = true)]
        subjects: Vec<String>,

        /// Regenerate even if a summary exists or a job is running (supersedes it)
        #[arg(long)]
        force: bool,

        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,

        /// Install the model first if it is missing
        #[arg(long)]
        pull: bool,

        /// Give up after this many seconds; unfinished jobs are marked failed
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the state of a job
    Status {
        /// Task ID
        task_id: String,
    },

    /// Wait for the active job of a subject, e.g. one started by another vsum
    Watch {
        subject: String,

        /// Stop waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List jobs for a subject
    Jobs { subject: String },

    /// List stored versions of a subject's summary
    Versions { subject: String },

    /// Show a stored summary
    Show {
        subject: String,

        /// Version number (default: current)
        #[arg(long)]
        version: Option<i64>,

        /// Print the stored text without structuring it
        #[arg(long)]
        raw: bool,
    },

    /// Structure a summary text file without touching the database
    Render {
        /// Summary text file
        file: PathBuf,

        /// Transcript file that may carry a [JUMP_POINTS] block
        #[arg(long)]
        transcript: Option<PathBuf>,
    },

    /// List subjects with stored summaries
    List,

    /// List installed models
    Models,

    /// Install a model and wait until it is registered
    Pull { name: String },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show database info
    Info,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented config template
    Init,
    /// Show effective settings
    Show,
}

/// Per-subject result of `vsum generate --json`.
#[derive(Serialize)]
struct GenerateResult {
    subject: String,
    task_id: Option<String>,
    outcome: &'static str,
    version: Option<i64>,
    error: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;
    let cfg = VsumConfig::load(cli.config.as_deref())?;
    let ollama_url = cfg.ollama_url(cli.ollama_url.as_deref());

    match cli.command {
        Commands::Render { file, transcript } => {
            render_file(&file, transcript.as_deref(), json_output)?;
        }
        Commands::Models => {
            let installed = OllamaClient::new(&ollama_url)?
                .list_installed()
                .with_context(|| format!("Could not list models at {ollama_url}"))?;
            if json_output {
                json_out::print_json(&installed)?;
            } else {
                table::print_models(&installed, &cfg.model(None));
            }
        }
        Commands::Pull { name } => {
            let client = OllamaClient::new(&ollama_url)?;
            let outcome =
                models::ensure_model(&client, &name, cfg.pull_attempts(), cfg.pull_interval())?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "model": name, "cached": outcome.cached }))?;
            } else if outcome.cached {
                println!("{name} is already installed");
            } else {
                println!("Installed {name}");
            }
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Init => {
                    let (path, created) = config::init_config(cli.config.as_deref())?;
                    if created {
                        println!("Wrote {}", path.display());
                    } else {
                        println!("{} already exists", path.display());
                    }
                }
                ConfigAction::Show => {
                    if json_output {
                        json_out::print_json(&serde_json::json!({
                            "ollama_url": ollama_url,
                            "model": cfg.model(None),
                            "poll_interval_ms": cfg.poll_interval().as_millis() as u64,
                            "pull_attempts": cfg.pull_attempts(),
                            "pull_interval_secs": cfg.pull_interval().as_secs(),
                        }))?;
                    } else {
                        println!("{}", cfg.display_effective());
                    }
                }
            }
        }

        Commands::Generate {
            subjects,
            force,
            model,
            pull,
            timeout,
        } => {
            let db = open_db(cli.db.as_deref())?;
            let subjects = expand_subjects(&subjects)?;
            let client = OllamaClient::new(&ollama_url)?;
            if pull {
                let name = cfg.model(model.as_deref());
                models::ensure_model(&client, &name, cfg.pull_attempts(), cfg.pull_interval())?;
            }

            let controller = job_controller(db, client, &cfg);
            let mut results = Vec::new();
            let mut started = Vec::new();
            for subject in subjects {
                if !force {
                    if let Some(version) = controller.completed_version(&subject)? {
                        if !json_output {
                            println!("{subject}: v{version} exists; use --force to regenerate");
                        }
                        results.push(GenerateResult {
                            subject,
                            task_id: None,
                            outcome: "exists",
                            version: Some(version),
                            error: None,
                        });
                        continue;
                    }
                }
                let task_id = controller.start(&subject, force, model.as_deref())?;
                if !json_output {
                    eprintln!("{subject}: job {task_id}");
                }
                started.push((subject, task_id));
            }

            let cancel = cancel_after(timeout);
            for (subject, task_id) in started {
                results.push(wait_for(&controller, subject, task_id, &cfg, &cancel, json_output)?);
            }

            // Workers die with this process; record that rather than leave
            // rows that look alive.
            let abandoned = controller.abandon_unfinished("vsum exited before the job finished")?;
            if abandoned > 0 && !json_output {
                eprintln!(
                    "Marked {abandoned} unfinished job{} failed; run generate again to retry",
                    if abandoned == 1 { "" } else { "s" }
                );
            }

            let failed = results.iter().filter(|r| r.outcome == "failed").count();
            if json_output {
                json_out::print_json(&results)?;
            }
            if failed > 0 {
                bail!("{failed} of {} job{} failed", results.len(), if results.len() == 1 { "" } else { "s" });
            }
        }

        Commands::Status { task_id } => {
            let db = open_db(cli.db.as_deref())?;
            let controller = job_controller(db, OllamaClient::new(&ollama_url)?, &cfg);
            let job = controller.status(&task_id)?;
            if json_output {
                json_out::print_json(&job)?;
            } else {
                table::print_job(&job);
            }
        }

        Commands::Watch { subject, timeout } => {
            let db = open_db(cli.db.as_deref())?;
            let controller = job_controller(db, OllamaClient::new(&ollama_url)?, &cfg);
            let Some(task_id) = controller.find_active(&subject)? else {
                bail!("No active job for {subject}");
            };
            let cancel = cancel_after(timeout);
            let result = wait_for(&controller, subject, task_id, &cfg, &cancel, json_output)?;
            if json_output {
                json_out::print_json(&result)?;
            }
            if result.outcome == "failed" {
                bail!("Job {} failed", result.task_id.unwrap_or_default());
            }
        }

        Commands::Jobs { subject } => {
            let db = open_db(cli.db.as_deref())?;
            let controller = job_controller(db, OllamaClient::new(&ollama_url)?, &cfg);
            let jobs = controller.jobs_for(&subject)?;
            if json_output {
                json_out::print_json(&jobs)?;
            } else {
                table::print_jobs(&subject, &jobs);
            }
        }

        Commands::Versions { subject } => {
            let db = open_db(cli.db.as_deref())?;
            let versions = db.list_versions(&subject)?;
            let current = latest_version_number(&db, &subject)?;
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "subject": subject,
                    "current": current,
                    "versions": versions,
                }))?;
            } else {
                table::print_versions(&subject, &versions, current);
            }
        }

        Commands::Show {
            subject,
            version,
            raw,
        } => {
            let db = open_db(cli.db.as_deref())?;
            let stored = match version {
                Some(n) => db.get_version(&subject, n)?,
                None => db.latest_completed(&subject)?,
            };

            if raw {
                if json_output {
                    json_out::print_json(&stored)?;
                } else {
                    println!("{}", stored.summary_text);
                }
                return Ok(());
            }

            let doc = parse_summary(&stored.summary_text, stored.transcript_text.as_deref());
            if json_output {
                json_out::print_json(&RenderedVersion::new(&stored, &doc))?;
            } else {
                table::print_version(&stored, &doc);
            }
        }

        Commands::List => {
            let db = open_db(cli.db.as_deref())?;
            let subjects = db.subjects()?;
            if json_output {
                json_out::print_json(&subjects)?;
            } else {
                table::print_subject_list(&subjects);
            }
        }

        Commands::Info => {
            let db = open_db(cli.db.as_deref())?;
            let stats = db.stats()?;
            let schema_ver = db
                .meta_value("schema_version")?
                .unwrap_or_else(|| "unknown".to_string());

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "schema_version": schema_ver,
                    "db_path": db.path.display().to_string(),
                    "stats": stats,
                }))?;
            } else {
                table::print_stats(&stats, &schema_ver, &db.path.display().to_string());
            }
        }
    }

    Ok(())
}

fn open_db(path: Option<&Path>) -> Result<Arc<Database>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Database::default_db_path()?,
    };
    Ok(Arc::new(Database::open(&path)?))
}

fn job_controller(db: Arc<Database>, client: OllamaClient, cfg: &VsumConfig) -> JobController {
    let generator = OllamaGenerator::new(client, cfg.model(None));
    JobController::with_options(db, Arc::new(generator), cfg.job_options())
}

/// Poll one job to the end, showing progress on stderr.
fn wait_for(
    controller: &JobController,
    subject: String,
    task_id: String,
    cfg: &VsumConfig,
    cancel: &CancelFlag,
    quiet: bool,
) -> Result<GenerateResult> {
    let show = |job: &Job| {
        if !quiet {
            eprint!("\r{}", table::progress_line(job));
            let _ = std::io::stderr().flush();
        }
    };
    let outcome = controller.await_completion(&task_id, cfg.poll_interval(), cancel, show)?;
    if !quiet {
        eprintln!();
    }

    let mut result = GenerateResult {
        subject,
        task_id: Some(task_id),
        outcome: "completed",
        version: None,
        error: None,
    };

    match outcome {
        PollOutcome::Completed => {
            let latest = controller.db().latest_completed(&result.subject)?;
            if !quiet {
                println!("{}: stored v{} ({})", result.subject, latest.version, latest.model_used);
            }
            result.version = Some(latest.version);
        }
        PollOutcome::Failed(message) => {
            if !quiet {
                println!("{}: failed: {message}", result.subject);
            }
            result.outcome = "failed";
            result.error = Some(message);
        }
        PollOutcome::Superseded { by } => {
            if !quiet {
                println!("{}: superseded by job {by}", result.subject);
            }
            result.outcome = "superseded";
        }
        PollOutcome::Cancelled => {
            if !quiet {
                println!("{}: timed out", result.subject);
            }
            result.outcome = "cancelled";
        }
    }
    Ok(result)
}

/// A flag that trips after `timeout` seconds, or never.
fn cancel_after(timeout: Option<u64>) -> CancelFlag {
    let flag = CancelFlag::new();
    if let Some(secs) = timeout {
        let trip = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            trip.cancel();
        });
    }
    flag
}

fn latest_version_number(db: &Database, subject: &str) -> Result<Option<i64>> {
    match db.latest_completed(subject) {
        Ok(v) => Ok(Some(v.version)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Expand glob patterns; plain arguments are kept as given.
fn expand_subjects(args: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut subjects = Vec::new();

    for arg in args {
        if !arg.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            if seen.insert(arg.clone()) {
                subjects.push(arg.clone());
            }
            continue;
        }

        let matches: Vec<_> = glob::glob(arg)
            .with_context(|| format!("Invalid glob pattern: {arg}"))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            warn!("No files found matching: {arg}");
        }
        for path in matches {
            let subject = path.to_string_lossy().into_owned();
            if seen.insert(subject.clone()) {
                subjects.push(subject);
            }
        }
    }

    if subjects.is_empty() {
        bail!("No subjects to generate");
    }
    Ok(subjects)
}

fn render_file(file: &Path, transcript: Option<&Path>, json_output: bool) -> Result<()> {
    let summary = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let transcript = transcript
        .map(|p| {
            std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
        })
        .transpose()?;

    let doc = parse_summary(&summary, transcript.as_deref());
    if json_output {
        json_out::print_json(&doc)?;
    } else {
        table::print_document(&doc);
    }
    Ok(())
}
