//! Command handlers for the `jobscribe` binary.
//!
//! Wires configuration, out-of-process workers and the job service
//! together: config → dispatcher → service → submit/poll → stdout.

use crate::cli::{FetchArgs, TranscribeArgs};
use crate::config::Config;
use crate::defaults::{DIARIZATION_CAPABILITY, punctuation_queue, transcription_capability};
use crate::dispatch::{CommandWorker, Dispatcher, LocalDispatcher};
use crate::job::status::{JobStatus, Progress};
use crate::job::task::JobOutput;
use crate::service::{JobService, Submission};
use crate::store::{JsonFileStore, ResultStore};
use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often the front end polls a running job.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/jobscribe/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides are applied last, then the result is validated.
pub fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Install the stderr log subscriber.
///
/// `-v` shows info, `-vv` debug; `--quiet` keeps only errors. `RUST_LOG`
/// overrides all of them.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("jobscribe={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// One [`CommandWorker`] per configured queue.
pub fn build_dispatcher(config: &Config) -> LocalDispatcher {
    let mut dispatcher = LocalDispatcher::new();
    for (queue, worker) in &config.workers {
        let command = CommandWorker::new(worker.command.clone(), worker.args.clone());
        dispatcher.register(&worker.capability, queue, Arc::new(command));
    }
    dispatcher
}

/// Run the transcribe command: submit, follow progress on stderr, print JSON.
pub async fn run_transcribe(mut config: Config, args: TranscribeArgs, quiet: bool) -> Result<()> {
    let audio = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let extension = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("wav")
        .to_string();

    config.service.keep_audio |= args.keep_audio;
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(build_dispatcher(&config));
    let service = JobService::from_config(&config, dispatcher);

    let submission = service
        .submit(&audio, &extension, args.transcription_config(), args.no_cache)
        .await?;

    let output = match submission {
        Submission::Cached(result) => {
            if !quiet {
                eprintln!("{}", "Cached result".dimmed());
            }
            JobOutput::Result(result)
        }
        Submission::Accepted(job_id) => {
            if !quiet {
                eprintln!("{} {}", "Job".dimmed(), job_id);
                follow_progress(&service, job_id).await;
            }
            match service.wait(job_id).await {
                Ok(output) => output,
                Err(e) => {
                    eprintln!("{}", format!("Error: {e}").red());
                    bail!("transcription job {job_id} failed");
                }
            }
        }
    };

    println!("{}", render_output(&output)?);
    Ok(())
}

/// Run the fetch command: print a stored result from the configured store.
pub async fn run_fetch(config: &Config, args: FetchArgs) -> Result<()> {
    let store = JsonFileStore::new(&config.store.path);
    println!("{}", render_fetched(&store, &args).await?);
    Ok(())
}

/// JSON payload of a stored result, or its speaker lines with `--lines`.
///
/// An undiarized result has no speaker lines; its text is printed instead.
async fn render_fetched(store: &dyn ResultStore, args: &FetchArgs) -> Result<String> {
    let Some(result) = store.fetch(&args.result_id).await? else {
        bail!("No stored result with id {}", args.result_id);
    };
    if !args.lines {
        return render_output(&JobOutput::Result(result));
    }
    let lines = result.speaker_lines();
    Ok(if lines.is_empty() {
        result.transcription_result
    } else {
        lines.join("\n")
    })
}

/// List configured workers and whether each is live, then what the service needs.
pub async fn run_capabilities(config: &Config) -> Result<()> {
    let dispatcher = build_dispatcher(config);
    let active = dispatcher.active_capabilities().await?;

    if config.workers.is_empty() {
        println!("No workers configured.");
    } else {
        println!("Workers:");
        for (queue, worker) in &config.workers {
            let state = if active.contains(&worker.capability) {
                "active".green().to_string()
            } else {
                "unavailable".red().to_string()
            };
            println!(
                "  {} {} ({}) {}",
                queue,
                worker.command.dimmed(),
                worker.capability,
                state
            );
        }
    }

    println!("Required:");
    let required = [
        ("transcription", transcription_capability(&config.service.name)),
        ("diarization", DIARIZATION_CAPABILITY.to_string()),
        ("punctuation", punctuation_queue(&config.service.language)),
    ];
    for (stage, capability) in required {
        let mark = if active.contains(&capability) {
            "●".green().to_string()
        } else {
            "○".dimmed().to_string()
        };
        println!("  {mark} {stage:<14} {capability}");
    }

    Ok(())
}

/// Print the effective configuration as TOML.
pub fn run_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Render progress updates on stderr until the job reaches a terminal state.
async fn follow_progress(service: &JobService, job_id: uuid::Uuid) {
    let mut last: Option<Progress> = None;
    loop {
        let status = service.poll(job_id);
        if let Some(progress) = status.progress()
            && last.as_ref() != Some(progress)
        {
            clear_line();
            eprint!("{}", format_progress(progress));
            last = Some(progress.clone());
        }
        if status.is_terminal() || matches!(status, JobStatus::Unknown) {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if last.is_some() {
        clear_line();
    }
}

fn format_progress(progress: &Progress) -> String {
    format!(
        "{} {}",
        format!("[{}/{}]", progress.current, progress.total).dimmed(),
        progress.step
    )
}

/// Clear the current terminal line.
fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// JSON printed on stdout: the result payload, or `{"result_id": ...}`.
fn render_output(output: &JobOutput) -> Result<String> {
    let json = match output {
        JobOutput::Result(result) => serde_json::to_string_pretty(result)?,
        JobOutput::ResultId(id) => {
            serde_json::to_string_pretty(&serde_json::json!({ "result_id": id }))?
        }
    };
    Ok(json)
}
