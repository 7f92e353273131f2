mod bootstrap;
mod report;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use spy_core::error::SpyError;
use spy_core::models::MonitorSnapshot;
use spy_core::settings::{Settings, SpyCommand};
use spy_core::source::CPU_SYSFS_ROOT;
use spy_core::store::PersistedState;
use spy_core::time_utils::boot_time_local;
use spy_data::kernel::kernel_version;
use spy_data::reader::find_time_in_state_tables;
use spy_runtime::lifecycle::{open_monitor, persist_if_invalidated, persist_offsets};
use spy_runtime::orchestrator::{WatchEvent, WatchOrchestrator};
use spy_runtime::worker::{RefreshOutcome, RefreshWorker};

use crate::report::{Report, View};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = Settings::load();
    let state_path = settings.state_path();

    bootstrap::ensure_state_dir(&state_path)?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("CPU Spy v{} starting", env!("CARGO_PKG_VERSION"));

    let command = settings.action();
    tracing::debug!(?command, cpu = settings.cpu, state = %state_path.display(), "dispatching");

    match command {
        SpyCommand::Sources => {
            list_sources(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
        SpyCommand::Watch { interval } => watch(&settings, interval).await,
        command => match run_once(&settings, command).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(e) if e.downcast_ref::<SpyError>().is_some_and(SpyError::is_unavailable) => {
                eprintln!("No time-in-state data: {e}");
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e),
        },
    }
}

// ── One-shot commands ──────────────────────────────────────────────────────────

async fn run_once(settings: &Settings, command: SpyCommand) -> Result<()> {
    let state_path = settings.state_path();
    let worker = RefreshWorker::new(open_monitor(settings));

    let (view, snapshot) = match command {
        SpyCommand::Refresh => {
            let adjusted = refreshed(&worker).await?;
            let raw = worker.with_monitor(|m| m.raw_states().clone()).await?;
            let snapshot = MonitorSnapshot {
                total_ticks: raw.total_ticks(),
                states: raw,
                ..adjusted
            };
            (View::Raw, snapshot)
        }
        SpyCommand::Reset => {
            let snapshot = worker.mark_offsets().await?;
            save(&worker, &state_path).await?;
            if !settings.json {
                println!("Counters reset.");
            }
            (View::Adjusted, snapshot)
        }
        SpyCommand::Restore => {
            worker.with_monitor(|m| m.clear_offsets()).await?;
            PersistedState::clear_at(&state_path)
                .with_context(|| format!("removing {}", state_path.display()))?;
            if !settings.json {
                println!("Offsets removed; showing time since boot.");
            }
            (View::Adjusted, refreshed(&worker).await?)
        }
        _ => (View::Adjusted, refreshed(&worker).await?),
    };

    // Restore already removed the state file.
    if command != SpyCommand::Restore {
        save_if_invalidated(&worker, &snapshot, &state_path).await?;
    }

    print_report(settings, &worker, view, snapshot).await
}

/// Refresh and return the adjusted view.
async fn refreshed(worker: &RefreshWorker) -> Result<MonitorSnapshot> {
    match worker.refresh().await? {
        RefreshOutcome::Completed(snapshot) => Ok(snapshot),
        RefreshOutcome::Skipped => Ok(worker.with_monitor(|m| m.snapshot()).await?),
    }
}

async fn save(worker: &RefreshWorker, state_path: &Path) -> Result<()> {
    let path = state_path.to_path_buf();
    worker
        .with_monitor(move |m| persist_offsets(m, &path))
        .await?
        .with_context(|| format!("saving offsets to {}", state_path.display()))
}

async fn save_if_invalidated(
    worker: &RefreshWorker,
    snapshot: &MonitorSnapshot,
    state_path: &Path,
) -> Result<()> {
    if snapshot.notice.is_none() {
        return Ok(());
    }
    let (snapshot, path) = (snapshot.clone(), state_path.to_path_buf());
    worker
        .with_monitor(move |m| persist_if_invalidated(m, &snapshot, &path))
        .await?
        .with_context(|| format!("saving offsets to {}", state_path.display()))?;
    Ok(())
}

async fn print_report(
    settings: &Settings,
    worker: &RefreshWorker,
    view: View,
    snapshot: MonitorSnapshot,
) -> Result<()> {
    let (source, boot_epoch_ms) = worker
        .with_monitor(|m| (m.source_description(), m.boot_epoch_ms()))
        .await?;
    let report = Report {
        view,
        source,
        snapshot,
        kernel: kernel_version(),
        boot_time: boot_time_local(boot_epoch_ms),
    };

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&report::report_to_json(&report))?);
    } else {
        print!("{}", report::render_text(&report));
    }
    Ok(())
}

// ── Watch ──────────────────────────────────────────────────────────────────────

async fn watch(settings: &Settings, interval: u64) -> Result<ExitCode> {
    let state_path = settings.state_path();
    let worker = RefreshWorker::new(open_monitor(settings));

    tracing::info!(interval, "starting watch");
    let (mut rx, handle) = WatchOrchestrator::new(interval, worker.clone()).start();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::debug!("watch loop ended");
                    break;
                };
                match event {
                    WatchEvent::Snapshot(snapshot) => {
                        save_if_invalidated(&worker, &snapshot, &state_path).await?;
                        print_report(settings, &worker, View::Adjusted, snapshot).await?;
                        if !settings.json {
                            println!();
                        }
                    }
                    WatchEvent::Unavailable(message) => {
                        eprintln!("No time-in-state data: {message}");
                    }
                    WatchEvent::Failed(message) => {
                        eprintln!("Refresh failed: {message}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping watch");
                break;
            }
        }
    }

    handle.abort();
    Ok(ExitCode::SUCCESS)
}

// ── Sources ────────────────────────────────────────────────────────────────────

fn list_sources(settings: &Settings) -> Result<()> {
    let tables = find_time_in_state_tables(Path::new(CPU_SYSFS_ROOT));
    if settings.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report::sources_to_json(&tables, settings.cpu))?
        );
    } else {
        print!("{}", report::render_sources(&tables, settings.cpu));
    }
    Ok(())
}
