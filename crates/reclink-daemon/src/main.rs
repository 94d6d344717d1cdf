use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use reclink_capture::resolve_binary;
use reclink_core::{RecordingId, ReclinkConfig, TargetId};
use reclink_platforms::PlatformRegistry;
use reclink_scheduler::reconcile::reconcile;
use reclink_scheduler::{CheckOutcome, SchedulerSettings, SchedulerSupervisor};
use reclink_store::{LifecycleRepository, SqliteRepository};

mod cli;

use cli::{print_json, Cli, Command, RecordingAction, TargetAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reclink=info,reclink_scheduler=info,reclink_capture=info,reclink_platforms=info,reclink_store=warn"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit --config > RECLINK_CONFIG > ~/.reclink/reclink.toml
    let config = ReclinkConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ReclinkConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let repo = Arc::new(
        SqliteRepository::open(db_path).with_context(|| format!("opening database {db_path}"))?,
    );

    let probe_binary = resolve_binary(&config.capture.binary);
    let platforms = Arc::new(PlatformRegistry::with_defaults(&config.platforms, &probe_binary)?);
    let scheduler =
        SchedulerSupervisor::new(repo.clone(), platforms, SchedulerSettings::from_config(&config));

    match cli.command {
        Command::Run => run(&scheduler).await,
        Command::Sweep => print_json(&scheduler.run_rotation_cleanup().await),
        Command::Reconcile => print_json(&reconcile(repo.as_ref())?),
        Command::Check { target_id } => {
            let outcome = scheduler.trigger_check_now(&TargetId::from(target_id)).await?;
            // A started capture belongs to this process; record it to the end.
            if let CheckOutcome::Started(id) = &outcome {
                print_json(&outcome)?;
                info!(recording_id = %id, "capturing, press Ctrl-C to stop");
                wait_for_capture(&scheduler, id).await?;
                return Ok(());
            }
            print_json(&outcome)
        }
        Command::Targets { action } => targets(&scheduler, repo.as_ref(), action).await,
        Command::Recordings { action } => recordings(&scheduler, repo.as_ref(), action).await,
    }
}

async fn run(scheduler: &SchedulerSupervisor) -> anyhow::Result<()> {
    scheduler.start().await?;
    info!(info = ?scheduler.info().await, "reclink running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.stop().await;
    Ok(())
}

async fn wait_for_capture(scheduler: &SchedulerSupervisor, id: &RecordingId) -> anyhow::Result<()> {
    let capture = scheduler.capture();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                capture.stop(id).await?;
                return Ok(());
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                if !capture.is_watching(id).await {
                    return Ok(());
                }
            }
        }
    }
}

async fn targets(
    scheduler: &SchedulerSupervisor,
    repo: &dyn LifecycleRepository,
    action: TargetAction,
) -> anyhow::Result<()> {
    match action {
        TargetAction::List => print_json(&scheduler.monitor_statuses().await?),
        TargetAction::Add(args) => {
            let existing = match &args.id {
                Some(id) => Some(
                    repo.get_target(&TargetId::from(id.as_str()))?
                        .with_context(|| format!("no target with id {id}"))?,
                ),
                None => None,
            };
            let target = scheduler.upsert_target(args.into_target(existing)).await?;
            print_json(&target)
        }
        TargetAction::Remove { target_id } => {
            scheduler.remove_target(&TargetId::from(target_id)).await?;
            Ok(())
        }
        TargetAction::Enable { target_id } => set_enabled(scheduler, repo, target_id, true).await,
        TargetAction::Disable { target_id } => set_enabled(scheduler, repo, target_id, false).await,
    }
}

async fn set_enabled(
    scheduler: &SchedulerSupervisor,
    repo: &dyn LifecycleRepository,
    target_id: String,
    enabled: bool,
) -> anyhow::Result<()> {
    let mut target = repo
        .get_target(&TargetId::from(target_id.as_str()))?
        .with_context(|| format!("no target with id {target_id}"))?;
    target.enabled = enabled;
    print_json(&scheduler.upsert_target(target).await?)
}

async fn recordings(
    scheduler: &SchedulerSupervisor,
    repo: &dyn LifecycleRepository,
    action: RecordingAction,
) -> anyhow::Result<()> {
    match action {
        RecordingAction::List {
            target,
            limit,
            active,
        } => {
            let mut rows = match (target, active) {
                (_, true) => scheduler.active_recordings()?,
                (Some(target), false) => repo.list_recordings(&TargetId::from(target))?,
                (None, false) => repo.list_recent_recordings(limit)?,
            };
            rows.truncate(limit);
            print_json(&rows)
        }
        RecordingAction::Favorite { recording_id } => {
            scheduler.set_favorite(&RecordingId::from(recording_id), true)?;
            Ok(())
        }
        RecordingAction::Unfavorite { recording_id } => {
            scheduler.set_favorite(&RecordingId::from(recording_id), false)?;
            Ok(())
        }
        RecordingAction::Delete { recording_id } => {
            scheduler
                .delete_recording(&RecordingId::from(recording_id))
                .await?;
            Ok(())
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
