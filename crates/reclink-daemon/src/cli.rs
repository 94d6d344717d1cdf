use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use reclink_core::{RetentionPolicy, RotationType, Target};

#[derive(Parser)]
#[command(name = "reclink", version, about = "Unattended live-stream recorder")]
pub struct Cli {
    /// Config file (overrides RECLINK_CONFIG and ~/.reclink/reclink.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Apply retention policies once
    Sweep,
    /// Repair recording rows left by an unclean shutdown
    Reconcile,
    /// Check one target now and start capturing if it is live
    Check { target_id: String },
    /// Manage monitored targets
    Targets {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Inspect and manage recordings
    Recordings {
        #[command(subcommand)]
        action: RecordingAction,
    },
}

#[derive(Subcommand)]
pub enum TargetAction {
    /// List targets and whether they are monitored
    List,
    /// Add a target, or update it when --id names an existing one
    Add(TargetArgs),
    Remove { target_id: String },
    Enable { target_id: String },
    Disable { target_id: String },
}

#[derive(Subcommand)]
pub enum RecordingAction {
    /// Recent recordings, newest first
    List {
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only pending/recording rows
        #[arg(long)]
        active: bool,
    },
    Favorite { recording_id: String },
    Unfavorite { recording_id: String },
    /// Delete the file and the row
    Delete { recording_id: String },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Existing target to update
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub platform: String,
    /// Channel id, login or handle on the platform
    #[arg(long = "broadcaster")]
    pub broadcaster_id: String,
    #[arg(long = "name")]
    pub display_name: Option<String>,
    #[arg(long, default_value = "best")]
    pub quality: String,
    /// Extra capture arguments, whitespace separated
    #[arg(long, allow_hyphen_values = true)]
    pub custom_args: Option<String>,
    /// File extension, e.g. mp4 or ts
    #[arg(long = "format")]
    pub output_format: Option<String>,
    /// e.g. "{streamer_id}_{yyyyMMdd}_{HHmmss}"
    #[arg(long)]
    pub template: Option<String>,
    #[arg(long)]
    pub disabled: bool,

    /// Enable rotation with this policy: time, count or size
    #[arg(long)]
    pub rotation: Option<RotationType>,
    #[arg(long)]
    pub max_age_days: Option<u32>,
    #[arg(long)]
    pub max_count: Option<u32>,
    #[arg(long)]
    pub max_size_gb: Option<f64>,
    /// Let rotation delete favorites
    #[arg(long)]
    pub no_protect_favorites: bool,
    /// Keep zero-byte recordings
    #[arg(long)]
    pub keep_empty: bool,
}

impl TargetArgs {
    /// Build the target, layered over `existing` when updating.
    pub fn into_target(self, existing: Option<Target>) -> Target {
        let display_name = self
            .display_name
            .unwrap_or_else(|| self.broadcaster_id.clone());
        let mut target = match existing {
            Some(mut t) => {
                t.platform = self.platform;
                t.broadcaster_id = self.broadcaster_id;
                t.display_name = display_name;
                t
            }
            None => Target::new(self.platform, self.broadcaster_id, display_name),
        };
        target.quality = self.quality;
        target.custom_args = self.custom_args;
        target.output_format = self.output_format;
        target.filename_template = self.template;
        target.enabled = !self.disabled;
        target.policy = RetentionPolicy {
            rotation_enabled: self.rotation.is_some(),
            rotation_type: self.rotation,
            max_age_days: self.max_age_days,
            max_count: self.max_count,
            max_size_gb: self.max_size_gb,
            protect_favorites: !self.no_protect_favorites,
            delete_empty_files: !self.keep_empty,
        };
        target
    }
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
