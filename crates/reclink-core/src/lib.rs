//! reclink-core: shared configuration, domain types and the recording
//! lifecycle state machine.
//!
//! | Module     | Contents                                                  |
//! |------------|-----------------------------------------------------------|
//! | `config`   | `ReclinkConfig` loaded from TOML + `RECLINK_*` env vars   |
//! | `types`    | `Target`, `RetentionPolicy`, `Recording`, `StreamInfo`    |
//! | `template` | Output file name template parsing and rendering           |
//! | `error`    | `CoreError` and the crate `Result` alias                  |

pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use config::ReclinkConfig;
pub use error::{CoreError, Result};
pub use template::{FilenameTemplate, TemplateVars, DEFAULT_TEMPLATE};
pub use types::{
    Recording, RecordingId, RecordingStatus, RetentionPolicy, RotationType, StreamInfo, Target,
    TargetId,
};
