//! reclink-platforms: per-platform liveness checks and capture arguments.
//!
//! Each streaming platform implements [`PlatformProvider`]; the
//! [`PlatformRegistry`] maps a target's `platform` string to its provider.
//!
//! | Platform   | Liveness source                                   |
//! |------------|---------------------------------------------------|
//! | `twitch`   | Helix `streams` endpoint, dry-run probe otherwise |
//! | `youtube`  | dry-run probe                                     |
//! | `chzzk`    | public channel API (`content.openLive`)           |
//! | `sooplive` | `player_live_api` (`CHANNEL.RESULT`)              |

pub mod chzzk;
pub mod error;
pub mod probe;
pub mod provider;
pub mod registry;
pub mod sooplive;
pub mod twitch;
pub mod youtube;

pub use error::{PlatformError, Result};
pub use probe::StreamProbe;
pub use provider::PlatformProvider;
pub use registry::PlatformRegistry;
