//! reclink-scheduler: decides when captures start and which files are kept.
//!
//! | Module       | Contents                                                        |
//! |--------------|-----------------------------------------------------------------|
//! | `monitor`    | Per-target liveness loop and the single check cycle             |
//! | `retention`  | Pure selection of recordings to delete under a retention policy |
//! | `sweeper`    | Periodic rotation sweep applying `retention` to disk and store  |
//! | `reconcile`  | Startup crash recovery and data repair                          |
//! | `refresher`  | Periodic size/duration refresh of running recordings            |
//! | `supervisor` | `SchedulerSupervisor`, the owner of all of the above            |

pub mod error;
pub mod monitor;
pub mod reconcile;
pub mod refresher;
pub mod retention;
pub mod supervisor;
pub mod sweeper;

pub use error::{Result, SchedulerError};
pub use monitor::CheckOutcome;
pub use reconcile::ReconcileReport;
pub use retention::select_for_deletion;
pub use supervisor::{MonitorStatus, SchedulerInfo, SchedulerSettings, SchedulerSupervisor};
pub use sweeper::SweepReport;
