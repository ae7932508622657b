pub mod analytics;
pub mod app;
pub mod codec;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod phases;
pub mod records;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;

pub use app::router;
pub use config::Config;
pub use state::{AppState, Journal};
pub use sync::{SyncCoordinator, SyncOutcome, SyncPhase, SyncStatus};
