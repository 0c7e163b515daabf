pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod migrate;
pub mod model;
pub mod ordering;
pub mod session;
pub mod storage;
pub mod validate;

pub use error::{AppError, AppResult};
pub use model::{default_config, PortfolioConfig, CONFIG_FILE_NAME, UNCATEGORIZED_ID};

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
