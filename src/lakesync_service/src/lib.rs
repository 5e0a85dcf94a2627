mod config;
mod error;
mod transfer;

pub use config::{
    EndpointConfig, IcebergEndpointConfig, IncrementalSettings, TransferConfig, TransferType,
};
pub use error::{Error, Result};
pub use transfer::{run_transfer, TransferReport};

/// Install the process-wide subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
