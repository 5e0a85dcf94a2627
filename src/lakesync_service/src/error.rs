#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration invalid: {}", .0.join("; "))]
    Config(Vec<String>),
    #[error("lakesync error: {0}")]
    Lakesync(#[from] lakesync::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transfer exceeded its deadline of {0} seconds")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
