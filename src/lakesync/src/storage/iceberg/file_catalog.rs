use crate::error::{Error, Result};
use crate::storage::iceberg::table_metadata::TableMetadata;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const METADATA_DIRECTORY: &str = "metadata";
pub const DATA_DIRECTORY: &str = "data";
pub const VERSION_HINT_FILENAME: &str = "version-hint.text";

/// Filesystem catalog for a local warehouse.
///
/// Owns every mutation under `<table>/metadata/`: it is the only component
/// that writes `version-hint.text` and `v{N}.metadata.json`. Commits are
/// versioned and made visible by renaming a scratch hint file over the hint,
/// so a reader either observes the prior version or the new one. Writers to
/// the same table within one process are serialized on a per-table mutex;
/// cross-process coordination is best-effort single-writer by contract.
pub struct FileCatalog {
    warehouse_path: PathBuf,
    commit_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileCatalog {
    pub fn new(warehouse_path: impl Into<PathBuf>) -> Self {
        Self {
            warehouse_path: warehouse_path.into(),
            commit_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn warehouse_path(&self) -> &Path {
        &self.warehouse_path
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.warehouse_path.join(table)
    }

    pub fn metadata_dir(&self, table: &str) -> PathBuf {
        self.table_path(table).join(METADATA_DIRECTORY)
    }

    pub fn data_dir(&self, table: &str) -> PathBuf {
        self.table_path(table).join(DATA_DIRECTORY)
    }

    /// Create the table layout (`metadata/` and `data/`). Idempotent.
    pub async fn initialize_table(&self, table: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(self.metadata_dir(table)).await?;
        tokio::fs::create_dir_all(self.data_dir(table)).await?;
        Ok(self.table_path(table))
    }

    /// The version named by `version-hint.text`, or none when the hint file
    /// is absent or does not parse as an integer.
    pub async fn current_version(&self, table: &str) -> Result<Option<u64>> {
        let hint_path = self.metadata_dir(table).join(VERSION_HINT_FILENAME);
        let content = match tokio::fs::read_to_string(&hint_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match content.trim().parse::<u64>() {
            Ok(version) => Ok(Some(version)),
            Err(_) => {
                warn!(table, hint = %content.trim(), "version hint is not an integer");
                Ok(None)
            }
        }
    }

    /// Atomically commit `metadata` as the next table version.
    ///
    /// Writes `v{N+1}.metadata.json`, then writes a scratch hint file and
    /// renames it over `version-hint.text` in a single filesystem rename.
    /// Interruption before the rename leaves the new metadata file dangling
    /// and unreferenced; readers keep following the prior hint. If the hint
    /// moved between the initial read and the rename, the commit is abandoned
    /// with [`Error::CommitConflict`] and the orphan stays on disk.
    pub async fn commit(
        &self,
        table: &str,
        metadata: &TableMetadata,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let lock = self.table_commit_lock(table).await;
        let _guard = lock.lock().await;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let observed_version = self.current_version(table).await?;
        let next_version = observed_version.unwrap_or(0) + 1;
        let metadata_dir = self.metadata_dir(table);
        let metadata_path = metadata_dir.join(format!("v{next_version}.metadata.json"));
        let json = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(&metadata_path, json).await?;

        if cancel.is_cancelled() {
            // The unreferenced v{N+1} file is garbage, not corruption.
            return Err(Error::Cancelled);
        }

        // Lost-update detection: another writer may have advanced the hint
        // while the metadata file was being written.
        if self.current_version(table).await? != observed_version {
            return Err(Error::commit_conflict(format!(
                "version hint for table {table} moved during commit of v{next_version}"
            )));
        }

        let hint_path = metadata_dir.join(VERSION_HINT_FILENAME);
        let scratch_path = metadata_dir.join(format!(
            "{VERSION_HINT_FILENAME}.{:08x}",
            rand::random::<u32>()
        ));
        tokio::fs::write(&scratch_path, next_version.to_string()).await?;
        tokio::fs::rename(&scratch_path, &hint_path).await?;

        debug!(table, version = next_version, "committed table metadata");
        Ok(next_version)
    }

    /// Load the current metadata, following the version hint. Returns none
    /// when the table has never been committed; a hint that names a missing
    /// metadata file is logged as a corruption signal and also yields none.
    pub async fn load_table(&self, table: &str) -> Result<Option<TableMetadata>> {
        let version = match self.current_version(table).await? {
            Some(version) => version,
            None => return Ok(None),
        };
        let metadata_path = self
            .metadata_dir(table)
            .join(format!("v{version}.metadata.json"));
        let bytes = match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    table,
                    version,
                    "version hint names a missing metadata file; treating table as unreadable"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let metadata: TableMetadata = serde_json::from_slice(&bytes)?;
        Ok(Some(metadata))
    }

    async fn table_commit_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().await;
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
