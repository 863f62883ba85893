//! File-backed route table
//!
//! The table is a single JSON object shared between the export scheduler
//! (writer) and the reverse proxy (reader), which usually run as separate
//! processes. Writes go to a temporary file in the same directory and are
//! renamed over the target, so a reader only ever observes a complete
//! table. Writers inside one process are serialized so concurrent exports
//! never drop each other's entries.

use lumos_proto::RouteTable;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Route table errors
#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("IO error on route table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize route table: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RouteTableError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Persistent instance-name -> base-URL mapping
pub struct RouteTableStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RouteTableStore {
    /// Create a store backed by the given file (created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole table
    ///
    /// A missing or blank file is an empty table. Unparsable content is
    /// discarded with a warning and also yields an empty table; the next
    /// write replaces it.
    pub async fn load_all(&self) -> Result<RouteTable, RouteTableError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("Route table {:?} does not exist yet", self.path);
                return Ok(RouteTable::new());
            }
            Err(e) => return Err(RouteTableError::io(&self.path, e)),
        };

        Ok(Self::parse(&content, &self.path))
    }

    fn parse(content: &[u8], path: &Path) -> RouteTable {
        let content = match std::str::from_utf8(content) {
            Ok(content) => content.trim(),
            Err(e) => {
                warn!(
                    "Route table {:?} is not valid UTF-8, discarding its entries: {}",
                    path, e
                );
                return RouteTable::new();
            }
        };
        if content.is_empty() {
            return RouteTable::new();
        }

        match serde_json::from_str::<RouteTable>(content) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    "Route table {:?} is corrupt, discarding its entries: {}",
                    path, e
                );
                RouteTable::new()
            }
        }
    }

    /// Base URL for one instance, if routed
    pub async fn lookup(&self, name: &str) -> Result<Option<String>, RouteTableError> {
        let mut table = self.load_all().await?;
        Ok(table.remove(name))
    }

    /// Insert or overwrite one entry and rewrite the table
    pub async fn upsert(&self, name: &str, url: &str) -> Result<(), RouteTableError> {
        let _guard = self.write_lock.lock().await;

        let mut table = self.load_all().await?;
        if let Some(previous) = table.insert(name.to_string(), url.to_string()) {
            debug!("Replacing route {} ({} -> {})", name, previous, url);
        }
        self.write_atomic(&table).await?;

        debug!("Published route /{} -> {}", name, url);
        Ok(())
    }

    /// Remove one entry, returning its previous base URL
    pub async fn remove(&self, name: &str) -> Result<Option<String>, RouteTableError> {
        let _guard = self.write_lock.lock().await;

        let mut table = self.load_all().await?;
        let removed = table.remove(name);
        if removed.is_some() {
            self.write_atomic(&table).await?;
            debug!("Removed route /{}", name);
        }

        Ok(removed)
    }

    async fn write_atomic(&self, table: &RouteTable) -> Result<(), RouteTableError> {
        let json = serde_json::to_string_pretty(table)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RouteTableError::io(parent, e))?;
        }

        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| RouteTableError::io(&tmp_path, e))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(RouteTableError::io(&self.path, e));
        }

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "routes".to_string());

        self.path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name,
            Uuid::new_v4().simple()
        ))
    }
}
