//! Actor snapshot files.
//!
//! The rules engine only reads snapshots; writing is offered for fixtures
//! and for the console. A snapshot file is either a versioned envelope or a
//! bare entity document as exported by the host.

use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot root must be an actor, found '{0}'")]
    NotAnActor(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot envelope version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A saved actor with enough metadata to list it without a full parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub saved_at: String,
    pub metadata: SnapshotMetadata,
    pub actor: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub item_count: usize,
}

impl SnapshotFile {
    pub fn new(actor: Entity) -> Self {
        let metadata = SnapshotMetadata {
            name: actor.name.clone(),
            kind: actor.kind.name().to_string(),
            item_count: actor.items.len(),
        };
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: timestamp(),
            metadata,
            actor,
        }
    }
}

/// Parse snapshot JSON, accepting an envelope or a bare actor document.
pub fn parse_snapshot(content: &str) -> Result<Entity, SnapshotError> {
    let raw: serde_json::Value = serde_json::from_str(content)?;

    let actor: Entity = if raw.get("actor").is_some() && raw.get("version").is_some() {
        let file: SnapshotFile = serde_json::from_value(raw)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: file.version,
            });
        }
        file.actor
    } else {
        serde_json::from_value(raw)?
    };

    if !actor.is_actor() {
        return Err(SnapshotError::NotAnActor(actor.kind.name().to_string()));
    }
    Ok(actor)
}

/// Load an actor snapshot from a JSON file.
pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Entity, SnapshotError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).await?;
    let actor = parse_snapshot(&content)?;
    tracing::debug!(path = %path.display(), actor = %actor.name, items = actor.items.len(), "snapshot loaded");
    Ok(actor)
}

/// Save an actor snapshot wrapped in a versioned envelope.
pub async fn save_snapshot(actor: &Entity, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let file = SnapshotFile::new(actor.clone());
    let content = serde_json::to_string_pretty(&file)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Read only the envelope metadata.
pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SnapshotMetadata, SnapshotError> {
    let content = fs::read_to_string(path).await?;

    #[derive(Deserialize)]
    struct Partial {
        version: u32,
        metadata: SnapshotMetadata,
    }

    let partial: Partial = serde_json::from_str(&content)?;
    if partial.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            found: partial.version,
        });
    }
    Ok(partial.metadata)
}

/// File name for an actor's snapshot inside `dir`.
pub fn snapshot_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    dir.as_ref().join(format!("{sanitized}.json"))
}

fn timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs().to_string()
}
