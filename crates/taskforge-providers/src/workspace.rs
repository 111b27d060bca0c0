//! Workspace manager - per-owner filesystem directories for CLI executions
//!
//! A workspace is created lazily on first use, reused across executions for
//! the same owner/provider pair, and never shared across owners. Rotation
//! archives the old directory rather than deleting it, so artifacts from
//! earlier runs stay recoverable.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::ProviderError;

/// Creates and tracks workspace directories under a configured root
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Resolve (and lazily create) the workspace for an owner/provider pair
    pub fn workspace_for(
        &self,
        owner_id: &str,
        provider_id: &str,
    ) -> Result<PathBuf, ProviderError> {
        validate_segment(owner_id)?;
        validate_segment(provider_id)?;

        let path = self.root.join(owner_id).join(provider_id);
        if !path.exists() {
            fs::create_dir_all(&path)
                .map_err(|e| ProviderError::Config(format!("cannot create workspace: {e}")))?;
            debug!(workspace = %path.display(), "Created workspace");
        }
        Ok(path)
    }

    /// Rotate a workspace: archive the current directory with a timestamp
    /// suffix and create a fresh one.
    pub fn rotate(&self, owner_id: &str, provider_id: &str) -> Result<PathBuf, ProviderError> {
        let path = self.workspace_for(owner_id, provider_id)?;

        let archived = path.with_file_name(format!(
            "{}-{}",
            provider_id,
            Utc::now().format("%Y%m%dT%H%M%S")
        ));
        fs::rename(&path, &archived)
            .map_err(|e| ProviderError::Config(format!("cannot archive workspace: {e}")))?;
        fs::create_dir_all(&path)
            .map_err(|e| ProviderError::Config(format!("cannot recreate workspace: {e}")))?;

        info!(
            workspace = %path.display(),
            archived = %archived.display(),
            "Rotated workspace"
        );
        Ok(path)
    }
}

/// Owner and provider ids become path segments; keep them contained.
fn validate_segment(segment: &str) -> Result<(), ProviderError> {
    if segment.is_empty() || segment.contains(['/', '\\', '\0']) || segment.starts_with('.') {
        return Err(ProviderError::Config(format!(
            "invalid workspace segment: {segment}"
        )));
    }
    Ok(())
}
