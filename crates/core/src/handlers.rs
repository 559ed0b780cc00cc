//! Handler registry: explicit (provider, client) → handler mapping.
//!
//! Handlers are declared in a JSON manifest loaded once at startup:
//!
//! ```json
//! {
//!     "Distributor": {
//!         "Client_01": { "kind": "python", "path": "handlers/Client_01.py" }
//!     }
//! }
//! ```
//!
//! Resolution is a pure lookup that never errors at dispatch time; a
//! missing pair parks the task instead. Paths are checked once at startup
//! so a misconfigured manifest surfaces before the first dispatch, not as
//! a per-task surprise.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CoreError;

/// Runtime a handler executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// `python3 <path>`.
    Python,
    /// `bash <path>`.
    Shell,
    /// Direct exec; checked for execute permission before spawning.
    Binary,
}

/// One registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandlerSpec {
    pub kind: HandlerKind,
    pub path: PathBuf,
}

/// Startup-loaded mapping from (provider, client) to a handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), HandlerSpec>,
}

impl HandlerRegistry {
    /// Load and parse the JSON manifest at `manifest_path`.
    pub async fn load(manifest_path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(manifest_path).await?;
        let manifest: HashMap<String, HashMap<String, HandlerSpec>> =
            serde_json::from_slice(&bytes)?;

        let mut handlers = HashMap::new();
        for (provider, clients) in manifest {
            for (client, spec) in clients {
                handlers.insert((provider.clone(), client), spec);
            }
        }
        Ok(Self { handlers })
    }

    /// Build a registry from explicit entries. Used by tests and embedders.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String, HandlerSpec)>,
    {
        let handlers = entries
            .into_iter()
            .map(|(provider, client, spec)| ((provider, client), spec))
            .collect();
        Self { handlers }
    }

    /// Look up the handler for a (provider, client) pair.
    pub fn resolve(&self, provider: &str, client: &str) -> Option<&HandlerSpec> {
        self.handlers
            .get(&(provider.to_string(), client.to_string()))
    }

    /// Check that every registered handler path exists, logging a warning
    /// per miss. Returns the number of missing paths.
    ///
    /// Misses do not fail startup: the corresponding tasks park with
    /// NO_SCRIPT_FOUND and recover once the path appears.
    pub async fn validate(&self) -> usize {
        let mut missing = 0;
        for ((provider, client), spec) in &self.handlers {
            if !tokio::fs::try_exists(&spec.path).await.unwrap_or(false) {
                tracing::warn!(
                    provider = %provider,
                    client = %client,
                    path = %spec.path.display(),
                    "registered handler path does not exist"
                );
                missing += 1;
            }
        }
        missing
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_manifest(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("create temp file");
        f.write_all(json.as_bytes()).expect("write manifest");
        f
    }

    #[tokio::test]
    async fn load_parses_nested_manifest() {
        let f = write_manifest(
            r#"{
                "Distributor": {
                    "Client_01": { "kind": "python", "path": "/opt/handlers/Client_01.py" },
                    "Client_02": { "kind": "shell", "path": "/opt/handlers/Client_02.sh" }
                },
                "Chain": {
                    "Client_03": { "kind": "binary", "path": "/opt/handlers/client_03" }
                }
            }"#,
        );

        let registry = HandlerRegistry::load(f.path()).await.expect("load");
        assert_eq!(registry.len(), 3);

        let spec = registry.resolve("Distributor", "Client_01").expect("hit");
        assert_eq!(spec.kind, HandlerKind::Python);
        assert_eq!(spec.path, PathBuf::from("/opt/handlers/Client_01.py"));

        let spec = registry.resolve("Chain", "Client_03").expect("hit");
        assert_eq!(spec.kind, HandlerKind::Binary);
    }

    #[tokio::test]
    async fn resolve_misses_return_none() {
        let f = write_manifest(r#"{"Distributor": {"Client_01": {"kind": "python", "path": "/x.py"}}}"#);
        let registry = HandlerRegistry::load(f.path()).await.expect("load");

        assert!(registry.resolve("Distributor", "Client_99").is_none());
        assert!(registry.resolve("Unknown", "Client_01").is_none());
    }

    #[tokio::test]
    async fn load_rejects_unknown_kind() {
        let f = write_manifest(r#"{"Distributor": {"Client_01": {"kind": "perl", "path": "/x.pl"}}}"#);
        let result = HandlerRegistry::load(f.path()).await;
        assert!(matches!(result, Err(CoreError::Manifest(_))));
    }

    #[tokio::test]
    async fn load_missing_manifest_is_io_error() {
        let result = HandlerRegistry::load(Path::new("/nonexistent/handlers.json")).await;
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[tokio::test]
    async fn validate_counts_missing_paths() {
        let existing = tempfile::NamedTempFile::new().expect("create temp file");
        let registry = HandlerRegistry::from_entries([
            (
                "Distributor".to_string(),
                "Client_01".to_string(),
                HandlerSpec {
                    kind: HandlerKind::Shell,
                    path: existing.path().to_path_buf(),
                },
            ),
            (
                "Distributor".to_string(),
                "Client_02".to_string(),
                HandlerSpec {
                    kind: HandlerKind::Shell,
                    path: PathBuf::from("/nonexistent/handler.sh"),
                },
            ),
        ]);

        assert_eq!(registry.validate().await, 1);
    }
}
