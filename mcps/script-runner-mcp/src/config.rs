//! Configuration document loading and the live snapshot store
//!
//! The document lists scripts and the directory they run in. The store keeps
//! the current [`ConfigSnapshot`] behind an `Arc` and replaces it wholesale on
//! reload or working-directory change, so readers never see a partial update
//! and in-flight executions keep the snapshot they started with.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::types::{
    ConfigSnapshot, ScriptDefinition, ScriptRunnerError, DEFAULT_MAX_OUTPUT_BYTES,
    DEFAULT_TIMEOUT_SECS,
};

/// Document looked up in the current directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = ".mcp-config.json";

// ============================================================================
// Document Types
// ============================================================================

/// On-disk configuration; unknown keys (e.g. container settings) are ignored
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    working_directory: Option<String>,

    #[serde(default, deserialize_with = "ordered_scripts")]
    scripts: Vec<(String, ScriptEntry)>,

    #[serde(default = "default_max_output")]
    max_output_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    /// Redundant with the map key; kept for compatibility with older documents
    #[serde(default)]
    name: Option<String>,

    path: String,

    #[serde(default)]
    description: String,

    #[serde(default)]
    arguments: Vec<String>,

    #[serde(default = "default_timeout")]
    timeout: u64,

    #[serde(default)]
    working_directory: Option<String>,

    #[serde(default)]
    interpreter: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_output() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

/// Deserialize the `scripts` map keeping document order and rejecting duplicate names
fn ordered_scripts<'de, D>(deserializer: D) -> Result<Vec<(String, ScriptEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedScripts;

    impl<'de> Visitor<'de> for OrderedScripts {
        type Value = Vec<(String, ScriptEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of script name to script definition")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut scripts: Vec<(String, ScriptEntry)> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, entry)) = map.next_entry::<String, ScriptEntry>()? {
                if scripts.iter().any(|(existing, _)| *existing == name) {
                    return Err(de::Error::custom(format!(
                        "duplicate script name '{}'",
                        name
                    )));
                }
                scripts.push((name, entry));
            }
            Ok(scripts)
        }
    }

    deserializer.deserialize_any(OrderedScripts)
}

// ============================================================================
// Loading
// ============================================================================

/// Load a snapshot from `path`
///
/// A missing file yields an empty registry rooted at the current directory.
/// `.toml` files are parsed as TOML, everything else as JSON.
pub fn load(path: &Path) -> Result<ConfigSnapshot, ScriptRunnerError> {
    if !path.exists() {
        let cwd = std::env::current_dir().map_err(|e| {
            ScriptRunnerError::ConfigError(format!("cannot determine current directory: {}", e))
        })?;
        info!(
            "No config at {}, starting with an empty script registry",
            path.display()
        );
        return Ok(ConfigSnapshot::empty(cwd));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ScriptRunnerError::ConfigError(format!("failed to read {}: {}", path.display(), e))
    })?;

    let document = parse_document(path, &content)?;
    build_snapshot(path, document)
}

fn parse_document(path: &Path, content: &str) -> Result<ConfigDocument, ScriptRunnerError> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let parsed = if is_toml {
        toml::from_str::<ConfigDocument>(content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<ConfigDocument>(content).map_err(|e| e.to_string())
    };

    parsed.map_err(|e| {
        ScriptRunnerError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
    })
}

fn build_snapshot(
    path: &Path,
    document: ConfigDocument,
) -> Result<ConfigSnapshot, ScriptRunnerError> {
    // Relative working directories are anchored at the document, not the process
    let base = document_dir(path)?;
    let requested = match &document.working_directory {
        Some(dir) => base.join(resolve_path(dir)),
        None => base,
    };
    let working_directory = canonical_dir(&requested).map_err(|reason| {
        ScriptRunnerError::ConfigError(format!(
            "working_directory {}: {}",
            requested.display(),
            reason
        ))
    })?;

    if document.max_output_bytes == 0 {
        return Err(ScriptRunnerError::ConfigError(
            "max_output_bytes must be greater than zero".to_string(),
        ));
    }

    let mut scripts = Vec::with_capacity(document.scripts.len());
    for (name, entry) in document.scripts {
        if entry.timeout == 0 {
            return Err(ScriptRunnerError::ConfigError(format!(
                "script '{}': timeout must be at least 1 second",
                name
            )));
        }
        if entry.path.trim().is_empty() {
            return Err(ScriptRunnerError::ConfigError(format!(
                "script '{}': path must not be empty",
                name
            )));
        }
        if let Some(declared) = entry.name.as_deref() {
            if declared != name {
                warn!(
                    key = %name,
                    declared,
                    "Script entry name differs from its key; using the key"
                );
            }
        }

        scripts.push(ScriptDefinition {
            path: resolve_path(&entry.path),
            description: entry.description,
            argument_names: entry.arguments,
            timeout_seconds: entry.timeout,
            working_directory: entry.working_directory.as_deref().map(resolve_path),
            interpreter: entry.interpreter.filter(|i| !i.trim().is_empty()),
            name,
        });
    }

    debug!(
        scripts = scripts.len(),
        "Parsed configuration from {}",
        path.display()
    );

    Ok(ConfigSnapshot {
        working_directory,
        scripts: Arc::new(scripts),
        max_output_bytes: document.max_output_bytes,
        source: Some(path.to_path_buf()),
    })
}

fn document_dir(path: &Path) -> Result<PathBuf, ScriptRunnerError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => Ok(parent.to_path_buf()),
        None => std::env::current_dir().map_err(|e| {
            ScriptRunnerError::ConfigError(format!("cannot determine current directory: {}", e))
        }),
    }
}

/// Canonicalize `path`, requiring an existing directory
fn canonical_dir(path: &Path) -> Result<PathBuf, String> {
    let canonical = path.canonicalize().map_err(|e| e.to_string())?;
    if !canonical.is_dir() {
        return Err("not a directory".to_string());
    }
    Ok(canonical)
}

/// Resolve ~ to home directory
fn resolve_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest.trim_start_matches('/'));
            }
        }
    }
    PathBuf::from(path)
}

// ============================================================================
// Store
// ============================================================================

/// Holds the live snapshot and the document path it reloads from
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load `path` and start serving its snapshot
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScriptRunnerError> {
        let path = path.into();
        let snapshot = load(&path)?;
        info!(
            scripts = snapshot.scripts.len(),
            working_directory = %snapshot.working_directory.display(),
            "Loaded configuration"
        );
        Ok(Self::with_snapshot(path, snapshot))
    }

    /// Store seeded with an explicit snapshot; `reload` still reads `path`
    pub fn with_snapshot(path: impl Into<PathBuf>, snapshot: ConfigSnapshot) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The live snapshot; a later call may return a different one
    pub async fn current_snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Re-read the document and swap it in; on failure the previous snapshot stays
    pub async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ScriptRunnerError> {
        let snapshot = match load(&self.path) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!("Reload failed, keeping previous configuration: {}", e);
                return Err(e);
            }
        };

        *self.current.write().await = Arc::clone(&snapshot);

        info!(
            scripts = snapshot.scripts.len(),
            working_directory = %snapshot.working_directory.display(),
            "Configuration reloaded"
        );
        Ok(snapshot)
    }

    /// Point scripts at another directory; relative paths resolve against the current one
    pub async fn set_working_directory(
        &self,
        path: &str,
    ) -> Result<Arc<ConfigSnapshot>, ScriptRunnerError> {
        if path.trim().is_empty() {
            return Err(ScriptRunnerError::PathError(
                "path must not be empty".to_string(),
            ));
        }

        let mut current = self.current.write().await;
        let target = current.working_directory.join(resolve_path(path));
        let canonical = canonical_dir(&target)
            .map_err(|reason| ScriptRunnerError::PathError(format!("{}: {}", path, reason)))?;

        let snapshot = Arc::new(current.with_working_directory(canonical));
        *current = Arc::clone(&snapshot);

        info!(
            working_directory = %snapshot.working_directory.display(),
            "Working directory changed"
        );
        Ok(snapshot)
    }
}
