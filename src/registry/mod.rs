//! Model registry
//!
//! Maps a chat's `(identity, model_name, shared)` triple to the directory
//! holding the model and the persona it speaks as. The shipped registry
//! reads a YAML file:
//!
//! ```yaml
//! models_dir: ./saved_models
//! base_model: ./saved_models/base
//! models:
//!   - owner: "7"
//!     name: ann-v2
//!     display_name: Ann
//!     shared_with: ["9"]
//! ```
//!
//! A model lives at `<models_dir>/<name>` unless an explicit `path` is
//! given. When that directory does not exist the base model is used.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Where a chat's model lives and who it speaks as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub location: PathBuf,
    pub display_name: String,
}

/// Resolves chat model references
pub trait ModelRegistry: Send + Sync {
    /// Look up `model_name` as seen by `identity`.
    ///
    /// Owned models match on (owner, name); shared models match on
    /// (name, grantee).
    fn resolve(&self, identity: &str, model_name: &str, shared: bool) -> Result<ResolvedModel>;

    /// Directory of the base checkpoint adapters are trained against
    fn base_model(&self) -> &Path;
}

/// One trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub owner: String,
    pub name: String,
    /// Persona name; defaults to `name`
    #[serde(default)]
    pub display_name: Option<String>,
    /// Explicit directory, overriding `<models_dir>/<name>`
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Identities this model has been shared with
    #[serde(default)]
    pub shared_with: Vec<String>,
}

impl ModelEntry {
    fn persona(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Registry backed by a YAML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlRegistry {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_base_model")]
    pub base_model: PathBuf,

    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./saved_models")
}

fn default_base_model() -> PathBuf {
    PathBuf::from("./saved_models/base")
}

impl YamlRegistry {
    /// Load the registry file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("reading {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("parsing {}: {e}", path.display())))
    }

    fn find(&self, identity: &str, model_name: &str, shared: bool) -> Option<&ModelEntry> {
        self.models.iter().find(|entry| {
            entry.name == model_name
                && if shared {
                    entry.shared_with.iter().any(|grantee| grantee == identity)
                } else {
                    entry.owner == identity
                }
        })
    }
}

impl ModelRegistry for YamlRegistry {
    fn resolve(&self, identity: &str, model_name: &str, shared: bool) -> Result<ResolvedModel> {
        let entry = self.find(identity, model_name, shared).ok_or_else(|| {
            EngineError::ModelNotFound(format!(
                "{model_name} is not available to this user, check model access"
            ))
        })?;

        let mut location = entry
            .path
            .clone()
            .unwrap_or_else(|| self.models_dir.join(&entry.name));
        if !location.exists() {
            tracing::warn!(
                model = %entry.name,
                missing = %location.display(),
                "Model directory missing, using base model"
            );
            location = self.base_model.clone();
        }

        Ok(ResolvedModel {
            location,
            display_name: entry.persona().to_string(),
        })
    }

    fn base_model(&self) -> &Path {
        &self.base_model
    }
}
