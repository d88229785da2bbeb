//! Model directory layout detection

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// File whose presence marks a directory as carrying adapter weights
pub const ADAPTER_CONFIG: &str = "adapter_config.json";

/// Adapter weight file written next to the adapter config
pub const ADAPTER_WEIGHTS: &str = "adapter_model.safetensors";

/// Detected model source
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Weight files, one per shard
    pub weight_files: Vec<PathBuf>,
    /// Path to `config.json`
    pub config_path: PathBuf,
    /// Adapter weights to merge on top of the base, if present
    pub adapter: Option<AdapterSource>,
}

/// Location of a LoRA adapter
#[derive(Debug, Clone)]
pub struct AdapterSource {
    pub config_path: PathBuf,
    pub weights_path: PathBuf,
}

/// Whether a model directory carries adapter weights
pub fn has_adapter(dir: &Path) -> bool {
    dir.join(ADAPTER_CONFIG).is_file()
}

/// Detect the model files in a directory
///
/// Fine-tuned directories usually hold only the adapter; the base weights
/// then come from `base_dir`.
pub fn detect_model_source(dir: &Path, base_dir: Option<&Path>) -> Result<ModelSource> {
    if !dir.is_dir() {
        return Err(anyhow!("Model path does not exist: {}", dir.display()));
    }

    let adapter = if has_adapter(dir) {
        let weights_path = dir.join(ADAPTER_WEIGHTS);
        if !weights_path.is_file() {
            return Err(anyhow!(
                "{} present but {} missing in {}",
                ADAPTER_CONFIG,
                ADAPTER_WEIGHTS,
                dir.display()
            ));
        }
        Some(AdapterSource {
            config_path: dir.join(ADAPTER_CONFIG),
            weights_path,
        })
    } else {
        None
    };

    let weights_dir = if find_weight_files(dir).is_empty() {
        base_dir.ok_or_else(|| {
            anyhow!(
                "No safetensors weights in {} and no base model configured",
                dir.display()
            )
        })?
    } else {
        dir
    };

    let weight_files = find_weight_files(weights_dir);
    if weight_files.is_empty() {
        return Err(anyhow!(
            "No supported model files found in directory: {}",
            weights_dir.display()
        ));
    }

    let config_path = [weights_dir, dir]
        .iter()
        .map(|d| d.join("config.json"))
        .find(|p| p.is_file())
        .ok_or_else(|| anyhow!("config.json not found for {}", dir.display()))?;

    Ok(ModelSource {
        weight_files,
        config_path,
        adapter,
    })
}

/// Find base weight files, single or sharded
fn find_weight_files(dir: &Path) -> Vec<PathBuf> {
    let single = dir.join("model.safetensors");
    if single.is_file() {
        return vec![single];
    }

    let mut shards = glob_files(dir, "model-*-of-*.safetensors");
    shards.sort();
    shards
}

fn glob_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full_pattern = dir.join(pattern);
    let Some(pattern) = full_pattern.to_str() else {
        return Vec::new();
    };
    glob::glob(pattern)
        .map(|paths| paths.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_single_file_without_adapter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), b"").unwrap();
        fs::write(dir.path().join("config.json"), b"{}").unwrap();

        let source = detect_model_source(dir.path(), None).unwrap();
        assert_eq!(source.weight_files.len(), 1);
        assert!(source.adapter.is_none());
        assert!(!has_adapter(dir.path()));
    }

    #[test]
    fn test_detect_sharded_weights_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model-00002-of-00002.safetensors"), b"").unwrap();
        fs::write(dir.path().join("model-00001-of-00002.safetensors"), b"").unwrap();
        fs::write(dir.path().join("config.json"), b"{}").unwrap();

        let source = detect_model_source(dir.path(), None).unwrap();
        assert_eq!(source.weight_files.len(), 2);
        assert!(source.weight_files[0].ends_with("model-00001-of-00002.safetensors"));
    }

    #[test]
    fn test_adapter_only_dir_uses_base_weights() {
        let base = tempfile::tempdir().unwrap();
        fs::write(base.path().join("model.safetensors"), b"").unwrap();
        fs::write(base.path().join("config.json"), b"{}").unwrap();

        let tuned = tempfile::tempdir().unwrap();
        fs::write(tuned.path().join(ADAPTER_CONFIG), b"{}").unwrap();
        fs::write(tuned.path().join(ADAPTER_WEIGHTS), b"").unwrap();

        assert!(has_adapter(tuned.path()));
        let source = detect_model_source(tuned.path(), Some(base.path())).unwrap();
        assert!(source.weight_files[0].starts_with(base.path()));
        assert!(source.adapter.is_some());
    }

    #[test]
    fn test_adapter_config_without_weights_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ADAPTER_CONFIG), b"{}").unwrap();
        assert!(detect_model_source(dir.path(), None).is_err());
    }

    #[test]
    fn test_missing_directory() {
        let err = detect_model_source(Path::new("/nonexistent/model"), None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
