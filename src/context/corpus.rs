//! CSV training corpora on disk
//!
//! Layout: `<root>/<identity>/<name>.csv`, each file with `input` and
//! `output` columns. Rows are in chronological order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{CorpusStore, Example};

/// Corpus store rooted at a directory
#[derive(Debug, Clone)]
pub struct CsvCorpusStore {
    root: PathBuf,
}

impl CsvCorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Identities map to a single directory component
    fn identity_dir(&self, identity: &str) -> Option<PathBuf> {
        let valid = !identity.is_empty()
            && identity != "."
            && identity != ".."
            && !identity.contains(['/', '\\']);
        valid.then(|| self.root.join(identity))
    }
}

impl CorpusStore for CsvCorpusStore {
    fn list_corpora(&self, identity: &str) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.identity_dir(identity) else {
            tracing::warn!(identity, "Rejected identity for corpus lookup");
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = dir.join("*.csv");
        let Some(pattern) = pattern.to_str() else {
            return Ok(Vec::new());
        };
        let mut files: Vec<PathBuf> = glob::glob(pattern)?.filter_map(|r| r.ok()).collect();
        files.sort();
        Ok(files)
    }

    fn read_examples(&self, corpus: &Path) -> Result<Vec<Example>> {
        let mut reader = csv::Reader::from_path(corpus)
            .with_context(|| format!("opening corpus {}", corpus.display()))?;
        let mut examples = Vec::new();
        for row in reader.deserialize::<Example>() {
            examples.push(row.with_context(|| format!("reading corpus {}", corpus.display()))?);
        }
        Ok(examples)
    }
}
