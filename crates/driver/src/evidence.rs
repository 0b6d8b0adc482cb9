//! Screenshot evidence under a single configured root

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::DriverResult;

/// Lays out evidence files as `<root>/<scenario-slug>/step-<NN>[-<label>].png`.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for the screenshot of step `index` (0-based), parent created.
    pub fn screenshot_path(
        &self,
        scenario: &str,
        index: usize,
        label: Option<&str>,
    ) -> DriverResult<PathBuf> {
        let dir = self.root.join(slugify(scenario));
        std::fs::create_dir_all(&dir)?;

        let mut file = format!("step-{:02}", index + 1);
        if let Some(label) = label.map(slugify).filter(|l| !l.is_empty()) {
            file.push('-');
            file.push_str(&label);
        }
        file.push_str(".png");
        Ok(dir.join(file))
    }

    /// SHA-256 of an evidence file, hex encoded
    pub fn digest(path: &Path) -> DriverResult<String> {
        let data = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
