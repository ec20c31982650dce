use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Class names the model was trained on, in output order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("class label list is empty"));
        }
        Ok(Self { names })
    }

    /// A list holding just `name`.
    pub fn single(name: &str) -> Self {
        Self {
            names: vec![name.to_string()],
        }
    }

    /// Parse one label per line.
    ///
    /// Only blank lines at either end of the file are dropped. An interior
    /// blank line still occupies its class index, so the positions keep
    /// lining up with the model's output columns.
    pub fn parse(raw: &str) -> Result<Self> {
        let body = raw.trim();
        if body.is_empty() {
            return Err(anyhow!("class label list is empty"));
        }
        let names = body
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Self::new(names)
    }

    pub fn index_of(&self, class: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|name| name == class)
            .ok_or_else(|| anyhow!("target class '{}' is not in the label list", class))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn load_labels(path: &Path) -> Result<ClassLabels> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class labels from {}", path.display()))?;
    ClassLabels::parse(&raw).with_context(|| format!("invalid label file {}", path.display()))
}
