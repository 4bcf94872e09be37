use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Where the hidden handler gets the text it reveals
pub trait SecretResource {
    fn reveal(&self) -> Result<String>;
}

/// Secret read from a file on every reveal
#[derive(Debug, Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretResource for FileSecret {
    fn reveal(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read secret from {}", self.path.display()))
    }
}

/// Fixed in-memory secret
#[derive(Debug, Clone)]
pub struct StaticSecret(pub String);

impl SecretResource for StaticSecret {
    fn reveal(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
