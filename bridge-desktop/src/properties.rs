//! `.properties` File Configuration Source

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::ConfigSource,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Reads `<directory>/<name>.properties` for each requested set.
///
/// Supports the common subset of the Java properties format: `key=value` or
/// `key: value` pairs, `#` and `!` comment lines, surrounding whitespace
/// trimmed. Line continuations and escapes are not interpreted.
#[derive(Debug, Clone)]
pub struct PropertiesFileSource {
    directory: PathBuf,
}

impl PropertiesFileSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// `<config dir>/cloudsync`, falling back to the working directory when
    /// the platform has no config directory.
    pub fn default_location() -> Self {
        let directory = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cloudsync");
        Self { directory }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.properties", name))
    }
}

#[async_trait]
impl ConfigSource for PropertiesFileSource {
    async fn load(&self, name: &str) -> Result<HashMap<String, String>> {
        let path = self.path_for(name);

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::NotAvailable(format!("Properties file not found: {}", path.display()))
            } else {
                BridgeError::Io(e)
            }
        })?;

        let props = parse_properties(&contents);
        debug!(set = name, keys = props.len(), "Loaded properties");
        Ok(props)
    }
}

/// Parses properties text into a map. Later duplicates win.
pub fn parse_properties(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(|c: char| c == '=' || c == ':')?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}
