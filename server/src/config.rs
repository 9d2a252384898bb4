//! File-based configuration for the server and admin binaries.
//!
//! Everything comes from one TOML file passed on the command line; the
//! environment is not consulted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Directory with the web front-end assets.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Broadcast provider base URL; overridable for tests.
    #[serde(default = "default_lichess_url")]
    pub lichess_url: String,
    /// One engine worker is started per entry.
    #[serde(default)]
    pub analyzers: Vec<AnalyzerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Engine executable and arguments.
    pub command: Vec<String>,
    /// Upper bound on the multi-PV width requested from the engine.
    pub max_multipv: u32,
    /// How many PVs of each bundle are persisted.
    #[serde(default = "default_show_pv")]
    pub show_pv: u32,
    /// When set, the engine is spawned on this host over ssh.
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    /// Static UCI options sent before every analysis.
    #[serde(default)]
    pub uci_options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl AnalyzerConfig {
    pub fn spawn_spec(&self) -> engine::SpawnSpec {
        engine::SpawnSpec {
            command: self.command.clone(),
            ssh: self.ssh.as_ref().map(|ssh| engine::SshSpec {
                host: ssh.host.clone(),
                username: ssh.username.clone(),
            }),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_lichess_url() -> String {
    lichess::DEFAULT_BASE_URL.to_string()
}

fn default_show_pv() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
db_path = "kibitzer.db"
bind_addr = "0.0.0.0:9000"
static_dir = "assets"

[[analyzers]]
command = ["lc0", "--show-wdl", "--show-movesleft"]
max_multipv = 230
show_pv = 20
ssh = { host = "gpubox", username = "lc0" }

[analyzers.uci_options]
MinibatchSize = "768"

[[analyzers]]
command = ["stockfish"]
max_multipv = 4
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.lichess_url, "https://lichess.org");
        assert_eq!(config.analyzers.len(), 2);

        let lc0 = &config.analyzers[0];
        assert_eq!(lc0.show_pv, 20);
        assert_eq!(lc0.ssh.as_ref().unwrap().host, "gpubox");
        assert_eq!(lc0.uci_options.get("MinibatchSize").unwrap(), "768");

        let stockfish = &config.analyzers[1];
        assert_eq!(stockfish.show_pv, 2);
        assert!(stockfish.ssh.is_none());
        assert!(stockfish.uci_options.is_empty());
    }

    #[test]
    fn test_missing_db_path_is_an_error() {
        assert!(toml::from_str::<Config>("bind_addr = \"x\"").is_err());
    }
}
