//! Configuration module
//!
//! Handles loading and saving OmokNet configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::game::{DEFAULT_BOARD_SIZE, WIN_LENGTH};
use crate::protocol::DEFAULT_RENDEZVOUS_PORT;

/// Largest supported board edge
pub const MAX_BOARD_SIZE: usize = 26;

/// Longest allowed turn, one hour
pub const MAX_TURN_TIMEOUT_SECS: u64 = 3600;

/// Longest allowed grace period for the opponent's turn
pub const MAX_TIMEOUT_GRACE_MS: u64 = 60_000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Rendezvous server location
    #[serde(default)]
    pub rendezvous: RendezvousConfig,

    /// Match rules
    #[serde(default)]
    pub game: GameConfig,

    /// Peer socket settings
    #[serde(default)]
    pub network: NetworkConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Display name used when none is given on the command line
    pub name: Option<String>,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Rendezvous configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Server host name or address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (also the port `server` listens on)
    #[serde(default = "default_rendezvous_port")]
    pub port: u16,
    /// Connection timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rendezvous_port() -> u16 {
    DEFAULT_RENDEZVOUS_PORT
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_rendezvous_port(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Game configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Board edge length
    #[serde(default = "default_board_size")]
    pub board_size: usize,
    /// Time a player has to make a move
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    /// Extra time granted to the opponent before their turn is declared lost
    #[serde(default = "default_timeout_grace")]
    pub timeout_grace_ms: u64,
}

fn default_board_size() -> usize {
    DEFAULT_BOARD_SIZE
}

fn default_turn_timeout() -> u64 {
    10
}

fn default_timeout_grace() -> u64 {
    1000
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_size: default_board_size(),
            turn_timeout_secs: default_turn_timeout(),
            timeout_grace_ms: default_timeout_grace(),
        }
    }
}

impl GameConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn timeout_grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface the peer socket binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Peer socket port (0 = pick any free port)
    #[serde(default)]
    pub peer_port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            peer_port: 0,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("omoknet/config.toml")),
            Some(PathBuf::from("./omoknet.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the game cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.game.board_size < WIN_LENGTH || self.game.board_size > MAX_BOARD_SIZE {
            return Err(ConfigError::Invalid {
                field: "game.board_size",
                reason: format!(
                    "must be between {} and {}, got {}",
                    WIN_LENGTH, MAX_BOARD_SIZE, self.game.board_size
                ),
            });
        }

        if self.game.turn_timeout_secs == 0 || self.game.turn_timeout_secs > MAX_TURN_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                field: "game.turn_timeout_secs",
                reason: format!(
                    "must be between 1 and {}, got {}",
                    MAX_TURN_TIMEOUT_SECS, self.game.turn_timeout_secs
                ),
            });
        }

        if self.game.timeout_grace_ms > MAX_TIMEOUT_GRACE_MS {
            return Err(ConfigError::Invalid {
                field: "game.timeout_grace_ms",
                reason: format!(
                    "must be at most {}, got {}",
                    MAX_TIMEOUT_GRACE_MS, self.game.timeout_grace_ms
                ),
            });
        }

        if self.rendezvous.host.is_empty() {
            return Err(ConfigError::Invalid {
                field: "rendezvous.host",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            name: Some("alice".to_string()),
            verbose: false,
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rendezvous.port, DEFAULT_RENDEZVOUS_PORT);
        assert_eq!(config.game.board_size, 10);
        assert_eq!(config.game.turn_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.game.turn_timeout_secs = 30;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.game.turn_timeout_secs, 30);
        assert_eq!(loaded.rendezvous.port, config.rendezvous.port);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rendezvous]\nhost = \"10.0.0.5\"").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.rendezvous.host, "10.0.0.5");
        assert_eq!(loaded.rendezvous.port, DEFAULT_RENDEZVOUS_PORT);
        assert_eq!(loaded.game.board_size, DEFAULT_BOARD_SIZE);
    }

    #[test]
    fn test_invalid_board_size_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[game]\nboard_size = 4").unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid { field: "game.board_size", .. })
        ));
    }

    #[test]
    fn test_huge_timeouts_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[game]\nturn_timeout_secs = 9223372036854775807").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid { field: "game.turn_timeout_secs", .. })
        ));

        let mut config = Config::default();
        config.game.timeout_grace_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "game.timeout_grace_ms", .. })
        ));

        config.game.timeout_grace_ms = MAX_TIMEOUT_GRACE_MS;
        config.game.turn_timeout_secs = MAX_TURN_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/definitely/not/here/omoknet.toml");
        assert!(matches!(Config::load(path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.general.name.as_deref(), Some("alice"));
    }
}
