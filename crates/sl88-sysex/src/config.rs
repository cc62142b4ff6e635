//! Bridge configuration
//!
//! Loaded from YAML. Every section has defaults, so an empty or partial file
//! is valid:
//!
//! ```yaml
//! keyboard:
//!   port_match: "SL GRAND"
//! app:
//!   port_match: "SL Editor"
//! protocol:
//!   preamble: "f000204b"
//!   terminator: "f7"
//!   settle_delay_ms: 100
//!   request_timeout_ms: 2000
//! ```

use crate::device::{Framing, DEFAULT_PREAMBLE, DEFAULT_TERMINATOR};
use crate::transport::Timing;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
///
/// Missing sections fall back to [`default_ports`], never to an empty
/// pattern (which would match every port).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Ports of the physical keyboard
    pub keyboard: PortConfig,
    /// Ports of the editor application
    pub app: PortConfig,
    pub protocol: ProtocolConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        default_ports()
    }
}

impl BridgeConfig {
    fn with_ports(keyboard: &str, app: &str) -> Self {
        Self {
            keyboard: PortConfig {
                port_match: keyboard.to_string(),
            },
            app: PortConfig {
                port_match: app.to_string(),
            },
            protocol: ProtocolConfig::default(),
        }
    }
}

/// One MIDI in/out pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Case-insensitive substring of both the input and output port names
    pub port_match: String,
}

/// Device framing and request timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub preamble: String,
    pub terminator: String,
    pub settle_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
            terminator: DEFAULT_TERMINATOR.to_string(),
            settle_delay_ms: 100,
            request_timeout_ms: 2000,
        }
    }
}

impl ProtocolConfig {
    pub fn framing(&self) -> Framing {
        Framing::new(&self.preamble, &self.terminator)
    }

    pub fn timing(&self) -> Timing {
        Timing {
            settle: Duration::from_millis(self.settle_delay_ms),
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// Port names the SL88 and its editor register with
pub fn default_ports() -> BridgeConfig {
    BridgeConfig::with_ports("SL GRAND", "SL Editor")
}

/// Get the default bridge config file path
///
/// Returns: <config dir>/sl88/bridge.yaml
pub fn default_bridge_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sl88")
        .join("bridge.yaml")
}

/// Load bridge configuration from a YAML file
///
/// If the file doesn't exist or is invalid, logs why and returns
/// [`default_ports`].
pub fn load_bridge_config(path: &Path) -> BridgeConfig {
    log::info!("load_bridge_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_bridge_config: Config file doesn't exist, using default ports");
        return default_ports();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<BridgeConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_bridge_config: keyboard '{}', app '{}'",
                    config.keyboard.port_match,
                    config.app.port_match
                );
                config
            }
            Err(e) => {
                log::warn!("load_bridge_config: Failed to parse config: {}", e);
                default_ports()
            }
        },
        Err(e) => {
            log::warn!("load_bridge_config: Failed to read config file: {}", e);
            default_ports()
        }
    }
}

/// Save bridge configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_bridge_config(config: &BridgeConfig, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    log::info!("save_bridge_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml =
        serde_yaml::to_string(config).context("Failed to serialize bridge config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write bridge config file: {:?}", path))?;

    Ok(())
}

/// Strip hardware-specific suffixes from a port name
///
/// - "SL GRAND:SL GRAND MIDI 2 24:1" -> "SL GRAND:SL GRAND MIDI 2"
/// - "SL Editor In [hw:2,0,0]" -> "SL Editor In"
pub fn normalize_port_name(name: &str) -> String {
    let mut result = name.trim();

    if let Some(bracket_pos) = result.rfind('[') {
        result = result[..bracket_pos].trim();
    }

    // Trailing ALSA sequencer client:port id
    if let Some(last_space) = result.rfind(' ') {
        let suffix = &result[last_space + 1..];
        let is_client_port = suffix
            .split_once(':')
            .is_some_and(|(client, port)| {
                !client.is_empty()
                    && !port.is_empty()
                    && client.chars().all(|c| c.is_ascii_digit())
                    && port.chars().all(|c| c.is_ascii_digit())
            });
        if is_client_port {
            result = result[..last_space].trim();
        }
    }

    result.to_string()
}

/// Case-insensitive substring match of normalized names
pub fn port_matches(actual_port: &str, port_match: &str) -> bool {
    normalize_port_name(actual_port)
        .to_lowercase()
        .contains(&normalize_port_name(port_match).to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = default_ports();
        assert_eq!(config.keyboard.port_match, "SL GRAND");
        assert_eq!(config.protocol.preamble, "f000204b");
        assert_eq!(config.protocol.timing(), Timing::default());
    }

    #[test]
    fn test_yaml_parsing_partial() {
        let yaml = r#"
keyboard:
  port_match: "SL88"
protocol:
  request_timeout_ms: 500
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.keyboard.port_match, "SL88");
        assert_eq!(config.app.port_match, "SL Editor");
        assert_eq!(config.protocol.terminator, "f7");
        assert_eq!(config.protocol.timing().timeout, Duration::from_millis(500));
        assert_eq!(config.protocol.timing().settle, Duration::from_millis(100));
    }

    #[test]
    fn test_framing_from_config() {
        let protocol = ProtocolConfig {
            preamble: "F0002000".into(),
            ..Default::default()
        };
        assert_eq!(protocol.framing().wrap("7f"), "f00020007ff7");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("sl88-bridge-config-does-not-exist.yaml");
        assert_eq!(load_bridge_config(&path), default_ports());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("sl88-bridge-test-{}", std::process::id()))
            .join("bridge.yaml");
        let mut config = default_ports();
        config.app.port_match = "Loopback".into();
        save_bridge_config(&config, &path).unwrap();
        assert_eq!(load_bridge_config(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_normalize_port_name() {
        assert_eq!(
            normalize_port_name("SL GRAND:SL GRAND MIDI 2 24:1"),
            "SL GRAND:SL GRAND MIDI 2"
        );
        assert_eq!(normalize_port_name("SL Editor In [hw:2,0,0]"), "SL Editor In");
        assert_eq!(normalize_port_name("MIDIIN2 (SL GRAND)"), "MIDIIN2 (SL GRAND)");
    }

    #[test]
    fn test_port_matches() {
        assert!(port_matches("MIDIOUT2 (SL GRAND)", "sl grand"));
        assert!(port_matches("SL Editor Out 20:0", "SL Editor"));
        assert!(!port_matches("Launchpad Mini", "SL GRAND"));
    }
}
