// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML configuration with `CITADEL_SECTION__KEY` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "CITADEL_";

/// Keys that cannot change across `reload()`; a reboot is required.
const REBOOT_ONLY_KEYS: &[&str] =
    &["bbs.max_messages_per_room", "bbs.max_rooms", "bbs.max_users"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bbs: BbsConfig,
    pub auth: AuthConfig,
    pub transport: TransportConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bbs: BbsConfig::default(),
            auth: AuthConfig::default(),
            transport: TransportConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BbsConfig {
    pub system_name: String,
    pub max_messages_per_room: u32,
    pub max_rooms: u32,
    pub max_users: u32,
    pub mail_message_limit: u32,
    pub starting_room: String,
    pub export_format: String,
    pub registration: RegistrationConfig,
}

impl Default for BbsConfig {
    fn default() -> Self {
        Self {
            system_name: "Mesh-Citadel".to_owned(),
            max_messages_per_room: 300,
            max_rooms: 50,
            max_users: 300,
            mail_message_limit: 50,
            starting_room: "Lobby".to_owned(),
            export_format: "json".to_owned(),
            registration: RegistrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub terms_required: bool,
    pub terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Idle seconds before a session is swept.
    pub session_timeout: u64,
    pub max_password_length: usize,
    pub max_username_length: usize,
    /// Days a node's password cache stays valid.
    pub password_cache_duration: u64,
    /// Seconds to stall after a failed password check.
    pub failed_login_delay: u64,
    pub recovery_questions: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout: 3600,
            max_password_length: 64,
            max_username_length: 32,
            password_cache_duration: 14,
            failed_login_delay: 5,
            recovery_questions: vec![
                "What is your favorite color?".to_owned(),
                "What was your first pet's name?".to_owned(),
                "Who was your favorite teacher?".to_owned(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub cli: CliConfig,
    pub meshcore: MeshcoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub socket: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { socket: PathBuf::from("/tmp/mesh-citadel-cli.sock") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshcoreConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub frequency: f64,
    pub bandwidth: f64,
    pub spreading_factor: u32,
    pub coding_rate: u32,
    pub tx_power: u32,
    pub name: String,
    pub multi_acks: bool,
    /// Hours between adverts.
    pub advert_interval: u64,
    /// Seconds to wait for an ACK after a packet send.
    pub ack_timeout: u64,
    /// Seconds between consecutive outbound packets.
    pub inter_packet_delay: f64,
    pub max_packet_size: usize,
    pub max_retries: u32,
    pub max_flood_attempts: u32,
    pub flood_after: u32,
    pub send_timeout: u64,
    pub watchdog_timeout: u64,
    pub contact_manager: ContactManagerConfig,
}

impl Default for MeshcoreConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_owned(),
            baud_rate: 115_200,
            frequency: 910.525,
            bandwidth: 62.5,
            spreading_factor: 7,
            coding_rate: 5,
            tx_power: 22,
            name: "Mesh-Citadel BBS".to_owned(),
            multi_acks: true,
            advert_interval: 6,
            ack_timeout: 8,
            inter_packet_delay: 0.5,
            max_packet_size: 140,
            max_retries: 3,
            max_flood_attempts: 2,
            flood_after: 2,
            send_timeout: 10,
            watchdog_timeout: 60,
            contact_manager: ContactManagerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactManagerConfig {
    pub max_device_contacts: u32,
    pub contact_limit_buffer: u32,
    pub update_contacts: bool,
}

impl Default for ContactManagerConfig {
    fn default() -> Self {
        Self { max_device_contacts: 100, contact_limit_buffer: 0, update_contacts: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { db_path: "citadel.db".to_owned() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: "info".to_owned(), log_file_path: "citadel.log".to_owned() }
    }
}

impl Config {
    /// Load from a YAML file, falling back to defaults if it is missing,
    /// then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                String::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config {}", path.display()))
            }
        };
        let mut config = Self::from_yaml(&raw, std::env::vars())?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse YAML and apply `CITADEL_SECTION__KEY` overrides from `env`.
    pub fn from_yaml(
        raw: &str,
        env: impl Iterator<Item = (String, String)>,
    ) -> anyhow::Result<Self> {
        let mut value: serde_yaml::Value = if raw.trim().is_empty() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            serde_yaml::from_str(raw).context("invalid YAML in config")?
        };

        for (key, val) in env {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else { continue };
            let path: Vec<String> =
                rest.to_ascii_lowercase().split("__").map(str::to_owned).collect();
            if path.iter().any(String::is_empty) {
                continue;
            }
            set_nested(&mut value, &path, coerce(&val));
        }

        let config: Self = serde_yaml::from_value(value).context("invalid config values")?;
        config.validate()?;
        Ok(config)
    }

    /// Re-read the config file. Fails if a reboot-only key changed.
    pub fn reload(&self) -> anyhow::Result<Self> {
        let Some(ref path) = self.path else {
            bail!("config was not loaded from a file");
        };
        let mut next = Self::load(path)?;
        for key in REBOOT_ONLY_KEYS {
            if self.reboot_value(key) != next.reboot_value(key) {
                bail!("cannot change reboot-only config key '{key}' at runtime");
            }
        }
        next.path = self.path.clone();
        Ok(next)
    }

    fn reboot_value(&self, key: &str) -> u32 {
        match key {
            "bbs.max_messages_per_room" => self.bbs.max_messages_per_room,
            "bbs.max_rooms" => self.bbs.max_rooms,
            "bbs.max_users" => self.bbs.max_users,
            _ => 0,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.bbs.system_name.is_empty() {
            bail!("bbs.system_name is required");
        }
        if self.database.db_path.is_empty() {
            bail!("database.db_path is required");
        }
        if self.transport.meshcore.max_packet_size < 16 {
            bail!("transport.meshcore.max_packet_size is too small");
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn password_cache_duration(&self) -> Duration {
        Duration::from_secs(self.password_cache_duration * 24 * 3600)
    }

    pub fn failed_login_delay(&self) -> Duration {
        Duration::from_secs(self.failed_login_delay)
    }
}

impl MeshcoreConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout)
    }

    pub fn inter_packet_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_packet_delay)
    }

    pub fn advert_interval(&self) -> Duration {
        Duration::from_secs(self.advert_interval * 3600)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout)
    }
}

impl ContactManagerConfig {
    /// Device contact slots the manager is allowed to fill.
    pub fn effective_capacity(&self) -> u32 {
        self.max_device_contacts.saturating_sub(self.contact_limit_buffer)
    }
}

fn set_nested(root: &mut serde_yaml::Value, path: &[String], new: serde_yaml::Value) {
    let mut node = root;
    for key in &path[..path.len() - 1] {
        if !node.is_mapping() {
            *node = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        let Some(map) = node.as_mapping_mut() else { return };
        let key = serde_yaml::Value::String(key.clone());
        node = map.entry(key).or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
    if !node.is_mapping() {
        *node = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    if let Some(map) = node.as_mapping_mut() {
        if let Some(last) = path.last() {
            map.insert(serde_yaml::Value::String(last.clone()), new);
        }
    }
}

/// Coerce an env-var string into the closest YAML scalar.
fn coerce(val: &str) -> serde_yaml::Value {
    match val.to_ascii_lowercase().as_str() {
        "true" => return serde_yaml::Value::Bool(true),
        "false" => return serde_yaml::Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = val.parse::<i64>() {
        return serde_yaml::Value::Number(n.into());
    }
    if let Ok(f) = val.parse::<f64>() {
        return serde_yaml::Value::Number(serde_yaml::Number::from(f));
    }
    serde_yaml::Value::String(val.to_owned())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
