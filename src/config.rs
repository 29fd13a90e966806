use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_AFK_WORLD: &str = "world_afk";

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: smartafk <data-root>".to_string());
        }
        let root = Path::new(&args[1]).to_path_buf();
        Ok(Self { root })
    }
}

/// What happens to an entity that is riding something when it goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehiclePolicy {
    Detach,
    /// Postpone the transition until the entity dismounts.
    Defer,
}

/// Immutable settings snapshot. Reloading builds a new one and swaps it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Seconds without activity before an entity is marked away.
    pub afk_timeout: i64,
    /// Seconds without activity before an away entity is disconnected; 0 or
    /// less disables.
    pub kick_timeout: i64,
    pub kick_message: String,
    pub bypass_permission: String,
    pub freeze_chunks: bool,
    pub vehicle_policy: VehiclePolicy,
    /// Seconds between periodic crash-recovery flushes.
    pub backup_interval: u64,
    pub afk_world: AfkWorldSettings,
    pub messages: Messages,
    pub settings: Toggles,
    pub detection: Detection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AfkWorldSettings {
    pub enabled: bool,
    pub world_name: String,
    pub spawn_location: SpawnPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Messages {
    pub prefix: String,
    pub afk_on: String,
    pub afk_off: String,
    pub afk_kick_warning: String,
    pub players_only: String,
    pub no_permission: String,
    pub reload: String,
    pub status_header: String,
    pub status_line: String,
    pub status_empty: String,
    pub status_total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Toggles {
    pub tab_prefix: bool,
    pub tab_prefix_format: String,
    pub backup_locations: bool,
    pub debug: bool,
    pub disable_damage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Detection {
    pub movement: bool,
    pub chat: bool,
    pub commands: bool,
    pub block_break: bool,
    pub block_place: bool,
    pub interact: bool,
    pub inventory: bool,
    pub damage: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            afk_timeout: 300,
            kick_timeout: 1800,
            kick_message: "&cYou were kicked for being AFK too long".to_string(),
            bypass_permission: "smartafk.bypass".to_string(),
            freeze_chunks: false,
            vehicle_policy: VehiclePolicy::Detach,
            backup_interval: 300,
            afk_world: AfkWorldSettings::default(),
            messages: Messages::default(),
            settings: Toggles::default(),
            detection: Detection::default(),
        }
    }
}

impl Default for AfkWorldSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            world_name: DEFAULT_AFK_WORLD.to_string(),
            spawn_location: SpawnPoint::default(),
        }
    }
}

impl Default for SpawnPoint {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 100.0,
            z: 0.5,
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            prefix: "&8[&6AFK&8] ".to_string(),
            afk_on: "&7{player} is now AFK".to_string(),
            afk_off: "&7{player} is no longer AFK".to_string(),
            afk_kick_warning: "&cYou will be kicked in {time} seconds!".to_string(),
            players_only: "&cOnly players can use this command!".to_string(),
            no_permission: "&cYou do not have permission!".to_string(),
            reload: "&aConfiguration reloaded!".to_string(),
            status_header: "&6&l====== AFK players ======".to_string(),
            status_line: "&7- &e{player} &8- &7{time}".to_string(),
            status_empty: "&7Nobody is AFK".to_string(),
            status_total: "&6Total: &e{count}".to_string(),
        }
    }
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            tab_prefix: true,
            tab_prefix_format: "&7[AFK] ".to_string(),
            backup_locations: true,
            debug: false,
            disable_damage: true,
        }
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            movement: true,
            chat: true,
            commands: true,
            block_break: true,
            block_place: true,
            interact: true,
            inventory: true,
            damage: true,
        }
    }
}

/// A value that was out of range and has been corrected in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub key: &'static str,
    pub message: String,
}

impl Settings {
    pub fn afk_timeout(&self) -> Duration {
        Duration::from_secs(self.afk_timeout.max(0).unsigned_abs())
    }

    /// `None` when forced disconnect is disabled.
    pub fn kick_timeout(&self) -> Option<Duration> {
        (self.kick_timeout > 0).then(|| Duration::from_secs(self.kick_timeout.unsigned_abs()))
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self, ConfigError> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `<root>/config.yml`, writing the defaults out first when absent.
    /// Out-of-range values are corrected, reported, and saved back.
    pub fn load(root: &Path) -> Result<(Self, Vec<ConfigIssue>), ConfigError> {
        let path = root.join(CONFIG_FILE);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let defaults = Self::default();
                defaults.save(&path)?;
                return Ok((defaults, Vec::new()));
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let mut settings = Self::parse(&data, &path)?;
        let issues = settings.validate();
        if !issues.is_empty() {
            settings.save(&path)?;
        }
        Ok((settings, issues))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let data = serde_yaml::to_string(self).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        clamp(&mut issues, "afk-timeout", &mut self.afk_timeout, 30, 86_400);
        clamp(&mut issues, "kick-timeout", &mut self.kick_timeout, 0, 86_400);

        if self.kick_timeout > 0 && self.kick_timeout <= self.afk_timeout {
            let corrected = self.afk_timeout * 2;
            issues.push(ConfigIssue {
                key: "kick-timeout",
                message: format!(
                    "kick-timeout ({}) must exceed afk-timeout ({}), using {}",
                    self.kick_timeout, self.afk_timeout, corrected
                ),
            });
            self.kick_timeout = corrected;
        }

        let y = self.afk_world.spawn_location.y;
        if !(-64.0..=320.0).contains(&y) {
            let corrected = if y.is_nan() { 100.0 } else { y.clamp(-64.0, 320.0) };
            issues.push(ConfigIssue {
                key: "afk-world.spawn-location.y",
                message: format!("spawn y {y} out of range -64..320, using {corrected}"),
            });
            self.afk_world.spawn_location.y = corrected;
        }

        if self.afk_world.world_name.trim().is_empty() {
            issues.push(ConfigIssue {
                key: "afk-world.world-name",
                message: format!("world name is empty, using '{DEFAULT_AFK_WORLD}'"),
            });
            self.afk_world.world_name = DEFAULT_AFK_WORLD.to_string();
        }
        issues
    }
}

fn clamp(issues: &mut Vec<ConfigIssue>, key: &'static str, value: &mut i64, min: i64, max: i64) {
    if *value < min {
        issues.push(ConfigIssue {
            key,
            message: format!("{key} too small ({value}), minimum is {min}"),
        });
        *value = min;
    } else if *value > max {
        issues.push(ConfigIssue {
            key,
            message: format!("{key} too large ({value}), maximum is {max}"),
        });
        *value = max;
    }
}
