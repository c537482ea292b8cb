use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_target: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "droid_toolbox".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Firmware and adapter timing, in milliseconds.
///
/// Observed values vary between droids and adapters, so all of them are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub scan_settle_ms: u64,
    pub identity_retry_ms: u64,
    pub handshake_interval_ms: u64,
    pub audio_interval_ms: u64,
    pub advertise_stop_ms: u64,
    pub command_delay_ms: u64,
    pub record_query_ms: u64,
    pub resolve_timeout_ms: u64,
    pub link_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            scan_settle_ms: 500,
            identity_retry_ms: 200,
            handshake_interval_ms: 100,
            audio_interval_ms: 100,
            advertise_stop_ms: 100,
            command_delay_ms: 50,
            record_query_ms: 800,
            resolve_timeout_ms: 5_000,
            link_timeout_ms: 10_000,
        }
    }
}

impl TimingSettings {
    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }
    pub fn identity_retry(&self) -> Duration {
        Duration::from_millis(self.identity_retry_ms)
    }
    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }
    pub fn audio_interval(&self) -> Duration {
        Duration::from_millis(self.audio_interval_ms)
    }
    pub fn advertise_stop(&self) -> Duration {
        Duration::from_millis(self.advertise_stop_ms)
    }
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
    pub fn record_query(&self) -> Duration {
        Duration::from_millis(self.record_query_ms)
    }
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub nickname: String,
    #[serde(default)]
    pub personality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default = "default_scan_duration_ms")]
    pub scan_duration_ms: u64,
    /// Keyed by upper-case device address
    #[serde(default)]
    pub favorites: BTreeMap<String, Favorite>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            timing: TimingSettings::default(),
            scan_duration_ms: default_scan_duration_ms(),
            favorites: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }
}

fn default_scan_duration_ms() -> u64 {
    2_000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from `path`, falling back to defaults when missing or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("DroidToolbox");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn save_favorite(&mut self, address: &BDAddr, favorite: Favorite) -> anyhow::Result<()> {
        self.settings
            .favorites
            .insert(favorite_key(address), favorite);
        self.save()
    }

    pub fn delete_favorite(&mut self, address: &BDAddr) -> anyhow::Result<()> {
        if self.settings.favorites.remove(&favorite_key(address)).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

fn favorite_key(address: &BDAddr) -> String {
    address.to_string().to_uppercase()
}

/// Nickname association used by scanning and the menus.
pub trait NicknameStore: Send + Sync {
    fn lookup_nickname(&self, address: &BDAddr) -> Option<String>;
    fn store_nickname(&self, address: &BDAddr, nickname: &str) -> anyhow::Result<()>;
    fn remove_nickname(&self, address: &BDAddr) -> anyhow::Result<()>;
}

impl NicknameStore for Mutex<SettingsService> {
    fn lookup_nickname(&self, address: &BDAddr) -> Option<String> {
        let settings = self.lock().ok()?;
        settings
            .get()
            .favorites
            .get(&favorite_key(address))
            .map(|favorite| favorite.nickname.clone())
    }

    fn store_nickname(&self, address: &BDAddr, nickname: &str) -> anyhow::Result<()> {
        let mut settings = self
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to lock settings"))?;
        let personality = settings
            .get()
            .favorites
            .get(&favorite_key(address))
            .and_then(|favorite| favorite.personality.clone());
        settings.save_favorite(
            address,
            Favorite {
                nickname: nickname.to_string(),
                personality,
            },
        )
    }

    fn remove_nickname(&self, address: &BDAddr) -> anyhow::Result<()> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("Failed to lock settings"))?
            .delete_favorite(address)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryNicknames {
    names: Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl NicknameStore for MemoryNicknames {
    fn lookup_nickname(&self, address: &BDAddr) -> Option<String> {
        self.names.lock().unwrap().get(&favorite_key(address)).cloned()
    }

    fn store_nickname(&self, address: &BDAddr, nickname: &str) -> anyhow::Result<()> {
        self.names
            .lock()
            .unwrap()
            .insert(favorite_key(address), nickname.to_string());
        Ok(())
    }

    fn remove_nickname(&self, address: &BDAddr) -> anyhow::Result<()> {
        self.names.lock().unwrap().remove(&favorite_key(address));
        Ok(())
    }
}
