//! # Configuration
//!
//! Where debug-info packages are cached and fetched from, and whether the
//! subsystem (and its remote server) is enabled at all.
//!
//! Settings are persisted through a [`SettingsStore`]. Loading follows a few
//! rules so a damaged or hand-edited store cannot enable more than the host
//! asked for:
//!
//! - stored strings shorter than three characters count as unset
//! - stored enable flags can only turn a feature off, never on
//! - unset paths fall back to `<base dir>/Symbols` and the public Microsoft
//!   symbol server
//!
//! Saving is equally conservative: only a writable non-default cache
//! directory and a custom `http(s)://` server are persisted.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SymbolError, SymbolResult};

/// Public Microsoft symbol server.
pub const DEFAULT_SERVER: &str = "https://msdl.microsoft.com/download/symbols";

/// Cache directory name under the base directory.
pub const DEFAULT_CACHE_DIR: &str = "Symbols";

/// Stored strings shorter than this are treated as unset.
const MIN_STORED_LEN: usize = 3;

/// Host-provided starting point for configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSeed
{
    /// Directory the default cache lives under
    pub base_dir: PathBuf,
    /// Start with the remote server disabled
    pub disable_server_on_startup: bool,
}

impl ConfigSeed
{
    pub fn new(base_dir: impl Into<PathBuf>) -> Self
    {
        Self {
            base_dir: base_dir.into(),
            disable_server_on_startup: false,
        }
    }

    /// Default local cache: `<base dir>/Symbols`.
    pub fn default_cache(&self) -> PathBuf
    {
        self.base_dir.join(DEFAULT_CACHE_DIR)
    }
}

/// Settings as they appear in the persisted store
///
/// Every field is optional; missing fields fall back to defaults on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoredSettings
{
    pub symbol_cache: Option<String>,
    pub symbol_server: Option<String>,
    pub symbol_enable: Option<bool>,
    pub symbol_server_enable: Option<bool>,
}

/// Persisted settings backend
pub trait SettingsStore: Send + Sync
{
    /// Read the stored settings; `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> SymbolResult<Option<StoredSettings>>;

    /// Replace the stored settings.
    fn save(&self, settings: &StoredSettings) -> SymbolResult<()>;
}

/// Settings kept in a TOML file
#[derive(Debug, Clone)]
pub struct TomlSettingsStore
{
    path: PathBuf,
}

impl TomlSettingsStore
{
    pub fn new(path: impl Into<PathBuf>) -> Self
    {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore
{
    fn load(&self) -> SymbolResult<Option<StoredSettings>>
    {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| SymbolError::Config(format!("{}: {e}", self.path.display())))
    }

    fn save(&self, settings: &StoredSettings) -> SymbolResult<()>
    {
        let contents = toml::to_string_pretty(settings).map_err(|e| SymbolError::Config(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, contents)?;
        debug!("Saved symbol settings to {}", self.path.display());
        Ok(())
    }
}

/// Settings kept in memory, for embedding hosts without persistent storage
#[derive(Debug, Default)]
pub struct MemorySettingsStore
{
    settings: Mutex<Option<StoredSettings>>,
}

impl MemorySettingsStore
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_settings(settings: StoredSettings) -> Self
    {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

impl SettingsStore for MemorySettingsStore
{
    fn load(&self) -> SymbolResult<Option<StoredSettings>>
    {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &StoredSettings) -> SymbolResult<()>
    {
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }
}

/// Effective symbol configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolConfig
{
    /// Subsystem enabled
    pub enabled: bool,
    /// Remote symbol server enabled
    pub server_enabled: bool,
    /// Local debug-info package cache
    pub local_cache: PathBuf,
    /// Remote symbol server URL
    pub server_url: String,
}

impl SymbolConfig
{
    /// Configuration used before anything has been loaded.
    pub fn defaults(seed: &ConfigSeed) -> Self
    {
        Self {
            enabled: true,
            server_enabled: !seed.disable_server_on_startup,
            local_cache: seed.default_cache(),
            server_url: DEFAULT_SERVER.to_string(),
        }
    }

    /// Load the effective configuration.
    ///
    /// `current` carries the enable flags from a previous load (or from a
    /// reconfigure request); without it the flags start from the seed. Stored
    /// flags are consulted only for features that are currently on.
    pub fn load(store: &dyn SettingsStore, seed: &ConfigSeed, current: Option<&SymbolConfig>) -> SymbolResult<Self>
    {
        let mut config = Self::defaults(seed);
        if let Some(current) = current {
            config.enabled = current.enabled;
            config.server_enabled = current.server_enabled;
        }

        let stored = store.load()?.unwrap_or_default();
        if let Some(cache) = usable(stored.symbol_cache.as_deref()) {
            config.local_cache = PathBuf::from(cache);
        }
        if let Some(server) = usable(stored.symbol_server.as_deref()) {
            config.server_url = server.to_string();
        }
        if config.enabled {
            config.enabled = stored.symbol_enable.unwrap_or(true);
        }
        if config.server_enabled {
            config.server_enabled = stored.symbol_server_enable.unwrap_or(true);
        }
        Ok(config)
    }

    /// Settings to persist for this configuration.
    ///
    /// The cache directory is kept only when it is not the default and is a
    /// writable directory. The server is kept only when it is an `http://` or
    /// `https://` URL other than the Microsoft server. Anything else is stored
    /// as an empty string so the next load falls back to the default.
    pub fn to_stored(&self, seed: &ConfigSeed) -> StoredSettings
    {
        let cache = if self.local_cache != seed.default_cache() && is_writable_dir(&self.local_cache) {
            self.local_cache.to_string_lossy().into_owned()
        } else {
            String::new()
        };
        let custom_server = (self.server_url.starts_with("http://") || self.server_url.starts_with("https://"))
            && !self.server_url.contains("msdl.microsoft.com");
        let server = if custom_server { self.server_url.clone() } else { String::new() };

        StoredSettings {
            symbol_cache: Some(cache),
            symbol_server: Some(server),
            symbol_enable: Some(self.enabled),
            symbol_server_enable: Some(self.server_enabled),
        }
    }

    /// Persist this configuration through `store` using [`Self::to_stored`].
    pub fn persist(&self, store: &dyn SettingsStore, seed: &ConfigSeed) -> SymbolResult<()>
    {
        store.save(&self.to_stored(seed))
    }

    /// Symbol path directive for this configuration.
    pub fn symbol_path(&self) -> SymbolPath
    {
        SymbolPath::new(
            &self.local_cache,
            self.server_enabled.then_some(self.server_url.as_str()),
        )
    }
}

/// Native symbol path directive: `srv*<local cache>[*<server>]`
///
/// Passed verbatim to the symbol service, which downloads missing packages
/// from the server into the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolPath(String);

impl SymbolPath
{
    pub fn new(local_cache: &Path, server: Option<&str>) -> Self
    {
        let mut path = format!("srv*{}", local_cache.display());
        if let Some(server) = server {
            path.push('*');
            path.push_str(server);
        }
        SymbolPath(path)
    }

    pub fn as_str(&self) -> &str
    {
        &self.0
    }
}

impl fmt::Display for SymbolPath
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.0)
    }
}

fn usable(value: Option<&str>) -> Option<&str>
{
    value.filter(|v| v.chars().count() >= MIN_STORED_LEN)
}

fn is_writable_dir(path: &Path) -> bool
{
    fs::metadata(path).is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn seed() -> ConfigSeed
    {
        ConfigSeed::new("/opt/symdb")
    }

    #[test]
    fn test_defaults_without_stored_settings()
    {
        let store = MemorySettingsStore::new();
        let config = SymbolConfig::load(&store, &seed(), None).unwrap();
        assert!(config.enabled);
        assert!(config.server_enabled);
        assert_eq!(config.local_cache, PathBuf::from("/opt/symdb/Symbols"));
        assert_eq!(config.server_url, DEFAULT_SERVER);
    }

    #[test]
    fn test_short_stored_strings_are_ignored()
    {
        let store = MemorySettingsStore::with_settings(StoredSettings {
            symbol_cache: Some("C:".to_string()),
            symbol_server: Some(String::new()),
            ..StoredSettings::default()
        });
        let config = SymbolConfig::load(&store, &seed(), None).unwrap();
        assert_eq!(config.local_cache, seed().default_cache());
        assert_eq!(config.server_url, DEFAULT_SERVER);
    }

    #[test]
    fn test_stored_flags_only_turn_features_off()
    {
        let store = MemorySettingsStore::with_settings(StoredSettings {
            symbol_enable: Some(true),
            symbol_server_enable: Some(false),
            ..StoredSettings::default()
        });
        let config = SymbolConfig::load(&store, &seed(), None).unwrap();
        assert!(config.enabled);
        assert!(!config.server_enabled);

        let mut startup = seed();
        startup.disable_server_on_startup = true;
        let store = MemorySettingsStore::with_settings(StoredSettings {
            symbol_server_enable: Some(true),
            ..StoredSettings::default()
        });
        let config = SymbolConfig::load(&store, &startup, None).unwrap();
        assert!(!config.server_enabled);
    }

    #[test]
    fn test_symbol_path_directive()
    {
        let mut config = SymbolConfig::defaults(&seed());
        assert_eq!(
            config.symbol_path().as_str(),
            "srv*/opt/symdb/Symbols*https://msdl.microsoft.com/download/symbols"
        );
        config.server_enabled = false;
        assert_eq!(config.symbol_path().as_str(), "srv*/opt/symdb/Symbols");
    }

    #[test]
    fn test_save_rules_drop_default_values()
    {
        let config = SymbolConfig::defaults(&seed());
        let stored = config.to_stored(&seed());
        assert_eq!(stored.symbol_cache.as_deref(), Some(""));
        assert_eq!(stored.symbol_server.as_deref(), Some(""));
    }

    #[test]
    fn test_save_rules_server_url()
    {
        let mut config = SymbolConfig::defaults(&seed());
        config.server_url = "ftp://symbols.example.com".to_string();
        assert_eq!(config.to_stored(&seed()).symbol_server.as_deref(), Some(""));

        config.server_url = "https://symbols.example.com/store".to_string();
        assert_eq!(
            config.to_stored(&seed()).symbol_server.as_deref(),
            Some("https://symbols.example.com/store")
        );

        config.server_url = "http://msdl.microsoft.com/download/symbols".to_string();
        assert_eq!(config.to_stored(&seed()).symbol_server.as_deref(), Some(""));
    }

    #[test]
    fn test_save_rules_cache_must_exist()
    {
        let mut config = SymbolConfig::defaults(&seed());
        config.local_cache = PathBuf::from("/nonexistent/symdb/cache");
        assert_eq!(config.to_stored(&seed()).symbol_cache.as_deref(), Some(""));
    }
}
