//! Tests for TOML-backed settings persistence

use std::fs;

use symdb_core::{ConfigSeed, SettingsStore, StoredSettings, SymbolConfig, SymbolError, TomlSettingsStore};

#[test]
fn test_missing_file_loads_nothing()
{
    let dir = tempfile::tempdir().unwrap();
    let store = TomlSettingsStore::new(dir.path().join("symbols.toml"));

    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn test_save_then_load()
{
    let dir = tempfile::tempdir().unwrap();
    let store = TomlSettingsStore::new(dir.path().join("nested").join("symbols.toml"));
    let settings = StoredSettings {
        symbol_cache: Some("/srv/symbols".to_string()),
        symbol_server: Some(String::new()),
        symbol_enable: Some(true),
        symbol_server_enable: Some(false),
    };

    store.save(&settings).unwrap();
    assert_eq!(store.load().unwrap(), Some(settings));

    let text = fs::read_to_string(store.path()).unwrap();
    assert!(text.contains("symbol-cache = \"/srv/symbols\""), "{text}");
    assert!(text.contains("symbol-server-enable = false"), "{text}");
}

#[test]
fn test_partial_file_uses_defaults()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("symbols.toml");
    fs::write(&path, "symbol-server = \"https://symbols.example.com\"\n").unwrap();
    let store = TomlSettingsStore::new(&path);

    let config = SymbolConfig::load(&store, &ConfigSeed::new(dir.path()), None).unwrap();
    assert!(config.enabled);
    assert!(config.server_enabled);
    assert_eq!(config.server_url, "https://symbols.example.com");
    assert_eq!(config.local_cache, dir.path().join("Symbols"));
}

#[test]
fn test_malformed_file_is_a_config_error()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("symbols.toml");
    fs::write(&path, "symbol-enable = \"maybe\"\n").unwrap();

    let err = TomlSettingsStore::new(&path).load().unwrap_err();
    assert!(matches!(err, SymbolError::Config(_)));
}

#[test]
fn test_persist_writable_cache()
{
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    fs::create_dir(&cache).unwrap();
    let seed = ConfigSeed::new(dir.path());
    let store = TomlSettingsStore::new(dir.path().join("symbols.toml"));

    let mut config = SymbolConfig::defaults(&seed);
    config.local_cache = cache.clone();
    config.persist(&store, &seed).unwrap();

    let reloaded = SymbolConfig::load(&store, &seed, None).unwrap();
    assert_eq!(reloaded.local_cache, cache);
    assert_eq!(
        reloaded.symbol_path().as_str(),
        format!("srv*{}*https://msdl.microsoft.com/download/symbols", cache.display())
    );
}
