use ikecmd_core::config::{Config, ConfigError};
use std::env;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tempfile::NamedTempFile;

// `Config::load` reads IKECMD_* variables, so every test that loads holds
// this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sets variables for the duration of a test and clears them on drop.
struct EnvVars(Vec<&'static str>);

impl EnvVars {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (key, value) in vars {
            env::set_var(key, value);
        }
        EnvVars(vars.iter().map(|(key, _)| *key).collect())
    }
}

impl Drop for EnvVars {
    fn drop(&mut self) {
        for key in &self.0 {
            env::remove_var(key);
        }
    }
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let _lock = env_lock();
    let mut file = NamedTempFile::new().unwrap();

    let config_str = r#"
        log_level = "debug"

        [logging]
        json = true

        [daemon]
        socket = "/run/ikecmd/test.sock"
        timeout_secs = 2

        [connection]
        host = "vpn.example.com"
        identity = "alice@example.com"
        profile = "v2-public-key-and-eap"
        private_key = "/etc/ikecmd/alice.pem"
        local_ts = ["10.9.0.0/24"]
        remote_ts = ["10.0.0.0/8", "192.168.0.0/16"]
    "#;

    file.write_all(config_str.as_bytes()).unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.log_level, "debug");
    assert!(config.logging.json);
    assert!(!config.logging.file);
    assert_eq!(config.daemon.socket, "/run/ikecmd/test.sock");
    assert_eq!(config.daemon.timeout(), Duration::from_secs(2));
    assert_eq!(config.connection.host, Some("vpn.example.com".to_string()));
    assert_eq!(
        config.connection.identity,
        Some("alice@example.com".to_string())
    );
    assert_eq!(config.connection.remote_identity, None);
    assert_eq!(
        config.connection.profile,
        Some("v2-public-key-and-eap".to_string())
    );
    assert_eq!(config.connection.local_ts, vec!["10.9.0.0/24".to_string()]);
    assert_eq!(config.connection.remote_ts.len(), 2);
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let _lock = env_lock();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"log_level = \"warn\"\n").unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.log_level, "warn");
    assert_eq!(config.daemon.socket, "/var/run/ikecmd/daemon.sock");
    assert_eq!(config.daemon.timeout_secs, 5);
    assert!(config.connection.local_ts.is_empty());
}

#[test]
fn test_invalid_profile_in_file() {
    let _lock = env_lock();
    let mut file = NamedTempFile::new().unwrap();

    let config_str = r#"
        [connection]
        profile = "ikev1-pub"
    "#;

    file.write_all(config_str.as_bytes()).unwrap();

    match Config::load(file.path()) {
        Err(ConfigError::InvalidValue { key, message }) => {
            assert_eq!(key, "connection.profile");
            assert!(message.contains("unknown connection profile"));
        }
        other => panic!("Expected InvalidValue for profile, got {:?}", other),
    }
}

#[test]
fn test_invalid_toml() {
    let _lock = env_lock();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[daemon\nsocket = 1").unwrap();

    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::TomlError(_))
    ));
}

#[test]
fn test_missing_file() {
    let _lock = env_lock();
    let result = Config::load("/nonexistent/ikecmd/config.toml");
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn test_save_and_reload() {
    let _lock = env_lock();
    let file = NamedTempFile::new().unwrap();

    let mut config = Config::new();
    config.connection.host = Some("gw.example.net".to_string());
    config.connection.remote_ts = vec!["172.16.0.0/12".to_string()];
    config.save(file.path()).unwrap();

    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.connection.host, Some("gw.example.net".to_string()));
    assert_eq!(loaded.connection.remote_ts, vec!["172.16.0.0/12".to_string()]);
}

#[test]
fn test_env_overrides_beat_file() {
    let _lock = env_lock();
    let file = config_file(
        r#"
        [logging]
        json = false

        [daemon]
        timeout_secs = 2

        [connection]
        host = "file.example.com"
        identity = "alice@example.com"
        local_ts = ["10.9.0.0/24"]
    "#,
    );

    let _vars = EnvVars::set(&[
        ("IKECMD_CONNECTION_HOST", "env.example.com"),
        ("IKECMD_CONNECTION_LOCAL_TS", "10.1.0.0/16, 10.2.0.0/16"),
        ("IKECMD_CONNECTION_REMOTE_TS", "192.168.1.0/24,,"),
        ("IKECMD_LOG_JSON", "yes"),
        ("IKECMD_DAEMON_TIMEOUT_SECS", "9"),
        ("IKECMD_DAEMON_SOCKET", "/run/ikecmd/env.sock"),
    ]);

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.connection.host.as_deref(), Some("env.example.com"));
    assert_eq!(
        config.connection.identity.as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(
        config.connection.local_ts,
        vec!["10.1.0.0/16".to_string(), "10.2.0.0/16".to_string()]
    );
    assert_eq!(
        config.connection.remote_ts,
        vec!["192.168.1.0/24".to_string()]
    );
    assert!(config.logging.json);
    assert_eq!(config.daemon.timeout(), Duration::from_secs(9));
    assert_eq!(config.daemon.socket, "/run/ikecmd/env.sock");
}

#[test]
fn test_unparseable_env_values_are_ignored() {
    let _lock = env_lock();
    let file = config_file("[logging]\njson = true\n\n[daemon]\ntimeout_secs = 3\n");

    let _vars = EnvVars::set(&[
        ("IKECMD_LOG_JSON", "maybe"),
        ("IKECMD_DAEMON_TIMEOUT_SECS", "soon"),
    ]);

    let config = Config::load(file.path()).unwrap();
    assert!(config.logging.json);
    assert_eq!(config.daemon.timeout_secs, 3);
}

#[test]
fn test_env_profile_is_validated() {
    let _lock = env_lock();
    let file = config_file("[connection]\nprofile = \"v2-eap\"\n");

    let _vars = EnvVars::set(&[("IKECMD_CONNECTION_PROFILE", "v3-magic")]);

    match Config::load(file.path()) {
        Err(ConfigError::InvalidValue { key, message }) => {
            assert_eq!(key, "connection.profile");
            assert_eq!(message, "unknown connection profile: v3-magic");
        }
        other => panic!("Expected InvalidValue for profile, got {:?}", other),
    }
}

#[test]
fn test_env_selectors_are_validated() {
    let _lock = env_lock();
    let file = config_file("[connection]\nremote_ts = [\"10.0.0.0/8\"]\n");

    let _vars = EnvVars::set(&[("IKECMD_CONNECTION_REMOTE_TS", "10.0.0.0/8,bogus")]);

    match Config::load(file.path()) {
        Err(ConfigError::InvalidValue { key, message }) => {
            assert_eq!(key, "connection.remote_ts");
            assert_eq!(message, "invalid traffic selector: bogus");
        }
        other => panic!("Expected InvalidValue for remote_ts, got {:?}", other),
    }
}

#[test]
fn test_env_zero_timeout_is_rejected() {
    let _lock = env_lock();
    let file = config_file("log_level = \"info\"\n");

    let _vars = EnvVars::set(&[("IKECMD_DAEMON_TIMEOUT_SECS", "0")]);

    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::InvalidValue { ref key, .. }) if key == "daemon.timeout_secs"
    ));
}
