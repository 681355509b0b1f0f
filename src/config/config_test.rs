use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_devtracker_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DEVTRACKER__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = DevtrackerConfig::default();

    assert_eq!(config.http.port, 2501);
    assert_eq!(config.views.lock_timeout_ms, 500);
    assert_eq!(config.views.max_page_size, 500);
    assert_eq!(config.views.strong_signal_dbm, -60);
    assert_eq!(config.views.default_phys, vec!["IEEE802.11", "Bluetooth"]);
    assert!(!config.monitoring.prometheus_enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_devtracker_env_vars();
    with_vars(
        vec![
            ("DEVTRACKER__VIEWS__LOCK_TIMEOUT_MS", Some("250")),
            ("DEVTRACKER__HTTP__PORT", Some("2600")),
        ],
        || {
            let config = DevtrackerConfig::new().unwrap();

            assert_eq!(config.views.lock_timeout_ms, 250);
            assert_eq!(config.http.port, 2600);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_devtracker_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");

    std::fs::write(
        &config_path,
        r#"
        [storage]
        db_path = "/tmp/xx/db"

        [views]
        max_page_size = 50
        default_phys = ["IEEE802.15.4"]
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = DevtrackerConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.storage.db_path.as_os_str().to_str(), Some("/tmp/xx/db"));
        assert_eq!(config.views.max_page_size, 50);
        assert_eq!(config.views.default_phys, vec!["IEEE802.15.4"]);
        // untouched values keep their defaults
        assert_eq!(config.views.lock_timeout_ms, 500);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_devtracker_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("devtracker.toml");
    std::fs::write(
        &config_path,
        r#"
        [http]
        port = 3000
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("DEVTRACKER__HTTP__PORT", Some("4000")),
        ],
        || {
            let config = DevtrackerConfig::new().unwrap();
            assert_eq!(config.http.port, 4000);
        },
    );
}

#[test]
#[serial]
fn missing_config_path_file_is_an_error() {
    cleanup_all_devtracker_env_vars();
    with_vars(vec![("CONFIG_PATH", Some("/nonexistent/devtracker.toml"))], || {
        assert!(DevtrackerConfig::new().is_err());
    });
}

#[test]
fn validation_should_reject_zero_lock_timeout() {
    let mut config = DevtrackerConfig::default();
    config.views.lock_timeout_ms = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_bad_listen_address() {
    let mut config = DevtrackerConfig::default();
    config.http.listen_address = "not-an-ip".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_signal_threshold_out_of_range() {
    let mut config = DevtrackerConfig::default();
    config.views.strong_signal_dbm = 10;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_privileged_prometheus_port() {
    let mut config = DevtrackerConfig::default();
    config.monitoring.prometheus_enabled = true;
    config.monitoring.prometheus_port = 80;

    assert!(config.validate().is_err());
}

#[test]
fn socket_addr_combines_address_and_port() {
    let http = HttpConfig {
        listen_address: "127.0.0.1".to_string(),
        port: 2501,
    };
    assert_eq!(http.socket_addr().unwrap().to_string(), "127.0.0.1:2501");
}
