// Config loading and validation tests

use pingboard::config::{AppConfig, expand_ss_locator};
use std::time::Duration;

const VALID_CONFIG: &str = r#"
[server]
port = 8080
host = "127.0.0.1"

[history]
oldest_history = 30
data_dir = "/tmp/pingboard"

[render]
slow_threshold_ms = 3000

[[sites]]
name = " tokyo "
url = " socks5://127.0.0.1:1080 "

[[sites]]
name = "paris"
url = "http://10.0.0.2:3128"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.history.oldest_history, 30);
    assert_eq!(config.render.slow_threshold_ms, 3000);
    assert_eq!(config.data_dir(), std::path::PathBuf::from("/tmp/pingboard"));
}

#[test]
fn test_site_fields_are_trimmed_and_ordered() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let order = config.target_order();
    assert_eq!(order.names(), &["tokyo".to_string(), "paris".to_string()]);
    let targets = config.targets();
    assert_eq!(targets[0].locator, "socks5://127.0.0.1:1080");
    assert_eq!(targets[1].name, "paris");
}

#[test]
fn test_config_defaults_when_omitted() {
    let minimal = r#"
[server]
port = 9000

[[sites]]
name = "a"
url = "socks5://127.0.0.1:1080"
"#;
    let config = AppConfig::load_from_str(minimal).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.history.oldest_history, 60);
    assert!(config.history.data_dir.is_none());
    assert_eq!(config.render.slow_threshold_ms, 5000);
    assert_eq!(
        config.probe.check_url,
        "http://connectivitycheck.gstatic.com/generate_204"
    );
    assert_eq!(config.probe.connect_timeout_secs, 5);
    assert_eq!(config.probe.response_timeout_secs, 10);

    let scheduler = config.scheduler_config();
    assert_eq!(scheduler.round_interval, Duration::from_secs(60));
    assert_eq!(scheduler.retry.max_attempts, 3);
    assert_eq!(scheduler.retry.pacing, Duration::from_secs(15));
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8080", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_zero_history() {
    let bad = VALID_CONFIG.replace("oldest_history = 30", "oldest_history = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("oldest_history"));
}

#[test]
fn test_config_validation_rejects_zero_slow_threshold() {
    let bad = VALID_CONFIG.replace("slow_threshold_ms = 3000", "slow_threshold_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("slow_threshold_ms"));
}

#[test]
fn test_config_validation_rejects_empty_name() {
    let bad = VALID_CONFIG.replace("name = \" tokyo \"", "name = \"   \"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("name must be specified"));
}

#[test]
fn test_config_validation_rejects_duplicate_name() {
    let bad = VALID_CONFIG.replace("name = \"paris\"", "name = \"tokyo\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("unique"));
}

#[test]
fn test_config_validation_rejects_comma_in_name() {
    let bad = VALID_CONFIG.replace("name = \"paris\"", "name = \"paris,fr\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("commas"));
}

#[test]
fn test_config_validation_rejects_empty_url() {
    let bad = VALID_CONFIG.replace("url = \"http://10.0.0.2:3128\"", "url = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("url must be specified"));
}

#[test]
fn test_config_validation_requires_sites() {
    let err = AppConfig::load_from_str("[server]\nport = 8080\n").unwrap_err();
    assert!(err.to_string().contains("sites"));
}

#[test]
fn test_config_validation_rejects_zero_attempts() {
    let bad = format!("{VALID_CONFIG}\n[probe]\nmax_attempts = 0\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_file_via_env_defaults_data_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let without_dir = VALID_CONFIG.replace("data_dir = \"/tmp/pingboard\"\n", "");
    std::fs::write(&path, without_dir).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.data_dir(), dir.path());
}

#[test]
fn test_config_validation_rejects_zero_pacing() {
    let bad = format!("{VALID_CONFIG}\n[probe]\nattempt_pacing_secs = 0\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("attempt_pacing_secs"));
}

#[test]
fn test_base64_ss_locator_is_expanded() {
    // base64("aes-256-gcm:pass@1.2.3.4:8388")
    let encoded = "ss://YWVzLTI1Ni1nY206cGFzc0AxLjIuMy40OjgzODg=";
    assert_eq!(
        expand_ss_locator(encoded).unwrap(),
        "ss://aes-256-gcm:pass@1.2.3.4:8388"
    );
    // Unpadded url-safe encodings show up in share links.
    assert_eq!(
        expand_ss_locator("ss://YWVzLTI1Ni1nY206cGFzc0AxLjIuMy40OjgzODg").unwrap(),
        "ss://aes-256-gcm:pass@1.2.3.4:8388"
    );

    let config_text = VALID_CONFIG.replace(
        "url = \"http://10.0.0.2:3128\"",
        &format!("url = \" {encoded} \""),
    );
    let config = AppConfig::load_from_str(&config_text).unwrap();
    assert_eq!(config.targets()[1].locator, "ss://aes-256-gcm:pass@1.2.3.4:8388");
}

#[test]
fn test_plain_locators_are_left_alone() {
    for url in [
        "ss://aes-256-gcm:pass@1.2.3.4:8388",
        "socks5://127.0.0.1:1080",
        "http://10.0.0.2:3128",
    ] {
        assert_eq!(expand_ss_locator(url).unwrap(), url);
    }
}

#[test]
fn test_config_rejects_undecodable_ss_locator() {
    let bad = VALID_CONFIG.replace("url = \"http://10.0.0.2:3128\"", "url = \"ss://!!notbase64\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sites[1].url"));

    // Decodes fine but is not a method:password@host:port triple.
    let no_at = "ss://aGVsbG8="; // base64("hello")
    assert!(expand_ss_locator(no_at).is_err());
}
