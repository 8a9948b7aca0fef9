// tests/config_env.rs
use std::io::Write;
use std::time::Duration;

use serial_test::serial;
use tempfile::NamedTempFile;

use tokenlaunch_radar::config::accounts::load_accounts_from;
use tokenlaunch_radar::AppConfig;

const KEYS: &[&str] = &[
    "ACCOUNTS",
    "ACCOUNTS_PATH",
    "NITTER_INSTANCE",
    "POLL_INTERVAL_SECS",
    "DEDUP_CAPACITY",
    "HUB_CAPACITY",
    "SMTP_HOST",
    "SMTP_USER",
    "SMTP_PASS",
    "NOTIFY_EMAIL_FROM",
    "NOTIFY_EMAIL_TO",
    "CONSUMER_MAX_ATTEMPTS",
    "CONSUMER_BACKOFF_MS",
];

fn clear_env() {
    for k in KEYS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn env_overrides_are_applied() {
    clear_env();
    std::env::set_var("ACCOUNTS", "degen,@whale");
    std::env::set_var("NITTER_INSTANCE", "nitter.example");
    std::env::set_var("POLL_INTERVAL_SECS", "0");
    std::env::set_var("HUB_CAPACITY", "32");
    std::env::set_var("CONSUMER_MAX_ATTEMPTS", "99");
    std::env::set_var("CONSUMER_BACKOFF_MS", "50");

    let cfg = AppConfig::from_env().expect("config");
    clear_env();

    assert_eq!(cfg.accounts, vec!["degen".to_string(), "whale".to_string()]);
    assert_eq!(cfg.nitter_instance, "nitter.example");
    assert_eq!(cfg.producer.interval, Duration::from_secs(1), "zero clamped");
    assert_eq!(cfg.hub_capacity, 32);
    assert_eq!(cfg.consume_policy.max_attempts, 20);
    assert_eq!(cfg.consume_policy.backoff, Duration::from_millis(50));
}

#[test]
#[serial]
fn accounts_file_is_merged_with_inline_list() {
    clear_env();
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    writeln!(file, r#"accounts = ["@whale", "anon"]"#).unwrap();

    std::env::set_var("ACCOUNTS", "degen,whale");
    std::env::set_var("ACCOUNTS_PATH", file.path());
    let cfg = AppConfig::from_env().expect("config");
    clear_env();

    assert_eq!(
        cfg.accounts,
        vec!["anon".to_string(), "degen".into(), "whale".into()]
    );
}

#[test]
#[serial]
fn missing_accounts_file_is_an_error() {
    clear_env();
    std::env::set_var("ACCOUNTS_PATH", "/definitely/not/here.toml");
    let res = AppConfig::from_env();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn smtp_requires_every_field() {
    clear_env();
    std::env::set_var("SMTP_HOST", "smtp.example");
    std::env::set_var("SMTP_USER", "bot");
    std::env::set_var("SMTP_PASS", "secret");
    std::env::set_var("NOTIFY_EMAIL_FROM", "bot@example.com");
    assert!(AppConfig::from_env().unwrap().smtp.is_none());

    std::env::set_var("NOTIFY_EMAIL_TO", "ops@example.com");
    let smtp = AppConfig::from_env().unwrap().smtp.expect("smtp configured");
    clear_env();
    assert_eq!(smtp.host, "smtp.example");
    assert_eq!(smtp.to, "ops@example.com");
}

#[test]
fn json_accounts_file_loads() {
    let mut file = NamedTempFile::new().expect("tempfile");
    write!(file, r#"["  @alice ", "bob", ""]"#).unwrap();
    let accounts = load_accounts_from(file.path()).unwrap();
    assert_eq!(accounts, vec!["alice".to_string(), "bob".to_string()]);
}
