use jobrunner::config::{Config, DEFAULT_DATABASE_URL};
use serial_test::serial;

const KEYS: [&str; 9] = [
    "JOBRUNNER_DATABASE_URL",
    "DATABASE_URL",
    "JOBRUNNER_ADMIN_ADDR",
    "ADMIN_ADDR",
    "JOBRUNNER_PERSIST_MAX_ATTEMPTS",
    "JOBRUNNER_PERSIST_RETRY_MS",
    "JOBRUNNER_SHUTDOWN_GRACE_MS",
    "JOBRUNNER_MIGRATE_ON_STARTUP",
    "JOBRUNNER_LOG_JSON",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_apply_when_nothing_is_set() {
    clear_env();
    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
    assert_eq!(cfg.admin_addr, None);
    assert!(cfg.migrate_on_startup);
    assert!(!cfg.log_json);

    let runner = cfg.runner_config();
    assert_eq!(runner.persist_max_attempts, 5);
    assert_eq!(runner.persist_retry_delay.as_millis(), 200);
    assert_eq!(runner.shutdown_grace.as_millis(), 5_000);
}

#[test]
#[serial]
fn primary_names_win_and_admin_can_be_disabled() {
    clear_env();
    std::env::set_var("DATABASE_URL", "sqlite://fallback.db");
    std::env::set_var("JOBRUNNER_DATABASE_URL", "sqlite://primary.db");
    std::env::set_var("ADMIN_ADDR", "off");
    std::env::set_var("JOBRUNNER_LOG_JSON", "yes");
    std::env::set_var("JOBRUNNER_SHUTDOWN_GRACE_MS", "750");

    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.database_url, "sqlite://primary.db");
    assert_eq!(cfg.admin_addr, None);
    assert!(cfg.log_json);
    assert_eq!(cfg.shutdown_grace_ms, 750);

    std::env::set_var("ADMIN_ADDR", " 127.0.0.1:8088 ");
    assert_eq!(Config::from_env().unwrap().admin_addr.as_deref(), Some("127.0.0.1:8088"));
    clear_env();
}

#[test]
#[serial]
fn invalid_numbers_are_rejected() {
    clear_env();
    std::env::set_var("JOBRUNNER_PERSIST_RETRY_MS", "soon");
    assert!(Config::from_env().is_err());

    clear_env();
    std::env::set_var("JOBRUNNER_PERSIST_MAX_ATTEMPTS", "0");
    assert!(Config::from_env().is_err());
    clear_env();
}
