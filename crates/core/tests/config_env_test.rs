use std::io::Write;

use scheduler_core::config::AppConfig;

#[test]
fn test_environment_overrides_file_values() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        [worker]
        slots = 2

        [lease]
        default_lease_seconds = 600
        "#
    )
    .unwrap();

    std::env::set_var("SCHEDULER__WORKER__SLOTS", "8");
    let config = AppConfig::load(file.path().to_str());
    std::env::remove_var("SCHEDULER__WORKER__SLOTS");

    let config = config.unwrap();
    assert_eq!(config.worker.slots, 8);
    assert_eq!(config.lease.default_lease_seconds, 600);
}
