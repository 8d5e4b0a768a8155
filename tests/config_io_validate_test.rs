use drivelink::config::Config;
use std::fs;

fn configured() -> Config {
    let mut cfg = Config::default();
    cfg.vehicle.vin = "WBY1Z21000V000001".to_string();
    cfg.account.access_token = "token".to_string();
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = configured();
    cfg.vehicle.drive_train = "BEV".to_string();
    cfg.vehicle.services_supported = vec!["statistics".to_string()];
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.vehicle.vin, "WBY1Z21000V000001");
    assert!(loaded.vehicle.is_electric());
    assert_eq!(loaded.vehicle.services_supported, vec!["statistics"]);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    // Missing identity
    assert!(Config::default().validate().is_err());

    let mut cfg = configured();
    cfg.account.access_token.clear();
    assert!(cfg.validate().is_err());

    cfg = configured();
    cfg.account.region = "MARS".to_string();
    assert!(cfg.validate().is_err());

    cfg = configured();
    cfg.vehicle.refresh_interval_minutes = 0;
    assert!(cfg.validate().is_err());

    cfg = configured();
    cfg.vehicle.image_size = 0;
    assert!(cfg.validate().is_err());

    cfg = configured();
    cfg.vehicle.edit_timeout_secs = 0;
    let err = cfg.validate().unwrap_err();
    assert!(format!("{}", err).contains("Configuration error"));
}

#[test]
fn partial_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"vehicle:\n  vin: WBY1\n  drive_train: PHEV\naccount:\n  access_token: abc\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.vehicle.refresh_interval_minutes, 15);
    assert_eq!(cfg.vehicle.image_viewport, "FRONT");
    assert_eq!(cfg.web.port, 8089);
    assert!(cfg.vehicle.is_electric());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
