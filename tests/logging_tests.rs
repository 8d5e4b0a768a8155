use drivelink::config::LoggingConfig;
use drivelink::logging::{LogContext, get_logger, get_logger_with_context, init_logging, parse_log_level};
use tracing::Level;

#[test]
fn parse_levels_case_insensitive() {
    assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
    assert_eq!(parse_log_level("Error").unwrap(), Level::ERROR);
    assert!(parse_log_level("verbose").is_err());
}

#[test]
fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        level: "DEBUG".to_string(),
        file: dir.path().join("drivelink.log").to_string_lossy().to_string(),
        console_output: false,
        ..Default::default()
    };
    assert!(init_logging(&config).is_ok());
    assert!(init_logging(&config).is_ok());

    // Loggers are usable after init
    get_logger("vehicle").info("logging initialized");
    get_logger_with_context(LogContext::new("edit").with_session_id("s-1".to_string()))
        .debug("context logger");

    // the appender keeps writing into the directory until process exit
    std::mem::forget(dir);
}
