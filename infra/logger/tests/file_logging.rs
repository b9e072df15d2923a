use cachet_logger::{LogRotation, LogSettings, Logger};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn settings_enable_json_file_logging() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let log_dir = tmp_dir.path().join("logs");

    let settings = LogSettings {
        console: false,
        directory: Some(log_dir.clone()),
        json: true,
        rotation: LogRotation::Never,
        ..LogSettings::default()
    };

    let logger = Logger::builder("integration-file-logging").settings(&settings)?.init()?;
    assert!(logger.has_file_sink());

    tracing::info!(segment = "sessions", "hello from integration test");

    std::thread::sleep(Duration::from_millis(30));
    drop(logger);

    let log_file = fs::read_dir(&log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("log"))
        .expect("log file should be created");

    let contents = fs::read_to_string(&log_file)?;
    let line = contents.lines().next().expect("at least one line");
    assert!(line.starts_with('{'), "json lines expected, got {line}");
    assert!(line.contains("hello from integration test"));

    Ok(())
}
