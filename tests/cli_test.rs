use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn mediagraph(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mediagraph"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to run mediagraph")
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = mediagraph(temp_path, &["init"]);
    assert!(output.status.success());

    // Check that config file was created
    let config_path = temp_path.join(".mediagraph/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[watcher]"));
    assert!(content.contains("[broker]"));

    // A second init without --force refuses to overwrite
    let output = mediagraph(temp_path, &["init"]);
    assert!(!output.status.success());
    let output = mediagraph(temp_path, &["init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".mediagraph");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config_content = r#"
version = 2
[watcher]
debounce_ms = 750
"#;
    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = mediagraph(temp_path, &["config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("debounce_ms = 750"));
}

#[test]
fn test_prospect_prints_wire_record() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("track.flac");
    std::fs::write(&file, b"audio").unwrap();
    std::fs::write(temp_dir.path().join("track.cue"), b"cue").unwrap();

    let output = mediagraph(temp_dir.path(), &["prospect", "track.flac"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["event_type"], "IN_CREATE");
    assert_eq!(json["size"], 5);
    assert_eq!(json["neighbors"].as_array().unwrap().len(), 1);
}

#[test]
fn test_prospect_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = mediagraph(temp_dir.path(), &["prospect", "nope.flac"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.flac"));
}

#[test]
fn test_scan_then_consume() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path();
    let media = workspace.join("media");
    std::fs::create_dir_all(media.join("album")).unwrap();
    std::fs::write(media.join("album/track.flac"), b"audio").unwrap();
    std::fs::write(media.join("album/track.cue"), b"cue").unwrap();
    std::fs::write(media.join("album/track.flac.part"), b"partial").unwrap();

    assert!(mediagraph(workspace, &["init"]).status.success());

    let output = mediagraph(workspace, &["scan", "media"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("2 published"), "{stdout}");

    let output = mediagraph(workspace, &["queue", "stats"]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("graph-writer"));

    let output = mediagraph(workspace, &["consume", "--once"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Merged 2 record(s)"), "{stdout}");

    let output = mediagraph(workspace, &["graph", "neighbors", "media/album/track.flac"]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("track.cue"));
}
