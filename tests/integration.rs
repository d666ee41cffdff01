use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn oraculo_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("oraculo");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/users.db"

[data]
cache_file = "{root}/data/cache.json"
training_dir = "{root}/data/documents/training"
learned_dir = "{root}/data/documents/learned"

[provider]
name = "openai"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("oraculo.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_oraculo(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = oraculo_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run oraculo binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database_and_data_layout() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_oraculo(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let root = tmp.path();
    assert!(root.join("data/users.db").exists());
    assert!(root.join("data/documents/training").is_dir());
    assert!(root.join("data/documents/learned").is_dir());
    assert_eq!(
        fs::read_to_string(root.join("data/cache.json")).unwrap(),
        "[]"
    );
}

#[test]
fn test_init_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_oraculo(&config_path, &["init"]);
    assert!(success1);

    // A populated cache file must survive a second init.
    fs::write(
        tmp.path().join("data/cache.json"),
        r#"[{"question":"q","answer":"a"}]"#,
    )
    .unwrap();

    let (_, _, success2) = run_oraculo(&config_path, &["init"]);
    assert!(success2);
    assert!(fs::read_to_string(tmp.path().join("data/cache.json"))
        .unwrap()
        .contains("\"question\""));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("absent.toml");
    let (_, stderr, success) = run_oraculo(&bogus, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_provider_rejected() {
    let (tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("openai", "gemini");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_oraculo(&config_path, &["init"]);
    assert!(!success, "init should reject unknown provider");
    assert!(stderr.contains("Unknown provider"));
    let _ = tmp;
}

#[test]
fn test_serve_requires_secret() {
    let (_tmp, config_path) = setup_test_env();
    let binary = oraculo_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("serve")
        .env_remove("ORACULO_SECRET")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ORACULO_SECRET"));
}
