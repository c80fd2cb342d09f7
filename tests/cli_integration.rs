use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tconn_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tconn"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("testimonies.json"),
        r#"[
  {
    "id": "t1",
    "title": "Nyamata church",
    "fullName": "Alice",
    "event": "Genocide",
    "dateOfEvent": "1994-04-07",
    "status": "approved"
  },
  {
    "id": "t2",
    "title": "Ntarama",
    "fullName": "Bob",
    "event": "Genocide",
    "dateOfEvent": "1994-04-09",
    "identityPreference": "anonymous"
  }
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/tconn.sqlite"

[server]
bind = "127.0.0.1:7342"
"#,
        root.display()
    );
    let config_path = config_dir.join("tconn.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tconn(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tconn_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .env_remove("EMBEDDING_PROVIDER")
        .env_remove("TCONN_DB_PATH")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tconn binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_tconn(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/tconn.sqlite").exists());

    let (_, stderr, ok) = run_tconn(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_import_approve_and_connections() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("testimonies.json");

    assert!(run_tconn(&config, &["init"]).2);

    let (stdout, stderr, ok) = run_tconn(&config, &["import", file.to_str().unwrap()]);
    assert!(ok, "import failed: {}", stderr);
    assert!(stdout.contains("imported: 2"));

    let (stdout, stderr, ok) = run_tconn(&config, &["approve", "t2"]);
    assert!(ok, "approve failed: {}", stderr);
    assert!(stdout.contains("edges: 2"), "unexpected output: {}", stdout);

    let (stdout, _, ok) = run_tconn(&config, &["connections", "t1"]);
    assert!(ok);
    assert!(stdout.contains("same_event"));
    assert!(stdout.contains("nearby_dates"));

    let (stdout, _, ok) = run_tconn(&config, &["discover", "--all"]);
    assert!(ok);
    assert!(stdout.contains("testimonies processed: 2"));

    let (stdout, _, ok) = run_tconn(&config, &["connections", "--all", "--limit", "1"]);
    assert!(ok);
    assert!(stdout.contains("1. [0.90] same_event"));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_errors_exit_nonzero() {
    let (_tmp, config) = setup_test_env();
    assert!(run_tconn(&config, &["init"]).2);

    let (_, stderr, ok) = run_tconn(&config, &["approve", "missing"]);
    assert!(!ok);
    assert!(stderr.contains("not found"));

    let (_, stderr, ok) = run_tconn(&config, &["embed", "pending"]);
    assert!(!ok);
    assert!(stderr.contains("disabled"));

    let (_, _, ok) = run_tconn(&config, &["discover"]);
    assert!(!ok);
}
