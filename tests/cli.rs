use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gsth_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gsth");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("gst_docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("rule36.txt"),
        "Rule 36(4): input tax credit is limited to invoices reflected in GSTR-2B.",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/store.json"
dims = 4

[watch]
dir = "{root}/gst_docs"

[embedding]
provider = "disabled"

[reasoning]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("gsth.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gsth(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gsth_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gsth binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_classify_defaults_to_hybrid_when_reasoning_disabled() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_gsth(&config, &["classify", "total tax in March"]);
    assert!(success, "classify failed: {}", stderr);
    assert_eq!(stdout.trim(), "HYBRID_QUERY");
}

#[test]
fn test_stats_on_empty_store() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_gsth(&config, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Dimensions: 4"));
    assert!(stdout.contains("Documents:  0"));
}

#[test]
fn test_ingest_then_stats_then_remove() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("gst_docs").join("rule36.txt");

    let (stdout, stderr, success) = run_gsth(&config, &["ingest", file.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("indexed rule36.txt"));
    assert!(tmp.path().join("data").join("store.json").exists());

    let (stdout, _, success) = run_gsth(&config, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:  1"));
    assert!(stdout.contains("rule36.txt"));

    let (stdout, _, success) = run_gsth(&config, &["remove", "rule36.txt"]);
    assert!(success);
    assert!(stdout.contains("removed rule36.txt"));

    let (stdout, _, _) = run_gsth(&config, &["stats"]);
    assert!(stdout.contains("Documents:  0"));
}

#[test]
fn test_remove_unknown_id_is_not_an_error() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_gsth(&config, &["remove", "never-ingested.pdf"]);
    assert!(success, "remove failed: {}", stderr);
    assert!(stdout.contains("not in store"));
}

#[test]
fn test_ask_surfaces_error_when_reasoning_disabled() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) = run_gsth(&config, &["ask", "Is ITC allowed?"]);
    assert!(!success);
    assert!(stderr.contains("structured query failed") || stderr.contains("synthesis"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_gsth(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
