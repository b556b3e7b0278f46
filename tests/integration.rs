use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const DIMS: usize = 16;

fn tmem_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tmem");
    path
}

/// Bag-of-bytes vector; identical text maps to identical vectors.
fn fake_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for b in text.bytes() {
        v[b as usize % DIMS] += 1.0;
    }
    v
}

/// Stand-in for Ollama's `/api/embed`: answers every request with one
/// `fake_vector` per input string.
fn start_embed_server() -> (mockito::ServerGuard, mockito::Mock) {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/embed")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(|request| {
            let body: serde_json::Value = request
                .body()
                .ok()
                .and_then(|b| serde_json::from_slice(b).ok())
                .unwrap_or(serde_json::Value::Null);
            let embeddings: Vec<Vec<f32>> = body["input"]
                .as_array()
                .map(|inputs| {
                    inputs
                        .iter()
                        .map(|t| fake_vector(t.as_str().unwrap_or_default()))
                        .collect()
                })
                .unwrap_or_default();
            serde_json::json!({ "embeddings": embeddings })
                .to_string()
                .into_bytes()
        })
        .create();
    (server, mock)
}

struct TestEnv {
    _tmp: TempDir,
    _embed: Option<(mockito::ServerGuard, mockito::Mock)>,
    root: PathBuf,
    config_path: PathBuf,
}

fn setup_test_env(embedding: &str) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("rust.md"),
        "# Rust\n\nOwnership and borrowing keep memory safe without a garbage collector.",
    )
    .unwrap();
    fs::write(
        files_dir.join("groceries.txt"),
        "Buy oat milk, rye bread and coffee beans on Friday.",
    )
    .unwrap();

    let mirror = root.join("mirror");
    fs::create_dir_all(mirror.join("JARVIS-Core")).unwrap();
    fs::create_dir_all(mirror.join("JARVIS-Ephemeral")).unwrap();
    fs::create_dir_all(mirror.join("Unsorted")).unwrap();
    fs::write(mirror.join("JARVIS-Core/profile.md"), "The user prefers metric units.").unwrap();
    fs::write(mirror.join("JARVIS-Ephemeral/todo.txt"), "Call the plumber tomorrow.").unwrap();
    fs::write(mirror.join("Unsorted/misc.txt"), "Not mapped to any tier.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/memory.sqlite"

[chunking]
chunk_size = 200
overlap = 40

[retrieval]
top_k = 5

{embedding}

[sync]
root = "{root}/mirror"
"#,
        root = root.display(),
        embedding = embedding,
    );

    let config_path = config_dir.join("tmem.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        _embed: None,
        root,
        config_path,
    }
}

fn embedding_env() -> TestEnv {
    let (server, mock) = start_embed_server();
    let mut env = setup_test_env(&format!(
        "[embedding]\nprovider = \"ollama\"\nmodel = \"fake\"\ndims = {}\nurl = \"{}\"\nmax_retries = 0",
        DIMS,
        server.url()
    ));
    env._embed = Some((server, mock));
    env
}

fn run_tmem(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tmem_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tmem binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let env = setup_test_env("");
    let (stdout, stderr, success) = run_tmem(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(env.root.join("data/memory.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env("");
    let (_, _, first) = run_tmem(&env.config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_tmem(&env.config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_and_sweep_on_empty_store() {
    let env = setup_test_env("");
    run_tmem(&env.config_path, &["init"]);

    let (stdout, stderr, success) = run_tmem(&env.config_path, &["stats", "--json"]);
    assert!(success, "stats failed: {}", stderr);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 0);
    assert_eq!(stats["total_chunks"], 0);

    let (stdout, stderr, success) = run_tmem(&env.config_path, &["sweep"]);
    assert!(success, "sweep failed: {}", stderr);
    assert!(stdout.contains("total      0 document(s)"));
}

#[test]
fn test_delete_unknown_id_is_noop() {
    let env = setup_test_env("");
    run_tmem(&env.config_path, &["init"]);
    let (stdout, stderr, success) = run_tmem(&env.config_path, &["delete", "does-not-exist"]);
    assert!(success, "delete failed: {}", stderr);
    assert!(stdout.contains("no document"));
}

#[test]
fn test_get_unknown_id() {
    let env = setup_test_env("");
    run_tmem(&env.config_path, &["init"]);

    let (stdout, _, success) = run_tmem(&env.config_path, &["get", "nope", "--json"]);
    assert!(success);
    assert_eq!(stdout.trim(), "null");

    let (_, stderr, success) = run_tmem(&env.config_path, &["get", "nope"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_invalid_chunk_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/m.sqlite\"\n\n[chunking]\nchunk_size = 100\noverlap = 100\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_tmem(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_tmem(Path::new("/nonexistent/tmem.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ingest_without_embedder_fails() {
    let env = setup_test_env("");
    run_tmem(&env.config_path, &["init"]);
    let file = env.root.join("files/rust.md");
    let (_, stderr, success) = run_tmem(&env.config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_query_and_reingest() {
    let env = embedding_env();
    run_tmem(&env.config_path, &["init"]);

    let rust = env.root.join("files/rust.md");
    let groceries = env.root.join("files/groceries.txt");

    let (stdout, stderr, success) = run_tmem(
        &env.config_path,
        &["ingest", "--tier", "core", rust.to_str().unwrap()],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("created"));

    let (stdout, _, success) = run_tmem(
        &env.config_path,
        &["ingest", "--tier", "ephemeral", groceries.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.starts_with("created"));

    let (stdout, _, success) = run_tmem(
        &env.config_path,
        &["ingest", "--tier", "core", rust.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.starts_with("unchanged"), "stdout: {}", stdout);

    let (stdout, stderr, success) = run_tmem(
        &env.config_path,
        &["query", "Ownership and borrowing keep memory safe", "--json"],
    );
    assert!(success, "query failed: {}", stderr);
    let passages: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(passages.len(), 2);
    assert_eq!(passages[0]["tier"], "core");
    assert_eq!(passages[1]["tier"], "ephemeral");

    let (stdout, _, success) = run_tmem(
        &env.config_path,
        &["query", "coffee", "--tier", "ephemeral", "--context"],
    );
    assert!(success);
    assert!(stdout.starts_with("[Context 1 - Source: "));
    assert!(stdout.contains("Tier: ephemeral"));
    assert!(!stdout.contains("Tier: core"));

    let (stdout, _, success) = run_tmem(&env.config_path, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 2);
}

#[test]
fn test_sync_dry_run_then_real_run() {
    let env = embedding_env();
    run_tmem(&env.config_path, &["init"]);

    let (stdout, stderr, success) =
        run_tmem(&env.config_path, &["sync", "--dry-run", "--progress", "off"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("sync (dry run) drive"));
    assert!(stdout.contains("added:     2"));
    assert!(stdout.contains("skipped:   1"));

    let (stdout, _, _) = run_tmem(&env.config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 0);

    let (stdout, stderr, success) = run_tmem(&env.config_path, &["sync", "--progress", "off"]);
    assert!(success, "sync failed: {}", stderr);
    assert!(stdout.contains("added:     2"));
    assert!(stdout.contains("failed:    0"));

    fs::remove_file(env.root.join("mirror/JARVIS-Ephemeral/todo.txt")).unwrap();
    let (stdout, _, success) = run_tmem(&env.config_path, &["sync", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("removed:   1"));
    assert!(stdout.contains("unchanged: 1"));
}

#[test]
fn test_negative_ttl_rejected() {
    let env = setup_test_env("");
    run_tmem(&env.config_path, &["init"]);
    let (_, stderr, success) = run_tmem(
        &env.config_path,
        &["ingest", "--text", "note", "--ttl=-5"],
    );
    assert!(!success);
    assert!(stderr.contains("--ttl"), "stderr: {}", stderr);
}

#[test]
fn test_same_text_in_two_tiers() {
    let env = embedding_env();
    run_tmem(&env.config_path, &["init"]);

    for tier in ["core", "ephemeral"] {
        let (stdout, stderr, success) = run_tmem(
            &env.config_path,
            &["ingest", "--tier", tier, "--text", "my blood type is O+"],
        );
        assert!(success, "ingest failed: {}", stderr);
        assert!(stdout.starts_with("created"), "stdout: {}", stdout);
    }

    let (stdout, _, _) = run_tmem(&env.config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 2);
}
