use assert_cmd::Command;
use assert_cmd::cargo;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::Server;
use predicates::prelude::*;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

const FOO_INDEX: &str = r#"[
    {"name": {"name": "foo"}, "depends": [[{"name": "bar"}]]},
    {"name": {"name": "x"}, "depends": [[{"name": "y"}, {"name": "z"}]]}
]"#;

const BAR_INDEX: &str = r#"[
    {"name": {"name": "bar"}, "depends": [[{"name": "foo"}]]},
    {"name": {"name": "z"}, "aliases": [{"name": "zz"}]}
]"#;

const ALPINE_INDEX: &str = r#"[
    {"name": {"distribution": "alpine", "name": "curl", "version": "8.5.0", "architecture": "x86_64"}}
]"#;

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// A workspace with two local repositories and a manifest listing them.
fn local_workspace() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("foo.json"), FOO_INDEX).unwrap();
    std::fs::write(dir.path().join("bar.json.gz"), gzip(BAR_INDEX)).unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"{"repositories": [{"path": "foo.json"}, {"path": "bar.json.gz"}]}"#,
    );
    (dir, manifest)
}

fn write_manifest(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("pkgdb.json");
    std::fs::write(&path, json).unwrap();
    path
}

fn pkgdb(dir: &Path, manifest: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("pkgdb"));
    cmd.arg("--manifest")
        .arg(manifest)
        .arg("--cache-dir")
        .arg(dir.join("cache"))
        .env_remove("PKGDB_TOKEN")
        .env_remove("PKGDB_MANIFEST")
        .env_remove("PKGDB_CACHE_DIR");
    cmd
}

#[test]
fn test_plan_resolves_cycle_across_repositories() {
    let (dir, manifest) = local_workspace();

    pkgdb(dir.path(), &manifest)
        .args(["--allow-local", "plan", "foo"])
        .assert()
        .success()
        .stdout("bar\nfoo\n");
}

#[test]
fn test_plan_picks_first_available_alternative() {
    let (dir, manifest) = local_workspace();

    pkgdb(dir.path(), &manifest)
        .args(["--allow-local", "--no-parallel", "plan", "x", "zz"])
        .assert()
        .success()
        .stdout("z\nx\n");
}

#[test]
fn test_plan_unknown_package_fails() {
    let (dir, manifest) = local_workspace();

    pkgdb(dir.path(), &manifest)
        .args(["--allow-local", "plan", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("package ghost not found"));
}

#[test]
fn test_local_repositories_need_allow_local() {
    let (dir, manifest) = local_workspace();

    pkgdb(dir.path(), &manifest)
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--allow-local"));
}

#[test]
fn test_names_streams_json_lines() {
    let (dir, manifest) = local_workspace();

    let output = pkgdb(dir.path(), &manifest)
        .args(["--allow-local", "names"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let names: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let short: Vec<&str> = names.iter().map(|n| n["name"].as_str().unwrap()).collect();
    assert_eq!(short, vec!["foo", "x", "bar", "z", "zz"]);
}

#[test]
fn test_search_http_repository() {
    let mut server = Server::new();
    let _index = server
        .mock("GET", "/alpine/index.json")
        .with_status(200)
        .with_body(ALPINE_INDEX)
        .create();

    let dir = tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        &format!(
            r#"{{"repositories": [{{"distro": "alpine", "url": "{}/alpine/index.json"}}]}}"#,
            server.url()
        ),
    );

    pkgdb(dir.path(), &manifest)
        .args(["search", "alpine/curl:x86_64"])
        .assert()
        .success()
        .stdout("alpine/curl@8.5.0:x86_64\n");

    pkgdb(dir.path(), &manifest)
        .args(["search", "debian/curl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages match debian/curl."));
}

#[test]
fn test_search_falls_back_to_provider() {
    let mut server = Server::new();
    let _index = server
        .mock("GET", "/index.json")
        .with_status(200)
        .with_body("[]")
        .create();
    let _search = server
        .mock("GET", "/search")
        .match_query(mockito::Matcher::UrlEncoded(
            "q".into(),
            "pypi/requests".into(),
        ))
        .with_status(200)
        .with_body(r#"[{"name": {"distribution": "pypi", "name": "requests", "version": "2.32.0"}}]"#)
        .create();

    let dir = tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        &format!(
            r#"{{
                "repositories": [{{"url": "{url}/index.json"}}],
                "search_providers": [{{"distro": "pypi", "url": "{url}/search"}}]
            }}"#,
            url = server.url()
        ),
    );

    pkgdb(dir.path(), &manifest)
        .args(["search", "pypi/requests", "--limit", "1"])
        .assert()
        .success()
        .stdout("pypi/requests@2.32.0\n");
}

#[test]
fn test_fetch_uses_cache_on_second_run() {
    let mut server = Server::new();
    let index = server
        .mock("GET", "/alpine/index.json")
        .with_status(200)
        .with_body(ALPINE_INDEX)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        &format!(
            r#"{{"repositories": [{{"distro": "alpine", "url": "{}/alpine/index.json"}}]}}"#,
            server.url()
        ),
    );

    pkgdb(dir.path(), &manifest)
        .arg("fetch")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh packages=1"))
        .stdout(predicate::str::contains("1 packages"));

    pkgdb(dir.path(), &manifest)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "cached""#));

    index.assert();
}

#[test]
fn test_fetch_failure_reports_repository() {
    let mut server = Server::new();
    let _ok = server
        .mock("GET", "/good.json")
        .with_status(200)
        .with_body("[]")
        .create();
    let _missing = server
        .mock("GET", "/missing.json")
        .with_status(404)
        .create();

    let dir = tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        &format!(
            r#"{{"repositories": [{{"url": "{url}/good.json"}}, {{"url": "{url}/missing.json"}}]}}"#,
            url = server.url()
        ),
    );

    pkgdb(dir.path(), &manifest)
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"))
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn test_script_runs_manifest_entry() {
    let mut server = Server::new();
    let script = server
        .mock("GET", "/scripts/kernel?arg=--release&arg=6.6")
        .with_status(200)
        .with_body(r#"{"steps": ["make"]}"#)
        .create();

    let dir = tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        &format!(
            r#"{{"scripts": [{{"name": "kernel", "url": "{}/scripts/kernel"}}]}}"#,
            server.url()
        ),
    );

    pkgdb(dir.path(), &manifest)
        .args(["script", "kernel", "--release", "6.6"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""make""#));
    script.assert();

    pkgdb(dir.path(), &manifest)
        .args(["script", "initramfs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no build script fetcher defined for: initramfs"));
}

#[test]
fn test_missing_manifest_fails() {
    let dir = tempdir().unwrap();

    pkgdb(dir.path(), &dir.path().join("absent.json"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read manifest"));
}
