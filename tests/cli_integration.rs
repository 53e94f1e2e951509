//! CLI integration tests for cforge.
//!
//! Every test runs against a private cache holding a seeded, fresh index
//! mirror, with remote operations disabled.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const FMT: &str = r#"
[package]
name = "fmt"
description = "A modern formatting library"
repository = "https://github.com/fmtlib/fmt"
keywords = ["format", "printf"]
tag_pattern = "{version}"

[cmake]
target = "fmt::fmt"

[[versions]]
version = "11.2.0"

[[versions]]
version = "11.1.4"
yanked = true

[[versions]]
version = "10.2.1"
"#;

const SPDLOG: &str = r#"
[package]
name = "spdlog"
description = "Fast C++ logging library"
repository = "https://github.com/gabime/spdlog"
tag_pattern = "v{version}"

[integration]
cmake_target = "spdlog::spdlog"

[features]
default = ["external_fmt"]

[features.external_fmt]
option = "SPDLOG_FMT_EXTERNAL"
requires = ["fmt@11.*"]

[[versions]]
version = "1.15.0"
"#;

/// A project directory plus a user cache seeded with an index mirror.
struct Fixture {
    _tmp: TempDir,
    project: PathBuf,
    cache: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn new(dependencies: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("demo");
        let cache = tmp.path().join("cache");
        let config = tmp.path().join("config");
        fs::create_dir_all(&project).unwrap();
        fs::create_dir_all(&config).unwrap();

        let registry = cache.join("registry");
        for (name, content) in [("fmt", FMT), ("spdlog", SPDLOG)] {
            let dir = registry
                .join("cforge-index")
                .join("packages")
                .join(&name[..1]);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{}.toml", name)), content).unwrap();
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        fs::write(registry.join(".last_update"), now.to_string()).unwrap();

        fs::write(
            project.join("cforge.toml"),
            format!(
                "[project]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\n{}",
                dependencies
            ),
        )
        .unwrap();

        Fixture {
            _tmp: tmp,
            project,
            cache,
            config,
        }
    }

    fn cforge(&self) -> Command {
        let mut cmd = Command::cargo_bin("cforge").unwrap();
        cmd.current_dir(&self.project)
            .env("CFORGE_CACHE_DIR", &self.cache)
            .env("CFORGE_OFFLINE", "1")
            .env("XDG_CONFIG_HOME", &self.config)
            .env_remove("RUST_LOG")
            .arg("--color")
            .arg("never");
        cmd
    }

    fn path(&self, name: &str) -> PathBuf {
        self.project.join(name)
    }

    fn manifest(&self) -> String {
        fs::read_to_string(self.path("cforge.toml")).unwrap()
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

// ============================================================================
// cforge lock
// ============================================================================

#[test]
fn test_lock_records_index_and_git_dependencies() {
    let fx = Fixture::new(
        "fmt = \"11.*\"\n\n[dependencies.git.mylib]\nurl = \"https://host/mylib.git\"\ntag = \"v1.0\"\n",
    );

    fx.cforge()
        .arg("lock")
        .assert()
        .success()
        .stderr(predicate::str::contains("Locked"));

    let lock = read(&fx.path("cforge.lock"));
    assert!(lock.starts_with("# cforge.lock"));
    assert!(lock.contains("# Mode: FetchContent\n"));
    assert!(lock.contains("[metadata]\nversion = 1"));
    assert!(lock.contains("[dependency.fmt]\nsource_type = \"index\""));
    assert!(lock.contains("resolved = \"11.2.0\""));
    assert!(lock.contains("[dependency.mylib]\nsource_type = \"git\""));
    assert!(lock.contains("resolved = \"v1.0\""));
}

#[test]
fn test_lock_force_is_bit_identical() {
    let fx = Fixture::new("fmt = \"11.*\"\n");
    fx.cforge().arg("lock").assert().success();
    let first = fs::read(fx.path("cforge.lock")).unwrap();

    fx.cforge().args(["lock", "--force"]).assert().success();
    assert_eq!(fs::read(fx.path("cforge.lock")).unwrap(), first);
}

#[test]
fn test_lock_existing_file_verifies_without_rewriting() {
    let fx = Fixture::new("fmt = \"11.*\"\n");
    fx.cforge().arg("lock").assert().success();
    let before = fs::read(fx.path("cforge.lock")).unwrap();

    // nothing is fetched into deps/, so fmt is reported
    fx.cforge()
        .arg("lock")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"))
        .stderr(predicate::str::contains("`fmt` does not match the lock file"));

    assert_eq!(fs::read(fx.path("cforge.lock")).unwrap(), before);
}

#[test]
fn test_lock_clean() {
    let fx = Fixture::new("fmt = \"11.*\"\n");
    fx.cforge().arg("lock").assert().success();

    fx.cforge()
        .args(["lock", "--clean"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed"));
    assert!(!fx.path("cforge.lock").exists());

    // absence is not an error
    fx.cforge().args(["lock", "--clean"]).assert().success();
}

#[test]
fn test_lock_without_dependencies_writes_nothing() {
    let fx = Fixture::new("");
    fx.cforge().args(["deps", "lock"]).assert().success();
    assert!(!fx.path("cforge.lock").exists());
}

#[test]
fn test_lock_force_after_emptying_dependencies_removes_file() {
    let fx = Fixture::new("fmt = \"11.*\"\n");
    fx.cforge().arg("lock").assert().success();
    assert!(fx.path("cforge.lock").exists());

    fs::write(
        fx.path("cforge.toml"),
        "[project]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\n",
    )
    .unwrap();
    fx.cforge()
        .args(["lock", "--force"])
        .assert()
        .success()
        .stderr(predicate::str::contains("no dependencies to lock"));
    assert!(!fx.path("cforge.lock").exists());
}

#[test]
fn test_lock_unknown_package_suggests_search() {
    let fx = Fixture::new("nosuchlib = \"1.0\"\n");
    fx.cforge()
        .arg("lock")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("package `nosuchlib` not found"))
        .stderr(predicate::str::contains("cforge deps search nosuchlib"));
    assert!(!fx.path("cforge.lock").exists());
}

#[test]
fn test_lock_yanked_version_fails() {
    let fx = Fixture::new("fmt = \"11.1.4\"\n");
    fx.cforge()
        .arg("lock")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no version of `fmt` matches `11.1.4`"));
}

#[test]
fn test_missing_manifest_hints_init() {
    let fx = Fixture::new("");
    fs::remove_file(fx.path("cforge.toml")).unwrap();
    fx.cforge()
        .args(["deps", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cforge init"));
}

// ============================================================================
// cforge deps
// ============================================================================

#[test]
fn test_deps_add_index_package() {
    let fx = Fixture::new("fmt = \"11.*\"\n");
    fx.cforge()
        .args(["deps", "add", "spdlog@1.*"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Added"))
        .stderr(predicate::str::contains("Finished deps add"));

    let manifest = fx.manifest();
    assert!(manifest.contains("spdlog = \"1.*\""));
    assert!(manifest.contains("fmt = \"11.*\""));
}

#[test]
fn test_deps_add_unknown_package_fails() {
    let fx = Fixture::new("");
    let before = fx.manifest();
    fx.cforge()
        .args(["deps", "add", "nosuchlib"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found in the index"));
    assert_eq!(fx.manifest(), before);
}

#[test]
fn test_deps_add_git_writes_dedicated_table() {
    let fx = Fixture::new("");
    fx.cforge()
        .args([
            "deps",
            "add",
            "mylib",
            "--git",
            "https://host/mylib.git",
            "--tag",
            "v1.0",
        ])
        .assert()
        .success();

    let manifest = fx.manifest();
    assert!(manifest.contains("[dependencies.git.mylib]"));
    assert!(manifest.contains("url = \"https://host/mylib.git\""));
    assert!(manifest.contains("tag = \"v1.0\""));
}

#[test]
fn test_deps_remove() {
    let fx = Fixture::new("fmt = \"11.*\"\nspdlog = \"1.*\"\n");
    fx.cforge()
        .args(["deps", "remove", "fmt"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed"))
        .stderr(predicate::str::contains("Finished deps remove"));
    let manifest = fx.manifest();
    assert!(!manifest.contains("fmt"));
    assert!(manifest.contains("spdlog"));

    fx.cforge()
        .args(["deps", "remove", "fmt"])
        .assert()
        .success()
        .stderr(predicate::str::contains("is not declared"));
}

#[test]
fn test_deps_list() {
    let fx = Fixture::new("fmt = \"11.*\"\nzlib = { system = true }\n");
    fx.cforge()
        .args(["deps", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fmt"))
        .stdout(predicate::str::contains("11.*"))
        .stdout(predicate::str::contains("system"))
        .stderr(predicate::str::contains("Finished deps list"));
}

#[test]
fn test_deps_search() {
    let fx = Fixture::new("");
    fx.cforge()
        .args(["deps", "search", "fmt"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("fmt"))
        .stdout(predicate::str::contains("A modern formatting library"))
        .stderr(predicate::str::contains("Finished deps search"));
}

#[test]
fn test_deps_info_flags_yanked() {
    let fx = Fixture::new("");
    fx.cforge()
        .args(["deps", "info", "fmt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fmt - A modern formatting library"))
        .stdout(predicate::str::contains("cmake (fmt::fmt)"))
        .stdout(predicate::str::contains("11.1.4 [yanked]"))
        .stderr(predicate::str::contains("Finished deps info"));
}

#[test]
fn test_deps_tree_nests_feature_dependencies() {
    let fx = Fixture::new("spdlog = \"1.*\"\n");
    fx.cforge()
        .args(["deps", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("└── spdlog v1.15.0 [external_fmt]"))
        .stdout(predicate::str::contains(
            "    └── fmt v11.2.0 (feature `external_fmt`)",
        ))
        .stderr(predicate::str::contains("Finished deps tree"));
}

#[test]
fn test_deps_outdated() {
    let fx = Fixture::new("fmt = \"10.*\"\nspdlog = \"1.*\"\n");
    fx.cforge()
        .args(["deps", "outdated"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.2.1"))
        .stdout(predicate::str::contains("11.2.0"))
        .stdout(predicate::str::contains("spdlog").not())
        .stderr(predicate::str::contains("Finished deps outdated"));
}

#[test]
fn test_deps_update_offline_with_fresh_index() {
    let fx = Fixture::new("");
    fx.cforge()
        .args(["deps", "update"])
        .assert()
        .success()
        .stderr(predicate::str::contains("up to date"));
}

#[test]
fn test_completions() {
    let fx = Fixture::new("");
    fx.cforge()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cforge"));
}
