//! CLI integration tests for Dock.
//!
//! These tests drive the `dock` binary end to end: manifest on disk, parts
//! built with `override-build` scripts, stage-packages served by the
//! `directory` backend, and the emitted descriptor checked on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// A project directory with an isolated home.
struct Project {
    tmp: TempDir,
}

impl Project {
    fn new(manifest: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("project")).unwrap();
        fs::write(tmp.path().join("project/dock.toml"), manifest).unwrap();
        Project { tmp }
    }

    fn dir(&self) -> PathBuf {
        self.tmp.path().join("project")
    }

    fn prime(&self) -> PathBuf {
        self.dir().join(".dock/prime")
    }

    /// A package repository for the `directory` backend, wired into
    /// `.dock/config.toml`.
    fn repository(&self, packages: &[(&str, &[(&str, &str)])]) -> PathBuf {
        let root = self.tmp.path().join("repo");
        for (name, files) in packages {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            for (rel, content) in *files {
                let path = dir.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
        }
        fs::create_dir_all(self.dir().join(".dock")).unwrap();
        fs::write(
            self.dir().join(".dock/config.toml"),
            format!(
                "[packages]\nbackend = \"directory\"\nrepository = \"{}\"\n",
                root.display()
            ),
        )
        .unwrap();
        root
    }

    fn dock(&self) -> Command {
        let mut cmd = Command::cargo_bin("dock").unwrap();
        cmd.current_dir(self.dir())
            .env("HOME", self.tmp.path().join("home"))
            .env_remove("DOCK_MANIFEST")
            .env_remove("DOCK_JOBS")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// A git repository with one commit, tagged `v0.152.0`.
fn upstream(dir: &Path) -> PathBuf {
    let repo = git2::Repository::init(dir).unwrap();
    fs::write(dir.join("Cargo.toml"), "[package]\nname = \"zed\"\n").unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new("Cargo.toml")).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Zed Industries", "hi@zed.dev").unwrap();
    let commit = repo
        .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    let object = repo.find_object(commit, None).unwrap();
    repo.tag_lightweight("v0.152.0", &object, false).unwrap();
    dir.to_path_buf()
}

/// `override-build` that installs an executable `bin/<name>`.
fn installs_command(name: &str) -> String {
    format!(
        r#"override-build = '''
mkdir -p "$DOCK_PART_INSTALL/bin"
printf '#!/bin/sh\necho {name}\n' > "$DOCK_PART_INSTALL/bin/{name}"
chmod +x "$DOCK_PART_INSTALL/bin/{name}"
'''
"#
    )
}

fn zed_manifest(upstream: &Path, command: &str) -> String {
    format!(
        r#"name = "zed"
version = "0.152.3"
summary = "A high-performance, multiplayer code editor"
confinement = "classic"

[parts.zed]
plugin = "rust"
source = "{upstream}"
source-type = "git"
source-depth = 1
{build}
[parts.deps]
plugin = "nil"
stage-packages = ["libasound2", "libxkbcommon0"]

[apps.zed-editor]
command = "{command}"
"#,
        upstream = upstream.display(),
        build = installs_command("zed"),
        command = command,
    )
}

fn read_descriptor(project: &Project) -> serde_json::Value {
    let text = fs::read_to_string(project.prime().join("meta/package.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ============================================================================
// dock build
// ============================================================================

#[test]
fn test_build_zed_with_stage_packages() {
    let tmp = TempDir::new().unwrap();
    let upstream = upstream(&tmp.path().join("zed"));
    let project = Project::new(&zed_manifest(&upstream, "bin/zed"));
    project.repository(&[
        ("libasound2", &[("usr/lib/libasound.so.2", "alsa")]),
        ("libxkbcommon0", &[("usr/lib/libxkbcommon.so.0", "xkb")]),
    ]);

    project
        .dock()
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("meta/package.json"));

    let prime = project.prime();
    assert!(prime.join("bin/zed").is_file());
    assert!(prime.join("usr/lib/libasound.so.2").is_file());
    assert!(prime.join("usr/lib/libxkbcommon.so.0").is_file());

    let descriptor = read_descriptor(&project);
    assert_eq!(descriptor["name"], "zed");
    assert_eq!(descriptor["version"], "0.152.3");
    assert_eq!(descriptor["confinement"], "classic");
    let apps = descriptor["apps"].as_object().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps["zed-editor"]["command"], "bin/zed");
}

#[test]
fn test_missing_app_command_fails_without_descriptor() {
    let tmp = TempDir::new().unwrap();
    let upstream = upstream(&tmp.path().join("zed"));
    let project = Project::new(&zed_manifest(&upstream, "bin/zed-editor"));
    project.repository(&[
        ("libasound2", &[("usr/lib/libasound.so.2", "alsa")]),
        ("libxkbcommon0", &[]),
    ]);

    project
        .dock()
        .args(["build", "--color", "never"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("zed-editor"))
        .stderr(predicate::str::contains("bin/zed-editor"));

    assert!(!project.prime().join("meta/package.json").exists());
}

#[test]
fn test_unknown_stage_package_exit_code() {
    let tmp = TempDir::new().unwrap();
    let upstream = upstream(&tmp.path().join("zed"));
    let project = Project::new(&zed_manifest(&upstream, "bin/zed"));
    project.repository(&[("libasound2", &[])]);

    project
        .dock()
        .args(["build", "--color", "never"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("libxkbcommon0"));
}

#[test]
fn test_shallow_clone_cannot_describe_version() {
    let tmp = TempDir::new().unwrap();
    let upstream = upstream(&tmp.path().join("zed"));
    let manifest = format!(
        r#"name = "zed"
version = "git"
adopt-info = "zed"

[parts.zed]
plugin = "rust"
source = "{}"
source-type = "git"
source-depth = 1
"#,
        upstream.display()
    );
    let project = Project::new(&manifest);

    project
        .dock()
        .args(["build", "--color", "never"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("git describe"))
        .stderr(predicate::str::contains("source-depth"));

    assert!(!project.dir().join(".dock/parts/zed/src").exists());
}

#[test]
fn test_adopted_version_from_git_describe() {
    let tmp = TempDir::new().unwrap();
    let upstream = upstream(&tmp.path().join("zed"));
    let manifest = format!(
        r#"name = "zed"
version = "git"
adopt-info = "zed"

[parts.zed]
plugin = "nil"
source = "{}"
source-type = "git"
{}
[apps.zed]
command = "bin/zed"
"#,
        upstream.display(),
        installs_command("zed")
    );
    let project = Project::new(&manifest);

    project.dock().arg("build").assert().success();
    assert_eq!(read_descriptor(&project)["version"], "v0.152.0");
}

#[test]
fn test_build_failure_reports_part() {
    let project = Project::new(
        r#"name = "zed"
version = "0.1.0"

[parts.zed]
plugin = "nil"
override-build = "echo compiling; exit 101"

[parts.zed-cli]
plugin = "nil"
after = ["zed"]
"#,
    );

    project
        .dock()
        .args(["build", "--color", "never"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("part `zed`"))
        .stderr(predicate::str::contains("101"))
        .stderr(predicate::str::contains("zed-cli (pending)"));

    let log = fs::read_to_string(project.dir().join(".dock/parts/zed/build.log")).unwrap();
    assert!(log.contains("compiling"));
}

#[test]
fn test_env_flag_overrides_config() {
    let project = Project::new(&format!(
        r#"name = "zed"
version = "0.1.0"

[parts.zed]
plugin = "nil"
build-environment = [{{ CHANNEL = "$RELEASE_CHANNEL" }}]
override-build = "echo $CHANNEL > $DOCK_PART_INSTALL/channel"
"#
    ));
    fs::create_dir_all(project.dir().join(".dock")).unwrap();
    fs::write(
        project.dir().join(".dock/config.toml"),
        "[build.environment]\nRELEASE_CHANNEL = \"nightly\"\n",
    )
    .unwrap();

    project
        .dock()
        .args(["build", "--env", "RELEASE_CHANNEL=stable"])
        .assert()
        .success();

    let channel = fs::read_to_string(project.prime().join("channel")).unwrap();
    assert_eq!(channel.trim(), "stable");
}

#[test]
fn test_json_message_format() {
    let project = Project::new(&format!(
        "name = \"zed\"\nversion = \"0.1.0\"\n\n[parts.zed]\nplugin = \"nil\"\n{}\n[apps.zed]\ncommand = \"bin/zed\"\n",
        installs_command("zed")
    ));

    let output = project
        .dock()
        .args(["build", "--message-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let reasons: Vec<_> = events.iter().map(|e| e["reason"].as_str().unwrap()).collect();
    assert_eq!(reasons.first(), Some(&"build-started"));
    assert_eq!(reasons.last(), Some(&"build-finished"));
    assert!(reasons.contains(&"part-state"));
    assert!(reasons.contains(&"package-emitted"));
    assert_eq!(events.last().unwrap()["success"], true);
}

// ============================================================================
// dock plan / validate
// ============================================================================

#[test]
fn test_plan_lists_shared_package_once() {
    let project = Project::new(
        r#"name = "zed"
version = "0.1.0"

[parts.zed]
plugin = "nil"
build-packages = ["libssl-dev"]

[parts.zed-cli]
plugin = "nil"
build-packages = ["libssl-dev", "pkg-config"]
after = ["zed"]
"#,
    );

    let output = project.dock().arg("plan").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("libssl-dev").count(), 1);
    assert!(stdout.contains("libssl-dev (build) <- zed, zed-cli"));
    assert!(stdout.contains("1. zed"));
    assert!(stdout.contains("2. zed-cli"));
}

#[test]
fn test_validate_ok() {
    let project = Project::new("name = \"zed\"\nversion = \"0.1.0\"\n\n[parts.zed]\nplugin = \"nil\"\n");

    project
        .dock()
        .arg("validate")
        .assert()
        .success()
        .stderr(predicate::str::contains("zed 0.1.0 is valid"));
}

#[test]
fn test_validate_reports_offending_key() {
    let project = Project::new(
        "name = \"zed\"\nversion = \"0.1.0\"\n\n[parts.zed]\nplugin = \"gradle\"\n",
    );

    project
        .dock()
        .args(["validate", "--color", "never"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("parts.zed.plugin"));
}

#[test]
fn test_no_manifest() {
    let tmp = TempDir::new().unwrap();

    Command::cargo_bin("dock")
        .unwrap()
        .arg("validate")
        .current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env_remove("DOCK_MANIFEST")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("dock init"));
}

// ============================================================================
// dock init / pack / clean / completions
// ============================================================================

#[test]
fn test_init_then_build() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("hello");

    Command::cargo_bin("dock")
        .unwrap()
        .args(["init", "--name", "hello"])
        .arg(&dir)
        .env("HOME", tmp.path().join("home"))
        .assert()
        .success();
    assert!(dir.join("dock.toml").is_file());

    Command::cargo_bin("dock")
        .unwrap()
        .arg("build")
        .current_dir(&dir)
        .env("HOME", tmp.path().join("home"))
        .env_remove("DOCK_MANIFEST")
        .assert()
        .success();

    let prime = dir.join(".dock/prime");
    assert!(prime.join("bin/hello").is_file());
    assert!(!prime.join("dock.toml").exists());
}

#[test]
fn test_pack_writes_archive() {
    let project = Project::new(&format!(
        "name = \"zed\"\nversion = \"0.152.3\"\n\n[parts.zed]\nplugin = \"nil\"\n{}\n[apps.zed]\ncommand = \"bin/zed\"\n",
        installs_command("zed")
    ));

    project
        .dock()
        .args(["pack", "--output", "dist"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[0-9a-f]{64}  .*zed_0\.152\.3_.*\.dock\n$").unwrap());

    let archive = fs::read_dir(project.dir().join("dist"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    assert_eq!(archive.extension().unwrap(), "dock");
}

#[test]
fn test_clean_removes_build_trees() {
    let project = Project::new("name = \"zed\"\nversion = \"0.1.0\"\n\n[parts.zed]\nplugin = \"nil\"\n");
    project.dock().arg("build").assert().success();
    assert!(project.prime().exists());
    fs::write(project.dir().join(".dock/config.toml"), "").unwrap();

    project.dock().arg("clean").assert().success();
    assert!(!project.prime().exists());
    assert!(project.dir().join(".dock/config.toml").exists());
}

#[test]
fn test_completions() {
    Command::cargo_bin("dock")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dock"));
}
