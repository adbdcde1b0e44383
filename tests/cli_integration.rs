//! Integration tests for the command-line interface.
//!
//! Every invocation gets its own HOME so default directories never touch
//! the real user profile.

mod common;

use artifact_patcher::launcher::sha256_file;
use common::*;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_artifact-patcher"))
        .args(args)
        .env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("ARTIFACT_PATCHER_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["patch", "patch-file", "stage", "status"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_patch_file_in_place() {
    let home = TempDir::new().unwrap();
    let jar = home.path().join("downloads/injected-client-1.0.jar");
    write_jar(&jar, &[("net/Client.class", &loopback_class())]);

    let output = run(home.path(), &["patch-file", jar.to_str().unwrap()]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("injected-client-1.0.jar"));
    assert_eq!(
        read_jar(&jar)["net/Client.class"].len(),
        loopback_class().len() - 9
    );
}

#[test]
fn test_patch_file_failure_exits_nonzero() {
    let home = TempDir::new().unwrap();
    let jar = home.path().join("injected-client-1.0.jar");
    write_jar(&jar, &[("net/Client.class", b"nothing to patch")]);
    let before = fs::read(&jar).unwrap();

    let output = run(home.path(), &["patch-file", jar.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("loopback"));
    assert_eq!(fs::read(&jar).unwrap(), before);
}

#[test]
fn test_patch_with_bootstrap_and_config() {
    let home = TempDir::new().unwrap();
    let repo = home.path().join("repo");
    let hash = {
        let path = repo.join("injected-client-1.0.jar");
        write_jar(&path, &[("net/Client.class", &loopback_class())]);
        sha256_file(&path).unwrap()
    };

    let bootstrap = home.path().join("bootstrap.json");
    fs::write(
        &bootstrap,
        format!(r#"{{"artifacts":[{{"name":"injected-client-1.0.jar","hash":"{hash}"}}]}}"#),
    )
    .unwrap();
    let config = home.path().join("patcher.toml");
    fs::write(&config, format!("[paths]\nrepo_dir = {:?}\n", repo.to_str().unwrap())).unwrap();

    let output = run(
        home.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "patch",
            "--bootstrap",
            bootstrap.to_str().unwrap(),
        ],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summary:"));
    assert!(stdout.contains("1 patched"));
}

#[test]
fn test_patch_missing_artifact() {
    let home = TempDir::new().unwrap();
    let bootstrap = home.path().join("bootstrap.json");
    fs::write(
        &bootstrap,
        r#"{"artifacts":[{"name":"client-1.0.jar","hash":"00"}]}"#,
    )
    .unwrap();
    let bootstrap = bootstrap.to_str().unwrap();

    let output = run(home.path(), &["patch", "--bootstrap", bootstrap]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("client-1.0.jar"));

    let output = run(
        home.path(),
        &["patch", "--bootstrap", bootstrap, "--ignore-missing-artifacts"],
    );
    assert!(output.status.success());
}

#[test]
fn test_stage_then_status() {
    let home = TempDir::new().unwrap();
    let bundle = home.path().join("bundle");
    put(&bundle, "resources/injected-client/port.txt", b"40000");
    put(&bundle, "resources/client/A.class", b"A");

    let output = run(home.path(), &["stage", "--bundle", bundle.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 staged"));

    let staged = home
        .path()
        .join(".runelite/runenite/resources/injected-client/port.txt");
    assert_eq!(fs::read(staged).unwrap(), b"40000");

    write_jar(
        &home.path().join(".runelite/repository2/injected-client-1.0.jar"),
        &[("a.class", b"a")],
    );
    let output = run(home.path(), &["status"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Patcher Status Report"));
    assert!(stdout.contains("injected-client-1.0.jar (loopback, port)"));
}

#[test]
fn test_stage_without_bundle_fails() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["stage"]);
    assert!(!output.status.success());
}
