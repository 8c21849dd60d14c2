//! Build script for rewind-cli
//!
//! Exports the short commit hash as `REWIND_GIT_COMMIT` for `--version`.
//! An explicit `REWIND_GIT_COMMIT` in the build environment wins over git.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=REWIND_GIT_COMMIT");

    let commit = std::env::var("REWIND_GIT_COMMIT")
        .ok()
        .filter(|c| !c.is_empty())
        .or_else(git_short_head)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=REWIND_GIT_COMMIT={}", commit);
}

fn git_short_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
