//! Stamps the `msc` binary with MSC_GIT_HASH, MSC_BUILD_TIMESTAMP and
//! MSC_BUILD_PROFILE, logged once at startup.

use std::path::Path;
use std::process::Command;

const UNKNOWN: &str = "unknown";

/// Output of a git command run from the crate directory, if it succeeded
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    // Rebuild when the checked-out commit moves
    if let Some(git_dir) = git(&["rev-parse", "--git-dir"]) {
        let head = Path::new(&git_dir).join("HEAD");
        println!("cargo:rerun-if-changed={}", head.display());
        if let Some(reference) = git(&["symbolic-ref", "-q", "HEAD"]) {
            println!("cargo:rerun-if-changed={}", Path::new(&git_dir).join(reference).display());
        }
    }
    println!("cargo:rerun-if-changed=build.rs");

    let hash = git(&["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| UNKNOWN.to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string());
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env=MSC_GIT_HASH={}", hash);
    println!("cargo:rustc-env=MSC_BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rustc-env=MSC_BUILD_PROFILE={}", profile);
}
