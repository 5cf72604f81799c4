// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

const VERSION_OVERRIDE: &str = "CAMERA_RECORDER_VERSION";

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed={}", VERSION_OVERRIDE);

    let version = std::env::var(VERSION_OVERRIDE)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(describe_head)
        .unwrap_or_else(|| format!("{}-unknown", env!("CARGO_PKG_VERSION")));

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` of HEAD without the leading `v`, `+dirty` on local changes
///
/// `v0.3.0` → `0.3.0`, `v0.3.0-4-g1a2b3c4` → `0.3.0+4.1a2b3c4`,
/// no tag → `0.1.0+1a2b3c4` using the package version.
fn describe_head() -> Option<String> {
    let describe = git(&["describe", "--tags", "--long", "--dirty", "--match", "v*"]);
    let Some(describe) = describe else {
        let hash = git(&["rev-parse", "--short", "HEAD"])?;
        return Some(format!("{}+{}", env!("CARGO_PKG_VERSION"), hash));
    };

    let (describe, dirty) = match describe.strip_suffix("-dirty") {
        Some(rest) => (rest, "+dirty"),
        None => (describe.as_str(), ""),
    };
    let mut parts = describe.rsplitn(3, '-');
    let hash = parts.next()?.trim_start_matches('g');
    let commits = parts.next()?;
    let tag = parts.next()?.trim_start_matches('v');

    Some(if commits == "0" {
        format!("{}{}", tag, dirty)
    } else {
        format!("{}+{}.{}{}", tag, commits, hash, dirty)
    })
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
