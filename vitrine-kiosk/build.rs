//! Build script for vitrine-kiosk
//!
//! Captures build identification information at compile time:
//! - Git commit hash (short form)
//! - Build timestamp
//! - Build profile (debug/release)
//!
//! The values are logged at startup and reported by the `/health` endpoint,
//! so a screen in the field can be matched to the build it runs.

use std::process::Command;

fn main() {
    // Short commit hash (8 characters); "unknown" outside a git checkout,
    // e.g. when building from a source tarball on the kiosk image builder
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Build time in RFC 3339, UTC, second precision
    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    // debug or release, as chosen by cargo
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    // Read back with env!() in main.rs and api/handlers.rs
    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);

    // No rerun-if-changed directives: cargo reruns this script on every build,
    // which keeps the hash and timestamp current
}
