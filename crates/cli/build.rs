use std::env;
use std::process::Command;

/// Short commit of the checkout, or "unknown" outside a git tree.
fn commit() -> String {
    let Ok(out) = Command::new("git").args(["rev-parse", "--short=7", "HEAD"]).output() else {
        return "unknown".into();
    };
    match String::from_utf8(out.stdout) {
        Ok(hash) if out.status.success() && !hash.trim().is_empty() => hash.trim().to_string(),
        _ => "unknown".into(),
    }
}

fn main() {
    for watched in ["../../.git/HEAD", "../../.git/refs/heads"] {
        println!("cargo:rerun-if-changed={watched}");
    }

    // Both show up in `winegap --version`
    println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit());
    println!(
        "cargo:rustc-env=TARGET={}",
        env::var("TARGET").unwrap_or_else(|_| "unknown".into())
    );
}
