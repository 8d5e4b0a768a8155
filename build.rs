use std::process::Command;

fn git_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");
    let sha = git_sha().or_else(|| std::env::var("GIT_SHA").ok().filter(|s| !s.is_empty()));

    // Development builds carry the commit so fingerprints can be matched to a tree
    let version = match (std::env::var("DRIVELINK_DEV_BUILD").as_deref(), sha) {
        (Ok("1") | Ok("true"), Some(sha)) => format!("{}-dev+{}", base, sha),
        (Ok("1") | Ok("true"), None) => format!("{}-dev", base),
        _ => base.to_string(),
    };
    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=DRIVELINK_DEV_BUILD");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
