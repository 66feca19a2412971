use std::process::Command;

const GIT_VERSION_COMMANDS: &[&[&str]] = &[&["describe", "--tags", "--always", "--dirty"], &["rev-parse", "--short", "HEAD"]];

fn main() {
    println!("cargo:rustc-env=HTTPCONNECT_VERSION={}", git_version().unwrap_or_else(|| "unknown".to_string()));
    println!("cargo:rerun-if-changed=.git/HEAD");
}

fn git_version() -> Option<String> {
    GIT_VERSION_COMMANDS.iter().find_map(|args| {
        let output = Command::new("git").args(*args).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            None
        } else {
            Some(version)
        }
    })
}
