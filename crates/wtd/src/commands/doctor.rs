//! `wtd doctor`: supplemented verb (SPEC_FULL.md §12.2) sanity-checking
//! that `git` and `docker` are reachable before a user hits a confusing
//! failure mid-reconcile.

use anyhow::Result;
use std::process::Command;

pub fn run() -> Result<()> {
    let mut ok = true;

    match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => {
            println!("git: {}", String::from_utf8_lossy(&output.stdout).trim());
        }
        _ => {
            println!("git: NOT FOUND on PATH");
            ok = false;
        }
    }

    match Command::new("docker").arg("version").arg("--format").arg("{{.Server.Version}}").output() {
        Ok(output) if output.status.success() => {
            println!("docker daemon: {}", String::from_utf8_lossy(&output.stdout).trim());
        }
        Ok(output) => {
            println!(
                "docker: reachable but daemon did not respond: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            ok = false;
        }
        Err(_) => {
            println!("docker: NOT FOUND on PATH");
            ok = false;
        }
    }

    match Command::new("docker").args(["buildx", "version"]).output() {
        Ok(output) if output.status.success() => {
            println!("docker buildx: {}", String::from_utf8_lossy(&output.stdout).trim());
        }
        _ => {
            println!("docker buildx: NOT AVAILABLE");
            ok = false;
        }
    }

    if !ok {
        anyhow::bail!("one or more prerequisites are missing");
    }
    Ok(())
}
