//! Shell completion emission, attested across the pack (e.g. `pop-cli`,
//! `shuttle`) as the standard way to expose `clap`'s generated
//! completions as a subcommand, plus `--install`'s auto-detected,
//! write-to-home variant (see spec.md §6).

use crate::cli::Cli;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

pub fn emit(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Detect the user's shell from `$SHELL`, write a completion script to its
/// conventional completions directory under the user's home, and return
/// the path written. The error string is meant for a plain stderr print;
/// the caller is responsible for the exit-2 mapping.
pub fn install() -> Result<PathBuf, String> {
    let shell_path = std::env::var("SHELL").map_err(|_| "$SHELL is not set; cannot detect your shell".to_string())?;
    let shell_name = std::path::Path::new(&shell_path).file_name().and_then(|n| n.to_str()).unwrap_or("");

    let home = directories_next::UserDirs::new()
        .ok_or_else(|| "could not determine the user's home directory".to_string())?
        .home_dir()
        .to_path_buf();

    let (shell, dest) = match shell_name {
        "bash" => (Shell::Bash, home.join(".local/share/bash-completion/completions/wtd")),
        "zsh" => (Shell::Zsh, home.join(".zfunc/_wtd")),
        "fish" => (Shell::Fish, home.join(".config/fish/completions/wtd.fish")),
        other => return Err(format!("unrecognized shell '{other}' from $SHELL; expected bash, zsh or fish")),
    };

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut file = std::fs::File::create(&dest).map_err(|e| format!("failed to write {}: {e}", dest.display()))?;
    generate(shell, &mut cmd, name, &mut file);
    Ok(dest)
}
