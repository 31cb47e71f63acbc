//! Completions command implementation
//!
//! Handles `bundle-slim completions`, which prints a shell completion script.

use clap::Command;
use clap_complete::{generate, Shell};
use std::io::Write;

/// Write a completion script for `shell` to `out`
///
/// # Examples
///
/// ```bash
/// bundle-slim completions bash > /etc/bash_completion.d/bundle-slim
/// bundle-slim completions zsh > ~/.zfunc/_bundle-slim
/// bundle-slim completions fish > ~/.config/fish/completions/bundle-slim.fish
/// ```
pub fn cmd_completions(shell: Shell, cmd: &mut Command, out: &mut dyn Write) {
    let bin_name = cmd.get_name().to_string();
    generate(shell, cmd, bin_name, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;

    fn command() -> Command {
        Command::new("bundle-slim")
            .subcommand(Command::new("optimize").arg(Arg::new("mode").long("mode")))
            .subcommand(Command::new("restore"))
    }

    #[test]
    fn test_cmd_completions_bash_mentions_subcommands() {
        let mut out = Vec::new();
        cmd_completions(Shell::Bash, &mut command(), &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("bundle-slim"));
        assert!(script.contains("optimize"));
        assert!(script.contains("--mode"));
    }

    #[test]
    fn test_cmd_completions_every_shell_produces_output() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell] {
            let mut out = Vec::new();
            cmd_completions(shell, &mut command(), &mut out);
            assert!(!out.is_empty(), "{shell} produced nothing");
        }
    }
}
