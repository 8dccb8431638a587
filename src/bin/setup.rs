//! devops-relay setup wizard.
//!
//! Prompts for the Telegram and GitHub credentials in the terminal and writes
//! `config.toml` to the project root (`RELAY_ROOT`, or the current directory).
//! Refuses to overwrite an existing file unless `--force` is given.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    bot_token: &'a str,
    user_id: &'a str,
    repo: &'a str,
    gh_token: &'a str,
    bind: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let user_id = p.user_id.trim();
    // Numeric ids stay numbers; anything else is quoted and the relay compares
    // the string form either way.
    let digits = user_id.strip_prefix('-').unwrap_or(user_id);
    let user_id = if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        user_id.to_owned()
    } else {
        format!("\"{user_id}\"")
    };

    let bot_token = p.bot_token;
    let repo = p.repo;
    let gh_token = p.gh_token;
    let bind = p.bind;

    format!(
        r#"[telegram]
bot_token = "{bot_token}"
allowed_user_id = {user_id}

[github]
repo = "{repo}"
token = "{gh_token}"

[server]
bind = "{bind}"
"#
    )
}

fn validate_repo(repo: &str) -> Result<()> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => anyhow::bail!("Repository must look like owner/name, got '{repo}'"),
    }
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let force = std::env::args().any(|a| a == "--force");
    let project_root =
        PathBuf::from(std::env::var("RELAY_ROOT").unwrap_or_else(|_| ".".to_string()));
    let config_path = project_root.join("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; rerun with --force to overwrite it",
            config_path.display()
        );
    }

    println!("=== devops-relay setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let bot_token = read_line("Telegram bot token: ")?;
    let user_id = read_line("Your Telegram user ID: ")?;
    let repo = read_line("GitHub repository (owner/name): ")?;
    validate_repo(&repo)?;
    let gh_token = read_line("GitHub token (repo scope): ")?;
    let bind = or_default(read_line("Bind address [0.0.0.0:8080]: ")?, "0.0.0.0:8080");

    let config = format_config(&ConfigParams {
        bot_token: &bot_token,
        user_id: &user_id,
        repo: &repo,
        gh_token: &gh_token,
        bind: &bind,
    });

    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the relay with:  cargo run");
    println!("   Then point the bot's webhook at it:");
    println!("   https://api.telegram.org/bot<token>/setWebhook?url=<public-url>");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bot_token: &str, user_id: &str, repo: &str, gh_token: &str, bind: &str) -> String {
        format_config(&ConfigParams {
            bot_token,
            user_id,
            repo,
            gh_token,
            bind,
        })
    }

    #[test]
    fn test_telegram_section_present() {
        let out = cfg("123:abc", "42", "octo/deploy", "ghp", "0.0.0.0:8080");
        assert!(out.contains("[telegram]"));
        assert!(out.contains(r#"bot_token = "123:abc""#));
        assert!(out.contains("allowed_user_id = 42\n"));
    }

    #[test]
    fn test_github_and_server_sections_present() {
        let out = cfg("t", "42", "octo/deploy", "ghp_x", "127.0.0.1:9000");
        assert!(out.contains("[github]"));
        assert!(out.contains(r#"repo = "octo/deploy""#));
        assert!(out.contains(r#"token = "ghp_x""#));
        assert!(out.contains("[server]"));
        assert!(out.contains(r#"bind = "127.0.0.1:9000""#));
    }

    #[test]
    fn test_non_numeric_user_id_is_quoted() {
        let out = cfg("t", "ops", "o/r", "g", "0.0.0.0:8080");
        assert!(out.contains(r#"allowed_user_id = "ops""#));
    }

    #[test]
    fn test_output_is_valid_toml() {
        let out = cfg("t", "-100", "o/r", "g", "0.0.0.0:8080");
        let value: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(value["telegram"]["allowed_user_id"].as_integer(), Some(-100));
        assert_eq!(value["github"]["repo"].as_str(), Some("o/r"));
    }

    #[test]
    fn test_repo_validation() {
        assert!(validate_repo("octo/deploy").is_ok());
        assert!(validate_repo("deploy").is_err());
        assert!(validate_repo("octo/").is_err());
        assert!(validate_repo("a/b/c").is_err());
    }
}
