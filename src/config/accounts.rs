// src/config/accounts.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::ingest::accounts::clean_handles;

/// Load tracked accounts from a file. Supports TOML (`accounts = [...]`) or a JSON array.
pub fn load_accounts_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading accounts from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_accounts(&content, ext.as_str())
}

/// Comma separated list (`ACCOUNTS=alice,@bob`).
pub fn parse_account_list(s: &str) -> Vec<String> {
    clean_handles(s.split(','))
}

fn parse_accounts(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("accounts");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported accounts file format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlAccounts {
        accounts: Vec<String>,
    }
    let v: TomlAccounts = toml::from_str(s)?;
    Ok(clean_handles(v.accounts))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_handles(v))
}
