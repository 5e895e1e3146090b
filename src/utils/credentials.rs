//! SMB password loading: config → env var → .env in config dir → secure prompt (opt-in).

use anyhow::{Context, Result};
use colored::Colorize;
use log::info;
use std::path::Path;

use crate::utils::PackagePaths;

fn non_empty(s: String) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Process environment first, then `.env` in `dir`. The file is read, never loaded
/// into the environment.
fn try_env_then_dotenv(key: &str, dir: &Path) -> Option<String> {
    if let Some(s) = std::env::var(key).ok().and_then(non_empty) {
        return Some(s);
    }
    let env_path = dir.join(".env");
    if !env_path.is_file() {
        return None;
    }
    dotenvy::from_path_iter(&env_path)
        .ok()?
        .filter_map(|item| item.ok())
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| non_empty(v))
}

/// Password for `user`. `configured` is the config file value; `ask` enables the prompt.
/// `Ok(None)` when no source provides one.
pub fn resolve_smb_password(
    configured: Option<&str>,
    user: &str,
    dir: &Path,
    ask: bool,
) -> Result<Option<String>> {
    if let Some(p) = configured.filter(|p| !p.is_empty()) {
        return Ok(Some(p.to_string()));
    }
    let key = PackagePaths::get().password_env();
    if let Some(s) = try_env_then_dotenv(key, dir) {
        info!("SMB password found in environment");
        return Ok(Some(s));
    }
    if !ask {
        return Ok(None);
    }
    let label = format!("[{}]", env!("CARGO_PKG_NAME")).cyan().bold();
    let pass = rpassword::prompt_password(format!("{} SMB password for {}: ", label, user))
        .context("read SMB password")?;
    let pass = pass.trim().to_string();
    Ok((!pass.is_empty()).then_some(pass))
}

/// Shown in place of a password in logs.
pub const MASKED_PASSWORD: &str = "xxxxxx";
