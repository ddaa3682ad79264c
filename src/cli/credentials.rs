use anyhow::{bail, Result};

use crate::core::config::{AppConfig, API_KEY_ENV};

const KEY_PREFIX: &str = "sk-";

/// `sk-xxxx...last4`. Keys too short to hide most of their body keep only
/// the three-character prefix.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 11 {
        let head: String = chars[..7].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        let head: String = chars.iter().take(KEY_PREFIX.len().min(chars.len() / 2)).collect();
        format!("{}***", head)
    }
}

/// Pick the API key: `--api-key` / `OPENAI_API_KEY` (both arrive through
/// clap), then the config file. A missing key is fatal; an unusual prefix
/// only warns.
pub fn resolve_api_key(flag_or_env: Option<String>, config: &AppConfig) -> Result<String> {
    let key = flag_or_env
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config.file_api_key().map(str::to_string));

    let Some(key) = key else {
        bail!(
            "OpenAI API key not found\n\n\
             Set the {env} environment variable:\n  \
             export {env}='your-api-key-here'\n\n\
             or pass --api-key, or add api_key to {path}",
            env = API_KEY_ENV,
            path = AppConfig::config_path().display()
        );
    };

    if !key.starts_with(KEY_PREFIX) {
        eprintln!("Warning: API key does not appear to be in the expected format");
        eprintln!("OpenAI API keys typically start with 'sk-' or 'sk-proj-'");
    }
    Ok(key)
}

/// Extra guidance for errors that look like a rejected credential.
pub fn auth_hint(error: &anyhow::Error) -> Option<&'static str> {
    let message = format!("{:#}", error).to_lowercase();
    let looks_like_auth = ["authentication", "api_key", "api key", "unauthorized"]
        .iter()
        .any(|needle| message.contains(needle));
    looks_like_auth.then_some(
        "Check your OpenAI API key. You can create one at https://platform.openai.com/api-keys",
    )
}
