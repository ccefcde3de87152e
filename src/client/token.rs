//! Provider tokens with masking for logs
//!
//! Tokens are read from the run environment into `secrecy::SecretString`
//! so they never show up in `Debug` output.

use secrecy::SecretString;
use std::collections::HashMap;

/// Supported providers with their environment variable names
const PROVIDER_TOKENS: &[(&str, &str)] = &[("gitea", "GITEA_TOKEN"), ("github", "GITHUB_TOKEN")];

/// Token lookup for hosting providers
///
/// # Examples
///
/// ```
/// use release_publisher::client::TokenManager;
/// use std::collections::HashMap;
///
/// let env = HashMap::from([("GITEA_TOKEN".to_string(), "0123456789abcdef".to_string())]);
/// let manager = TokenManager::new();
/// assert!(manager.get_token(&env, "gitea").is_some());
/// assert!(manager.get_token(&env, "github").is_none());
/// ```
#[derive(Debug, Default)]
pub struct TokenManager {
    provider_map: HashMap<String, String>,
}

impl TokenManager {
    pub fn new() -> Self {
        let provider_map = PROVIDER_TOKENS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self { provider_map }
    }

    /// Environment variable holding the provider's token
    pub fn variable(&self, provider: &str) -> Option<&str> {
        self.provider_map.get(provider).map(String::as_str)
    }

    /// Read the provider token from the environment map
    ///
    /// Returns `None` if the provider is unknown or the variable is unset or empty.
    pub fn get_token(&self, env: &HashMap<String, String>, provider: &str) -> Option<SecretString> {
        let name = self.variable(provider)?;
        let value = env.get(name)?.trim();
        if value.is_empty() {
            return None;
        }
        Some(SecretString::from(value.to_string()))
    }

    /// Mask a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters; tokens shorter than 10
    /// characters are fully masked.
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }
}
