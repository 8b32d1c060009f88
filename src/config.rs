use std::env;

use reqwest::Url;

use crate::error::LedgerError;

pub const BASE_URL_VAR: &str = "STOCKLEDGER_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Where the ledger lives. Deployments move around a lot so nothing is hardcoded beyond a local
/// default.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    pub base_url: Url,
}

impl LedgerConfig {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| LedgerError::Config {
            reason: format!("{base_url}: {err}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::Config {
                reason: format!("{base_url} cannot be used as a base address"),
            });
        }
        Ok(Self { base_url })
    }

    /// Reads [`BASE_URL_VAR`], falling back to [`DEFAULT_BASE_URL`].
    pub fn from_env() -> Result<Self, LedgerError> {
        match env::var(BASE_URL_VAR) {
            Ok(url) if !url.trim().is_empty() => Self::new(&url),
            _ => Self::new(DEFAULT_BASE_URL),
        }
    }

    pub fn from_address(address: &str, port: u16) -> Result<Self, LedgerError> {
        Self::new(&format!("http://{address}:{port}"))
    }

    /// Base URL with `segments` appended, each percent-encoded on its own.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        //cannot_be_a_base was rejected in new so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerConfig;

    #[test]
    fn test_that_endpoint_appends_encoded_segments() {
        let config = LedgerConfig::new("http://ledger.local:8080/").unwrap();
        let url = config.endpoint(&["user", "mary jane", "stock", "AAPL"]);
        assert_eq!(url.as_str(), "http://ledger.local:8080/user/mary%20jane/stock/AAPL");
    }

    #[test]
    fn test_that_endpoint_keeps_base_path() {
        let config = LedgerConfig::new("https://example.org/api").unwrap();
        assert_eq!(config.endpoint(&["stocks"]).as_str(), "https://example.org/api/stocks");
    }

    #[test]
    fn test_that_invalid_base_is_rejected() {
        assert!(LedgerConfig::new("not a url").is_err());
        assert!(LedgerConfig::new("mailto:someone@example.org").is_err());
    }

    #[test]
    fn test_that_from_address_builds_http_url() {
        let config = LedgerConfig::from_address("127.0.0.1", 9000).unwrap();
        assert_eq!(config.endpoint(&["users"]).as_str(), "http://127.0.0.1:9000/users");
    }
}
