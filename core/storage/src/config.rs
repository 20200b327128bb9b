//! Declarative storage configuration.

use serde::{Deserialize, Serialize};

use polystore_common::{ConfigErrorKind, Error, Result};
use polystore_credential::Provider;

use crate::httpclient::HttpClientOptions;
use crate::pairs::{self, Pair};

/// One storage, as written in a config file.
///
/// ```json
/// {
///   "type": "cos",
///   "credential": "env",
///   "name": "photos-1250000000",
///   "location": "ap-guangzhou",
///   "work_dir": "/2024/"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend type, e.g. `fs` or `cos`.
    #[serde(rename = "type")]
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Credential config string such as `hmac:AK:SK`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_client: Option<HttpClientOptions>,
}

impl StorageConfig {
    /// Config for `backend` with every other field unset.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON config.
    ///
    /// # Errors
    /// `InvalidConfig` carrying the serde message.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::config(e.to_string(), ConfigErrorKind::InvalidConfig))
    }

    /// Pretty-printed JSON, as `from_json` reads it back.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(e.to_string(), ConfigErrorKind::InvalidConfig))
    }

    /// Construction pairs for this config.
    ///
    /// # Errors
    /// Fails if the credential string does not parse.
    pub fn to_pairs(&self) -> Result<Vec<Pair>> {
        let mut out = Vec::new();

        if let Some(v) = &self.work_dir {
            out.push(pairs::with_work_dir(v.as_str()));
        }
        if let Some(v) = &self.credential {
            out.push(pairs::with_credential(Provider::parse(v)?));
        }
        if let Some(v) = &self.name {
            out.push(pairs::with_name(v.as_str()));
        }
        if let Some(v) = &self.location {
            out.push(pairs::with_location(v.as_str()));
        }
        if let Some(v) = &self.http_client {
            out.push(pairs::with_http_client_options(v.clone()));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::keys;

    #[test]
    fn test_from_json() {
        let cfg = StorageConfig::from_json(
            r#"{"type": "cos", "credential": "hmac:a:b", "name": "n", "location": "l",
                "http_client": {"request_timeout_ms": 1000}}"#,
        )
        .unwrap();
        assert_eq!(cfg.backend, "cos");
        assert_eq!(cfg.work_dir, None);

        let keys: Vec<_> = cfg.to_pairs().unwrap().iter().map(|p| p.key()).collect();
        assert_eq!(
            keys,
            vec![
                keys::CREDENTIAL,
                keys::NAME,
                keys::LOCATION,
                keys::HTTP_CLIENT_OPTIONS
            ]
        );
    }

    #[test]
    fn test_bad_credential_fails_to_pairs() {
        let mut cfg = StorageConfig::new("cos");
        cfg.credential = Some("bogus".to_string());
        assert!(matches!(
            cfg.to_pairs(),
            Err(Error::Config {
                kind: ConfigErrorKind::UnsupportedProtocol,
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let err = StorageConfig::from_json("{").unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                kind: ConfigErrorKind::InvalidConfig,
                ..
            }
        ));
    }

    #[test]
    fn test_json_round_trip_skips_unset() {
        let mut cfg = StorageConfig::new("fs");
        cfg.work_dir = Some("/tmp".to_string());
        let json = cfg.to_json().unwrap();
        assert!(!json.contains("credential"));
        assert_eq!(StorageConfig::from_json(&json).unwrap(), cfg);
    }
}
