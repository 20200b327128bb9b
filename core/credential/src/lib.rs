//! Credential providers for polystore backends.
//!
//! A provider is parsed from a compact config string of colon separated
//! tokens, `protocol:arg1:arg2...`:
//!
//! | config        | protocol | args                     |
//! |---------------|----------|--------------------------|
//! | `hmac:AK:SK`  | hmac     | access key, secret key   |
//! | `apikey:KEY`  | apikey   | api key                  |
//! | `file:PATH`   | file     | path, the backend decides how to read it |
//! | `env`         | env      | none, the backend reads its own environment variables |
//!
//! Providers are immutable once built and zeroize their arguments on drop.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use polystore_common::{ConfigErrorKind, Error, Result};

/// Credential protocol selected by the first config token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Access key + secret key.
    Hmac,
    #[serde(rename = "apikey")]
    ApiKey,
    File,
    Env,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hmac => "hmac",
            Self::ApiKey => "apikey",
            Self::File => "file",
            Self::Env => "env",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "hmac" => Some(Self::Hmac),
            "apikey" => Some(Self::ApiKey),
            "file" => Some(Self::File),
            "env" => Some(Self::Env),
            _ => None,
        }
    }

    /// Number of arguments this protocol carries.
    pub fn arity(&self) -> usize {
        match self {
            Self::Hmac => 2,
            Self::ApiKey | Self::File => 1,
            Self::Env => 0,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-tagged credential.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Provider {
    #[zeroize(skip)]
    protocol: Protocol,
    args: Vec<String>,
}

impl Provider {
    /// Parse a config string into a provider.
    ///
    /// # Errors
    /// - `UnsupportedProtocol` if the first token is unknown; the message
    ///   carries the whole config string
    /// - `InvalidConfig` if the argument count does not match the protocol
    pub fn parse(cfg: &str) -> Result<Self> {
        let mut tokens = cfg.split(':');
        let token = tokens.next().unwrap_or_default();

        let protocol = Protocol::from_token(token)
            .ok_or_else(|| Error::config(cfg, ConfigErrorKind::UnsupportedProtocol))?;

        Self::new(protocol, tokens.map(str::to_string).collect())
    }

    /// Like [`Provider::parse`], but aborts on an invalid config.
    ///
    /// # Panics
    /// Panics with the parse error if `cfg` is not a valid config.
    pub fn must_parse(cfg: &str) -> Self {
        match Self::parse(cfg) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    /// Build a provider from a protocol and its arguments.
    ///
    /// # Errors
    /// `InvalidConfig` if the argument count does not match the protocol;
    /// the message carries the config rebuilt from `protocol` and `args`.
    pub fn new(protocol: Protocol, mut args: Vec<String>) -> Result<Self> {
        if args.len() != protocol.arity() {
            let mut cfg = std::iter::once(protocol.as_str())
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(":");
            let err = Error::config(cfg.as_str(), ConfigErrorKind::InvalidConfig);
            cfg.zeroize();
            args.zeroize();
            return Err(err);
        }

        Ok(Self { protocol, args })
    }

    /// Like [`Provider::new`], but aborts on a wrong argument count.
    ///
    /// # Panics
    /// Panics if `args` does not match the protocol's arity.
    pub fn must_new(protocol: Protocol, args: Vec<String>) -> Self {
        match Self::new(protocol, args) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    /// Access key and secret key pair.
    pub fn hmac(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Hmac,
            args: vec![access_key.into(), secret_key.into()],
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::ApiKey,
            args: vec![key.into()],
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::File,
            args: vec![path.into()],
        }
    }

    /// Credentials the backend reads from its own environment variables.
    pub fn env() -> Self {
        Self {
            protocol: Protocol::Env,
            args: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Raw arguments, in config order.
    pub fn value(&self) -> &[String] {
        &self.args
    }

    /// `(access_key, secret_key)` for hmac providers.
    pub fn hmac_keys(&self) -> Option<(&str, &str)> {
        match (self.protocol, self.args.as_slice()) {
            (Protocol::Hmac, [ak, sk]) => Some((ak.as_str(), sk.as_str())),
            _ => None,
        }
    }

    pub fn api_key_value(&self) -> Option<&str> {
        match (self.protocol, self.args.as_slice()) {
            (Protocol::ApiKey, [key]) => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match (self.protocol, self.args.as_slice()) {
            (Protocol::File, [path]) => Some(Path::new(path)),
            _ => None,
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Provider {{ protocol: {}, args: [REDACTED; {}] }}",
            self.protocol,
            self.args.len()
        )
    }
}
