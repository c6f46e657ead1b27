// Access control for data commands
//
// The access key is read from:
// 1. System keychain (with the `keychain` feature)
// 2. Environment variable WINEGAP_ACCESS_KEY
//
// Only its SHA-256 digest is ever configured; the key itself is never
// stored in settings.toml.

use std::env;
use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::settings::Settings;

/// Environment variable holding the access key
pub const ACCESS_KEY_ENV: &str = "WINEGAP_ACCESS_KEY";

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "winegap";

#[cfg(feature = "keychain")]
const KEYCHAIN_ACCOUNT: &str = "access-key";

/// Source of the access key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Key retrieved from system keychain
    Keychain,
    /// Key retrieved from environment variable
    Environment,
    /// No key found
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of key lookup
#[derive(Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

impl fmt::Debug for KeyLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLookup")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

/// Get the access key
///
/// Checks in order:
/// 1. System keychain
/// 2. Environment variable (WINEGAP_ACCESS_KEY)
pub fn get_access_key() -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup {
                    key: Some(key),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    if let Ok(key) = env::var(ACCESS_KEY_ENV) {
        if !key.is_empty() {
            return KeyLookup {
                key: Some(key),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

/// Lowercase hex SHA-256 of `key`, the form stored in settings
pub fn digest_hex(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// A digest is configured but no key was supplied
    MissingKey,
    /// The supplied key does not match the configured digest
    Denied,
    /// The configured digest is not valid hex
    InvalidDigest,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => write!(f, "access key required (set {ACCESS_KEY_ENV})"),
            Self::Denied => write!(f, "access key rejected"),
            Self::InvalidDigest => write!(f, "configured access_key_sha256 is not valid hex"),
        }
    }
}

impl std::error::Error for AccessError {}

/// Proof that access was granted. Data commands take one by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessContext {
    source: KeySource,
    restricted: bool,
}

impl AccessContext {
    /// Check the supplied key against the configured digest
    pub fn authorize(settings: &Settings) -> Result<Self, AccessError> {
        match settings.access_key_sha256.as_deref() {
            None => Ok(Self::open()),
            Some(expected) => Self::authorize_with(expected, get_access_key()),
        }
    }

    /// Access with no key configured
    pub fn open() -> Self {
        Self {
            source: KeySource::None,
            restricted: false,
        }
    }

    pub fn authorize_with(expected_hex: &str, lookup: KeyLookup) -> Result<Self, AccessError> {
        let expected = hex::decode(expected_hex.trim()).map_err(|_| AccessError::InvalidDigest)?;
        let key = lookup.key.ok_or(AccessError::MissingKey)?;
        let digest = Sha256::digest(key.as_bytes());

        if bool::from(digest.as_slice().ct_eq(&expected)) {
            log::debug!("access granted via {}", lookup.source.as_str());
            Ok(Self {
                source: lookup.source,
                restricted: true,
            })
        } else {
            Err(AccessError::Denied)
        }
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    /// True when a key was required and verified
    pub fn is_restricted(&self) -> bool {
        self.restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: Option<&str>) -> KeyLookup {
        KeyLookup {
            key: key.map(str::to_string),
            source: if key.is_some() { KeySource::Environment } else { KeySource::None },
        }
    }

    #[test]
    fn test_digest_hex() {
        assert_eq!(
            digest_hex("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_digest_is_raw_sha256() {
        let bytes = hex::decode(digest_hex("s3cret")).unwrap();
        assert_eq!(bytes.as_slice(), Sha256::digest(b"s3cret").as_slice());
    }

    #[test]
    fn test_open_without_digest() {
        let ctx = AccessContext::authorize(&Settings::default()).unwrap();
        assert!(!ctx.is_restricted());
        assert_eq!(ctx.source(), KeySource::None);
    }

    #[test]
    fn test_matching_key_is_granted() {
        let expected = digest_hex("s3cret");
        let ctx = AccessContext::authorize_with(&expected, lookup(Some("s3cret"))).unwrap();
        assert!(ctx.is_restricted());
        assert_eq!(ctx.source(), KeySource::Environment);

        let upper = expected.to_uppercase();
        assert!(AccessContext::authorize_with(&upper, lookup(Some("s3cret"))).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_key_is_denied() {
        let expected = digest_hex("s3cret");
        assert_eq!(
            AccessContext::authorize_with(&expected, lookup(Some("guess"))),
            Err(AccessError::Denied)
        );
        assert_eq!(
            AccessContext::authorize_with(&expected, lookup(None)),
            Err(AccessError::MissingKey)
        );
    }

    #[test]
    fn test_invalid_digest() {
        assert_eq!(
            AccessContext::authorize_with("zz", lookup(Some("s3cret"))),
            Err(AccessError::InvalidDigest)
        );
        assert_eq!(
            AccessContext::authorize_with("abc", lookup(Some("s3cret"))),
            Err(AccessError::InvalidDigest)
        );
    }

    #[test]
    fn test_short_digest_never_matches() {
        let prefix = &digest_hex("s3cret")[..32];
        assert_eq!(
            AccessContext::authorize_with(prefix, lookup(Some("s3cret"))),
            Err(AccessError::Denied)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let shown = format!("{:?}", lookup(Some("s3cret")));
        assert!(!shown.contains("s3cret"));
    }
}
