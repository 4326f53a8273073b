// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Credential handling and HMAC key derivation
//!
//! Short term credentials use the password bytes directly as the HMAC key.
//! Long term credentials derive the key as `H(username:realm:password)`
//! where `H` is MD5 by default or SHA-256 when negotiated through the
//! PASSWORD-ALGORITHM attribute.  Anonymous users are identified by
//! `USERHASH = SHA-256(username:realm)`.
//!
//! The parser never owns passwords.  It consults a caller provided
//! [`CredentialProvider`] when, and only when, it verifies an integrity
//! attribute.

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::message::StunParseError;

/// The password hashing algorithm carried in a PASSWORD-ALGORITHM attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordAlgorithm {
    /// MD5, the default when no algorithm is negotiated.
    Md5,
    /// SHA-256.
    Sha256,
}

impl PasswordAlgorithm {
    /// The IANA registered algorithm number.
    pub fn id(self) -> u16 {
        match self {
            Self::Md5 => 0x0001,
            Self::Sha256 => 0x0002,
        }
    }

    /// Map an algorithm number to a known algorithm.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x0001 => Some(Self::Md5),
            0x0002 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for PasswordAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha256 => write!(f, "SHA256"),
        }
    }
}

/// Derive a long term HMAC key from `username:realm:password`.
///
/// # Examples
/// ```
/// # use stun_wire::credentials::{long_term_key, PasswordAlgorithm};
/// let key = long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Md5);
/// assert_eq!(key.len(), 16);
/// ```
pub fn long_term_key(
    username: &[u8],
    realm: &[u8],
    password: &[u8],
    algorithm: PasswordAlgorithm,
) -> Vec<u8> {
    match algorithm {
        PasswordAlgorithm::Md5 => {
            let mut digest = Md5::new();
            feed_key_material(&mut digest, username, realm, password);
            digest.finalize().to_vec()
        }
        PasswordAlgorithm::Sha256 => {
            let mut digest = Sha256::new();
            feed_key_material(&mut digest, username, realm, password);
            digest.finalize().to_vec()
        }
    }
}

fn feed_key_material<D: Digest>(digest: &mut D, username: &[u8], realm: &[u8], password: &[u8]) {
    digest.update(username);
    digest.update(b":");
    digest.update(realm);
    digest.update(b":");
    digest.update(password);
}

/// Compute `USERHASH = SHA-256(username:realm)` for anonymous user
/// identification.
///
/// # Examples
/// ```
/// # use stun_wire::credentials::userhash;
/// assert_eq!(userhash(b"user", b"realm").len(), 32);
/// ```
pub fn userhash(username: &[u8], realm: &[u8]) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update(username);
    digest.update(b":");
    digest.update(realm);
    digest.finalize().into()
}

/// A request for key material, sum typed over the three credential flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialQuery<'a> {
    /// Long term credentials identified by USERNAME and REALM.  The
    /// provider returns the raw password; the parser derives the key.
    UsernameRealm {
        username: &'a [u8],
        realm: &'a [u8],
    },
    /// Long term credentials identified by an anonymous USERHASH.  The
    /// provider returns the derived key material for `algorithm`, since
    /// the parser never learns the username behind the hash.
    Userhash {
        userhash: &'a [u8],
        realm: &'a [u8],
        algorithm: PasswordAlgorithm,
    },
    /// Short term credentials.  The provider returns the password, used
    /// verbatim as the HMAC key.
    ShortTerm,
}

/// The capability the parser consults to verify integrity attributes.
///
/// Returning `None` means no credentials are known for the query; the
/// parse then fails with
/// [`MissingMessageIntegrityKey`](StunParseError::MissingMessageIntegrityKey).
pub trait CredentialProvider {
    fn lookup(&self, query: CredentialQuery<'_>) -> Option<Vec<u8>>;
}

/// Short term credentials: the password doubles as the HMAC key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortTermCredentials {
    password: Vec<u8>,
}

impl ShortTermCredentials {
    /// Create a new set of [`ShortTermCredentials`].
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl CredentialProvider for ShortTermCredentials {
    fn lookup(&self, query: CredentialQuery<'_>) -> Option<Vec<u8>> {
        match query {
            CredentialQuery::ShortTerm => Some(self.password.clone()),
            _ => None,
        }
    }
}

/// A single user's long term credentials, answering both username and
/// userhash keyed lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTermCredentials {
    username: String,
    password: String,
    realm: String,
}

impl LongTermCredentials {
    /// Create a new set of [`LongTermCredentials`].
    ///
    /// # Examples
    /// ```
    /// # use stun_wire::credentials::LongTermCredentials;
    /// let credentials = LongTermCredentials::new("user", "pass", "realm");
    /// assert_eq!(credentials.username(), "user");
    /// ```
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: realm.into(),
        }
    }

    /// The configured username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The configured password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// The configured realm.
    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl CredentialProvider for LongTermCredentials {
    fn lookup(&self, query: CredentialQuery<'_>) -> Option<Vec<u8>> {
        match query {
            CredentialQuery::UsernameRealm { username, realm }
                if username == self.username.as_bytes() && realm == self.realm.as_bytes() =>
            {
                Some(self.password.clone().into_bytes())
            }
            CredentialQuery::Userhash {
                userhash: hash,
                realm,
                algorithm,
            } if realm == self.realm.as_bytes()
                && hash == userhash(self.username.as_bytes(), realm).as_slice() =>
            {
                Some(long_term_key(
                    self.username.as_bytes(),
                    realm,
                    self.password.as_bytes(),
                    algorithm,
                ))
            }
            _ => None,
        }
    }
}

/// Parser side record of the attributes that drive key derivation.
///
/// USERNAME, REALM, USERHASH, and PASSWORD-ALGORITHM are recorded as they
/// are encountered, last seen wins.  The algorithm defaults to MD5.
#[derive(Debug, Default)]
pub(crate) struct KeyGenerator<'a> {
    algorithm_id: Option<u16>,
    username: Option<&'a [u8]>,
    realm: Option<&'a [u8]>,
    userhash: Option<&'a [u8]>,
}

impl<'a> KeyGenerator<'a> {
    pub(crate) fn record_username(&mut self, username: &'a [u8]) {
        self.username = Some(username);
    }

    pub(crate) fn record_realm(&mut self, realm: &'a [u8]) {
        self.realm = Some(realm);
    }

    pub(crate) fn record_userhash(&mut self, userhash: &'a [u8]) {
        self.userhash = Some(userhash);
    }

    pub(crate) fn record_algorithm(&mut self, id: u16) {
        self.algorithm_id = Some(id);
    }

    fn algorithm(&self) -> Result<PasswordAlgorithm, StunParseError> {
        match self.algorithm_id {
            None => Ok(PasswordAlgorithm::Md5),
            Some(id) => {
                PasswordAlgorithm::from_id(id).ok_or(StunParseError::UnknownPasswordAlgorithm)
            }
        }
    }

    /// Produce the HMAC key for the message recorded so far.
    ///
    /// A REALM selects the long term flow, keyed by USERNAME or, failing
    /// that, USERHASH.  Without a REALM the short term flow applies.
    pub(crate) fn generate(
        &self,
        provider: &dyn CredentialProvider,
    ) -> Result<Vec<u8>, StunParseError> {
        match self.realm {
            Some(realm) => {
                let algorithm = self.algorithm()?;
                if let Some(username) = self.username {
                    let password = provider
                        .lookup(CredentialQuery::UsernameRealm { username, realm })
                        .ok_or(StunParseError::MissingMessageIntegrityKey)?;
                    Ok(long_term_key(username, realm, &password, algorithm))
                } else if let Some(hash) = self.userhash {
                    provider
                        .lookup(CredentialQuery::Userhash {
                            userhash: hash,
                            realm,
                            algorithm,
                        })
                        .ok_or(StunParseError::MissingMessageIntegrityKey)
                } else {
                    Err(StunParseError::MissingUsername)
                }
            }
            None if self.userhash.is_some() => Err(StunParseError::MissingRealm),
            None => provider
                .lookup(CredentialQuery::ShortTerm)
                .ok_or(StunParseError::MissingMessageIntegrityKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // https://tools.ietf.org/html/rfc8489#appendix-B.1
    const B1_USERNAME: &str = "\u{30DE}\u{30C8}\u{30EA}\u{30C3}\u{30AF}\u{30B9}";
    const B1_USERHASH: [u8; 32] = [
        0x4a, 0x3c, 0xf3, 0x8f, 0xef, 0x69, 0x92, 0xbd, 0xa9, 0x52, 0xc6, 0x78, 0x04, 0x17,
        0xda, 0x0f, 0x24, 0x81, 0x94, 0x15, 0x56, 0x9e, 0x60, 0xb2, 0x05, 0xc4, 0x6e, 0x41,
        0x40, 0x7f, 0x17, 0x04,
    ];

    #[test]
    fn userhash_vector() {
        let _log = crate::tests::test_init_log();
        assert_eq!(
            userhash(B1_USERNAME.as_bytes(), b"example.org"),
            B1_USERHASH
        );
    }

    #[test]
    fn long_term_key_lengths() {
        let _log = crate::tests::test_init_log();
        assert_eq!(
            long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Md5).len(),
            16
        );
        assert_eq!(
            long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Sha256).len(),
            32
        );
    }

    #[test]
    fn algorithm_ids() {
        let _log = crate::tests::test_init_log();
        assert_eq!(PasswordAlgorithm::Md5.id(), 0x0001);
        assert_eq!(PasswordAlgorithm::Sha256.id(), 0x0002);
        assert_eq!(PasswordAlgorithm::from_id(0x0002), Some(PasswordAlgorithm::Sha256));
        assert_eq!(PasswordAlgorithm::from_id(0x0003), None);
    }

    #[test]
    fn short_term_flow() {
        let _log = crate::tests::test_init_log();
        let provider = ShortTermCredentials::new(&b"VOkJxbRl1RmTxUk/WvJxBt"[..]);
        let generator = KeyGenerator::default();
        let key = generator.generate(&provider).unwrap();
        assert_eq!(key, b"VOkJxbRl1RmTxUk/WvJxBt");
    }

    #[test]
    fn long_term_flow_by_username() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let mut generator = KeyGenerator::default();
        generator.record_username(b"user");
        generator.record_realm(b"realm");
        let key = generator.generate(&provider).unwrap();
        assert_eq!(
            key,
            long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Md5)
        );
    }

    #[test]
    fn long_term_flow_by_userhash() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let hash = userhash(b"user", b"realm");
        let mut generator = KeyGenerator::default();
        generator.record_userhash(&hash);
        generator.record_realm(b"realm");
        let key = generator.generate(&provider).unwrap();
        assert_eq!(
            key,
            long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Md5)
        );
    }

    #[test]
    fn last_seen_algorithm_wins() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let mut generator = KeyGenerator::default();
        generator.record_username(b"user");
        generator.record_realm(b"realm");
        generator.record_algorithm(PasswordAlgorithm::Md5.id());
        generator.record_algorithm(PasswordAlgorithm::Sha256.id());
        let key = generator.generate(&provider).unwrap();
        assert_eq!(
            key,
            long_term_key(b"user", b"realm", b"pass", PasswordAlgorithm::Sha256)
        );
    }

    #[test]
    fn unknown_algorithm() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let mut generator = KeyGenerator::default();
        generator.record_username(b"user");
        generator.record_realm(b"realm");
        generator.record_algorithm(0x7777);
        assert_eq!(
            generator.generate(&provider),
            Err(StunParseError::UnknownPasswordAlgorithm)
        );
    }

    #[test]
    fn missing_identity() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let mut generator = KeyGenerator::default();
        generator.record_realm(b"realm");
        assert_eq!(
            generator.generate(&provider),
            Err(StunParseError::MissingUsername)
        );

        let hash = userhash(b"user", b"realm");
        let mut generator = KeyGenerator::default();
        generator.record_userhash(&hash);
        assert_eq!(
            generator.generate(&provider),
            Err(StunParseError::MissingRealm)
        );
    }

    #[test]
    fn provider_rejects_unknown_user() {
        let _log = crate::tests::test_init_log();
        let provider = LongTermCredentials::new("user", "pass", "realm");
        let mut generator = KeyGenerator::default();
        generator.record_username(b"other");
        generator.record_realm(b"realm");
        assert_eq!(
            generator.generate(&provider),
            Err(StunParseError::MissingMessageIntegrityKey)
        );
    }
}
