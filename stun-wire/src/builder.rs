// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! STUN message building
//!
//! [`MessageBuilder`] serializes attributes eagerly into the output buffer
//! and enforces the attribute ordering rules of RFC 8489: integrity and
//! fingerprint attributes terminate a message, so once one is requested no
//! further plain attribute may be appended.  Setters latch the first error
//! and turn every later call into a no-op; [`MessageBuilder::build`]
//! surfaces that error or the finished bytes.
//!
//! MESSAGE-INTEGRITY, MESSAGE-INTEGRITY-SHA256, and FINGERPRINT are
//! deferred: requesting them records the intent and `build` emits them
//! last, in that order, each computed with the length patching rule.
//!
//! ## Examples
//!
//! ```
//! use stun_wire::builder::MessageBuilder;
//! use stun_wire::message::{MessageType, TransactionId};
//!
//! let mut builder = MessageBuilder::new(
//!     MessageType::BINDING_REQUEST,
//!     TransactionId::generate(),
//! );
//! builder.set_software("stun-wire");
//! builder.add_fingerprint();
//! let bytes = builder.build().unwrap();
//! assert_eq!(bytes.len() % 4, 0);
//! ```

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use crate::attribute::integrity::{SHA1_LEN, SHA256_LEN};
use crate::attribute::nonce::{SecurityFeatures, NONCE_COOKIE_LEN};
use crate::attribute::{address, error, fingerprint, ice, integrity, nonce};
use crate::attribute::AttributeType;
use crate::credentials::{long_term_key, userhash, PasswordAlgorithm};
use crate::message::{MessageType, StunWriteError, TransactionId, HEADER_LENGTH, MAGIC_COOKIE};

use std::net::SocketAddr;

const MAX_USERNAME_LEN: usize = 513;
const MAX_REALM_LEN: usize = 763;
const MAX_NONCE_LEN: usize = 763;
const MAX_SOFTWARE_LEN: usize = 763;
const MAX_REASON_LEN: usize = 763;
const MAX_DOMAIN_LEN: usize = 255;

/// How far into the terminal attribute sequence a message has progressed.
///
/// The stages are strictly increasing while building: plain attributes are
/// only legal in [`Open`](BuilderStage::Open), MESSAGE-INTEGRITY-SHA256 may
/// follow MESSAGE-INTEGRITY, and FINGERPRINT terminates everything.  The
/// parser walks the same ladder when validating received messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum BuilderStage {
    Open,
    SawMessageIntegrity,
    SawMessageIntegritySha256,
    SawFingerprint,
}

/// A single use builder for one STUN message.
#[derive(Debug)]
pub struct MessageBuilder {
    msg: Vec<u8>,
    stage: BuilderStage,
    error: Option<StunWriteError>,
    key: Option<Vec<u8>>,
    integrity: bool,
    integrity_sha256: Option<usize>,
    fingerprint: bool,
    padding: u8,
}

impl MessageBuilder {
    /// Create a builder for a message of `mtype` with `transaction_id`.
    pub fn new(mtype: MessageType, transaction_id: TransactionId) -> Self {
        let mut msg = Vec::with_capacity(512);
        msg.extend_from_slice(&mtype.value().to_be_bytes());
        msg.extend_from_slice(&[0, 0]);
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(transaction_id.as_bytes());
        Self {
            msg,
            stage: BuilderStage::Open,
            error: None,
            key: None,
            integrity: false,
            integrity_sha256: None,
            fingerprint: false,
            padding: 0,
        }
    }

    /// The transaction id this message was created with.
    pub fn transaction_id(&self) -> TransactionId {
        let mut id = [0; 12];
        id.copy_from_slice(&self.msg[8..20]);
        id.into()
    }

    /// Override the byte used to pad attribute values to 4 byte boundaries.
    ///
    /// The padding content is ignored by every compliant parser; the
    /// default of zero is what should appear on the wire.  This knob exists
    /// to reproduce published test vectors that pad with other bytes (the
    /// RFC 5769 samples pad the USERNAME with ASCII spaces).
    pub fn padding_byte(&mut self, padding: u8) {
        self.padding = padding;
    }

    fn latch(&mut self, error: StunWriteError) {
        if self.error.is_none() {
            warn!("latching build error: {error}");
            self.error = Some(error);
        }
    }

    /// Whether a plain attribute may be appended; latches the ordering
    /// error otherwise.
    fn open(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.stage != BuilderStage::Open {
            self.latch(StunWriteError::InvalidAttributeSequence);
            return false;
        }
        true
    }

    fn push_attribute_header(&mut self, atype: AttributeType, len: usize) {
        self.msg.extend_from_slice(&atype.value().to_be_bytes());
        self.msg.extend_from_slice(&(len as u16).to_be_bytes());
    }

    fn pad(&mut self) {
        while self.msg.len() % 4 != 0 {
            self.msg.push(self.padding);
        }
    }

    fn push_attribute(&mut self, atype: AttributeType, value: &[u8]) {
        self.push_attribute_header(atype, value.len());
        self.msg.extend_from_slice(value);
        self.pad();
    }

    /// Append a MAPPED-ADDRESS attribute.
    pub fn set_mapped_address(&mut self, addr: SocketAddr) {
        if !self.open() {
            return;
        }
        let (value, len) = address::encode_value(addr, None);
        self.push_attribute(AttributeType::MAPPED_ADDRESS, &value[..len]);
    }

    /// Append an XOR-MAPPED-ADDRESS attribute, obfuscated against the
    /// magic cookie and this message's transaction id.
    pub fn set_xor_mapped_address(&mut self, addr: SocketAddr) {
        if !self.open() {
            return;
        }
        let mut mask = [0; 16];
        mask.copy_from_slice(&self.msg[4..20]);
        let (value, len) = address::encode_value(addr, Some(&mask));
        self.push_attribute(AttributeType::XOR_MAPPED_ADDRESS, &value[..len]);
    }

    /// Append an ALTERNATE-SERVER attribute.
    pub fn set_alternate_server(&mut self, addr: SocketAddr) {
        if !self.open() {
            return;
        }
        let (value, len) = address::encode_value(addr, None);
        self.push_attribute(AttributeType::ALTERNATE_SERVER, &value[..len]);
    }

    /// Append a USERNAME attribute.
    pub fn set_username(&mut self, username: &str) {
        if !self.open() {
            return;
        }
        if username.len() > MAX_USERNAME_LEN {
            self.latch(StunWriteError::UsernameTooLong);
            return;
        }
        self.push_attribute(AttributeType::USERNAME, username.as_bytes());
    }

    /// Append a USERHASH attribute carrying a precomputed
    /// [`userhash`](crate::credentials::userhash) value.
    pub fn set_userhash(&mut self, hash: &[u8]) {
        if !self.open() {
            return;
        }
        if hash.len() != 32 {
            self.latch(StunWriteError::InvalidUserhashLength);
            return;
        }
        self.push_attribute(AttributeType::USERHASH, hash);
    }

    /// Append a REALM attribute.
    pub fn set_realm(&mut self, realm: &str) {
        if !self.open() {
            return;
        }
        if realm.len() > MAX_REALM_LEN {
            self.latch(StunWriteError::RealmTooLong);
            return;
        }
        self.push_attribute(AttributeType::REALM, realm.as_bytes());
    }

    /// Append a NONCE attribute.
    pub fn set_nonce(&mut self, nonce: &[u8]) {
        if !self.open() {
            return;
        }
        if nonce.len() > MAX_NONCE_LEN {
            self.latch(StunWriteError::NonceTooLong);
            return;
        }
        self.push_attribute(AttributeType::NONCE, nonce);
    }

    /// Append a NONCE attribute prefixed with the RFC 8489 security
    /// feature cookie.
    pub fn set_nonce_with_security_features(
        &mut self,
        features: SecurityFeatures,
        nonce: &[u8],
    ) {
        if !self.open() {
            return;
        }
        if nonce.len() + NONCE_COOKIE_LEN > MAX_NONCE_LEN {
            self.latch(StunWriteError::NonceTooLong);
            return;
        }
        let cookie = nonce::encode_cookie(features);
        self.push_attribute_header(AttributeType::NONCE, NONCE_COOKIE_LEN + nonce.len());
        self.msg.extend_from_slice(&cookie);
        self.msg.extend_from_slice(nonce);
        self.pad();
    }

    /// Append an ERROR-CODE attribute.  `code` must be within [300, 699].
    pub fn set_error_code(&mut self, code: u16, reason: &str) {
        if !self.open() {
            return;
        }
        if !(300..=699).contains(&code) {
            self.latch(StunWriteError::InvalidErrorCode);
            return;
        }
        if reason.len() > MAX_REASON_LEN {
            self.latch(StunWriteError::ReasonTooLong);
            return;
        }
        self.push_attribute_header(AttributeType::ERROR_CODE, 4 + reason.len());
        error::encode_value(code, reason, &mut self.msg);
        self.pad();
    }

    /// Append an UNKNOWN-ATTRIBUTES attribute listing `attributes`.
    pub fn set_unknown_attributes(&mut self, attributes: &[AttributeType]) {
        if !self.open() {
            return;
        }
        self.push_attribute_header(AttributeType::UNKNOWN_ATTRIBUTES, 2 * attributes.len());
        error::encode_unknown_value(attributes, &mut self.msg);
        self.pad();
    }

    /// Append a SOFTWARE attribute.
    pub fn set_software(&mut self, software: &str) {
        if !self.open() {
            return;
        }
        if software.len() > MAX_SOFTWARE_LEN {
            self.latch(StunWriteError::SoftwareTooLong);
            return;
        }
        self.push_attribute(AttributeType::SOFTWARE, software.as_bytes());
    }

    /// Append an ALTERNATE-DOMAIN attribute.
    pub fn set_alternate_domain(&mut self, domain: &str) {
        if !self.open() {
            return;
        }
        if domain.len() > MAX_DOMAIN_LEN {
            self.latch(StunWriteError::DomainTooLong);
            return;
        }
        self.push_attribute(AttributeType::ALTERNATE_DOMAIN, domain.as_bytes());
    }

    /// Append a PRIORITY attribute composed from the candidate
    /// preferences.  `component_id` starts at 1.
    pub fn set_priority(&mut self, type_pref: u8, local_pref: u16, component_id: u8) {
        if !self.open() {
            return;
        }
        if component_id < 1 {
            self.latch(StunWriteError::InvalidPriorityComponentId);
            return;
        }
        let value = ice::priority_value(type_pref, local_pref, component_id);
        self.push_attribute(AttributeType::PRIORITY, &value.to_be_bytes());
    }

    /// Append an ICE-CONTROLLED attribute with the role tie breaker.
    pub fn set_ice_controlled(&mut self, tie_breaker: u64) {
        if !self.open() {
            return;
        }
        self.push_attribute(AttributeType::ICE_CONTROLLED, &tie_breaker.to_be_bytes());
    }

    /// Append an ICE-CONTROLLING attribute with the role tie breaker.
    pub fn set_ice_controlling(&mut self, tie_breaker: u64) {
        if !self.open() {
            return;
        }
        self.push_attribute(AttributeType::ICE_CONTROLLING, &tie_breaker.to_be_bytes());
    }

    /// Supply a short term credential: the password doubles as the HMAC
    /// key for any requested integrity attribute.
    pub fn set_password(&mut self, password: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if self.key.is_some() {
            self.latch(StunWriteError::KeyAlreadySet);
            return;
        }
        self.key = Some(password.to_vec());
    }

    /// Supply long term credentials.
    ///
    /// Derives the HMAC key as `H(username:realm:password)`.  When
    /// `algorithm` is not the MD5 default a PASSWORD-ALGORITHM attribute
    /// is appended so the peer derives the same key.
    pub fn set_long_term_credentials(
        &mut self,
        username: &str,
        realm: &str,
        password: &str,
        algorithm: PasswordAlgorithm,
    ) {
        if self.error.is_some() {
            return;
        }
        if self.key.is_some() {
            self.latch(StunWriteError::KeyAlreadySet);
            return;
        }
        if username.len() > MAX_USERNAME_LEN {
            self.latch(StunWriteError::UsernameTooLong);
            return;
        }
        if realm.len() > MAX_REALM_LEN {
            self.latch(StunWriteError::RealmTooLong);
            return;
        }
        if algorithm != PasswordAlgorithm::Md5 {
            if !self.open() {
                return;
            }
            let mut value = [0; 4];
            BigEndian::write_u16(&mut value[..2], algorithm.id());
            self.push_attribute(AttributeType::PASSWORD_ALGORITHM, &value);
        }
        self.key = Some(long_term_key(
            username.as_bytes(),
            realm.as_bytes(),
            password.as_bytes(),
            algorithm,
        ));
    }

    /// Compute a USERHASH for `username` in `realm` and append it.
    pub fn set_userhash_credentials(&mut self, username: &str, realm: &str) {
        if self.error.is_some() {
            return;
        }
        if username.len() > MAX_USERNAME_LEN {
            self.latch(StunWriteError::UsernameTooLong);
            return;
        }
        if realm.len() > MAX_REALM_LEN {
            self.latch(StunWriteError::RealmTooLong);
            return;
        }
        let hash = userhash(username.as_bytes(), realm.as_bytes());
        self.set_userhash(&hash);
    }

    /// Request a MESSAGE-INTEGRITY attribute, emitted on
    /// [`build`](MessageBuilder::build).  Requires a credential.
    pub fn add_message_integrity(&mut self) {
        if self.error.is_some() {
            return;
        }
        if self.stage != BuilderStage::Open {
            self.latch(StunWriteError::InvalidAttributeSequence);
            return;
        }
        self.stage = BuilderStage::SawMessageIntegrity;
        self.integrity = true;
    }

    /// Request an untruncated MESSAGE-INTEGRITY-SHA256 attribute.
    pub fn add_message_integrity_sha256(&mut self) {
        self.add_message_integrity_sha256_truncated(SHA256_LEN);
    }

    /// Request a MESSAGE-INTEGRITY-SHA256 attribute truncated to `len`
    /// bytes.  `len` must be a multiple of 4 within [16, 32].
    pub fn add_message_integrity_sha256_truncated(&mut self, len: usize) {
        if self.error.is_some() {
            return;
        }
        if !integrity::valid_sha256_len(len) {
            self.latch(StunWriteError::InvalidMessageIntegritySha256Length);
            return;
        }
        if self.stage > BuilderStage::SawMessageIntegrity {
            self.latch(StunWriteError::InvalidAttributeSequence);
            return;
        }
        self.stage = BuilderStage::SawMessageIntegritySha256;
        self.integrity_sha256 = Some(len);
    }

    /// Request a FINGERPRINT attribute, emitted last on
    /// [`build`](MessageBuilder::build).
    pub fn add_fingerprint(&mut self) {
        if self.error.is_some() {
            return;
        }
        self.stage = BuilderStage::SawFingerprint;
        self.fingerprint = true;
    }

    /// Finish the message: emit any deferred integrity and fingerprint
    /// attributes, patch the header length, and return the bytes.
    #[tracing::instrument(name = "message_build", level = "trace", skip(self))]
    pub fn build(mut self) -> Result<Vec<u8>, StunWriteError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let wants_integrity = self.integrity || self.integrity_sha256.is_some();
        let key = self.key.take();
        match (&key, wants_integrity) {
            (None, true) => return Err(StunWriteError::MissingMessageIntegrityKey),
            (Some(_), false) => return Err(StunWriteError::KeySetButUnused),
            _ => {}
        }
        if let Some(key) = key.as_deref() {
            if self.integrity {
                let advertised = (self.msg.len() - HEADER_LENGTH + 4 + SHA1_LEN) as u16;
                let mac = integrity::compute_sha1(key, &self.msg, advertised);
                self.push_attribute(AttributeType::MESSAGE_INTEGRITY, &mac);
            }
            if let Some(len) = self.integrity_sha256 {
                let advertised = (self.msg.len() - HEADER_LENGTH + 4 + len) as u16;
                let mac = integrity::compute_sha256(key, &self.msg, advertised);
                self.push_attribute(AttributeType::MESSAGE_INTEGRITY_SHA256, &mac[..len]);
            }
        }
        if self.fingerprint {
            let advertised =
                (self.msg.len() - HEADER_LENGTH + fingerprint::FINGERPRINT_SIZE) as u16;
            let crc = fingerprint::compute(&self.msg, advertised);
            self.push_attribute(AttributeType::FINGERPRINT, &crc.to_be_bytes());
        }
        let length = (self.msg.len() - HEADER_LENGTH) as u16;
        BigEndian::write_u16(&mut self.msg[2..4], length);
        Ok(self.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ShortTermCredentials;
    use crate::parser::Parser;

    fn binding_builder() -> MessageBuilder {
        MessageBuilder::new(MessageType::BINDING_REQUEST, TransactionId::default())
    }

    #[test]
    fn fingerprint_only_binding_request() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.add_fingerprint();
        let bytes = builder.build().unwrap();
        assert_eq!(bytes.len(), 28);
        assert_eq!(BigEndian::read_u16(&bytes[2..4]), 8);
        Parser::new().parse(&bytes).unwrap();
    }

    #[test]
    fn length_discipline() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_software("s");
        builder.set_username("abcde");
        let bytes = builder.build().unwrap();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(
            BigEndian::read_u16(&bytes[2..4]) as usize + HEADER_LENGTH,
            bytes.len()
        );
    }

    #[test]
    fn attribute_after_fingerprint() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.add_fingerprint();
        builder.set_software("test");
        assert_eq!(
            builder.build(),
            Err(StunWriteError::InvalidAttributeSequence)
        );
    }

    #[test]
    fn attribute_after_integrity() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        builder.add_message_integrity();
        builder.set_software("test");
        assert_eq!(
            builder.build(),
            Err(StunWriteError::InvalidAttributeSequence)
        );
    }

    #[test]
    fn integrity_after_sha256() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        builder.add_message_integrity_sha256();
        builder.add_message_integrity();
        assert_eq!(
            builder.build(),
            Err(StunWriteError::InvalidAttributeSequence)
        );
    }

    #[test]
    fn integrity_after_fingerprint() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        builder.add_fingerprint();
        builder.add_message_integrity();
        assert_eq!(
            builder.build(),
            Err(StunWriteError::InvalidAttributeSequence)
        );
    }

    #[test]
    fn integrity_then_sha256_then_fingerprint_is_legal() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        builder.add_message_integrity();
        builder.add_message_integrity_sha256();
        builder.add_fingerprint();
        let bytes = builder.build().unwrap();
        let credentials = ShortTermCredentials::new(&b"secret"[..]);
        Parser::with_credentials(&credentials).parse(&bytes).unwrap();
    }

    #[test]
    fn sha256_truncation_lengths() {
        let _log = crate::tests::test_init_log();
        for (len, ok) in [
            (0, false),
            (15, false),
            (16, true),
            (17, false),
            (20, true),
            (32, true),
            (33, false),
        ] {
            let mut builder = binding_builder();
            builder.set_password(b"secret");
            builder.add_message_integrity_sha256_truncated(len);
            let result = builder.build();
            if ok {
                assert_eq!(result.unwrap().len(), HEADER_LENGTH + 4 + len);
            } else {
                assert_eq!(
                    result,
                    Err(StunWriteError::InvalidMessageIntegritySha256Length),
                    "length {len}"
                );
            }
        }
    }

    #[test]
    fn key_set_but_unused() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        assert_eq!(builder.build(), Err(StunWriteError::KeySetButUnused));
    }

    #[test]
    fn integrity_without_key() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.add_message_integrity();
        assert_eq!(
            builder.build(),
            Err(StunWriteError::MissingMessageIntegrityKey)
        );
    }

    #[test]
    fn duplicate_key() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"one");
        builder.set_password(b"two");
        assert_eq!(builder.build(), Err(StunWriteError::KeyAlreadySet));
    }

    #[test]
    fn first_error_wins() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_error_code(200, "not an error class");
        builder.set_username(&"x".repeat(600));
        assert_eq!(builder.build(), Err(StunWriteError::InvalidErrorCode));
    }

    #[test]
    fn value_limits() {
        let _log = crate::tests::test_init_log();
        let long = "x".repeat(800);

        let mut builder = binding_builder();
        builder.set_username(&long);
        assert_eq!(builder.build(), Err(StunWriteError::UsernameTooLong));

        let mut builder = binding_builder();
        builder.set_realm(&long);
        assert_eq!(builder.build(), Err(StunWriteError::RealmTooLong));

        let mut builder = binding_builder();
        builder.set_nonce(long.as_bytes());
        assert_eq!(builder.build(), Err(StunWriteError::NonceTooLong));

        let mut builder = binding_builder();
        builder.set_software(&long);
        assert_eq!(builder.build(), Err(StunWriteError::SoftwareTooLong));

        let mut builder = binding_builder();
        builder.set_error_code(400, &long);
        assert_eq!(builder.build(), Err(StunWriteError::ReasonTooLong));

        let mut builder = binding_builder();
        builder.set_alternate_domain(&"d".repeat(256));
        assert_eq!(builder.build(), Err(StunWriteError::DomainTooLong));

        let mut builder = binding_builder();
        builder.set_priority(110, 1, 0);
        assert_eq!(
            builder.build(),
            Err(StunWriteError::InvalidPriorityComponentId)
        );

        let mut builder = binding_builder();
        builder.set_userhash(&[0; 31]);
        assert_eq!(builder.build(), Err(StunWriteError::InvalidUserhashLength));
    }

    #[test]
    fn nonce_cookie_overhead_counts_against_the_limit() {
        let _log = crate::tests::test_init_log();
        let nonce = vec![b'n'; MAX_NONCE_LEN - NONCE_COOKIE_LEN];
        let mut builder = binding_builder();
        builder.set_nonce_with_security_features(SecurityFeatures::USER_ANONYMITY, &nonce);
        assert!(builder.build().is_ok());

        let nonce = vec![b'n'; MAX_NONCE_LEN - NONCE_COOKIE_LEN + 1];
        let mut builder = binding_builder();
        builder.set_nonce_with_security_features(SecurityFeatures::USER_ANONYMITY, &nonce);
        assert_eq!(builder.build(), Err(StunWriteError::NonceTooLong));
    }

    #[test]
    fn padding_byte_is_a_test_seam() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.padding_byte(b' ');
        builder.set_username("abc");
        let bytes = builder.build().unwrap();
        assert_eq!(&bytes[24..28], b"abc ");
    }

    #[test]
    fn sha256_alone_is_legal_from_open() {
        let _log = crate::tests::test_init_log();
        let mut builder = binding_builder();
        builder.set_password(b"secret");
        builder.add_message_integrity_sha256();
        let bytes = builder.build().unwrap();
        let credentials = ShortTermCredentials::new(&b"secret"[..]);
        Parser::with_credentials(&credentials).parse(&bytes).unwrap();
    }
}
