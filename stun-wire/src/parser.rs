// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! STUN message parsing
//!
//! [`Parser::parse`] validates the header, walks the attributes enforcing
//! the terminal attribute ordering, verifies FINGERPRINT and any integrity
//! attributes, and returns a [`Message`] view borrowing the input buffer.
//!
//! Integrity verification needs key material, which the parser obtains
//! from an optional [`CredentialProvider`].  The provider is consulted
//! only when an integrity attribute is actually encountered.
//!
//! ## Examples
//!
//! ```
//! use stun_wire::builder::MessageBuilder;
//! use stun_wire::message::{MessageType, TransactionId};
//! use stun_wire::parser::Parser;
//!
//! let mut builder = MessageBuilder::new(
//!     MessageType::BINDING_REQUEST,
//!     TransactionId::generate(),
//! );
//! builder.set_software("stun-wire");
//! builder.add_fingerprint();
//! let bytes = builder.build().unwrap();
//!
//! let msg = Parser::new().parse(&bytes).unwrap();
//! assert_eq!(msg.message_type(), MessageType::BINDING_REQUEST);
//! assert_eq!(msg.software(), Some("stun-wire"));
//! ```

use std::net::SocketAddr;

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use crate::attribute::error::ErrorCode;
use crate::attribute::integrity::{valid_sha256_len, SHA1_LEN};
use crate::attribute::nonce::SecurityFeatures;
use crate::attribute::{address, error, fingerprint, integrity, nonce, padded_len};
use crate::attribute::{AttributeType, RawAttribute};
use crate::builder::BuilderStage;
use crate::credentials::{CredentialProvider, KeyGenerator, PasswordAlgorithm};
use crate::message::{
    check_header, is_recognized, MessageType, StunParseError, TransactionId, HEADER_LENGTH,
};

/// A STUN message parser.
///
/// Stateless apart from an optionally configured credential provider; a
/// single parser may be shared across threads and reused for any number
/// of messages.
#[derive(Clone, Copy, Default)]
pub struct Parser<'p> {
    provider: Option<&'p dyn CredentialProvider>,
}

impl std::fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("credentials", &self.provider.is_some())
            .finish()
    }
}

impl<'p> Parser<'p> {
    /// Create a parser without credentials.  Messages carrying an
    /// integrity attribute will fail to parse with
    /// [`StunParseError::MissingMessageIntegrityKey`].
    pub fn new() -> Self {
        Self { provider: None }
    }

    /// Create a parser that verifies integrity attributes against keys
    /// from `provider`.
    pub fn with_credentials(provider: &'p dyn CredentialProvider) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    fn derive_key(&self, key_gen: &KeyGenerator) -> Result<Vec<u8>, StunParseError> {
        let provider = self
            .provider
            .ok_or(StunParseError::MissingMessageIntegrityKey)?;
        key_gen.generate(provider)
    }

    /// Parse and verify `data`, returning a [`Message`] view tied to it.
    ///
    /// The walk enforces the same attribute ordering ladder the builder
    /// does.  When an integrity attribute is followed by its permitted
    /// successors the view is truncated to end after the last of them, so
    /// anything beyond is ignored.
    #[tracing::instrument(
        name = "message_parse",
        level = "trace",
        skip(self, data),
        fields(data.len = data.len())
    )]
    pub fn parse<'a>(&self, data: &'a [u8]) -> Result<Message<'a>, StunParseError> {
        check_header(data)?;

        let mut end = data.len();
        let mut bytes_parsed = HEADER_LENGTH;
        let mut stage = BuilderStage::Open;
        let mut key_gen = KeyGenerator::default();
        let mut mapped_address = None;
        let mut xor_mapped_address = None;
        let mut alternate_server = None;
        let mut unknown_required = vec![];

        while bytes_parsed < end {
            let attr = RawAttribute::from_bytes(&data[bytes_parsed..end])?;
            let value = attr.value();
            match attr.get_type() {
                AttributeType::MESSAGE_INTEGRITY => {
                    if value.len() != SHA1_LEN {
                        return Err(StunParseError::MessageIntegrityCheckFailed);
                    }
                    if stage > BuilderStage::Open {
                        return Err(StunParseError::InvalidAttributeSequence);
                    }
                    end = scan_integrity_successors(data, bytes_parsed + 4 + SHA1_LEN, end)?;
                    let key = self.derive_key(&key_gen)?;
                    let advertised = (bytes_parsed - HEADER_LENGTH + 4 + SHA1_LEN) as u16;
                    integrity::verify_sha1(&key, &data[..bytes_parsed], advertised, value)?;
                    stage = BuilderStage::SawMessageIntegrity;
                }
                AttributeType::MESSAGE_INTEGRITY_SHA256 => {
                    if !valid_sha256_len(value.len()) {
                        return Err(StunParseError::MessageIntegritySha256CheckFailed);
                    }
                    if stage > BuilderStage::SawMessageIntegrity {
                        return Err(StunParseError::InvalidAttributeSequence);
                    }
                    let sha_end = bytes_parsed + 4 + value.len();
                    end = scan_fingerprint_successor(data, sha_end, end)?;
                    let key = self.derive_key(&key_gen)?;
                    let advertised = (bytes_parsed - HEADER_LENGTH + 4 + value.len()) as u16;
                    integrity::verify_sha256(&key, &data[..bytes_parsed], advertised, value)?;
                    stage = BuilderStage::SawMessageIntegritySha256;
                }
                AttributeType::FINGERPRINT => {
                    if value.len() != 4 {
                        return Err(StunParseError::FingerprintCheckFailed);
                    }
                    if bytes_parsed + attr.padded_len() != end {
                        warn!("FINGERPRINT is not the final attribute");
                        return Err(StunParseError::InvalidAttributeSequence);
                    }
                    fingerprint::verify(&data[..bytes_parsed], BigEndian::read_u32(value))?;
                    stage = BuilderStage::SawFingerprint;
                }
                atype => {
                    if stage != BuilderStage::Open {
                        warn!("attribute {atype} after an ending attribute");
                        return Err(StunParseError::InvalidAttributeSequence);
                    }
                    match atype {
                        AttributeType::MAPPED_ADDRESS => {
                            mapped_address = Some(address::decode_value(atype, value, data)?);
                        }
                        AttributeType::XOR_MAPPED_ADDRESS => {
                            xor_mapped_address = Some(address::decode_value(atype, value, data)?);
                        }
                        AttributeType::ALTERNATE_SERVER => {
                            alternate_server = Some(address::decode_value(atype, value, data)?);
                        }
                        AttributeType::USERNAME => key_gen.record_username(value),
                        AttributeType::REALM => key_gen.record_realm(value),
                        AttributeType::USERHASH => {
                            if value.len() != 32 {
                                return Err(StunParseError::InvalidUserhashLength);
                            }
                            key_gen.record_userhash(value);
                        }
                        AttributeType::PASSWORD_ALGORITHM => {
                            if value.len() < 4 {
                                return Err(StunParseError::MalformedAttribute);
                            }
                            key_gen.record_algorithm(BigEndian::read_u16(&value[..2]));
                        }
                        _ => {
                            if !is_recognized(atype) && atype.comprehension_required() {
                                warn!("unknown comprehension required attribute {atype}");
                                unknown_required.push(atype);
                            }
                        }
                    }
                }
            }
            bytes_parsed += attr.padded_len();
        }

        Ok(Message {
            data: &data[..end],
            mapped_address,
            xor_mapped_address,
            alternate_server,
            unknown_required,
        })
    }
}

/// Determine where the message must end once a MESSAGE-INTEGRITY attribute
/// finishing at `mi_end` has been seen: either immediately, or after a
/// MESSAGE-INTEGRITY-SHA256 and/or FINGERPRINT successor.
fn scan_integrity_successors(
    data: &[u8],
    mi_end: usize,
    end: usize,
) -> Result<usize, StunParseError> {
    if mi_end >= end {
        return Ok(end);
    }
    let next = RawAttribute::from_bytes(&data[mi_end..end])?;
    match next.get_type() {
        AttributeType::FINGERPRINT => Ok(mi_end + next.padded_len()),
        AttributeType::MESSAGE_INTEGRITY_SHA256 => {
            scan_fingerprint_successor(data, mi_end + next.padded_len(), end)
        }
        atype => {
            warn!("attribute {atype} after MESSAGE-INTEGRITY");
            Err(StunParseError::InvalidAttributeSequence)
        }
    }
}

/// Determine where the message must end once an integrity attribute
/// finishing at `offset` has been seen: only FINGERPRINT may follow.
fn scan_fingerprint_successor(
    data: &[u8],
    offset: usize,
    end: usize,
) -> Result<usize, StunParseError> {
    if offset >= end {
        return Ok(end);
    }
    let next = RawAttribute::from_bytes(&data[offset..end])?;
    if next.get_type() != AttributeType::FINGERPRINT {
        warn!("attribute {} after an integrity attribute", next.get_type());
        return Err(StunParseError::InvalidAttributeSequence);
    }
    Ok(offset + next.padded_len())
}

/// A parsed STUN message: a view into the caller's buffer plus the fields
/// extracted during the parse.
///
/// Attribute accessors borrow from the input buffer, so the view lives no
/// longer than the datagram it was parsed from.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    data: &'a [u8],
    mapped_address: Option<SocketAddr>,
    xor_mapped_address: Option<SocketAddr>,
    alternate_server: Option<SocketAddr>,
    unknown_required: Vec<AttributeType>,
}

impl<'a> Message<'a> {
    /// The [`MessageType`] of this message.
    pub fn message_type(&self) -> MessageType {
        MessageType::new(BigEndian::read_u16(&self.data[..2]))
    }

    /// The [`TransactionId`] of this message.
    pub fn transaction_id(&self) -> TransactionId {
        let mut id = [0; 12];
        id.copy_from_slice(&self.data[8..20]);
        id.into()
    }

    /// The MAPPED-ADDRESS, if present.
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.mapped_address
    }

    /// The XOR-MAPPED-ADDRESS with the obfuscation undone, if present.
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.xor_mapped_address
    }

    /// The ALTERNATE-SERVER, if present.
    pub fn alternate_server(&self) -> Option<SocketAddr> {
        self.alternate_server
    }

    /// Unrecognized comprehension required attribute types found in the
    /// message, in order of appearance.
    pub fn unknown_comprehension_required(&self) -> &[AttributeType] {
        &self.unknown_required
    }

    /// Iterate over the raw attributes of the message.
    pub fn iter_attributes(&self) -> impl Iterator<Item = RawAttribute<'a>> {
        MessageAttributes {
            data: self.data,
            offset: HEADER_LENGTH,
        }
    }

    /// The first attribute of type `atype`, if present.
    pub fn raw_attribute(&self, atype: AttributeType) -> Option<RawAttribute<'a>> {
        self.iter_attributes().find(|attr| attr.get_type() == atype)
    }

    /// Whether the message contains an attribute of type `atype`.
    pub fn has_attribute(&self, atype: AttributeType) -> bool {
        self.raw_attribute(atype).is_some()
    }

    fn attribute_value(&self, atype: AttributeType) -> Option<&'a [u8]> {
        self.raw_attribute(atype).map(|attr| attr.value())
    }

    fn utf8_attribute(&self, atype: AttributeType) -> Option<&'a str> {
        std::str::from_utf8(self.attribute_value(atype)?).ok()
    }

    /// The USERNAME, if present and valid UTF-8.
    pub fn username(&self) -> Option<&'a str> {
        self.utf8_attribute(AttributeType::USERNAME)
    }

    /// The REALM, if present and valid UTF-8.
    pub fn realm(&self) -> Option<&'a str> {
        self.utf8_attribute(AttributeType::REALM)
    }

    /// The SOFTWARE description, if present and valid UTF-8.
    pub fn software(&self) -> Option<&'a str> {
        self.utf8_attribute(AttributeType::SOFTWARE)
    }

    /// The ALTERNATE-DOMAIN, if present and valid UTF-8.
    pub fn alternate_domain(&self) -> Option<&'a str> {
        self.utf8_attribute(AttributeType::ALTERNATE_DOMAIN)
    }

    /// The NONCE bytes, including any security feature cookie.
    pub fn nonce(&self) -> Option<&'a [u8]> {
        self.attribute_value(AttributeType::NONCE)
    }

    /// The security features advertised by a nonce cookie, if the NONCE
    /// carries one.
    pub fn security_features(&self) -> Option<SecurityFeatures> {
        nonce::decode_cookie(self.nonce()?)
    }

    /// The 32 byte USERHASH, if present.
    pub fn userhash(&self) -> Option<&'a [u8]> {
        self.attribute_value(AttributeType::USERHASH)
    }

    /// The ERROR-CODE, if present and well formed.
    pub fn error_code(&self) -> Option<ErrorCode<'a>> {
        error::decode_value(self.attribute_value(AttributeType::ERROR_CODE)?).ok()
    }

    /// The attribute types listed in UNKNOWN-ATTRIBUTES, if present.
    pub fn unknown_attributes(&self) -> Option<Vec<AttributeType>> {
        error::decode_unknown_value(self.attribute_value(AttributeType::UNKNOWN_ATTRIBUTES)?).ok()
    }

    /// The negotiated PASSWORD-ALGORITHM, if present and known.
    pub fn password_algorithm(&self) -> Option<PasswordAlgorithm> {
        let value = self.attribute_value(AttributeType::PASSWORD_ALGORITHM)?;
        if value.len() < 4 {
            return None;
        }
        PasswordAlgorithm::from_id(BigEndian::read_u16(&value[..2]))
    }

    /// The raw algorithm numbers offered in PASSWORD-ALGORITHMS (plural).
    ///
    /// Negotiation policy is the caller's concern; unknown numbers are
    /// surfaced as is.
    pub fn password_algorithms(&self) -> Option<Vec<u16>> {
        let value = self.attribute_value(AttributeType::PASSWORD_ALGORITHMS)?;
        let mut ids = vec![];
        let mut offset = 0;
        while offset + 4 <= value.len() {
            ids.push(BigEndian::read_u16(&value[offset..offset + 2]));
            let params = BigEndian::read_u16(&value[offset + 2..offset + 4]) as usize;
            offset += 4 + padded_len(params);
        }
        if offset != value.len() {
            return None;
        }
        Some(ids)
    }

    /// The raw ICE PRIORITY value, if present.
    pub fn priority(&self) -> Option<u32> {
        let value = self.attribute_value(AttributeType::PRIORITY)?;
        (value.len() == 4).then(|| BigEndian::read_u32(value))
    }

    /// The ICE-CONTROLLED tie breaker, if present.
    pub fn ice_controlled(&self) -> Option<u64> {
        let value = self.attribute_value(AttributeType::ICE_CONTROLLED)?;
        (value.len() == 8).then(|| BigEndian::read_u64(value))
    }

    /// The ICE-CONTROLLING tie breaker, if present.
    pub fn ice_controlling(&self) -> Option<u64> {
        let value = self.attribute_value(AttributeType::ICE_CONTROLLING)?;
        (value.len() == 8).then(|| BigEndian::read_u64(value))
    }
}

impl std::fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message(type: {}, transaction: {}, attributes: [",
            self.message_type(),
            self.transaction_id()
        )?;
        for (i, attr) in self.iter_attributes().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}")?;
        }
        write!(f, "])")
    }
}

struct MessageAttributes<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for MessageAttributes<'a> {
    type Item = RawAttribute<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        // framing was validated during the parse
        let Ok(attr) = RawAttribute::from_bytes(&self.data[self.offset..]) else {
            self.offset = self.data.len();
            return None;
        };
        self.offset += attr.padded_len();
        Some(attr)
    }
}
