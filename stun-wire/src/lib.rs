// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # stun-wire
//!
//! Building and parsing of STUN messages as specified in [RFC8489] and
//! interoperable with [RFC5389].
//!
//! The [`builder::MessageBuilder`] serializes attributes with correct
//! framing, enforces the terminal attribute ordering, and computes
//! MESSAGE-INTEGRITY, MESSAGE-INTEGRITY-SHA256, and FINGERPRINT values
//! with the RFC's length patching rule.  The [`parser::Parser`] validates
//! and authenticates received datagrams against a caller provided
//! [`credentials::CredentialProvider`] and exposes the attributes through
//! a borrowed [`parser::Message`] view.
//!
//! Transport, retransmission, and credential storage are deliberately out
//! of scope; the crate is synchronous and allocation light.
//!
//! [RFC8489]: https://tools.ietf.org/html/rfc8489
//! [RFC5389]: https://tools.ietf.org/html/rfc5389
//!
//! ## Examples
//!
//! ```
//! use stun_wire::builder::MessageBuilder;
//! use stun_wire::message::{MessageType, TransactionId};
//! use stun_wire::parser::Parser;
//!
//! let mut request = MessageBuilder::new(
//!     MessageType::BINDING_REQUEST,
//!     TransactionId::generate(),
//! );
//! request.set_software("stun-wire");
//! request.add_fingerprint();
//! let bytes = request.build().unwrap();
//!
//! let msg = Parser::new().parse(&bytes).unwrap();
//! assert_eq!(msg.message_type(), MessageType::BINDING_REQUEST);
//! ```

pub mod attribute;
pub mod builder;
pub mod credentials;
pub mod message;
pub mod parser;

use builder::MessageBuilder;
use message::{MessageType, StunWriteError, TransactionId};

/// Build a binding request with a freshly generated transaction id and a
/// SOFTWARE attribute.
///
/// # Examples
///
/// ```
/// let bytes = stun_wire::binding_request("stun-wire").unwrap();
/// assert_eq!(bytes[0], 0x00);
/// assert_eq!(bytes[1], 0x01);
/// ```
pub fn binding_request(software: &str) -> Result<Vec<u8>, StunWriteError> {
    let mut builder = MessageBuilder::new(MessageType::BINDING_REQUEST, TransactionId::generate());
    builder.set_software(software);
    builder.build()
}
