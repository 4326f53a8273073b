// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! ERROR-CODE and UNKNOWN-ATTRIBUTES value codecs

use byteorder::{BigEndian, ByteOrder};

use crate::message::StunParseError;

use super::AttributeType;

/// A decoded ERROR-CODE attribute, borrowing the reason phrase from the
/// message it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode<'a> {
    code: u16,
    reason: &'a str,
}

impl<'a> ErrorCode<'a> {
    /// The client should contact the alternate server in this response.
    pub const TRY_ALTERNATE: u16 = 300;
    /// The request was malformed.
    pub const BAD_REQUEST: u16 = 400;
    /// The request did not contain the correct credentials.
    pub const UNAUTHENTICATED: u16 = 401;
    /// The server received an unknown comprehension required attribute.
    pub const UNKNOWN_ATTRIBUTE: u16 = 420;
    /// The nonce used is no longer valid.
    pub const STALE_NONCE: u16 = 438;
    /// The server suffered a temporary error, the client should try again.
    pub const SERVER_ERROR: u16 = 500;

    /// The numeric error code, in [300, 699].
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The reason phrase.
    pub fn reason(&self) -> &'a str {
        self.reason
    }
}

impl std::fmt::Display for ErrorCode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.code, self.reason)
    }
}

/// Encode an ERROR-CODE value: `reserved(2) | class(1) | number(1) | reason`.
pub(crate) fn encode_value(code: u16, reason: &str, out: &mut Vec<u8>) {
    out.push(0);
    out.push(0);
    out.push((code / 100) as u8);
    out.push((code % 100) as u8);
    out.extend_from_slice(reason.as_bytes());
}

/// Decode an ERROR-CODE value.
pub(crate) fn decode_value(value: &[u8]) -> Result<ErrorCode<'_>, StunParseError> {
    if value.len() < 4 {
        return Err(StunParseError::UnexpectedEof);
    }
    let class = (value[2] & 0x7) as u16;
    let number = value[3] as u16;
    if !(3..7).contains(&class) || number > 99 {
        return Err(StunParseError::MalformedAttribute);
    }
    let reason =
        std::str::from_utf8(&value[4..]).map_err(|_| StunParseError::MalformedAttribute)?;
    Ok(ErrorCode {
        code: class * 100 + number,
        reason,
    })
}

/// Encode an UNKNOWN-ATTRIBUTES value: the attribute types as a `u16` list.
pub(crate) fn encode_unknown_value(attributes: &[AttributeType], out: &mut Vec<u8>) {
    for atype in attributes {
        out.extend_from_slice(&atype.value().to_be_bytes());
    }
}

/// Decode an UNKNOWN-ATTRIBUTES value.
pub(crate) fn decode_unknown_value(
    value: &[u8],
) -> Result<Vec<AttributeType>, StunParseError> {
    if value.len() % 2 != 0 {
        return Err(StunParseError::MalformedAttribute);
    }
    Ok(value
        .chunks_exact(2)
        .map(|chunk| AttributeType::new(BigEndian::read_u16(chunk)))
        .collect())
}
