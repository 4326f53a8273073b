// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! NONCE security feature cookie
//!
//! RFC 8489 servers advertise security features by prefixing the nonce
//! with the 13 byte cookie `"obMatJos2"` followed by 4 base64 characters
//! encoding a 24 bit feature set.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// The fixed ASCII prefix of a nonce cookie.
const NONCE_COOKIE_PREFIX: &[u8] = b"obMatJos2";

/// The total number of bytes the cookie occupies at the front of a nonce.
pub(crate) const NONCE_COOKIE_LEN: usize = NONCE_COOKIE_PREFIX.len() + 4;

/// The STUN security feature set carried in a nonce cookie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityFeatures(u32);

impl SecurityFeatures {
    /// No features.
    pub const NONE: SecurityFeatures = SecurityFeatures(0);
    /// The server supports the PASSWORD-ALGORITHMS negotiation.
    pub const PASSWORD_ALGORITHMS: SecurityFeatures = SecurityFeatures(1);
    /// The server supports anonymous USERHASH user names.
    pub const USER_ANONYMITY: SecurityFeatures = SecurityFeatures(2);

    /// The raw 24 bit feature set.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every feature in `other` is present in `self`.
    ///
    /// # Examples
    /// ```
    /// # use stun_wire::attribute::nonce::SecurityFeatures;
    /// let features = SecurityFeatures::PASSWORD_ALGORITHMS | SecurityFeatures::USER_ANONYMITY;
    /// assert!(features.contains(SecurityFeatures::USER_ANONYMITY));
    /// assert!(!SecurityFeatures::NONE.contains(SecurityFeatures::USER_ANONYMITY));
    /// ```
    pub fn contains(self, other: SecurityFeatures) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SecurityFeatures {
    type Output = SecurityFeatures;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SecurityFeatures {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Encode the cookie prepended to a nonce advertising `features`.
pub(crate) fn encode_cookie(features: SecurityFeatures) -> [u8; NONCE_COOKIE_LEN] {
    let mut cookie = [0; NONCE_COOKIE_LEN];
    cookie[..NONCE_COOKIE_PREFIX.len()].copy_from_slice(NONCE_COOKIE_PREFIX);
    let bits = features.bits().to_be_bytes();
    // the feature set occupies 24 bits, three bytes to four base64 chars
    let mut encoded = [0; 4];
    // encoding 3 bytes always produces exactly 4 characters
    let Ok(4) = STANDARD.encode_slice(&bits[1..4], &mut encoded) else {
        unreachable!();
    };
    cookie[NONCE_COOKIE_PREFIX.len()..].copy_from_slice(&encoded);
    cookie
}

/// Extract the security feature set from a nonce, if it carries a cookie.
pub(crate) fn decode_cookie(nonce: &[u8]) -> Option<SecurityFeatures> {
    if nonce.len() < NONCE_COOKIE_LEN || !nonce.starts_with(NONCE_COOKIE_PREFIX) {
        return None;
    }
    let mut decoded = [0; 4];
    let len = STANDARD
        .decode_slice(
            &nonce[NONCE_COOKIE_PREFIX.len()..NONCE_COOKIE_LEN],
            &mut decoded,
        )
        .ok()?;
    if len != 3 {
        return None;
    }
    Some(SecurityFeatures(u32::from_be_bytes([
        0, decoded[0], decoded[1], decoded[2],
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_roundtrip() {
        let _log = crate::tests::test_init_log();
        for features in [
            SecurityFeatures::NONE,
            SecurityFeatures::PASSWORD_ALGORITHMS,
            SecurityFeatures::USER_ANONYMITY,
            SecurityFeatures::PASSWORD_ALGORITHMS | SecurityFeatures::USER_ANONYMITY,
        ] {
            let cookie = encode_cookie(features);
            assert_eq!(cookie.len(), 13);
            assert_eq!(decode_cookie(&cookie), Some(features));
        }
    }

    #[test]
    fn rfc8489_b1_cookie() {
        let _log = crate::tests::test_init_log();
        // the RFC 8489 B.1 nonce advertises only the anonymity feature
        let cookie = encode_cookie(SecurityFeatures::USER_ANONYMITY);
        assert_eq!(&cookie, b"obMatJos2AAAC");

        let nonce = b"obMatJos2AAACf//499k954d6OL34oL9FSTvy64sA";
        let features = decode_cookie(nonce).unwrap();
        assert!(features.contains(SecurityFeatures::USER_ANONYMITY));
        assert!(!features.contains(SecurityFeatures::PASSWORD_ALGORITHMS));
    }

    #[test]
    fn not_a_cookie() {
        let _log = crate::tests::test_init_log();
        assert_eq!(decode_cookie(b"f//499k954d6OL34oL9FSTvy64sA"), None);
        assert_eq!(decode_cookie(b"obMatJos2"), None);
        // invalid base64 in the feature characters
        assert_eq!(decode_cookie(b"obMatJos2~~~~nonce"), None);
    }
}
