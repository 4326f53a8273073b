// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! MESSAGE-INTEGRITY and MESSAGE-INTEGRITY-SHA256 core
//!
//! The MAC covers the message header and every attribute before the
//! integrity attribute, but with the header length field replaced by the
//! value it will hold once the integrity attribute itself is appended.
//! Rather than patching the buffer, both directions feed the MAC with the
//! two type bytes, the two advertised length bytes, and then everything
//! from offset 4 up to the integrity attribute.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

use crate::message::StunParseError;

/// The value length of a MESSAGE-INTEGRITY attribute.
pub(crate) const SHA1_LEN: usize = 20;
/// The maximum (untruncated) value length of MESSAGE-INTEGRITY-SHA256.
pub(crate) const SHA256_LEN: usize = 32;

/// Whether `len` is a legal MESSAGE-INTEGRITY-SHA256 value length: at
/// least 16, at most 32, and a multiple of 4.
pub(crate) fn valid_sha256_len(len: usize) -> bool {
    (16..=SHA256_LEN).contains(&len) && len % 4 == 0
}

fn sha1_mac(key: &[u8]) -> Hmac<Sha1> {
    let Ok(mac) = Hmac::<Sha1>::new_from_slice(key) else {
        // HMAC accepts keys of any length
        unreachable!();
    };
    mac
}

fn sha256_mac(key: &[u8]) -> Hmac<Sha256> {
    let Ok(mac) = Hmac::<Sha256>::new_from_slice(key) else {
        // HMAC accepts keys of any length
        unreachable!();
    };
    mac
}

fn feed<M: Mac>(mac: &mut M, msg: &[u8], advertised_len: u16) {
    mac.update(&msg[..2]);
    mac.update(&advertised_len.to_be_bytes());
    mac.update(&msg[4..]);
}

/// Compute the HMAC-SHA1 of `msg` with its length field advertised as
/// `advertised_len`.
pub(crate) fn compute_sha1(key: &[u8], msg: &[u8], advertised_len: u16) -> [u8; SHA1_LEN] {
    let mut mac = sha1_mac(key);
    feed(&mut mac, msg, advertised_len);
    mac.finalize().into_bytes().into()
}

/// Verify a received MESSAGE-INTEGRITY value in constant time.
pub(crate) fn verify_sha1(
    key: &[u8],
    msg: &[u8],
    advertised_len: u16,
    expected: &[u8],
) -> Result<(), StunParseError> {
    let mut mac = sha1_mac(key);
    feed(&mut mac, msg, advertised_len);
    mac.verify_slice(expected).map_err(|_| {
        debug!("MESSAGE-INTEGRITY check failed");
        StunParseError::MessageIntegrityCheckFailed
    })
}

/// Compute the HMAC-SHA256 of `msg` with its length field advertised as
/// `advertised_len`.  Truncation to the attribute length is the caller's
/// concern.
pub(crate) fn compute_sha256(key: &[u8], msg: &[u8], advertised_len: u16) -> [u8; SHA256_LEN] {
    let mut mac = sha256_mac(key);
    feed(&mut mac, msg, advertised_len);
    mac.finalize().into_bytes().into()
}

/// Verify a received, possibly truncated, MESSAGE-INTEGRITY-SHA256 value
/// in constant time.
pub(crate) fn verify_sha256(
    key: &[u8],
    msg: &[u8],
    advertised_len: u16,
    expected: &[u8],
) -> Result<(), StunParseError> {
    let mut mac = sha256_mac(key);
    feed(&mut mac, msg, advertised_len);
    mac.verify_truncated_left(expected).map_err(|_| {
        debug!("MESSAGE-INTEGRITY-SHA256 check failed");
        StunParseError::MessageIntegritySha256CheckFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder};

    use crate::message::{MAGIC_COOKIE, HEADER_LENGTH};

    fn sample_message() -> Vec<u8> {
        let mut msg = vec![0; HEADER_LENGTH + 8];
        msg[1] = 0x01;
        BigEndian::write_u16(&mut msg[2..4], 8);
        BigEndian::write_u32(&mut msg[4..8], MAGIC_COOKIE);
        msg[20..28].copy_from_slice(&[0x80, 0x22, 0x00, 0x04, b't', b'e', b's', b't']);
        msg
    }

    #[test]
    fn sha1_roundtrip() {
        let _log = crate::tests::test_init_log();
        let msg = sample_message();
        let advertised = (msg.len() - HEADER_LENGTH + 4 + SHA1_LEN) as u16;
        let mac = compute_sha1(b"secret", &msg, advertised);
        verify_sha1(b"secret", &msg, advertised, &mac).unwrap();
        assert_eq!(
            verify_sha1(b"other", &msg, advertised, &mac),
            Err(StunParseError::MessageIntegrityCheckFailed)
        );
    }

    #[test]
    fn sha256_roundtrip_truncated() {
        let _log = crate::tests::test_init_log();
        let msg = sample_message();
        for len in [16, 20, 24, 28, 32] {
            let advertised = (msg.len() - HEADER_LENGTH + 4 + len) as u16;
            let mac = compute_sha256(b"secret", &msg, advertised);
            verify_sha256(b"secret", &msg, advertised, &mac[..len]).unwrap();
            let mut tampered = mac;
            tampered[0] ^= 0x40;
            assert_eq!(
                verify_sha256(b"secret", &msg, advertised, &tampered[..len]),
                Err(StunParseError::MessageIntegritySha256CheckFailed)
            );
        }
    }

    #[test]
    fn advertised_length_changes_the_mac() {
        // the length patching rule is cryptographically meaningful: a MAC
        // over the unpatched header must differ from the canonical value
        let _log = crate::tests::test_init_log();
        let msg = sample_message();
        let original = BigEndian::read_u16(&msg[2..4]);
        let advertised = original + 4 + SHA1_LEN as u16;
        assert_ne!(
            compute_sha1(b"secret", &msg, advertised),
            compute_sha1(b"secret", &msg, original)
        );
        assert_ne!(
            compute_sha256(b"secret", &msg, advertised + 12),
            compute_sha256(b"secret", &msg, original)
        );
    }

    #[test]
    fn sha256_length_rule() {
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
            assert_eq!(valid_sha256_len(len), ok, "length {len}");
        }
    }
}
