// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! FINGERPRINT core
//!
//! The fingerprint value is the CRC-32 (IEEE) of the message up to but
//! excluding the FINGERPRINT attribute, xored with `0x5354554E` ("STUN").
//! On emit the header length must already advertise the final message
//! size, so the compute path feeds the patched length the same way the
//! integrity core does.  On verify the attribute is always last and the
//! header is already final, so the prefix is hashed as is.

use crc::{Crc, CRC_32_ISO_HDLC};
use tracing::debug;

use crate::message::StunParseError;

const CRC_ALGO: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// The XOR constant applied to the CRC, the ASCII bytes "STUN".
const FINGERPRINT_XOR: u32 = 0x5354554E;

/// The total size of a FINGERPRINT attribute on the wire.
pub(crate) const FINGERPRINT_SIZE: usize = 8;

/// Compute the fingerprint of `msg` with its length field advertised as
/// `advertised_len`.
pub(crate) fn compute(msg: &[u8], advertised_len: u16) -> u32 {
    let mut digest = CRC_ALGO.digest();
    digest.update(&msg[..2]);
    digest.update(&advertised_len.to_be_bytes());
    digest.update(&msg[4..]);
    digest.finalize() ^ FINGERPRINT_XOR
}

/// Verify a received fingerprint over `prefix`, the message bytes up to
/// the FINGERPRINT attribute header.
pub(crate) fn verify(prefix: &[u8], received: u32) -> Result<(), StunParseError> {
    if CRC_ALGO.checksum(prefix) ^ FINGERPRINT_XOR != received {
        debug!("FINGERPRINT check failed");
        return Err(StunParseError::FingerprintCheckFailed);
    }
    Ok(())
}
