// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PUBACK frame decoding.
//!
//! Clients that surface raw acknowledgment frames instead of decoded packet
//! ids feed them through [`decode_puback`]. Frame layout:
//!
//! ```text
//! +--------+----------------+-----------+-------------+------------+
//! | 0x40   | remaining len  | packet id | reason code | properties |
//! | 1 byte | varint (1..4)  | u16 BE    | u8 (v5 opt) | (v5 opt)   |
//! +--------+----------------+-----------+-------------+------------+
//! ```
//!
//! MQTT 3.1.1 frames stop after the packet id. A v5 frame with remaining
//! length 2 implies reason code `0x00` (success).

use crate::error::AckDecodeError;
use crate::transport::MessageId;

/// PUBACK fixed header byte (packet type 4, flags 0).
pub const PUBACK_HEADER: u8 = 0x40;

/// Reason code meaning "accepted".
pub const REASON_SUCCESS: u8 = 0x00;

/// Reason code for "accepted, but nobody is subscribed".
pub const REASON_NO_MATCHING_SUBSCRIBERS: u8 = 0x10;

const MAX_VARINT_BYTES: usize = 4;

/// Decoded PUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    /// Packet id being acknowledged.
    pub id: MessageId,
    /// Reason code (`0x00` when absent).
    pub reason_code: u8,
}

impl PubAck {
    /// Broker accepted the publish.
    ///
    /// Reason codes below `0x80` are successes.
    pub fn is_success(&self) -> bool {
        self.reason_code < 0x80
    }
}

/// Decode one PUBACK frame.
pub fn decode_puback(buf: &[u8]) -> Result<PubAck, AckDecodeError> {
    if buf.len() < 4 {
        return Err(AckDecodeError::Truncated(buf.len()));
    }
    if buf[0] != PUBACK_HEADER {
        return Err(AckDecodeError::UnexpectedType(buf[0]));
    }

    let (remaining, len_bytes) = decode_remaining_length(&buf[1..])?;
    let body = &buf[1 + len_bytes..];
    if remaining < 2 || body.len() != remaining {
        return Err(AckDecodeError::InvalidLength);
    }

    let raw_id = u16::from_be_bytes([body[0], body[1]]);
    if raw_id == 0 {
        return Err(AckDecodeError::ZeroPacketId);
    }

    let reason_code = body.get(2).copied().unwrap_or(REASON_SUCCESS);

    Ok(PubAck {
        id: MessageId(raw_id),
        reason_code,
    })
}

/// Encode a PUBACK frame (3.1.1 form when `reason_code` is success).
pub fn encode_puback(id: MessageId, reason_code: u8) -> Vec<u8> {
    let [hi, lo] = id.0.to_be_bytes();
    if reason_code == REASON_SUCCESS {
        vec![PUBACK_HEADER, 0x02, hi, lo]
    } else {
        vec![PUBACK_HEADER, 0x03, hi, lo, reason_code]
    }
}

fn decode_remaining_length(buf: &[u8]) -> Result<(usize, usize), AckDecodeError> {
    let mut value = 0usize;
    for (i, byte) in buf.iter().take(MAX_VARINT_BYTES).enumerate() {
        value |= usize::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(AckDecodeError::InvalidLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_v311_puback() {
        let ack = decode_puback(&[0x40, 0x02, 0x01, 0x2C]).expect("decode");
        assert_eq!(ack.id, MessageId(300));
        assert_eq!(ack.reason_code, REASON_SUCCESS);
        assert!(ack.is_success());
    }

    #[test]
    fn test_decode_v5_with_reason_and_properties() {
        // reason 0x10, property length 0
        let ack = decode_puback(&[0x40, 0x04, 0x00, 0x07, 0x10, 0x00]).expect("decode");
        assert_eq!(ack.id, MessageId(7));
        assert_eq!(ack.reason_code, REASON_NO_MATCHING_SUBSCRIBERS);
        assert!(ack.is_success());
    }

    #[test]
    fn test_decode_error_reason_code() {
        let ack = decode_puback(&[0x40, 0x03, 0x00, 0x09, 0x87]).expect("decode");
        assert!(!ack.is_success());
    }

    #[test]
    fn test_encode_matches_decode() {
        let frame = encode_puback(MessageId(513), 0x87);
        let ack = decode_puback(&frame).expect("decode");
        assert_eq!(ack.id, MessageId(513));
        assert_eq!(ack.reason_code, 0x87);
    }

    #[test]
    fn test_truncated_frame() {
        assert_eq!(
            decode_puback(&[0x40, 0x02, 0x01]),
            Err(AckDecodeError::Truncated(3))
        );
    }

    #[test]
    fn test_wrong_packet_type() {
        // PUBREC
        assert_eq!(
            decode_puback(&[0x50, 0x02, 0x00, 0x01]),
            Err(AckDecodeError::UnexpectedType(0x50))
        );
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            decode_puback(&[0x40, 0x05, 0x00, 0x01]),
            Err(AckDecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_unterminated_varint() {
        assert_eq!(
            decode_puback(&[0x40, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
            Err(AckDecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_zero_packet_id() {
        assert_eq!(
            decode_puback(&[0x40, 0x02, 0x00, 0x00]),
            Err(AckDecodeError::ZeroPacketId)
        );
    }
}
