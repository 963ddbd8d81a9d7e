/// Message codec - JSON body encoding into bounded buffers
///
/// Outbound payloads are serialized straight into the transport's fixed
/// outgoing buffer; nothing is allocated on the encode path. Inbound
/// acknowledgments are only ever turned back into text.
use std::io;

use crate::contracts::{OutgoingMessage, Payload};
use crate::errors::{BeaconError, Result};
use crate::OUTGOING_CAPACITY;

/// Largest encoded size accepted; the last byte of the buffer is kept for a terminator
pub const ENCODE_LIMIT: usize = OUTGOING_CAPACITY - 1;

/// `io::Write` adapter that refuses to grow past `limit`
struct BoundedWriter<'a> {
    buf: &'a mut OutgoingMessage,
    limit: usize,
}

impl io::Write for BoundedWriter<'_> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.buf.len() + bytes.len() > self.limit {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "outgoing buffer full"));
        }
        self.buf
            .extend_from_slice(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::WriteZero, "outgoing buffer full"))?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encode a payload into the outgoing buffer
///
/// The buffer is cleared first, so retries never accumulate bytes. On
/// failure it is left empty rather than holding a truncated document.
///
/// # Errors
/// Returns `BeaconError::EncodeFailed` if the encoded form exceeds [`ENCODE_LIMIT`]
pub fn encode(payload: &Payload, out: &mut OutgoingMessage) -> Result<usize> {
    out.clear();
    let mut writer = BoundedWriter { buf: &mut *out, limit: ENCODE_LIMIT };
    if serde_json::to_writer(&mut writer, payload).is_err() {
        out.clear();
        return Err(BeaconError::EncodeFailed { limit: ENCODE_LIMIT });
    }
    Ok(out.len())
}

/// Decode a JSON body mapping
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    serde_json::from_slice(bytes).map_err(|e| BeaconError::DecodeFailed(e.to_string()))
}

/// View received bytes as UTF-8 text
pub fn decode_text(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| BeaconError::DecodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // {"body":""} is 11 bytes of framing around the body text.
    const FRAMING: usize = 11;

    #[test]
    fn test_encode_wire_shape() {
        let mut out = OutgoingMessage::new();
        let len = encode(&Payload::body("Elapsed time: 312ms"), &mut out).unwrap();

        assert_eq!(&out[..], br#"{"body":"Elapsed time: 312ms"}"#);
        assert_eq!(len, out.len());
    }

    #[test]
    fn test_encode_decode_recovers_body() {
        let mut out = OutgoingMessage::new();
        let body = "Component server-ready check at 1234ms";
        encode(&Payload::body(body), &mut out).unwrap();

        let decoded = decode_payload(&out).unwrap();
        assert_eq!(decoded.body_text(), Some(body));
    }

    #[test]
    fn test_encode_limit_boundary() {
        let mut out = OutgoingMessage::new();

        let fits = "x".repeat(ENCODE_LIMIT - FRAMING);
        assert_eq!(encode(&Payload::body(fits), &mut out).unwrap(), ENCODE_LIMIT);

        let overflows = "x".repeat(ENCODE_LIMIT - FRAMING + 1);
        assert_eq!(
            encode(&Payload::body(overflows), &mut out),
            Err(BeaconError::EncodeFailed { limit: ENCODE_LIMIT })
        );
        assert!(out.is_empty(), "failed encode must not leave partial bytes");
    }

    #[test]
    fn test_escaping_counts_against_capacity() {
        let mut out = OutgoingMessage::new();
        // Each quote becomes \" on the wire.
        let quoted = "\"".repeat(50);
        assert!(encode(&Payload::body(quoted), &mut out).is_err());
    }

    #[test]
    fn test_reencode_overwrites() {
        let mut out = OutgoingMessage::new();
        encode(&Payload::body("a much longer first body string"), &mut out).unwrap();
        encode(&Payload::body("short"), &mut out).unwrap();
        assert_eq!(&out[..], br#"{"body":"short"}"#);
    }

    #[test]
    fn test_decode_text_rejects_invalid_utf8() {
        assert_eq!(decode_text(b"ACK").unwrap(), "ACK");
        assert!(matches!(decode_text(&[0xff, 0xfe]), Err(BeaconError::DecodeFailed(_))));
        assert!(decode_payload(b"not json").is_err());
    }
}
