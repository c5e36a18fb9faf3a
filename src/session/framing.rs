//! Varint length-delimited frame accumulation (spec §4.4 "The session owns
//! a buffer that accumulates bytes until a complete framed message is
//! present", §10 "a partial varint-length read is not an error").

use bytes::{Buf, BytesMut};

use crate::error::{DaemonError, ErrorCode};

/// Accumulates bytes from a socket and yields complete frames as soon as
/// they're available. One instance per [`super::ClientSession`].
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
    max_frame_len: usize,
}

/// What the reader learned from the bytes appended so far.
pub enum Progress {
    /// Not enough bytes yet for a length prefix, or not enough payload
    /// bytes yet — keep reading.
    NeedMoreData,
    /// A full frame's payload, with its bytes (and the frame's own
    /// length-prefix bytes) removed from the buffer.
    Frame(Vec<u8>),
}

impl FrameReader {
    pub fn new(max_frame_len: usize) -> Self {
        Self { buf: BytesMut::new(), max_frame_len }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to pull one complete frame out of whatever has been fed so far.
    /// Spec §10: the total frame-length accounting includes the varint's
    /// own encoded size, not just the payload.
    pub fn try_read_frame(&mut self) -> Result<Progress, DaemonError> {
        let mut cursor = &self.buf[..];
        let before = cursor.remaining();
        let length = match prost::encoding::decode_varint(&mut cursor) {
            Ok(length) => length as usize,
            Err(_) => return Ok(Progress::NeedMoreData),
        };
        let varint_len = before - cursor.remaining();

        if length > self.max_frame_len {
            return Err(DaemonError::new(ErrorCode::InvalidValue, format!("frame of {} bytes exceeds max_frame_length", length)));
        }
        if cursor.remaining() < length {
            return Ok(Progress::NeedMoreData);
        }

        let frame_total = varint_len + length;
        let payload = self.buf[varint_len..frame_total].to_vec();
        self.buf.advance(frame_total);
        Ok(Progress::Frame(payload))
    }

    /// Encode a payload with its varint length prefix for writing (spec
    /// §4.4 "The writer mirrors this: encode length as varint, serialize
    /// payload").
    pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 5);
        prost::encoding::encode_varint(payload.len() as u64, &mut out);
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_varint_needs_more_data() {
        let mut reader = FrameReader::new(1024);
        reader.feed(&[0x80]);
        assert!(matches!(reader.try_read_frame().unwrap(), Progress::NeedMoreData));
    }

    #[test]
    fn partial_payload_needs_more_data() {
        let mut reader = FrameReader::new(1024);
        let framed = FrameReader::encode_frame(&[1, 2, 3, 4]);
        reader.feed(&framed[..framed.len() - 1]);
        assert!(matches!(reader.try_read_frame().unwrap(), Progress::NeedMoreData));
    }

    #[test]
    fn complete_frame_round_trips() {
        let mut reader = FrameReader::new(1024);
        let framed = FrameReader::encode_frame(b"hello");
        reader.feed(&framed);
        match reader.try_read_frame().unwrap() {
            Progress::Frame(payload) => assert_eq!(payload, b"hello"),
            Progress::NeedMoreData => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut reader = FrameReader::new(4);
        let framed = FrameReader::encode_frame(b"too long");
        reader.feed(&framed);
        assert!(reader.try_read_frame().is_err());
    }

    #[test]
    fn two_concatenated_frames_are_read_in_order() {
        let mut reader = FrameReader::new(1024);
        reader.feed(&FrameReader::encode_frame(b"one"));
        reader.feed(&FrameReader::encode_frame(b"two"));
        let first = match reader.try_read_frame().unwrap() {
            Progress::Frame(p) => p,
            _ => panic!("expected frame"),
        };
        let second = match reader.try_read_frame().unwrap() {
            Progress::Frame(p) => p,
            _ => panic!("expected frame"),
        };
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");
    }
}
