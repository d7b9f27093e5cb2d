//! Length-prefixed framing for the LAN byte stream.
//!
//! Every message on a LAN connection is a 4-byte big-endian unsigned
//! length followed by exactly that many payload bytes. The decoder is
//! pure and incremental, so message boundaries survive arbitrary TCP
//! segmentation and coalescing.

use crate::FrameError;

/// Maximum payload length a frame may declare (1 MiB).
///
/// Timer-state and session-complete payloads are a few hundred bytes;
/// anything near this limit is a corrupt or hostile stream.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Encode a payload as a length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Feed it bytes as they arrive with [`extend`](Self::extend); pull
/// complete payloads with [`next_frame`](Self::next_frame). Partial
/// frames simply wait for more input.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete payload, if one has fully arrived.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A declared
    /// length beyond [`MAX_FRAME_SIZE`] is connection-fatal.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let payload = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(payload))
    }

    /// Bytes currently buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_prepends_big_endian_length() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn roundtrip_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_frame(b"payload").unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"payload");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_payload_is_valid() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_frame(b"").unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn survives_byte_at_a_time_delivery() {
        let frame = encode_frame(b"one byte at a time").unwrap();
        let mut decoder = FrameDecoder::new();
        for byte in &frame[..frame.len() - 1] {
            decoder.extend(std::slice::from_ref(byte));
            assert!(decoder.next_frame().unwrap().is_none());
        }
        decoder.extend(&frame[frame.len() - 1..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"one byte at a time");
    }

    #[test]
    fn survives_coalesced_frames() {
        let mut stream = encode_frame(b"first").unwrap();
        stream.extend_from_slice(&encode_frame(b"second").unwrap());
        stream.extend_from_slice(&encode_frame(b"third").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"first");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"second");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"third");
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn survives_arbitrary_chunking() {
        let messages: Vec<Vec<u8>> = (0..20)
            .map(|i| format!("message number {i} with some padding").into_bytes())
            .collect();
        let mut stream = Vec::new();
        for m in &messages {
            stream.extend_from_slice(&encode_frame(m).unwrap());
        }

        // Deliver in chunks of varying sizes and collect everything.
        for chunk_size in [1, 3, 7, 16, 64, 1024] {
            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoder.extend(chunk);
                while let Some(payload) = decoder.next_frame().unwrap() {
                    decoded.push(payload);
                }
            }
            assert_eq!(decoded, messages, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(FrameError::TooLarge { .. })
        ));
    }
}
