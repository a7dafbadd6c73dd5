use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;

/// Maximum encoded envelope body size accepted on the wire. Guards against
/// an unbounded allocation from a corrupt or hostile length prefix.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Which length-prefix shape a [`FrameCodec`] reads/writes.
///
/// Regular envelope traffic uses a LEB128 varint length prefix. The initial
/// handshake frame on both the control channel and the device channel pads
/// the length field to a fixed 8 bytes (low 4 bytes holding the real
/// length, the rest zero) for backward compatibility with a fixed-width
/// header a peer expects — see `shared/Helpers.cpp`'s
/// `sendControlDescriptor`/`readControlDescriptor` in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Varint,
    DescriptorPadded,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("malformed varint length prefix")]
    MalformedVarint,
    #[error("invalid json envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// A length-delimited JSON [`Envelope`] codec for use with
/// `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    kind: FrameKind,
    // Number of body bytes in the frame currently being decoded, once the
    // length prefix has been read. `None` means we're still waiting on the
    // length prefix itself.
    decoding_len: Option<u32>,
}

impl FrameCodec {
    pub fn new(kind: FrameKind) -> Self {
        Self { kind, decoding_len: None }
    }

    fn header_len(&self) -> usize {
        match self.kind {
            FrameKind::Varint => 0, // variable, handled separately
            FrameKind::DescriptorPadded => 8,
        }
    }
}

fn encode_varint_u32(mut value: u32, out: &mut BytesMut) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Attempt to decode a varint length prefix from `buf` without consuming
/// it. Returns `Ok(Some((value, bytes_consumed)))` once a full varint is
/// present, `Ok(None)` if more bytes are needed, `Err` if the varint is
/// malformed (more than 5 bytes, which cannot happen for a valid u32).
fn peek_varint_u32(buf: &[u8]) -> Result<Option<(u32, usize)>, FrameError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 5 {
            return Err(FrameError::MalformedVarint);
        }
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let body_len = match self.decoding_len {
            Some(len) => len,
            None => match self.kind {
                FrameKind::Varint => match peek_varint_u32(src)? {
                    Some((len, consumed)) => {
                        src.advance(consumed);
                        len
                    }
                    None => return Ok(None),
                },
                FrameKind::DescriptorPadded => {
                    if src.len() < 8 {
                        return Ok(None);
                    }
                    let mut header = src.split_to(8);
                    header.truncate(4);
                    u32::from_le_bytes(header.as_ref().try_into().unwrap())
                }
            },
        };

        if body_len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(body_len));
        }
        self.decoding_len = Some(body_len);

        if src.len() < body_len as usize {
            src.reserve(body_len as usize - src.len());
            return Ok(None);
        }

        let body = src.split_to(body_len as usize);
        self.decoding_len = None;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        Ok(Some(envelope))
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        let len =
            u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(u32::MAX))?;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        match self.kind {
            FrameKind::Varint => encode_varint_u32(len, dst),
            FrameKind::DescriptorPadded => {
                dst.reserve(self.header_len());
                dst.put_slice(&len.to_le_bytes());
                dst.put_slice(&[0u8; 4]);
            }
        }
        dst.reserve(body.len());
        dst.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Message, Recipient};

    fn sample_envelope() -> Envelope {
        Envelope::new(
            Recipient::Collector,
            Recipient::Monitor,
            Message::Descriptor { id: "Collector".to_owned() },
        )
    }

    #[test]
    fn varint_round_trip_small_and_large() {
        for len in [0u32, 1, 127, 128, 16383, 16384, 2_000_000] {
            let mut buf = BytesMut::new();
            encode_varint_u32(len, &mut buf);
            let (decoded, consumed) = peek_varint_u32(&buf).unwrap().unwrap();
            assert_eq!(decoded, len);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn varint_frame_round_trips_through_encoder_and_decoder() {
        let mut codec = FrameCodec::new(FrameKind::Varint);
        let mut buf = BytesMut::new();
        let envelope = sample_envelope();
        codec.encode(envelope.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, envelope);
        assert!(buf.is_empty());
    }

    #[test]
    fn descriptor_padded_frame_uses_eight_byte_header() {
        let mut codec = FrameCodec::new(FrameKind::DescriptorPadded);
        let mut buf = BytesMut::new();
        let envelope = sample_envelope();
        codec.encode(envelope.clone(), &mut buf).unwrap();

        let body_len = serde_json::to_vec(&envelope).unwrap().len() as u32;
        assert_eq!(&buf[0..4], &body_len.to_le_bytes());
        assert_eq!(&buf[4..8], &[0u8; 4]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn decoder_waits_for_more_bytes_on_partial_frame() {
        let mut codec = FrameCodec::new(FrameKind::Varint);
        let mut full = BytesMut::new();
        codec.encode(sample_envelope(), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut codec = FrameCodec::new(FrameKind::Varint);
        let mut buf = BytesMut::new();
        encode_varint_u32(MAX_FRAME_LEN + 1, &mut buf);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(_)));
    }
}
