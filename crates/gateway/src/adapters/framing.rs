//! Length-prefixed message framing shared by the RPC surfaces.
//!
//! Every frame is a one byte flag followed by a big-endian `u32` payload
//! length and the payload itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use thiserror::Error;

use crate::rpc::{Code, Status};

pub(crate) const HEADER_LEN: usize = 5;

/// Set on frames whose payload is compressed.
pub(crate) const FLAG_COMPRESSED: u8 = 0x01;

/// Set on the gRPC-web trailer frame.
pub(crate) const FLAG_TRAILERS: u8 = 0x80;

// `grpc-message` keeps printable ASCII except `%`; everything else is escaped.
const GRPC_MESSAGE: &AsciiSet = &CONTROLS.add(b'%');

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("frame header is truncated")]
    TruncatedHeader,

    #[error("frame declares {declared} bytes but only {available} remain")]
    TruncatedPayload { declared: usize, available: usize },

    #[error("compressed messages are not supported")]
    Compressed,

    #[error("expected a single request message")]
    MessageCount,

    #[error("frame payload of {0} bytes is too large")]
    TooLarge(usize),
}

impl From<FrameError> for Status {
    fn from(error: FrameError) -> Self {
        Self::invalid_argument(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) flag: u8,
    pub(crate) payload: Bytes,
}

impl Frame {
    pub(crate) const fn is_trailers(&self) -> bool {
        self.flag & FLAG_TRAILERS != 0
    }
}

/// Append one frame to `out`.
pub(crate) fn encode_into(out: &mut BytesMut, flag: u8, payload: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|source| {
        tracing::debug!("frame length overflow: {source}");
        FrameError::TooLarge(payload.len())
    })?;

    out.reserve(HEADER_LEN + payload.len());
    out.put_u8(flag);
    out.put_u32(len);
    out.put_slice(payload);

    Ok(())
}

pub(crate) fn encode(flag: u8, payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut out = BytesMut::new();
    encode_into(&mut out, flag, payload)?;
    Ok(out.freeze())
}

/// Split a buffer into frames. Any trailing partial frame is an error.
pub(crate) fn decode(mut buf: Bytes) -> Result<Vec<Frame>, FrameError> {
    let mut frames = Vec::new();

    while buf.has_remaining() {
        if buf.remaining() < HEADER_LEN {
            return Err(FrameError::TruncatedHeader);
        }

        let flag = buf.get_u8();
        let declared = buf.get_u32() as usize;

        if buf.remaining() < declared {
            return Err(FrameError::TruncatedPayload {
                declared,
                available: buf.remaining(),
            });
        }

        frames.push(Frame {
            flag,
            payload: buf.split_to(declared),
        });
    }

    Ok(frames)
}

/// Extract the single message of a unary request. A body with no message
/// frames is an empty message.
pub(crate) fn decode_request(buf: Bytes) -> Result<Bytes, FrameError> {
    let mut messages = decode(buf)?
        .into_iter()
        .filter(|frame| !frame.is_trailers());

    match (messages.next(), messages.next()) {
        (None, _) => Ok(Bytes::new()),
        (Some(frame), None) if frame.flag & FLAG_COMPRESSED != 0 => Err(FrameError::Compressed),
        (Some(frame), None) => Ok(frame.payload),
        (Some(_), Some(_)) => Err(FrameError::MessageCount),
    }
}

/// Status pair for a finished call.
pub(crate) fn status_parts(status: Option<&Status>) -> (Code, String) {
    match status {
        Some(status) => (
            status.code,
            utf8_percent_encode(&status.message, GRPC_MESSAGE).to_string(),
        ),
        None => (Code::Ok, String::new()),
    }
}

/// Body of the gRPC-web trailer frame: HTTP/1 style header lines.
pub(crate) fn trailer_block(status: Option<&Status>) -> String {
    let (code, message) = status_parts(status);

    format!("grpc-status:{}\r\ngrpc-message:{message}\r\n", code.grpc())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn frames_carry_flag_and_big_endian_length() -> TestResult {
        let frame = encode(0, b"{}")?;

        assert_eq!(frame.as_ref(), b"\x00\x00\x00\x00\x02{}");

        Ok(())
    }

    #[test]
    fn decode_splits_consecutive_frames() -> TestResult {
        let mut out = BytesMut::new();
        encode_into(&mut out, 0, b"{\"a\":1}")?;
        encode_into(&mut out, FLAG_TRAILERS, b"grpc-status:0\r\n")?;

        let frames = decode(out.freeze())?;

        assert_eq!(frames.len(), 2);
        assert!(!frames.first().is_some_and(Frame::is_trailers));
        assert!(frames.last().is_some_and(Frame::is_trailers));

        Ok(())
    }

    #[test]
    fn truncated_frames_are_rejected() {
        assert_eq!(
            decode(Bytes::from_static(b"\x00\x00\x00")),
            Err(FrameError::TruncatedHeader)
        );
        assert_eq!(
            decode(Bytes::from_static(b"\x00\x00\x00\x00\x09{}")),
            Err(FrameError::TruncatedPayload {
                declared: 9,
                available: 2
            })
        );
    }

    #[test]
    fn unary_requests_hold_at_most_one_message() -> TestResult {
        assert!(decode_request(Bytes::new())?.is_empty(), "empty body");
        assert_eq!(decode_request(encode(0, b"{}")?)?.as_ref(), b"{}");

        let mut twice = BytesMut::new();
        encode_into(&mut twice, 0, b"{}")?;
        encode_into(&mut twice, 0, b"{}")?;

        assert_eq!(
            decode_request(twice.freeze()),
            Err(FrameError::MessageCount)
        );
        assert_eq!(
            decode_request(encode(FLAG_COMPRESSED, b"gz")?),
            Err(FrameError::Compressed)
        );

        Ok(())
    }

    #[test]
    fn trailer_block_percent_encodes_the_message() {
        let status = Status::not_found("user 7 not found: 100%");

        assert_eq!(
            trailer_block(Some(&status)),
            "grpc-status:5\r\ngrpc-message:user 7 not found: 100%25\r\n"
        );
        assert_eq!(trailer_block(None), "grpc-status:0\r\ngrpc-message:\r\n");
    }

    #[test]
    fn non_ascii_and_control_bytes_are_escaped() {
        let status = Status::invalid_argument("café\n");

        assert_eq!(status_parts(Some(&status)).1, "caf%C3%A9%0A");
    }
}
