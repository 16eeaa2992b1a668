//! Ordered protocol matchers over a connection's opening bytes.

use std::fmt;

/// Protocol claimed by a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Protocol {
    /// HTTP/2 with prior knowledge: native RPC and h2c REST.
    Http2,
    /// HTTP/1.1: browser RPC and REST.
    Http1,
}

impl Protocol {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Http2 => "http2",
            Self::Http1 => "http1",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Match {
    Matched,
    NeedMore,
    Rejected,
}

pub(crate) trait Matcher: Send + Sync + fmt::Debug {
    fn protocol(&self) -> Protocol;

    fn check(&self, prefix: &[u8]) -> Match;
}

pub(crate) const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Http2Preface;

impl Matcher for Http2Preface {
    fn protocol(&self) -> Protocol {
        Protocol::Http2
    }

    fn check(&self, prefix: &[u8]) -> Match {
        if prefix.len() < HTTP2_PREFACE.len() {
            if HTTP2_PREFACE.starts_with(prefix) {
                Match::NeedMore
            } else {
                Match::Rejected
            }
        } else if prefix.starts_with(HTTP2_PREFACE) {
            Match::Matched
        } else {
            Match::Rejected
        }
    }
}

const HTTP1_METHODS: &[&[u8]] = &[
    b"GET", b"POST", b"PUT", b"PATCH", b"DELETE", b"HEAD", b"OPTIONS", b"CONNECT", b"TRACE",
];

/// `<METHOD> <target> HTTP/1.x` followed by a line break.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Http1RequestLine;

impl Matcher for Http1RequestLine {
    fn protocol(&self) -> Protocol {
        Protocol::Http1
    }

    fn check(&self, prefix: &[u8]) -> Match {
        let Some(space) = prefix.iter().position(|byte| *byte == b' ') else {
            // Still reading the method token.
            return if HTTP1_METHODS.iter().any(|method| method.starts_with(prefix)) {
                Match::NeedMore
            } else {
                Match::Rejected
            };
        };

        let (method, rest) = prefix.split_at(space);

        if !HTTP1_METHODS.contains(&method) {
            return Match::Rejected;
        }

        let Some(line_end) = rest.iter().position(|byte| *byte == b'\n') else {
            return if rest.iter().all(|byte| is_request_line_byte(*byte)) {
                Match::NeedMore
            } else {
                Match::Rejected
            };
        };

        let (line, _) = rest.split_at(line_end);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        match split_target_and_version(line) {
            Some((target, version)) if !target.is_empty() && is_http1_version(version) => {
                Match::Matched
            }
            _ => Match::Rejected,
        }
    }
}

fn is_request_line_byte(byte: u8) -> bool {
    byte == b'\r' || byte.is_ascii_graphic() || byte == b' '
}

/// `" <target> HTTP/1.x"` -> (`target`, `HTTP/1.x`).
fn split_target_and_version(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let line = line.strip_prefix(b" ")?;
    let version_start = line.iter().rposition(|byte| *byte == b' ')?;
    let (target, version) = line.split_at(version_start);

    Some((target, version.strip_prefix(b" ")?))
}

fn is_http1_version(version: &[u8]) -> bool {
    version == b"HTTP/1.1" || version == b"HTTP/1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preface_needs_every_byte() {
        assert_eq!(Http2Preface.check(b""), Match::NeedMore);
        assert_eq!(Http2Preface.check(b"PRI * HTTP/2"), Match::NeedMore);
        assert_eq!(Http2Preface.check(HTTP2_PREFACE), Match::Matched);
        assert_eq!(
            Http2Preface.check(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n\x00\x00\x12\x04"),
            Match::Matched
        );
        assert_eq!(Http2Preface.check(b"GET / HTTP/1.1\r\n"), Match::Rejected);
    }

    #[test]
    fn request_line_is_recognized() {
        assert_eq!(
            Http1RequestLine.check(b"GET /healthz HTTP/1.1\r\nHost: x\r\n"),
            Match::Matched
        );
        assert_eq!(
            Http1RequestLine.check(b"POST /portico.api.v1.AuthService/SignIn HTTP/1.1\r\n"),
            Match::Matched
        );
        assert_eq!(
            Http1RequestLine.check(b"OPTIONS * HTTP/1.0\n"),
            Match::Matched
        );
    }

    #[test]
    fn partial_request_lines_need_more() {
        assert_eq!(Http1RequestLine.check(b""), Match::NeedMore);
        assert_eq!(Http1RequestLine.check(b"DEL"), Match::NeedMore);
        assert_eq!(Http1RequestLine.check(b"GET /api/v1/us"), Match::NeedMore);
    }

    #[test]
    fn pri_is_not_an_http1_method() {
        assert_eq!(Http1RequestLine.check(b"PRI"), Match::Rejected);
        assert_eq!(Http1RequestLine.check(HTTP2_PREFACE), Match::Rejected);
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(Http1RequestLine.check(b"\x16\x03\x01\x02\x00"), Match::Rejected);
        assert_eq!(Http1RequestLine.check(b"get / HTTP/1.1\r\n"), Match::Rejected);
        assert_eq!(Http1RequestLine.check(b"GET / SPDY/3\r\n"), Match::Rejected);
        assert_eq!(Http1RequestLine.check(b"GET  HTTP/1.1\r\n"), Match::Rejected);
        assert_eq!(Http1RequestLine.check(b"GET /\x00"), Match::Rejected);
    }
}
