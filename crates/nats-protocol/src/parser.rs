//! Incremental decoder for server traffic.
//!
//! WebSocket frames do not line up with protocol operations: one frame may
//! carry several operations, and a `MSG` payload may arrive in a later frame
//! than its control line.  [`Parser`] buffers input until a complete
//! operation is available.

use crate::ops::{ServerInfo, ServerOp};
use crate::{ProtocolError, CRLF, MAX_CONTROL_LINE, MAX_PAYLOAD};

/// Buffers raw bytes; text is only decoded once a whole control line or
/// payload is present, so a chunk may end inside a UTF-8 sequence.
#[derive(Debug)]
pub struct Parser {
    buf: Vec<u8>,
    max_payload: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            max_payload: MAX_PAYLOAD,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_payload(mut self, limit: usize) -> Self {
        self.max_payload = limit;
        self
    }

    /// Largest declared `MSG` size accepted; bigger ones are malformed.
    pub fn set_max_payload(&mut self, limit: usize) {
        self.max_payload = limit;
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Append a chunk of server bytes to the internal buffer.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(chunk.as_ref());
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete operation.
    ///
    /// Returns `Ok(None)` when more input is needed.  An error always
    /// consumes the offending input, so callers can keep polling after
    /// reporting it.
    pub fn next_op(&mut self) -> Result<Option<ServerOp>, ProtocolError> {
        let Some(line_end) = find_crlf(&self.buf) else {
            if self.buf.len() > MAX_CONTROL_LINE {
                self.buf.clear();
                return Err(ProtocolError::ControlLineTooLong);
            }
            return Ok(None);
        };

        let body_start = line_end + CRLF.len();
        let line = match std::str::from_utf8(&self.buf[..line_end]) {
            Ok(line) => line.to_string(),
            Err(_) => {
                let line = String::from_utf8_lossy(&self.buf[..line_end]).into_owned();
                self.buf.drain(..body_start);
                return Err(ProtocolError::UnknownOp(line));
            }
        };
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line.as_str(), ""),
        };

        if verb.eq_ignore_ascii_case("MSG") {
            return self.take_msg(&line, rest, body_start);
        }

        self.buf.drain(..body_start);
        let op = match verb.to_ascii_uppercase().as_str() {
            "PING" => ServerOp::Ping,
            "PONG" => ServerOp::Pong,
            "+OK" => ServerOp::Ok,
            "-ERR" => ServerOp::Err(rest.trim_matches('\'').to_string()),
            "INFO" => {
                let info: ServerInfo = serde_json::from_str(rest)?;
                ServerOp::Info(Box::new(info))
            }
            _ => return Err(ProtocolError::UnknownOp(line.clone())),
        };
        Ok(Some(op))
    }

    /// Decode everything currently buffered, stopping at the first error.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Result<Vec<ServerOp>, ProtocolError> {
        self.push(chunk);
        let mut ops = Vec::new();
        while let Some(op) = self.next_op()? {
            ops.push(op);
        }
        Ok(ops)
    }

    /// `MSG <subject> <sid> [reply-to] <#bytes>\r\n<payload>\r\n`
    fn take_msg(
        &mut self,
        line: &str,
        args: &str,
        body_start: usize,
    ) -> Result<Option<ServerOp>, ProtocolError> {
        let malformed = || ProtocolError::Malformed {
            op: "MSG",
            line: line.to_string(),
        };

        let parts: Vec<&str> = args.split_whitespace().collect();
        let parsed = match parts.as_slice() {
            [subject, sid, size] => Some((*subject, *sid, None, *size)),
            [subject, sid, reply, size] => Some((*subject, *sid, Some(*reply), *size)),
            _ => None,
        };
        let Some((subject, sid, reply, size)) = parsed else {
            self.buf.drain(..body_start);
            return Err(malformed());
        };
        let (Ok(sid), Ok(size)) = (sid.parse::<u64>(), size.parse::<usize>()) else {
            self.buf.drain(..body_start);
            return Err(malformed());
        };

        let frame_end = body_start
            .checked_add(size)
            .and_then(|end| end.checked_add(CRLF.len()));
        let (Some(frame_end), true) = (frame_end, size <= self.max_payload) else {
            tracing::debug!(sid, size, limit = self.max_payload, "MSG exceeds max payload");
            self.buf.drain(..body_start);
            return Err(malformed());
        };
        if self.buf.len() < frame_end {
            return Ok(None);
        }

        let body_end = frame_end - CRLF.len();
        let terminated = &self.buf[body_end..frame_end] == CRLF.as_bytes();
        let payload = std::str::from_utf8(&self.buf[body_start..body_end])
            .ok()
            .filter(|_| terminated)
            .map(str::to_string);
        // The declared frame is consumed either way; what follows it is kept.
        self.buf.drain(..frame_end);

        match payload {
            Some(payload) => Ok(Some(ServerOp::Msg {
                subject: subject.to_string(),
                sid,
                reply: reply.map(str::to_string),
                payload,
            })),
            None => {
                tracing::debug!(sid, size, "discarding undecodable MSG frame");
                Err(ProtocolError::BadPayload { sid })
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_ops() {
        let mut p = Parser::new();
        let ops = p.feed("PING\r\nPONG\r\n+OK\r\n-ERR 'Unknown Protocol Operation'\r\n").unwrap();
        assert_eq!(
            ops,
            vec![
                ServerOp::Ping,
                ServerOp::Pong,
                ServerOp::Ok,
                ServerOp::Err("Unknown Protocol Operation".into()),
            ]
        );
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn parses_info() {
        let mut p = Parser::new();
        let ops = p.feed("INFO {\"server_id\":\"abc\",\"max_payload\":1024}\r\n").unwrap();
        match &ops[..] {
            [ServerOp::Info(info)] => {
                assert_eq!(info.server_id, "abc");
                assert_eq!(info.max_payload, 1024);
            }
            other => panic!("expected INFO, got {other:?}"),
        }
    }

    #[test]
    fn parses_msg_with_and_without_reply() {
        let mut p = Parser::new();
        let ops = p
            .feed("MSG foo 1 5\r\nhello\r\nMSG foo 2 _INBOX.x 2\r\nhi\r\n")
            .unwrap();
        assert_eq!(
            ops,
            vec![
                ServerOp::Msg {
                    subject: "foo".into(),
                    sid: 1,
                    reply: None,
                    payload: "hello".into(),
                },
                ServerOp::Msg {
                    subject: "foo".into(),
                    sid: 2,
                    reply: Some("_INBOX.x".into()),
                    payload: "hi".into(),
                },
            ]
        );
    }

    #[test]
    fn waits_for_split_payload() {
        let mut p = Parser::new();
        assert!(p.feed("MSG foo 1 11\r\nhello ").unwrap().is_empty());
        let ops = p.feed("world\r\n").unwrap();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            ServerOp::Msg { payload, .. } => assert_eq!(payload, "hello world"),
            other => panic!("expected MSG, got {other:?}"),
        }
    }

    #[test]
    fn waits_for_split_control_line() {
        let mut p = Parser::new();
        assert!(p.feed("PI").unwrap().is_empty());
        assert_eq!(p.feed("NG\r\n").unwrap(), vec![ServerOp::Ping]);
    }

    #[test]
    fn payload_length_counts_bytes() {
        let mut p = Parser::new();
        let ops = p.feed("MSG foo 1 6\r\nhéllo\r\n").unwrap();
        match &ops[0] {
            ServerOp::Msg { payload, .. } => assert_eq!(payload, "héllo"),
            other => panic!("expected MSG, got {other:?}"),
        }
    }

    #[test]
    fn lowercase_verbs_accepted() {
        let mut p = Parser::new();
        assert_eq!(p.feed("ping\r\n").unwrap(), vec![ServerOp::Ping]);
    }

    #[test]
    fn unknown_op_is_consumed() {
        let mut p = Parser::new();
        p.push("BOGUS 1 2\r\nPING\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::UnknownOp(_))));
        assert_eq!(p.next_op().unwrap(), Some(ServerOp::Ping));
    }

    #[test]
    fn malformed_msg_is_consumed() {
        let mut p = Parser::new();
        p.push("MSG foo notanumber 3\r\nPONG\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::Malformed { .. })));
        // Only the control line was dropped; the parser resynchronises on the next line.
        assert_eq!(p.next_op().unwrap(), Some(ServerOp::Pong));
    }

    #[test]
    fn unterminated_payload_drops_only_its_frame() {
        let mut p = Parser::new();
        p.push("MSG foo 7 3\r\nabcXYPONG\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::BadPayload { sid: 7 })));
        assert_eq!(p.next_op().unwrap(), Some(ServerOp::Pong));
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn invalid_utf8_payload_keeps_following_ops() {
        let mut p = Parser::new();
        p.push(b"MSG foo 2 2\r\n\xff\xfe\r\nPING\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::BadPayload { sid: 2 })));
        assert_eq!(p.next_op().unwrap(), Some(ServerOp::Ping));
    }

    #[test]
    fn character_split_across_chunks() {
        let raw = "MSG foo 1 6\r\nh\u{e9}llo\r\n".as_bytes();
        // Byte 15 is the second half of the two-byte 'é'.
        let (head, tail) = raw.split_at(15);
        let mut p = Parser::new();
        assert!(p.feed(head).unwrap().is_empty());
        let ops = p.feed(tail).unwrap();
        match &ops[..] {
            [ServerOp::Msg { payload, .. }] => assert_eq!(payload, "h\u{e9}llo"),
            other => panic!("expected MSG, got {other:?}"),
        }
    }

    #[test]
    fn size_overflow_is_malformed() {
        let mut p = Parser::new();
        p.push("MSG foo 1 18446744073709551615\r\nPING\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::Malformed { op: "MSG", .. })));
        assert_eq!(p.next_op().unwrap(), Some(ServerOp::Ping));
    }

    #[test]
    fn size_over_limit_is_rejected_without_buffering() {
        let mut p = Parser::new();
        p.push("MSG foo 1 999999999999\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::Malformed { .. })));
        assert_eq!(p.pending(), 0);

        let mut p = Parser::new().with_max_payload(4);
        p.push("MSG foo 1 5\r\nhello\r\n");
        assert!(matches!(p.next_op(), Err(ProtocolError::Malformed { .. })));
        p.set_max_payload(5);
        p.push("MSG foo 1 5\r\nhello\r\n");
        // The rejected payload line is left behind as an unknown op.
        assert!(matches!(p.next_op(), Err(ProtocolError::UnknownOp(_))));
        assert!(matches!(p.next_op(), Ok(Some(ServerOp::Msg { .. }))));
    }

    #[test]
    fn oversized_control_line_is_rejected() {
        let mut p = Parser::new();
        p.push(&"x".repeat(MAX_CONTROL_LINE + 1));
        assert!(matches!(p.next_op(), Err(ProtocolError::ControlLineTooLong)));
        assert_eq!(p.pending(), 0);
    }
}
