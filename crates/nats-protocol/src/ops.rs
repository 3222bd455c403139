//! Client commands and server operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CRLF;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Payload of the `CONNECT` command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectInfo {
    pub verbose: bool,
    pub pedantic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lang: String,
    pub version: String,
    pub protocol: u8,
}

impl Default for ConnectInfo {
    fn default() -> Self {
        Self {
            verbose: false,
            pedantic: false,
            name: None,
            lang: crate::LANG.into(),
            version: crate::VERSION.into(),
            protocol: 1,
        }
    }
}

/// A command sent by the client.
///
/// `Display` renders the exact wire text, terminator included.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOp<'a> {
    Connect(&'a ConnectInfo),
    /// `PUB <subject> <bytes>\r\n<payload>\r\n`
    Pub { subject: &'a str, payload: &'a str },
    /// `SUB <subject> [queue] <sid>\r\n`
    Sub {
        subject: &'a str,
        queue: Option<&'a str>,
        sid: u64,
    },
    Ping,
    Pong,
}

impl fmt::Display for ClientOp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientOp::Connect(info) => {
                let json = serde_json::to_string(info).map_err(|_| fmt::Error)?;
                write!(f, "CONNECT {json}{CRLF}")
            }
            // `str::len` is the UTF-8 byte length, which is what the server counts.
            ClientOp::Pub { subject, payload } => {
                write!(f, "PUB {subject} {}{CRLF}{payload}{CRLF}", payload.len())
            }
            ClientOp::Sub {
                subject,
                queue: Some(queue),
                sid,
            } => write!(f, "SUB {subject} {queue} {sid}{CRLF}"),
            ClientOp::Sub {
                subject,
                queue: None,
                sid,
            } => write!(f, "SUB {subject} {sid}{CRLF}"),
            ClientOp::Ping => write!(f, "PING{CRLF}"),
            ClientOp::Pong => write!(f, "PONG{CRLF}"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server → Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Payload of the server's `INFO` operation.  Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerInfo {
    pub server_id: String,
    pub server_name: Option<String>,
    pub version: String,
    pub proto: i32,
    pub host: String,
    pub port: u16,
    pub max_payload: u64,
    pub headers: bool,
    pub auth_required: bool,
    pub client_id: Option<u64>,
}

/// An operation received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOp {
    Info(Box<ServerInfo>),
    Msg {
        subject: String,
        sid: u64,
        reply: Option<String>,
        payload: String,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_uses_byte_length() {
        let op = ClientOp::Pub {
            subject: "foo",
            payload: "héllo",
        };
        assert_eq!(op.to_string(), "PUB foo 6\r\nhéllo\r\n");
    }

    #[test]
    fn pub_with_empty_payload() {
        let op = ClientOp::Pub {
            subject: "foo.bar",
            payload: "",
        };
        assert_eq!(op.to_string(), "PUB foo.bar 0\r\n\r\n");
    }

    #[test]
    fn sub_with_and_without_queue() {
        let plain = ClientOp::Sub {
            subject: "foo",
            queue: None,
            sid: 1,
        };
        let grouped = ClientOp::Sub {
            subject: "foo",
            queue: Some("workers"),
            sid: 2,
        };
        assert_eq!(plain.to_string(), "SUB foo 1\r\n");
        assert_eq!(grouped.to_string(), "SUB foo workers 2\r\n");
    }

    #[test]
    fn connect_omits_missing_name() {
        let info = ConnectInfo::default();
        let line = ClientOp::Connect(&info).to_string();
        assert!(line.starts_with("CONNECT {"));
        assert!(line.ends_with("}\r\n"));
        assert!(!line.contains("\"name\""));
        assert!(line.contains("\"lang\":\"rust\""));
    }

    #[test]
    fn connect_includes_name_when_set() {
        let info = ConnectInfo {
            name: Some("orders-svc".into()),
            ..Default::default()
        };
        let line = ClientOp::Connect(&info).to_string();
        assert!(line.contains("\"name\":\"orders-svc\""));
    }

    #[test]
    fn ping_pong_lines() {
        assert_eq!(ClientOp::Ping.to_string(), "PING\r\n");
        assert_eq!(ClientOp::Pong.to_string(), "PONG\r\n");
    }

    #[test]
    fn server_info_ignores_unknown_fields() {
        let raw = r#"{"server_id":"N1","version":"2.10.0","max_payload":1048576,"jetstream":true}"#;
        let info: ServerInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.server_id, "N1");
        assert_eq!(info.max_payload, 1_048_576);
        assert!(!info.headers);
    }
}
