//! NATS text protocol: client commands, server operations, and the
//! incremental parser used by the WebSocket reader loop.
//!
//! Every frame on the wire is a control line terminated by `\r\n`, optionally
//! followed by a payload of a declared byte length (itself terminated by
//! `\r\n`).  Client commands are rendered through [`ClientOp`]'s `Display`
//! impl; server traffic is decoded by [`Parser`].

pub mod ops;
pub mod parser;

pub use ops::{ClientOp, ConnectInfo, ServerInfo, ServerOp};
pub use parser::Parser;

/// Server URL used when the caller does not supply one.
pub const DEFAULT_URL: &str = "ws://localhost:4222";

/// Line terminator for every control line and payload.
pub const CRLF: &str = "\r\n";

/// Client language reported in `CONNECT`.
pub const LANG: &str = "rust";

/// Client version reported in `CONNECT`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest control line accepted before the parser gives up on a frame.
pub const MAX_CONTROL_LINE: usize = 4096;

/// Largest `MSG` payload accepted until the server's `INFO` sets its own
/// `max_payload`.
pub const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Errors produced while decoding server traffic.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("unknown protocol operation: {0}")]
    UnknownOp(String),

    #[error("malformed {op}: {line}")]
    Malformed { op: &'static str, line: String },

    #[error("INFO payload: {0}")]
    Info(#[from] serde_json::Error),

    #[error("control line exceeds {MAX_CONTROL_LINE} bytes")]
    ControlLineTooLong,

    #[error("payload for sid {sid} is not valid UTF-8 or is missing its terminator")]
    BadPayload { sid: u64 },
}
