//! Transport error classification.

use std::error::Error as StdError;
use std::io;

use dg_domain::error::{Error, TransportKind};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts map to [`TransportKind::Timeout`]; connect failures (DNS,
/// refused), connection resets and broken bodies map to
/// [`TransportKind::Network`]; anything else is [`TransportKind::Unknown`].
pub fn from_reqwest(e: reqwest::Error) -> Error {
    let kind = classify(&e);
    Error::Transport {
        kind,
        message: e.to_string(),
    }
}

fn classify(e: &reqwest::Error) -> TransportKind {
    if e.is_timeout() {
        return TransportKind::Timeout;
    }
    if let Some(kind) = io_kind_in_chain(e) {
        match kind {
            io::ErrorKind::TimedOut => return TransportKind::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected => return TransportKind::Network,
            _ => {}
        }
    }
    if e.is_connect() || e.is_request() || e.is_body() {
        return TransportKind::Network;
    }
    TransportKind::Unknown
}

/// Walk the source chain looking for the underlying I/O error, if any.
fn io_kind_in_chain(e: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source: Option<&(dyn StdError + 'static)> = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = err.source();
    }
    None
}
