//! Error taxonomy for one delivery attempt.
//!
//! Each variant maps to a distinct phase of the session so callers can tell
//! an infrastructure problem (connection, transmission) from a credential or
//! addressing problem without parsing strings.

use thiserror::Error;

use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum MailError {
    /// Dialing, the TLS handshake, or the protocol greeting failed before
    /// the session became usable.
    #[error("connection to mail server failed: {0}")]
    Connection(String),

    /// The server rejected the credential exchange.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The server answered `MAIL`, `RCPT` or `DATA` with a non-success
    /// reply. The whole send is aborted; no partial delivery.
    #[error("{command} rejected by server: {reply}")]
    Protocol {
        command: &'static str,
        reply: String,
    },

    /// The payload write or its dot-terminated finalization failed after the
    /// server had already accepted `DATA`.
    #[error("message transmission failed: {0}")]
    Transmission(String),

    /// Propagated unchanged from the template-rendering collaborator.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The environment was missing or held an unusable mail setting.
    #[error("configuration: {0}")]
    Config(String),
}
