//! # Outbound SMTP module
//!
//! One delivery attempt is one session: dial, greet, authenticate, run the
//! MAIL/RCPT/DATA conversation, quit. The session's progress is tracked by
//! an explicit state machine built with enums and matching so each failure
//! point can be exercised on its own.

pub mod client;
pub mod reply;
pub mod state_machine;

pub use client::MailTransport;
