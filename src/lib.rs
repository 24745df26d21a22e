//! # mailout
//!
//! Outbound mail for the service: build a MIME message (HTML body, optional
//! attachments, optional rendered-template attachments) and deliver it over
//! an authenticated SMTP session, one connection per send.
//!
//! ```no_run
//! use mailout::config::MailConfig;
//! use mailout::message::Message;
//! use mailout::smtp::MailTransport;
//!
//! # async fn demo() -> Result<(), mailout::error::MailError> {
//! let mut message = Message::new("noreply@example.com", "Welcome!", false);
//! message.to.push("user@example.com".to_owned());
//! message.body = "<h1>Hello</h1>".to_owned();
//!
//! let transport = MailTransport::new(MailConfig::from_env()?);
//! transport.send(&message).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod render;
pub mod smtp;
