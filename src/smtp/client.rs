//! One-shot delivery over an authenticated SMTP session.
//!
//! [`MailTransport::send`] owns the whole lifecycle: dial (with TLS when
//! configured), greet, `AUTH PLAIN`, `MAIL`/`RCPT`/`DATA`, best-effort
//! `QUIT`. The socket lives inside the [`Session`] value, so every exit
//! path releases it when the value drops.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::{MailConfig, Security};
use crate::error::MailError;
use crate::message::Message;
use crate::smtp::reply::Reply;
use crate::smtp::state_machine::{Event, State};

/// Delivers messages one at a time over independent connections. Holds no
/// cross-call state; a single value can serve concurrent `send`s.
pub struct MailTransport {
    config: MailConfig,
}

impl MailTransport {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Execute one delivery attempt. No retry, no partial delivery: the
    /// first rejected step aborts the whole send.
    pub async fn send(&self, message: &Message) -> Result<(), MailError> {
        let mut session = Session::open(&self.config).await?;
        session.deliver(message).await?;
        session.quit().await;

        info!(
            recipients = message.envelope_recipients().len(),
            "message delivered"
        );
        Ok(())
    }
}

/// Wrapper over the plaintext or TLS socket so the conversation code is
/// written once.
enum SessionStream {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<TlsStream<TcpStream>>),
}

impl SessionStream {
    async fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read_line(buf).await,
            Self::Tls(stream) => stream.read_line(buf).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.get_mut().write_all(data).await,
            Self::Tls(stream) => stream.get_mut().write_all(data).await,
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.get_mut().flush().await,
            Self::Tls(stream) => stream.get_mut().flush().await,
        }
    }
}

/// A single SMTP conversation. Created in `Ready`-or-later, consumed by one
/// delivery.
struct Session {
    stream: SessionStream,
    state: State,
    io_timeout: Duration,
}

impl Session {
    /// Dial, perform the TLS handshake when configured, read the greeting,
    /// announce ourselves and authenticate. On return the session is in
    /// `Authenticated`.
    async fn open(config: &MailConfig) -> Result<Session, MailError> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!(%addr, "dialing mail server");

        let tcp = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MailError::Connection(format!("connect to {addr} timed out")))?
            .map_err(|e| MailError::Connection(format!("connect to {addr} failed: {e}")))?;

        let stream = match config.security {
            Security::Tls => {
                let tls = tls_handshake(config, tcp).await?;
                SessionStream::Tls(BufReader::new(tls))
            }
            Security::None => SessionStream::Plain(BufReader::new(tcp)),
        };

        let mut session = Session {
            stream,
            state: State::Disconnected,
            io_timeout: config.io_timeout,
        };
        session.transition(Event::Dialed);

        let greeting = session
            .read_reply()
            .await
            .map_err(|e| MailError::Connection(format!("no greeting: {e}")))?;
        if greeting.code != 220 {
            return Err(MailError::Connection(format!(
                "server refused the session: {greeting}"
            )));
        }

        let ehlo = session
            .exchange(&format!("EHLO {}", config.ehlo_domain))
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;
        if !ehlo.is_positive() {
            return Err(MailError::Connection(format!("EHLO rejected: {ehlo}")));
        }
        session.transition(Event::Greeted);

        session.authenticate(&config.username, &config.password).await?;

        Ok(session)
    }

    /// `AUTH PLAIN` with a single base64 `\0user\0pass` token. The command
    /// line is never logged.
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let token = BASE64.encode(format!("\0{username}\0{password}"));
        debug!("C: AUTH PLAIN [redacted]");

        self.write_line(&format!("AUTH PLAIN {token}"))
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;
        let reply = self
            .read_reply()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        if !reply.is_positive() {
            return Err(MailError::Auth(reply.to_string()));
        }
        self.transition(Event::Authenticated);
        Ok(())
    }

    /// MAIL/RCPT/DATA for one message. Every envelope recipient must be
    /// accepted before any payload byte is written.
    async fn deliver(&mut self, message: &Message) -> Result<(), MailError> {
        let reply = self
            .command("MAIL FROM", &format!("MAIL FROM:<{}>", message.sender))
            .await?;
        if !reply.is_positive() {
            return Err(MailError::Protocol {
                command: "MAIL FROM",
                reply: reply.to_string(),
            });
        }
        self.transition(Event::SenderAccepted);

        for recipient in message.envelope_recipients() {
            let reply = self
                .command("RCPT TO", &format!("RCPT TO:<{recipient}>"))
                .await?;
            if !reply.is_positive() {
                return Err(MailError::Protocol {
                    command: "RCPT TO",
                    reply: format!("{recipient}: {reply}"),
                });
            }
        }
        self.transition(Event::RecipientsAccepted);

        let reply = self.command("DATA", "DATA").await?;
        if !reply.is_intermediate() {
            return Err(MailError::Protocol {
                command: "DATA",
                reply: reply.to_string(),
            });
        }
        self.transition(Event::DataAccepted);

        // From here on the server has committed to reading a payload;
        // anything that goes wrong is a transmission failure.
        let payload = dot_stuff(&message.to_bytes());
        self.stream
            .write_all(&payload)
            .await
            .map_err(|e| MailError::Transmission(e.to_string()))?;
        self.stream
            .write_all(b".\r\n")
            .await
            .map_err(|e| MailError::Transmission(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| MailError::Transmission(e.to_string()))?;

        let reply = self
            .read_reply()
            .await
            .map_err(|e| MailError::Transmission(e.to_string()))?;
        if !reply.is_positive() {
            return Err(MailError::Transmission(reply.to_string()));
        }
        self.transition(Event::PayloadAccepted);

        Ok(())
    }

    /// Best-effort goodbye. By now the message is handed over, so a failure
    /// here is logged and swallowed.
    async fn quit(&mut self) {
        if let Err(e) = self.exchange("QUIT").await {
            warn!("QUIT after delivery failed: {e}");
        }
        self.transition(Event::Quit);
    }

    fn transition(&mut self, event: Event) {
        let next = self.state.next(event);
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Command phase of the transaction: I/O failures mean the transport
    /// broke underneath us, which callers treat as a connection problem.
    async fn command(&mut self, name: &'static str, line: &str) -> Result<Reply, MailError> {
        self.exchange(line)
            .await
            .map_err(|e| MailError::Connection(format!("{name}: {e}")))
    }

    async fn exchange(&mut self, line: &str) -> io::Result<Reply> {
        debug!("C: {line}");
        self.write_line(line).await?;
        self.read_reply().await
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await?;
        self.stream.flush().await
    }

    /// Read one complete (possibly multi-line) reply under the I/O timeout.
    async fn read_reply(&mut self) -> io::Result<Reply> {
        let mut raw = String::new();

        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(self.io_timeout, self.stream.read_line(&mut line))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reply timed out"))??;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ));
            }
            debug!("S: {}", line.trim_end());
            raw.push_str(&line);

            // A dash after the code marks a continuation line.
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                break;
            }
        }

        Reply::parse(&raw)
    }
}

/// Transparent dot-stuffing: a payload line starting with `.` gets another
/// `.` so the server cannot mistake it for the terminator. Also normalizes
/// line endings to CRLF.
fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 64);
    for line in payload.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn tls_handshake(
    config: &MailConfig,
    tcp: TcpStream,
) -> Result<TlsStream<TcpStream>, MailError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if !config.verify_certificates {
        warn!("TLS certificate verification disabled");
        tls_config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertVerifier));
    }

    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
        .map_err(|e| MailError::Connection(format!("bad server name: {e}")))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailError::Connection(format!("TLS handshake failed: {e}")))
}

/// Accept-anything verifier behind `verify_certificates = false`, for
/// servers with self-signed certificates.
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
