use tracing::{error, info};

use mailout::config::MailConfig;
use mailout::logging::setup_tracing;
use mailout::message::Message;
use mailout::smtp::MailTransport;

/// Delivery smoke test: checks that the configured mail server accepts a
/// message. Does nothing unless `MAIL_SMOKE_TO` names a recipient, so the
/// binary is safe to run bare.
#[tokio::main]
async fn main() {
    setup_tracing();

    let config = match MailConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let Ok(recipient) = std::env::var("MAIL_SMOKE_TO") else {
        info!("MAIL_SMOKE_TO not set, nothing to do");
        return;
    };

    let mut message = Message::new(
        config.username.clone(),
        "mailout delivery check",
        false,
    );
    message.to.push(recipient);
    message.body = "<p>The mail server is reachable and accepted this message.</p>".to_owned();

    let transport = MailTransport::new(config);
    match transport.send(&message).await {
        Ok(()) => info!("delivery check passed"),
        Err(e) => {
            error!("delivery check failed: {e}");
            std::process::exit(1);
        }
    }
}
