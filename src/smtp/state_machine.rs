//! Linear state machine for one outbound delivery session.
//!
//! There is no branching beyond failure-exit: every event either moves the
//! session one step forward, or the session is torn down.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connected,
    Ready,
    Authenticated,
    TransactionOpen,
    RecipientsAccepted,
    Sending,
    Sent,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// TCP connect (and TLS handshake, when configured) completed.
    Dialed,
    /// Server greeting read and EHLO accepted.
    Greeted,
    /// Credential exchange accepted.
    Authenticated,
    /// MAIL FROM accepted.
    SenderAccepted,
    /// Every envelope recipient individually accepted.
    RecipientsAccepted,
    /// DATA accepted; server is waiting for the payload.
    DataAccepted,
    /// Payload written and acknowledged.
    PayloadAccepted,
    /// QUIT sent (or the session is being torn down).
    Quit,
}

impl State {
    pub fn next(self, event: Event) -> State {
        match (self, event) {
            (State::Disconnected, Event::Dialed) => State::Connected,
            (State::Connected, Event::Greeted) => State::Ready,
            (State::Ready, Event::Authenticated) => State::Authenticated,
            (State::Authenticated, Event::SenderAccepted) => State::TransactionOpen,
            (State::TransactionOpen, Event::RecipientsAccepted) => State::RecipientsAccepted,
            (State::RecipientsAccepted, Event::DataAccepted) => State::Sending,
            (State::Sending, Event::PayloadAccepted) => State::Sent,
            (_, Event::Quit) => State::Closed,
            // Anything out of order means the conversation is over.
            (_, _) => State::Closed,
        }
    }
}
