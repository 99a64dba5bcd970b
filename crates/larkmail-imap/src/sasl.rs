//! Bridge from [`SaslClient`] to async-imap's `Authenticator`
//!
//! async-imap base64-encodes whatever `process` returns, so the adapter hands
//! back raw mechanism bytes. A challenge the mechanism refuses is answered
//! with an empty line, which makes the server finish the exchange with a
//! tagged NO; the refusal itself is kept for the caller.

use larkmail_auth::{AuthError, SaslClient};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// async-imap authenticator driving a [`SaslClient`]
pub struct SaslAuthenticator<C> {
    client: C,
    started: bool,
    violation: Arc<Mutex<Option<AuthError>>>,
}

impl<C: SaslClient> SaslAuthenticator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            started: false,
            violation: Arc::default(),
        }
    }

    /// Handle to the first mechanism error, readable after the exchange
    pub fn violation(&self) -> Arc<Mutex<Option<AuthError>>> {
        self.violation.clone()
    }

    fn record(&self, error: AuthError) {
        warn!("SASL exchange aborted: {}", error);
        if let Ok(mut slot) = self.violation.lock() {
            slot.get_or_insert(error);
        }
    }
}

impl<C: SaslClient> async_imap::Authenticator for SaslAuthenticator<C> {
    type Response = Vec<u8>;

    fn process(&mut self, challenge: &[u8]) -> Self::Response {
        if !self.started {
            self.started = true;
            return match self.client.start() {
                Ok((_, initial)) => initial,
                Err(e) => {
                    self.record(e);
                    Vec::new()
                }
            };
        }

        match self.client.next(challenge) {
            Ok(response) => response,
            Err(e) => {
                self.record(e);
                Vec::new()
            }
        }
    }
}
