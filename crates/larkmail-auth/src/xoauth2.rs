//! XOAUTH2 SASL mechanism for IMAP/SMTP
//!
//! The whole exchange is one initial response:
//! `user={email}\x01auth=Bearer {token}\x01\x01`. Servers that reject the
//! token answer with a JSON error challenge; the mechanism never replies to
//! it, so any challenge is reported as an error.

use crate::{AuthError, AuthResult};

/// SASL mechanism name
pub const MECHANISM: &str = "XOAUTH2";

/// Client side of a SASL mechanism
pub trait SaslClient: Send + Sync {
    /// Mechanism name and initial response
    fn start(&self) -> AuthResult<(&'static str, Vec<u8>)>;

    /// Answer a server challenge
    fn next(&self, challenge: &[u8]) -> AuthResult<Vec<u8>>;
}

/// XOAUTH2 client for one user and access token
#[derive(Clone)]
pub struct XOAuth2Client {
    email: String,
    access_token: String,
}

/// Create a bearer-token SASL client
pub fn new_bearer_client(email: &str, access_token: &str) -> XOAuth2Client {
    XOAuth2Client::new(email, access_token)
}

impl XOAuth2Client {
    pub fn new(email: &str, access_token: &str) -> Self {
        Self {
            email: email.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Get the email address
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the access token, for transports that build the response themselves
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The raw (not base64 encoded) initial response
    pub fn initial_response(&self) -> Vec<u8> {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.email, self.access_token
        )
        .into_bytes()
    }
}

impl SaslClient for XOAuth2Client {
    fn start(&self) -> AuthResult<(&'static str, Vec<u8>)> {
        Ok((MECHANISM, self.initial_response()))
    }

    fn next(&self, challenge: &[u8]) -> AuthResult<Vec<u8>> {
        Err(AuthError::UnexpectedChallenge(
            String::from_utf8_lossy(challenge).into_owned(),
        ))
    }
}

impl std::fmt::Debug for XOAuth2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XOAuth2Client")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_response_format() {
        let client = new_bearer_client("a@b.com", "T");
        let (mechanism, response) = client.start().unwrap();

        assert_eq!(mechanism, "XOAUTH2");
        assert_eq!(response, b"user=a@b.com\x01auth=Bearer T\x01\x01".to_vec());
    }

    #[test]
    fn test_any_challenge_fails() {
        let client = new_bearer_client("a@b.com", "T");
        let challenges: [&[u8]; 3] = [
            b"",
            b"{\"status\":\"401\",\"schemes\":\"bearer\"}",
            b"\x00\xff",
        ];
        for challenge in challenges {
            assert!(matches!(
                client.next(challenge),
                Err(AuthError::UnexpectedChallenge(_))
            ));
        }
    }

    #[test]
    fn test_debug_hides_token() {
        let client = new_bearer_client("a@b.com", "ya29.secret");
        assert!(!format!("{:?}", client).contains("ya29"));
    }
}
