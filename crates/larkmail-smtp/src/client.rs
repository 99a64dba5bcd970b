//! SMTP client implementation

use crate::{SmtpError, SmtpResult};
use larkmail_auth::{yahoo, Authenticator};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, Tokio1Executor};
use tracing::{debug, info};

/// Port where the server expects TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

/// Credentials and allowed mechanisms for an authenticator
///
/// lettre builds the XOAUTH2 response itself from the user and the token.
pub fn credentials_for(auth: &Authenticator) -> (Credentials, Vec<Mechanism>) {
    match auth {
        Authenticator::Password { username, password } => (
            Credentials::new(username.clone(), password.clone()),
            vec![Mechanism::Plain, Mechanism::Login],
        ),
        Authenticator::Bearer(client) => (
            Credentials::new(
                client.email().to_string(),
                client.access_token().to_string(),
            ),
            vec![Mechanism::Xoauth2],
        ),
    }
}

/// SMTP endpoint that credentials are checked against
pub struct SmtpClient {
    host: String,
    port: u16,
}

impl SmtpClient {
    /// Create a new SMTP client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create a Yahoo SMTP client
    pub fn yahoo() -> Self {
        Self::new(yahoo::SMTP_HOST, yahoo::SMTP_PORT)
    }

    /// Authenticated transport; port 465 uses implicit TLS, others STARTTLS
    pub fn transport(&self, auth: &Authenticator) -> SmtpResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .map_err(|e| SmtpError::TlsError(e.to_string()))?;

        let (credentials, mechanisms) = credentials_for(auth);
        debug!(host = %self.host, port = self.port, ?mechanisms, "Building SMTP transport");
        Ok(builder
            .port(self.port)
            .credentials(credentials)
            .authentication(mechanisms)
            .build())
    }

    /// Connect and authenticate without sending anything
    pub async fn verify(&self, auth: &Authenticator) -> SmtpResult<()> {
        let transport = self.transport(auth)?;
        match transport.test_connection().await {
            Ok(true) => {
                info!("SMTP login verified for {}", auth.username());
                Ok(())
            }
            Ok(false) => Err(SmtpError::ConnectionFailed(format!(
                "{}:{} did not accept the connection",
                self.host, self.port
            ))),
            Err(e) => Err(SmtpError::from_transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larkmail_auth::new_bearer_client;

    #[test]
    fn test_password_uses_plain_login() {
        let auth = Authenticator::Password {
            username: "me@yahoo.com".into(),
            password: "pw".into(),
        };
        let (credentials, mechanisms) = credentials_for(&auth);
        assert_eq!(credentials, Credentials::new("me@yahoo.com".into(), "pw".into()));
        assert_eq!(mechanisms, vec![Mechanism::Plain, Mechanism::Login]);
    }

    #[test]
    fn test_bearer_uses_xoauth2() {
        let auth = Authenticator::Bearer(new_bearer_client("a@b.com", "T"));
        let (credentials, mechanisms) = credentials_for(&auth);
        assert_eq!(credentials, Credentials::new("a@b.com".into(), "T".into()));
        assert_eq!(mechanisms, vec![Mechanism::Xoauth2]);
    }
}
