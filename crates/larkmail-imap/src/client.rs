//! IMAP client implementation

use crate::{ImapError, ImapResult, SaslAuthenticator};
use async_imap::{Client, Session};
use async_native_tls::TlsStream;
use async_std::io::{Read, Write};
use async_std::net::TcpStream;
use larkmail_auth::{yahoo, AuthError, Authenticator, XOAUTH2_MECHANISM};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

// Type alias for our TLS stream
type ImapStream = TlsStream<TcpStream>;

/// How long to wait for the TCP connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP client for one server
pub struct ImapClient {
    session: Option<Session<ImapStream>>,
    host: String,
    port: u16,
}

impl ImapClient {
    /// Create a new IMAP client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            session: None,
            host: host.into(),
            port,
        }
    }

    /// Create a Yahoo IMAP client
    pub fn yahoo() -> Self {
        Self::new(yahoo::IMAP_HOST, yahoo::IMAP_PORT)
    }

    async fn connect(&self) -> ImapResult<Client<ImapStream>> {
        info!("Connecting to {}:{}", self.host, self.port);

        let address = format!("{}:{}", self.host, self.port);
        let tcp_stream = async_std::future::timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| ImapError::Timeout)?
            .map_err(|e| ImapError::ConnectionFailed(e.to_string()))?;

        let tls_stream = async_native_tls::TlsConnector::new()
            .connect(&self.host, tcp_stream)
            .await
            .map_err(|e| ImapError::TlsError(e.to_string()))?;

        debug!("TLS connection established");
        let mut client = Client::new(tls_stream);
        read_greeting(&mut client).await?;
        Ok(client)
    }

    /// Connect and log in
    pub async fn login(&mut self, auth: &Authenticator) -> ImapResult<()> {
        let client = self.connect().await?;
        self.session = Some(authenticate(client, auth).await?);
        Ok(())
    }

    fn session_mut(&mut self) -> ImapResult<&mut Session<ImapStream>> {
        self.session.as_mut().ok_or(ImapError::NotConnected)
    }

    /// Send NOOP
    pub async fn noop(&mut self) -> ImapResult<()> {
        self.session_mut()?
            .noop()
            .await
            .map_err(|e| ImapError::ServerError(e.to_string()))
    }

    /// Log out and drop the session
    pub async fn logout(&mut self) -> ImapResult<()> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| ImapError::ServerError(e.to_string()))?;
            info!("Logged out from {}", self.host);
        }
        Ok(())
    }
}

/// Consume the untagged greeting so it is not mistaken for a reply
pub async fn read_greeting<T>(client: &mut Client<T>) -> ImapResult<()>
where
    T: Read + Write + Unpin + Debug + Send,
{
    match client.read_response().await {
        Some(Ok(_)) => {
            debug!("Read server greeting");
            Ok(())
        }
        Some(Err(e)) => Err(ImapError::ConnectionFailed(format!("reading greeting: {}", e))),
        None => Err(ImapError::ConnectionFailed(
            "connection closed before the greeting".into(),
        )),
    }
}

/// Sort a LOGIN/AUTHENTICATE failure: only a server refusal is a bad credential
fn login_error(e: async_imap::error::Error) -> ImapError {
    use async_imap::error::Error;
    match e {
        Error::No(message) | Error::Bad(message) => ImapError::AuthenticationFailed(message),
        Error::Io(e) => ImapError::ConnectionFailed(e.to_string()),
        Error::ConnectionLost => ImapError::ConnectionFailed("connection lost".into()),
        other => ImapError::ServerError(other.to_string()),
    }
}

/// Log in on an established connection with either method
pub async fn authenticate<T>(client: Client<T>, auth: &Authenticator) -> ImapResult<Session<T>>
where
    T: Read + Write + Unpin + Debug + Send,
{
    match auth {
        Authenticator::Password { username, password } => {
            info!("Authenticating with LOGIN for {}", username);
            let session = client
                .login(username, password)
                .await
                .map_err(|(e, _)| login_error(e))?;
            info!("LOGIN authentication successful");
            Ok(session)
        }
        Authenticator::Bearer(sasl) => {
            info!("Authenticating with XOAUTH2 for {}", sasl.email());
            let authenticator = SaslAuthenticator::new(sasl.clone());
            let violation = authenticator.violation();

            let result = client
                .authenticate(XOAUTH2_MECHANISM, authenticator)
                .await;

            let recorded = match violation.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            match (result, recorded) {
                (_, Some(AuthError::UnexpectedChallenge(challenge))) => {
                    Err(ImapError::Protocol(format!("unexpected challenge: {}", challenge)))
                }
                (_, Some(other)) => Err(ImapError::AuthenticationFailed(other.to_string())),
                (Err((e, _)), None) => Err(login_error(e)),
                (Ok(session), None) => {
                    info!("XOAUTH2 authentication successful");
                    Ok(session)
                }
            }
        }
    }
}

/// Prove a logged-in session works, then end it
pub async fn verify_session<T>(mut session: Session<T>) -> ImapResult<()>
where
    T: Read + Write + Unpin + Debug + Send,
{
    session
        .noop()
        .await
        .map_err(|e| ImapError::ServerError(e.to_string()))?;
    session
        .logout()
        .await
        .map_err(|e| ImapError::ServerError(e.to_string()))?;
    debug!("IMAP session verified");
    Ok(())
}

/// Connect to `host:port`, log in, NOOP and log out
pub async fn verify(host: &str, port: u16, auth: &Authenticator) -> ImapResult<()> {
    let mut client = ImapClient::new(host, port);
    client.login(auth).await?;
    client.noop().await?;
    client.logout().await
}
