//! Browser authorization flow
//!
//! A loopback HTTPS listener receives the provider's redirect. The handler
//! may run any number of times (browsers prefetch, users reload) but only the
//! first outcome reaches the caller: the sender half of a oneshot channel sits
//! in a slot that the first request takes. The caller waits on the receiver
//! with a deadline, then shuts the listener down.

use crate::oauth2::OAuthClient;
use crate::{tls, AuthError, AuthResult, OAuthClientConfig, OAuthToken};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use axum_server::Handle;
use rand::RngCore;
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long the user has to finish signing in
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// How long in-flight responses get once the flow has resolved
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Body served after a code was accepted
pub const SUCCESS_MESSAGE: &str = "Authentication successful! You can close this tab.";

/// Opens the authorization URL for the user
pub trait BrowserLauncher: Send + Sync {
    /// Try to open `url` in a browser
    fn launch(&self, url: &str) -> std::io::Result<()>;

    /// Called when [`launch`](Self::launch) failed; the user has to open `url`
    fn manual(&self, url: &str) {
        warn!("Could not open a browser. Please visit: {}", url);
    }
}

/// The desktop's default browser
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }

    fn manual(&self, url: &str) {
        eprintln!("Could not open a browser. Please visit this URL to sign in:\n\n  {}\n", url);
    }
}

/// 128 random bits, hex encoded
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

type Outcome = AuthResult<String>;

/// Shared by every invocation of the callback handler
#[derive(Clone)]
pub struct CallbackState {
    expected_state: Arc<str>,
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl CallbackState {
    /// Handler state expecting `expected_state`, and the receiver for its outcome
    pub fn new(expected_state: &str) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let state = Self {
            expected_state: Arc::from(expected_state),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (state, rx)
    }

    /// Deliver `outcome` unless an earlier request already did
    fn resolve(&self, outcome: Outcome) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                // the receiver may already be gone after a timeout
                let _ = tx.send(outcome);
                true
            }
            None => {
                debug!("Ignoring callback after the flow resolved");
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Router serving the redirect target at `/`
pub fn callback_router(state: CallbackState) -> Router {
    Router::new()
        .route("/", get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<String>) {
    if query.state.as_deref() != Some(&*state.expected_state) {
        warn!("OAuth2 callback with mismatched state");
        state.resolve(Err(AuthError::StateMismatch));
        return (StatusCode::BAD_REQUEST, page("Error", "State mismatch"));
    }

    if let Some(error) = query.error {
        let reason = query.error_description.unwrap_or(error);
        warn!("Authorization server reported: {}", reason);
        state.resolve(Err(AuthError::AuthorizationDenied(reason)));
        return (StatusCode::BAD_REQUEST, page("Error", "Authentication failed"));
    }

    match query.code {
        Some(code) => {
            debug!("Received authorization code");
            state.resolve(Ok(code));
            (StatusCode::OK, page("Success", SUCCESS_MESSAGE))
        }
        None => {
            state.resolve(Err(AuthError::MissingCode));
            (StatusCode::BAD_REQUEST, page("Error", "No code received"))
        }
    }
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title} - larkmail</title>
    <style>
        body {{ font-family: system-ui, sans-serif; text-align: center; margin-top: 20vh; }}
        p {{ color: #666; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
</body>
</html>"#
    ))
}

/// Wait for the first outcome, or fail once `timeout` has passed
pub async fn wait_for_callback(
    receiver: &mut oneshot::Receiver<Outcome>,
    timeout: Duration,
) -> AuthResult<String> {
    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(AuthError::Io(std::io::Error::other(
            "callback server stopped unexpectedly",
        ))),
        Err(_) => Err(AuthError::CallbackTimeout(timeout.as_secs())),
    }
}

/// Running loopback HTTPS listener
///
/// `localhost` may resolve to either loopback family, so the port is served on
/// `127.0.0.1` and, where the host has IPv6, on `[::1]` too.
pub struct CallbackServer {
    port: u16,
    listeners: Vec<(Handle, JoinHandle<std::io::Result<()>>)>,
    receiver: oneshot::Receiver<Outcome>,
}

fn bind_error(port: u16, e: std::io::Error) -> AuthError {
    AuthError::CallbackBind {
        port,
        message: e.to_string(),
    }
}

/// Bind `[::1]:port` unless the host has no IPv6 loopback
fn bind_ipv6(requested: u16, port: u16) -> AuthResult<Option<std::net::TcpListener>> {
    match std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, port)) {
        Ok(listener) => Ok(Some(listener)),
        // a caller-chosen port that is taken is an error on either family
        Err(e) if requested != 0 && e.kind() == std::io::ErrorKind::AddrInUse => {
            Err(bind_error(requested, e))
        }
        Err(e) => {
            debug!("Not listening on [::1]:{}: {}", port, e);
            Ok(None)
        }
    }
}

impl CallbackServer {
    /// Bind the loopback addresses on `port` and start serving; port 0 picks a free port
    pub async fn start(port: u16, expected_state: &str) -> AuthResult<Self> {
        let ipv4 = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|e| bind_error(port, e))?;
        let bound = ipv4.local_addr()?.port();
        let ipv6 = bind_ipv6(port, bound)?;

        let tls_config = tls::rustls_config().await?;
        let (state, receiver) = CallbackState::new(expected_state);
        let app = callback_router(state);

        let mut listeners = Vec::new();
        for listener in std::iter::once(ipv4).chain(ipv6) {
            listener.set_nonblocking(true)?;
            let handle = Handle::new();
            let server = axum_server::tls_rustls::from_tcp_rustls(listener, tls_config.clone())
                .handle(handle.clone());
            let service = app.clone().into_make_service();
            listeners.push((handle, tokio::spawn(async move { server.serve(service).await })));
        }

        info!(
            addresses = listeners.len(),
            "Listening for OAuth2 callback on https://localhost:{}", bound
        );
        Ok(Self {
            port: bound,
            listeners,
            receiver,
        })
    }

    /// Port actually bound
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the first callback outcome
    pub async fn wait(&mut self, timeout: Duration) -> AuthResult<String> {
        wait_for_callback(&mut self.receiver, timeout).await
    }

    /// Stop accepting and give in-flight responses [`SHUTDOWN_GRACE`] to finish
    pub async fn shutdown(self) {
        for (handle, _) in &self.listeners {
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
        for (_, task) in self.listeners {
            match task.await {
                Ok(Ok(())) => debug!("Callback server stopped"),
                Ok(Err(e)) => warn!("Callback server error: {}", e),
                Err(e) => warn!("Callback server task failed: {}", e),
            }
        }
    }
}

fn open_browser(launcher: &dyn BrowserLauncher, url: &str) {
    info!("Opening browser for authentication");
    if let Err(e) = launcher.launch(url) {
        debug!("Browser launch failed: {}", e);
        launcher.manual(url);
    }
}

/// Run the whole browser login on `port` with the system browser
pub async fn browser_login(config: &OAuthClientConfig, port: u16) -> AuthResult<OAuthToken> {
    browser_login_with(config, port, &SystemBrowser, CALLBACK_TIMEOUT).await
}

/// Run the whole browser login with an explicit launcher and deadline
pub async fn browser_login_with(
    config: &OAuthClientConfig,
    port: u16,
    launcher: &dyn BrowserLauncher,
    timeout: Duration,
) -> AuthResult<OAuthToken> {
    let state = generate_state();
    let mut server = CallbackServer::start(port, &state).await?;
    let redirect_uri = config.redirect_uri(server.port());

    let result = async {
        let client = OAuthClient::new(config, Some(&redirect_uri))?;
        let url = client.authorize_url(&state);
        open_browser(launcher, url.as_str());

        let code = server.wait(timeout).await?;
        client.exchange_code(&code).await
    }
    .await;

    server.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_state_is_128_bit_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_code_is_delivered() {
        let (state, mut rx) = CallbackState::new("s1");
        let (status, body) = call(callback_router(state), "/?state=s1&code=abc").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(SUCCESS_MESSAGE));
        assert_eq!(wait_for_callback(&mut rx, CALLBACK_TIMEOUT).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_wrong_state_never_succeeds() {
        let (state, mut rx) = CallbackState::new("s1");
        let (status, body) = call(callback_router(state), "/?state=evil&code=abc").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("State mismatch"));
        assert!(matches!(
            wait_for_callback(&mut rx, CALLBACK_TIMEOUT).await,
            Err(AuthError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_missing_state_is_a_mismatch() {
        let (state, mut rx) = CallbackState::new("s1");
        call(callback_router(state), "/?code=abc").await;
        assert!(matches!(rx.try_recv(), Ok(Err(AuthError::StateMismatch))));
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let (state, mut rx) = CallbackState::new("s1");
        let (status, body) = call(
            callback_router(state),
            "/?state=s1&error=access_denied&error_description=User%20cancelled",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Authentication failed"));
        match rx.try_recv() {
            Ok(Err(AuthError::AuthorizationDenied(reason))) => {
                assert_eq!(reason, "User cancelled")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_code() {
        let (state, mut rx) = CallbackState::new("s1");
        let (status, body) = call(callback_router(state), "/?state=s1").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("No code received"));
        assert!(matches!(rx.try_recv(), Ok(Err(AuthError::MissingCode))));
    }

    #[tokio::test]
    async fn test_other_paths_do_not_resolve() {
        let (state, mut rx) = CallbackState::new("s1");
        let (status, _) = call(callback_router(state), "/favicon.ico").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let (state, mut rx) = CallbackState::new("s1");
        let router = callback_router(state);

        call(router.clone(), "/?state=s1&code=first").await;
        // a late request is still answered but changes nothing
        let (status, _) = call(router.clone(), "/?state=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(router, "/?state=s1&code=second").await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(wait_for_callback(&mut rx, CALLBACK_TIMEOUT).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_resolve_once() {
        let (state, mut rx) = CallbackState::new("s1");
        let router = callback_router(state);

        let (a, b) = tokio::join!(
            call(router.clone(), "/?state=s1&code=a"),
            call(router.clone(), "/?state=s1&code=b"),
        );
        assert_eq!(a.0, StatusCode::OK);
        assert_eq!(b.0, StatusCode::OK);

        let code = wait_for_callback(&mut rx, CALLBACK_TIMEOUT).await.unwrap();
        assert!(code == "a" || code == "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_callback() {
        let (_state, mut rx) = CallbackState::new("s1");
        let err = wait_for_callback(&mut rx, CALLBACK_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, AuthError::CallbackTimeout(120)));
    }

    #[tokio::test]
    async fn test_port_in_use_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        match CallbackServer::start(port, "s1").await {
            Err(AuthError::CallbackBind { port: p, .. }) => assert_eq!(p, port),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("bound a port that is in use"),
        }
    }

    #[tokio::test]
    async fn test_server_starts_and_stops() {
        let server = CallbackServer::start(0, "s1").await.unwrap();
        assert_ne!(server.port(), 0);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_serves_both_loopback_families() {
        let server = CallbackServer::start(0, "s1").await.unwrap();
        let port = server.port();

        tokio::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        // hosts without IPv6 only get the IPv4 listener
        if std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_ok() {
            tokio::net::TcpStream::connect((Ipv6Addr::LOCALHOST, port))
                .await
                .unwrap();
        }
        server.shutdown().await;
    }
}
