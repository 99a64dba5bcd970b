//! Full browser login against a local stand-in for the provider

use axum::routing::post;
use axum::{Form, Json, Router};
use larkmail_auth::{
    browser_login_with, AuthError, BrowserLauncher, OAuthClientConfig, SUCCESS_MESSAGE,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

type Forms = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Token endpoint that records each request form and issues a fixed token
async fn start_token_endpoint() -> (String, Forms) {
    let forms: Forms = Arc::default();
    let recorded = forms.clone();
    let app = Router::new().route(
        "/token",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(form);
                Json(json!({
                    "access_token": "access-1",
                    "token_type": "bearer",
                    "expires_in": 3600,
                    "refresh_token": "refresh-1",
                }))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{}", addr), forms)
}

fn config(base: &str) -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: "client-123".into(),
        client_secret: "s3cret".into(),
        auth_url: format!("{}/authorize", base),
        token_url: format!("{}/token", base),
        scopes: vec!["openid".into()],
    }
}

/// Plays the browser: follows the authorization URL straight back to the
/// redirect URI with the given query
struct RedirectingBrowser {
    query: fn(&str) -> String,
    request: Mutex<Option<JoinHandle<(u16, String)>>>,
}

impl RedirectingBrowser {
    fn new(query: fn(&str) -> String) -> Self {
        Self {
            query,
            request: Mutex::new(None),
        }
    }

    async fn response(&self) -> (u16, String) {
        let task = self.request.lock().unwrap().take().unwrap();
        task.await.unwrap()
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        let url = Url::parse(url).unwrap();
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let redirect = param("redirect_uri").replace("localhost", "127.0.0.1");
        let callback = format!("{}/?{}", redirect, (self.query)(&param("state")));

        let task = tokio::spawn(async move {
            let client = reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .unwrap();
            let response = client.get(callback).send().await.unwrap();
            let status = response.status().as_u16();
            (status, response.text().await.unwrap())
        });
        *self.request.lock().unwrap() = Some(task);
        Ok(())
    }
}

/// A desktop without a browser
#[derive(Default)]
struct NoBrowser {
    shown: Mutex<Option<String>>,
}

impl BrowserLauncher for NoBrowser {
    fn launch(&self, _url: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no browser",
        ))
    }

    fn manual(&self, url: &str) {
        *self.shown.lock().unwrap() = Some(url.to_string());
    }
}

#[tokio::test]
async fn test_code_is_exchanged_for_token() {
    let (base, forms) = start_token_endpoint().await;
    let browser = RedirectingBrowser::new(|state| format!("state={}&code=good-code", state));

    let token = browser_login_with(&config(&base), 0, &browser, Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(token.access_token, "access-1");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert!(token.is_valid());

    let (status, body) = browser.response().await;
    assert_eq!(status, 200);
    assert!(body.contains(SUCCESS_MESSAGE));

    let forms = forms.lock().unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["grant_type"], "authorization_code");
    assert_eq!(forms[0]["code"], "good-code");
    assert!(forms[0]["redirect_uri"].starts_with("https://localhost:"));
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let (base, forms) = start_token_endpoint().await;
    let browser = RedirectingBrowser::new(|_| "state=forged&code=good-code".to_string());

    let err = browser_login_with(&config(&base), 0, &browser, Duration::from_secs(30))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::StateMismatch));
    assert_eq!(browser.response().await.0, 400);
    assert!(forms.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_denied_consent() {
    let (base, _forms) = start_token_endpoint().await;
    let browser = RedirectingBrowser::new(|state| format!("state={}&error=access_denied", state));

    let err = browser_login_with(&config(&base), 0, &browser, Duration::from_secs(30))
        .await
        .unwrap_err();

    match err {
        AuthError::AuthorizationDenied(reason) => assert_eq!(reason, "access_denied"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_exchange_failure_is_distinct() {
    // nothing listens on the token endpoint
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let browser = RedirectingBrowser::new(|state| format!("state={}&code=good-code", state));
    let err = browser_login_with(&config(&base), 0, &browser, Duration::from_secs(30))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ExchangeFailed(_)));
}

#[tokio::test]
async fn test_launch_failure_shows_url_and_times_out() {
    let (base, _forms) = start_token_endpoint().await;
    let browser = NoBrowser::default();

    let err = browser_login_with(&config(&base), 0, &browser, Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::CallbackTimeout(_)));
    let shown = browser.shown.lock().unwrap().clone().unwrap();
    assert!(shown.starts_with(&format!("{}/authorize?", base)));
    assert!(shown.contains("access_type=offline"));
}

#[tokio::test]
async fn test_port_is_free_again_after_login() {
    let (base, _forms) = start_token_endpoint().await;
    let port = {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap().port()
    };

    let browser = RedirectingBrowser::new(|state| format!("state={}&code=good-code", state));
    browser_login_with(&config(&base), port, &browser, Duration::from_secs(30))
        .await
        .unwrap();
    browser.response().await;

    assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
}
