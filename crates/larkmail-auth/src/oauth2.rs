//! OAuth2 authorization-code client
//!
//! Thin wrapper over the `oauth2` crate: builds the authorization URL for a
//! given state token, exchanges the returned code, and refreshes tokens.

use crate::token_source::TokenRefresher;
use crate::{AuthError, AuthResult, OAuthClientConfig, OAuthToken};
use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info};
use url::Url;

/// OAuth2 client bound to one [`OAuthClientConfig`]
pub struct OAuthClient {
    client: BasicClient,
    scopes: Vec<String>,
}

impl OAuthClient {
    /// Create a client; `redirect_uri` is only needed for the browser flow
    pub fn new(config: &OAuthClientConfig, redirect_uri: Option<&str>) -> AuthResult<Self> {
        let auth_url = AuthUrl::new(config.auth_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid token URL: {}", e)))?;

        let mut client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        if let Some(uri) = redirect_uri {
            let redirect_url = RedirectUrl::new(uri.to_string())
                .map_err(|e| AuthError::InvalidConfig(format!("Invalid redirect URL: {}", e)))?;
            client = client.set_redirect_uri(redirect_url);
        }

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
        })
    }

    /// Authorization URL carrying `state`, the scopes and an offline-access request
    pub fn authorize_url(&self, state: &str) -> Url {
        let state = state.to_string();
        let mut request = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_extra_param("access_type", "offline");

        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, _) = request.url();
        url
    }

    /// Exchange an authorization code for a token
    pub async fn exchange_code(&self, code: &str) -> AuthResult<OAuthToken> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        info!("Exchanged authorization code for token");
        Ok(token_from_response(&response))
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<OAuthToken> {
        debug!("Refreshing OAuth2 access token");
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        Ok(token_from_response(&response))
    }
}

fn token_from_response(response: &BasicTokenResponse) -> OAuthToken {
    let mut token = OAuthToken::new(
        response.access_token().secret().clone(),
        response.refresh_token().map(|t| t.secret().clone()),
        response.expires_in(),
    );
    token.token_type = response.token_type().as_ref().to_string();
    token
}
