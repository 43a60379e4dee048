//! OAuth2 Authorization Code flow for desktop use.
//!
//! 1. Opens the browser at the provider's consent page
//! 2. Listens on a localhost port for the redirect carrying the code
//! 3. Exchanges the code for an access token (+ refresh token)
//!
//! Endpoint URLs live on [`OAuthConfig`] so tests can point the flow at a
//! local mock server.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::OAuthError;
use crate::model::Account;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Seconds of slack before nominal expiry at which a token counts as stale.
const EXPIRY_SLACK_SECS: i64 = 60;

/// How long the callback listener waits for the browser redirect.
pub const CALLBACK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
}

impl OAuthConfig {
    /// Google Calendar credentials with the standard Google endpoints.
    pub fn google(client_id: &str, client_secret: &str, redirect_port: u16) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/calendar".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
            ],
            redirect_port,
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }

    /// Full consent-page URL. `access_type=offline` and `prompt=consent`
    /// make Google return a refresh token on every authorization.
    pub fn auth_url_full(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(&scopes),
        )
    }
}

/// An access token with its refresh companion and expiry instant.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Run the full flow: open browser, wait for the redirect, exchange the code.
pub async fn authorize(config: &OAuthConfig) -> Result<TokenSet, OAuthError> {
    let server = CallbackServer::bind(config.redirect_port).await?;
    let auth_url = config.auth_url_full();
    if open::that(&auth_url).is_err() {
        tracing::warn!("could not open browser; visit this URL manually: {auth_url}");
    }
    let code = server.wait_for_code(CALLBACK_TIMEOUT_SECS).await?;
    exchange_code(config, &code).await
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(config: &OAuthConfig, code: &str) -> Result<TokenSet, OAuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", &config.redirect_uri()),
    ];
    let body: serde_json::Value = Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?
        .json()
        .await?;

    if let Some(error) = body.get("error") {
        return Err(OAuthError::TokenExchangeFailed(error.to_string()));
    }
    token_set_from_response(&body, None)
        .ok_or_else(|| OAuthError::TokenExchangeFailed("no access_token in response".into()))
}

/// Obtain a fresh access token from a refresh token. Providers may omit
/// the refresh token in the response; the old one is carried forward.
pub async fn refresh_access_token(
    config: &OAuthConfig,
    refresh: &str,
) -> Result<TokenSet, OAuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];
    let body: serde_json::Value = Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?
        .json()
        .await?;

    if let Some(error) = body.get("error") {
        return Err(OAuthError::TokenRefreshFailed(error.to_string()));
    }
    token_set_from_response(&body, Some(refresh))
        .ok_or_else(|| OAuthError::TokenRefreshFailed("no access_token in response".into()))
}

fn token_set_from_response(body: &serde_json::Value, old_refresh: Option<&str>) -> Option<TokenSet> {
    let access_token = body.get("access_token")?.as_str()?.to_string();
    let expires_at = body
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|secs| Utc::now() + Duration::seconds(secs));
    let refresh_token = body
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| old_refresh.map(String::from));
    Some(TokenSet {
        access_token,
        refresh_token,
        expires_at,
    })
}

/// Look up the authenticated user's email address. Falls back to a generic
/// label if the userinfo endpoint denies or omits it.
pub async fn fetch_user_email(config: &OAuthConfig, access_token: &str) -> String {
    let resp = Client::new()
        .get(&config.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await;
    let email = match resp {
        Ok(resp) => resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("email").and_then(|e| e.as_str()).map(String::from)),
        Err(err) => {
            tracing::warn!("userinfo request failed: {err}");
            None
        }
    };
    email.unwrap_or_else(|| "Google Account".to_string())
}

/// Whether the account's access token is (about to be) expired.
pub fn token_expired(account: &Account, now: DateTime<Utc>) -> bool {
    match account.token_expiry {
        Some(expiry) => now > expiry - Duration::seconds(EXPIRY_SLACK_SECS),
        None => false,
    }
}

/// Refresh the account's access token if it has expired. Returns `true`
/// when the account was updated and should be persisted. An expired token
/// with no refresh token is an authentication error; the account has to be
/// re-authorized.
pub async fn ensure_fresh_token(
    account: &mut Account,
    config: &OAuthConfig,
) -> Result<bool, OAuthError> {
    if !token_expired(account, Utc::now()) {
        return Ok(false);
    }
    if account.refresh_token.is_empty() {
        tracing::warn!(
            account = %account.name,
            "access token expired and no refresh token stored; re-authentication required"
        );
        return Err(OAuthError::NoRefreshToken);
    }
    let tokens = refresh_access_token(config, &account.refresh_token).await?;
    account.access_token = tokens.access_token;
    if let Some(refresh) = tokens.refresh_token {
        account.refresh_token = refresh;
    }
    account.token_expiry = tokens.expires_at;
    Ok(true)
}

/// One-shot localhost listener for the OAuth redirect.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Bind the redirect port. Port 0 picks a free one (tests).
    pub async fn bind(port: u16) -> Result<Self, OAuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener
            .local_addr()
            .map_err(|e| OAuthError::Listener(e.to_string()))?
            .port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the browser redirect and return the authorization code.
    ///
    /// Requests without a `code` or `error` parameter (favicon probes and
    /// the like) are answered and ignored. The listener is dropped on
    /// return, freeing the port.
    pub async fn wait_for_code(self, timeout_secs: u64) -> Result<String, OAuthError> {
        let wait = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            self.accept_loop(),
        );
        match wait.await {
            Ok(result) => result,
            Err(_) => Err(OAuthError::CallbackTimeout { timeout_secs }),
        }
    }

    async fn accept_loop(&self) -> Result<String, OAuthError> {
        loop {
            let (mut stream, _) = self.listener.accept().await?;
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).await?;
            let request = String::from_utf8_lossy(&buf[..n]);

            match parse_callback(&request) {
                Some(CallbackResult::Code(code)) => {
                    respond(&mut stream, "Authentication successful. You can close this tab.")
                        .await;
                    return Ok(code);
                }
                Some(CallbackResult::Error(error)) => {
                    respond(&mut stream, "Authentication failed. You can close this tab.").await;
                    return Err(OAuthError::AuthorizationFailed(error));
                }
                None => {
                    respond(&mut stream, "Waiting for authentication...").await;
                }
            }
        }
    }
}

enum CallbackResult {
    Code(String),
    Error(String),
}

fn parse_callback(request: &str) -> Option<CallbackResult> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    let url = url::Url::parse(&format!("http://127.0.0.1{path}")).ok()?;
    let mut code = None;
    let mut error = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.to_string()),
            "error" => error = Some(v.to_string()),
            _ => {}
        }
    }
    if let Some(code) = code {
        return Some(CallbackResult::Code(code));
    }
    error.map(CallbackResult::Error)
}

async fn respond(stream: &mut tokio::net::TcpStream, message: &str) {
    let body = format!("<html><body><h2>{message}</h2></body></html>");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    // The browser closing early is not an error worth surfacing.
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
