//! REST client for the command ledger backend.
//!
//! Signs the device in with its own credentials, then issues the command
//! RPCs with the resulting session token. A session the backend rejects
//! (HTTP 401) is refreshed once and the rejected call re-issued; a 401
//! means the RPC never ran, so this cannot duplicate a claim or completion.

use super::error::{LedgerError, LedgerResult};
use super::Ledger;
use async_trait::async_trait;
use relay_shared::Command;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BODY_SUMMARY_CHARS: usize = 160;

fn summarize_response_body(body: &str) -> String {
    let head: String = body.chars().take(BODY_SUMMARY_CHARS).collect();
    if head.len() < body.len() {
        format!("len={}, {}…", body.len(), head)
    } else {
        head
    }
}

/// Device credentials used for password sign-in
#[derive(Clone)]
pub struct LedgerCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LedgerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

enum RpcReply {
    Body(Value),
    Unauthorized,
}

/// Ledger backend client
pub struct LedgerClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    credentials: LedgerCredentials,
    session: RwLock<Option<TokenResponse>>,
}

impl LedgerClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - Backend base URL (e.g., `https://xyz.supabase.co`)
    /// * `api_key` - Project API key sent as `apikey` on every request
    /// * `credentials` - This device's sign-in credentials
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        credentials: LedgerCredentials,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            credentials,
            session: RwLock::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_access_token(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        credentials: LedgerCredentials,
        access_token: &str,
    ) -> Self {
        let mut client = Self::new(api_url, api_key, credentials);
        *client.session.get_mut() = Some(TokenResponse {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_in: None,
        });
        client
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.api_url, name)
    }

    fn token_url(&self, grant_type: &str) -> String {
        format!("{}/auth/v1/token?grant_type={}", self.api_url, grant_type)
    }

    /// Sign in with the device credentials and store the session
    pub async fn sign_in(&self) -> LedgerResult<()> {
        let body = json!({
            "email": self.credentials.email,
            "password": self.credentials.password,
        });
        let session = self.token_request("password", &body).await?;
        info!(
            email = %self.credentials.email,
            expires_in = ?session.expires_in,
            "Signed in to command ledger"
        );
        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Current session access token
    pub async fn access_token(&self) -> LedgerResult<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| LedgerError::Auth("not signed in".into()))
    }

    /// Exchange the refresh token, falling back to a fresh password sign-in
    async fn refresh(&self) -> LedgerResult<()> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            let body = json!({ "refresh_token": refresh_token });
            match self.token_request("refresh_token", &body).await {
                Ok(session) => {
                    info!("Ledger session refreshed");
                    *self.session.write().await = Some(session);
                    return Ok(());
                }
                Err(e) => warn!("Ledger token refresh failed, signing in again: {}", e),
            }
        }

        self.sign_in().await
    }

    async fn token_request(&self, grant_type: &str, body: &Value) -> LedgerResult<TokenResponse> {
        let response = self
            .http_client
            .post(self.token_url(grant_type))
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LedgerError::Auth(format!(
                "{} grant rejected: HTTP {} ({})",
                grant_type,
                status,
                summarize_response_body(&text)
            )));
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Call RPC `name`, refreshing the session once if it is rejected
    async fn rpc(&self, name: &str, args: &Value) -> LedgerResult<Value> {
        let token = self.access_token().await?;
        if let RpcReply::Body(value) = self.post_rpc(name, args, &token).await? {
            return Ok(value);
        }

        warn!(rpc = name, "Ledger session rejected, refreshing");
        self.refresh().await?;
        let token = self.access_token().await?;
        match self.post_rpc(name, args, &token).await? {
            RpcReply::Body(value) => Ok(value),
            RpcReply::Unauthorized => Err(LedgerError::Auth(format!(
                "{name} unauthorized after session refresh"
            ))),
        }
    }

    async fn post_rpc(&self, name: &str, args: &Value, token: &str) -> LedgerResult<RpcReply> {
        debug!(rpc = name, "Calling ledger RPC");

        let response = self
            .http_client
            .post(self.rpc_url(name))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .json(args)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(RpcReply::Unauthorized);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(LedgerError::Status {
                operation: name.to_string(),
                status,
                body_summary: summarize_response_body(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(RpcReply::Body(Value::Null));
        }
        Ok(RpcReply::Body(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn pending_for_device(&self, device_id: &str) -> LedgerResult<Vec<Command>> {
        let rows = match self
            .rpc("pending_for_device", &json!({ "device_id": device_id }))
            .await?
        {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => {
                return Err(LedgerError::Protocol(format!(
                    "pending_for_device returned {other}"
                )))
            }
        };

        // one malformed row must not hide the rest
        let commands = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Command>(row) {
                Ok(command) => Some(command),
                Err(e) => {
                    warn!("Skipping malformed pending command row: {}", e);
                    None
                }
            })
            .collect();
        Ok(commands)
    }

    async fn ack_command(&self, command_id: &str) -> LedgerResult<bool> {
        match self
            .rpc("ack_command", &json!({ "command_id": command_id }))
            .await?
        {
            Value::Bool(claimed) => Ok(claimed),
            Value::Null => Ok(false),
            other => Err(LedgerError::Protocol(format!("ack_command returned {other}"))),
        }
    }

    async fn complete_command(
        &self,
        command_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> LedgerResult<()> {
        self.rpc(
            "complete_command",
            &json!({
                "command_id": command_id,
                "success": success,
                "error_message": error_message,
            }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `responses` in order, one per connection, recording
    /// `METHOD path body` for each request received
    async fn canned_backend(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let (head_end, content_length) = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf);
                    if let Some(pos) = text.find("\r\n\r\n") {
                        let length = text[..pos]
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        break (pos + 4, length);
                    }
                };
                while buf.len() < head_end + content_length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }

                let text = String::from_utf8_lossy(&buf).to_string();
                let request_line = text.lines().next().unwrap_or_default();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default();
                let path = parts.next().unwrap_or_default();
                seen.lock()
                    .unwrap()
                    .push(format!("{} {} {}", method, path, &text[head_end..]));

                let response = format!(
                    concat!(
                        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\n",
                        "Content-Length: {}\r\nConnection: close\r\n\r\n{}"
                    ),
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), requests)
    }

    fn credentials() -> LedgerCredentials {
        LedgerCredentials {
            email: "edge@example.com".into(),
            password: "secret".into(),
        }
    }

    const TOKEN: &str = r#"{"access_token":"tok-1","refresh_token":"ref-1","expires_in":3600}"#;
    const REFRESHED: &str = r#"{"access_token":"tok-2","refresh_token":"ref-2","expires_in":3600}"#;

    #[tokio::test]
    async fn test_sign_in_then_claim() {
        let (url, requests) = canned_backend(vec![(200, TOKEN), (200, "true")]).await;
        let client = LedgerClient::new(format!("{url}/"), "anon", credentials());

        client.sign_in().await.unwrap();
        assert_eq!(client.access_token().await.unwrap(), "tok-1");
        assert!(client.ack_command("c1").await.unwrap());

        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("POST /auth/v1/token?grant_type=password"));
        assert!(requests[0].contains(r#""password":"secret""#));
        assert!(requests[1].starts_with("POST /rest/v1/rpc/ack_command"));
        assert!(requests[1].contains(r#""command_id":"c1""#));
    }

    #[tokio::test]
    async fn test_rejected_sign_in_is_auth_error() {
        let (url, _) = canned_backend(vec![(400, r#"{"error":"invalid_grant"}"#)]).await;
        let client = LedgerClient::new(url, "anon", credentials());

        let err = client.sign_in().await.unwrap_err();
        assert!(matches!(err, LedgerError::Auth(ref m) if m.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_unauthorized_rpc_refreshes_once() {
        let (url, requests) = canned_backend(vec![
            (200, TOKEN),
            (401, r#"{"message":"JWT expired"}"#),
            (200, REFRESHED),
            (200, "false"),
        ])
        .await;
        let client = LedgerClient::new(url, "anon", credentials());
        client.sign_in().await.unwrap();

        assert!(!client.ack_command("c1").await.unwrap());
        assert_eq!(client.access_token().await.unwrap(), "tok-2");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests[2].starts_with("POST /auth/v1/token?grant_type=refresh_token"));
        assert!(requests[2].contains("ref-1"));
    }

    #[tokio::test]
    async fn test_pending_skips_malformed_rows() {
        let (url, _) = canned_backend(vec![
            (200, TOKEN),
            (
                200,
                r#"[{"id":"c1","command_type":"OPEN_DOOR","payload":{}},{"command_type":"STOP"}]"#,
            ),
        ])
        .await;
        let client = LedgerClient::new(url, "anon", credentials());
        client.sign_in().await.unwrap();

        let pending = client.pending_for_device("edge-01").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c1");
    }

    #[tokio::test]
    async fn test_complete_accepts_empty_body_and_surfaces_errors() {
        let (url, requests) = canned_backend(vec![
            (200, TOKEN),
            (204, ""),
            (500, r#"{"message":"boom"}"#),
        ])
        .await;
        let client = LedgerClient::new(url, "anon", credentials());
        client.sign_in().await.unwrap();

        client
            .complete_command("c3", false, Some("unsupported command type \"BOGUS\""))
            .await
            .unwrap();
        let err = client.complete_command("c4", true, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Status { status, .. } if status.as_u16() == 500));

        let requests = requests.lock().unwrap();
        assert!(requests[1].contains(r#""success":false"#));
        assert!(requests[2].contains(r#""error_message":null"#));
    }

    #[tokio::test]
    async fn test_rpc_without_session_fails_fast() {
        let client = LedgerClient::new("http://127.0.0.1:9", "anon", credentials());
        let err = client.ack_command("c1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Auth(_)));
    }
}
