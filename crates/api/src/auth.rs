//! Auth provider client
//!
//! The login flow is delegated to a hosted auth provider: the browser
//! lands on `/auth/callback?code=...` and we exchange the one-time
//! code for the authenticated user. Only the user's identity is
//! consumed here; session issuance stays with the provider.

use reqwest::Client;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// Authenticated user as returned by the auth provider
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    user: AuthUser,
}

/// Client for the hosted auth provider's code exchange endpoint
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Exchange an OAuth authorization code for the user it belongs to
    pub async fn exchange_code(&self, code: &str) -> ApiResult<AuthUser> {
        if self.base_url.is_empty() {
            return Err(ApiError::Upstream(
                "auth provider is not configured".to_string(),
            ));
        }

        let response = self
            .http
            .post(format!(
                "{}/token?grant_type=authorization_code",
                self.base_url
            ))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("auth code exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Auth provider rejected code exchange");
            return Err(ApiError::Unauthorized);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid auth provider response: {}", e)))?;
        Ok(token.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_normalized() {
        let client = AuthClient::new("https://auth.example.com/".to_string(), "key".to_string());
        assert_eq!(client.base_url, "https://auth.example.com");
    }

    #[tokio::test]
    async fn test_unconfigured_provider_errors() {
        let client = AuthClient::new(String::new(), String::new());
        assert!(matches!(
            client.exchange_code("code").await,
            Err(ApiError::Upstream(_))
        ));
    }
}
