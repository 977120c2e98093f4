//! Billing provider client configuration
//!
//! Thin HTTP client for the Paddle-style billing API. The only call
//! the core makes is "fetch customer by id": webhook payloads carry
//! an external customer id but not always an email, and the email is
//! what ties a provider customer back to a tenant-local record.

use serde::Deserialize;

use crate::error::{BillingError, BillingResult};

/// Which provider environment this deployment talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleEnvironment {
    Sandbox,
    Live,
}

impl PaddleEnvironment {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox-api.paddle.com",
            Self::Live => "https://api.paddle.com",
        }
    }

    pub fn from_str_or_sandbox(s: &str) -> Self {
        match s {
            "live" | "production" => Self::Live,
            _ => Self::Sandbox,
        }
    }
}

/// Configuration for the billing provider
#[derive(Debug, Clone)]
pub struct PaddleConfig {
    /// API key for server-side provider calls
    pub api_key: String,
    /// Webhook signing secret shared with the provider
    pub webhook_secret: String,
    pub environment: PaddleEnvironment,
    /// Override for the API base URL (tests)
    pub api_base_url: Option<String>,
}

impl PaddleConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            api_key: std::env::var("PADDLE_API_KEY")
                .map_err(|_| BillingError::Config("PADDLE_API_KEY not set".to_string()))?,
            webhook_secret: std::env::var("PADDLE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("PADDLE_WEBHOOK_SECRET not set".to_string()))?,
            environment: PaddleEnvironment::from_str_or_sandbox(
                &std::env::var("PADDLE_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
            ),
            api_base_url: std::env::var("PADDLE_API_BASE_URL").ok(),
        })
    }

    fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base_url())
    }
}

/// Customer record as returned by the provider API
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    data: ProviderCustomer,
}

/// Billing provider client
#[derive(Clone)]
pub struct PaddleClient {
    http: reqwest::Client,
    config: PaddleConfig,
}

impl PaddleClient {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(PaddleConfig::from_env()?))
    }

    pub fn config(&self) -> &PaddleConfig {
        &self.config
    }

    /// Fetch a customer record (notably its email) by external id
    pub async fn get_customer(&self, customer_id: &str) -> BillingResult<ProviderCustomer> {
        let url = format!("{}/customers/{}", self.config.base_url(), customer_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BillingError::UpstreamApi(format!(
                "customer lookup for '{}' returned {}",
                customer_id,
                response.status()
            )));
        }

        let body: CustomerResponse = response.json().await?;
        Ok(body.data)
    }
}
