pub mod config;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BotError;
use crate::models::Account;
use crate::provisioning::config::{ApiEnvelope, CreateUserRequest, DeleteUserRequest, IpInfoResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const SERVICE: &str = "provisioning api";
const IPINFO_URL: &str = "https://ipinfo.io/json";

#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Not idempotent: every successful call creates a new account.
    async fn create_account(&self, password: &str, days: u32) -> Result<Account, BotError>;
    async fn delete_account(&self, password: &str) -> Result<(), BotError>;
    async fn list_accounts(&self) -> Result<Vec<Account>, BotError>;
}

/// Client for the local VPN panel API.
///
/// No retry middleware: a retried create after a lost response hands out a
/// second account.
pub struct ProvisioningClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProvisioningClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, BotError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn call<B, T>(&self, request: RequestBuilder, body: Option<&B>) -> Result<Option<T>, BotError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut request = request.header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| BotError::decode(SERVICE, e))?;
            request = request.header("Content-Type", "application/json").body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope = match serde_json::from_str::<ApiEnvelope<T>>(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(BotError::Transport(format!("{} returned {}", SERVICE, status)));
            }
            Err(e) => return Err(BotError::decode(SERVICE, format!("{}: {}", e, text))),
        };

        if !envelope.success {
            return Err(BotError::Api(
                envelope.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl ProvisioningApi for ProvisioningClient {
    async fn create_account(&self, password: &str, days: u32) -> Result<Account, BotError> {
        let request = self.client.post(format!("{}/user/create", self.base_url));
        let body = CreateUserRequest { password, days };

        let account: Account = self
            .call(request, Some(&body))
            .await?
            .ok_or_else(|| BotError::decode(SERVICE, "create succeeded without account data"))?;

        log::info!("🆕 Account created, expires {}", account.expired);
        Ok(account)
    }

    async fn delete_account(&self, password: &str) -> Result<(), BotError> {
        let request = self.client.post(format!("{}/user/delete", self.base_url));
        let body = DeleteUserRequest { password };
        self.call::<_, serde_json::Value>(request, Some(&body)).await?;
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, BotError> {
        let request = self.client.get(format!("{}/users", self.base_url));
        let accounts: Option<Vec<Account>> = self.call::<(), _>(request, None).await?;
        Ok(accounts.unwrap_or_default())
    }
}

/// City and ISP of the server, shown next to account credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLocation {
    pub city: String,
    pub isp: String,
}

impl Default for ServerLocation {
    fn default() -> Self {
        Self {
            city: "Unknown".to_string(),
            isp: "Unknown".to_string(),
        }
    }
}

pub async fn fetch_server_location() -> ServerLocation {
    let lookup = async {
        let response = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?
            .get(IPINFO_URL)
            .send()
            .await?;
        response.json::<IpInfoResponse>().await
    };

    match lookup.await {
        Ok(info) => {
            let fallback = ServerLocation::default();
            ServerLocation {
                city: info.city.unwrap_or(fallback.city),
                isp: info.org.unwrap_or(fallback.isp),
            }
        }
        Err(e) => {
            log::warn!("Server location lookup failed: {}", e);
            ServerLocation::default()
        }
    }
}
