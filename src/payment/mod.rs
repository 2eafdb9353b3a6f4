pub mod config;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::config::PaymentSettings;
use crate::error::BotError;
use crate::payment::config::{
    CreateTransactionRequest, CreateTransactionResponse, TransactionStatusResponse,
};

const RETRIES: u32 = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SERVICE: &str = "payment gateway";

/// What the buyer scans or types to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCode {
    ImageUrl(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub payment_code: PaymentCode,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Settled,
    Failed,
    Unknown(String),
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "paid" | "completed" | "settled" | "success" => PaymentStatus::Settled,
            "pending" | "unpaid" | "waiting" => PaymentStatus::Pending,
            "failed" | "expired" | "canceled" | "cancelled" => PaymentStatus::Failed,
            _ => PaymentStatus::Unknown(raw.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_charge(&self, order_id: &str, amount: u64, method: &str) -> Result<Charge, BotError>;
    async fn query_status(&self, order_id: &str) -> Result<PaymentStatus, BotError>;
}

/// Pakasir QRIS gateway.
pub struct PakasirClient {
    client: ClientWithMiddleware,
    base_url: String,
    project: String,
    api_key: String,
}

impl PakasirClient {
    pub fn new(settings: &PaymentSettings) -> Result<Self, BotError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(RETRIES);
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project: settings.project.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

#[async_trait]
impl PaymentGateway for PakasirClient {
    async fn initiate_charge(&self, order_id: &str, amount: u64, method: &str) -> Result<Charge, BotError> {
        let request = CreateTransactionRequest {
            project: self.project.clone(),
            order_id: order_id.to_string(),
            amount,
            api_key: self.api_key.clone(),
        };
        let body = serde_json::to_vec(&request).map_err(|e| BotError::decode(SERVICE, e))?;

        let response = self
            .authorize(self.client.post(format!("{}/transactioncreate/{}", self.base_url, method)))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let text = response.text().await?;
        let parsed = serde_json::from_str::<CreateTransactionResponse>(&text)
            .map_err(|e| BotError::decode(SERVICE, format!("{}: {}", e, text)))?;

        let Some(payment) = parsed.payment else {
            return Err(match parsed.error.or(parsed.message) {
                Some(message) => BotError::Api(message),
                None => BotError::decode(SERVICE, format!("no payment in response: {}", text)),
            });
        };

        let payment_code = match (payment.qris_image, payment.payment_number) {
            (Some(url), _) if !url.is_empty() => PaymentCode::ImageUrl(url),
            (_, Some(code)) if !code.is_empty() => PaymentCode::Text(code),
            _ => return Err(BotError::decode(SERVICE, "payment has neither qris_image nor payment_number")),
        };

        log::info!("💳 Charge created for order {} ({})", order_id, amount);

        Ok(Charge {
            payment_code,
            expires_at: payment.expired_at,
        })
    }

    async fn query_status(&self, order_id: &str) -> Result<PaymentStatus, BotError> {
        let response = self
            .authorize(self.client.get(format!("{}/transactionstatus", self.base_url)))
            .query(&[("project", self.project.as_str()), ("order_id", order_id)])
            .header("Accept", "application/json")
            .send()
            .await?;

        let text = response.text().await?;
        let parsed = serde_json::from_str::<TransactionStatusResponse>(&text)
            .map_err(|e| BotError::decode(SERVICE, format!("{}: {}", e, text)))?;

        match parsed.status() {
            Some(status) => Ok(PaymentStatus::parse(status)),
            None => Err(match parsed.error {
                Some(message) => BotError::Api(message),
                None => BotError::decode(SERVICE, format!("no status in response: {}", text)),
            }),
        }
    }
}
