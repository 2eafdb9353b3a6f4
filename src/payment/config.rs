use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
pub struct CreateTransactionRequest {
    pub project: String,
    pub order_id: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateTransactionResponse {
    pub payment: Option<PaymentPayload>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentPayload {
    pub qris_image: Option<String>,
    pub payment_number: Option<String>,
    pub expired_at: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionStatusResponse {
    pub status: Option<String>,
    pub transaction: Option<TransactionStatus>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionStatus {
    pub status: Option<String>,
}

impl TransactionStatusResponse {
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_deref()
            .or_else(|| self.transaction.as_ref().and_then(|t| t.status.as_deref()))
    }
}
