use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
pub struct CreateUserRequest<'a> {
    pub password: &'a str,
    pub days: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteUserRequest<'a> {
    pub password: &'a str,
}

/// Every panel API response is wrapped in this envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IpInfoResponse {
    pub city: Option<String>,
    pub org: Option<String>,
}
