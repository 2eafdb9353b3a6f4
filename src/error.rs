use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// Unparsable or out-of-range input. Recovered by re-prompting.
    #[error("invalid input: {0}")]
    UserInput(String),

    /// The remote service could not be reached or did not answer.
    #[error("network error: {0}")]
    Transport(String),

    /// The remote service answered with a failure payload. Kept verbatim.
    #[error("{0}")]
    Api(String),

    #[error("malformed response from {service}: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("trial already redeemed")]
    AlreadyRedeemed,

    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("chat transport error: {0}")]
    Chat(String),
}

impl BotError {
    pub fn decode(service: &'static str, reason: impl ToString) -> Self {
        BotError::Decode {
            service,
            reason: reason.to_string(),
        }
    }

    /// Errors worth another attempt on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Transport(_) | BotError::Decode { .. })
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Transport(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for BotError {
    fn from(err: reqwest_middleware::Error) -> Self {
        BotError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_is_rendered_verbatim() {
        let err = BotError::Api("user already exists".to_string());
        assert_eq!(err.to_string(), "user already exists");
        assert!(!err.is_transient());
    }

    #[test]
    fn transport_and_decode_are_transient() {
        assert!(BotError::Transport("timeout".into()).is_transient());
        assert!(BotError::decode("payment", "missing field").is_transient());
        assert!(!BotError::AlreadyRedeemed.is_transient());
    }
}
