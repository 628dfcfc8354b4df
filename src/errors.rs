use thiserror::Error;

/// Typed error hierarchy for rollcall.
///
/// Use at module boundaries (store access, transport calls, admin handlers).
/// Internal/leaf functions can continue using `anyhow::Result` — the
/// `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No member record for user {user_id}")]
    Unauthenticated { user_id: String },

    #[error("Tenant {chat_id} is inactive")]
    TenantInactive { chat_id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type RollcallResult<T> = std::result::Result<T, RollcallError>;

impl RollcallError {
    /// Whether this error ever reaches an end user. Everything else is
    /// logged and discarded by the dispatch loop.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, RollcallError::Unauthenticated { .. })
    }
}
