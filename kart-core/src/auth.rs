use serde_json::Value;

use crate::pii::Masked;

/// The caller's identity for one request. The raw token and its claims are
/// forwarded to the datastore, which applies row-level authorization.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub token: Masked<String>,
    pub subject: String,
    pub claims: Value,
}

impl AuthContext {
    pub fn new(token: impl Into<String>, subject: impl Into<String>, claims: Value) -> Self {
        Self {
            token: Masked(token.into()),
            subject: subject.into(),
            claims,
        }
    }
}
