use serde::{Deserialize, Serialize};

/// Identity of the caller, taken from request headers.
///
/// Used to resolve the `me` alias in dataset references and to pick a
/// default profile when a request names none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub peername: Option<String>,
    pub profile_id: Option<String>,
}

impl OwnerContext {
    /// Create an OwnerContext with just a peername
    pub fn new(peername: String) -> Self {
        Self {
            peername: Some(peername),
            profile_id: None,
        }
    }

    /// Create an OwnerContext with full identity information
    pub fn with_details(peername: Option<String>, profile_id: Option<String>) -> Self {
        Self {
            peername,
            profile_id,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.peername.is_none() && self.profile_id.is_none()
    }
}
