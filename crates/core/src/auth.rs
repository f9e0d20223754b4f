use serde::{Deserialize, Serialize};

/// Identity attached to a connection after the authentication collaborator ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    subject: String,
    authenticated: bool,
}

impl ClientIdentity {
    /// Creates an identity for a client that presented valid credentials.
    #[must_use]
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            authenticated: true,
        }
    }

    /// Creates the identity used when no access token is configured.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_owned(),
            authenticated: false,
        }
    }

    /// Returns the stable subject for logging and receipts.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns whether credentials were checked for this identity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}
