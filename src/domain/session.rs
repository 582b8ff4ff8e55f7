//! Authentication state as seen by the application.

use serde::{Deserialize, Serialize};

/// Principal issued by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier assigned by the provider.
    pub subject: String,
    /// Email address, when the provider shares one.
    pub email: Option<String>,
}

impl Identity {
    /// Name shown in greetings: the email, or the subject when it is missing.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.subject)
    }
}

/// Current local view of the authentication state for one session key.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub is_loading: bool,
}

impl Session {
    /// State before the first session check has resolved.
    pub const fn loading() -> Self {
        Self {
            identity: None,
            is_loading: true,
        }
    }

    /// State after a session check or a provider event.
    pub const fn resolved(identity: Option<Identity>) -> Self {
        Self {
            identity,
            is_loading: false,
        }
    }

    /// State after an explicit sign-out.
    pub const fn signed_out() -> Self {
        Self::resolved(None)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}
