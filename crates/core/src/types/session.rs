//! Session mode of the cart.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Whether the current session has an authenticated principal.
///
/// Guest carts live only in the local store; authenticated carts are cached
/// from and mirrored to the remote cart API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Guest,
    Authenticated,
}

impl SessionMode {
    /// Map the auth collaborator's boolean signal to a mode.
    #[must_use]
    pub const fn from_authenticated(authenticated: bool) -> Self {
        if authenticated {
            Self::Authenticated
        } else {
            Self::Guest
        }
    }

    /// True for [`SessionMode::Authenticated`].
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_authenticated() {
        assert_eq!(
            SessionMode::from_authenticated(true),
            SessionMode::Authenticated
        );
        assert_eq!(SessionMode::from_authenticated(false), SessionMode::Guest);
        assert!(SessionMode::Authenticated.is_authenticated());
        assert!(!SessionMode::Guest.is_authenticated());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionMode::Guest.to_string(), "guest");
        assert_eq!(SessionMode::Authenticated.to_string(), "authenticated");
    }
}
