//! Process-wide authorization state.
//!
//! ```text
//!                 /start, or any command without a credential
//!  Unauthenticated ───────────────────────────────► AwaitingCode
//!        ▲                                             │  /auth <code> accepted
//!        │ /clear                                      ▼
//!        └──────────────────────────────────────── Authenticated
//! ```
//!
//! A rejected code keeps the session in `AwaitingCode`. When a credential
//! turns out to be unusable the session falls back to `AwaitingCode` with a
//! fresh authorization.

use photocut_providers::PendingAuthorization;

/// The authorization session shared by every chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthSession {
    /// No credential and no authorization in progress.
    #[default]
    Unauthenticated,
    /// A consent link was sent; waiting for `/auth <code>`.
    AwaitingCode(PendingAuthorization),
    /// A usable credential was loaded or obtained.
    Authenticated,
}

impl AuthSession {
    /// Returns the pending authorization, if one is in progress.
    pub fn pending(&self) -> Option<&PendingAuthorization> {
        match self {
            Self::AwaitingCode(pending) => Some(pending),
            _ => None,
        }
    }

    /// Returns true once a credential has been confirmed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Enters `AwaitingCode` with a new authorization.
    pub fn await_code(&mut self, pending: PendingAuthorization) {
        *self = Self::AwaitingCode(pending);
    }

    /// Marks the session authenticated.
    pub fn authenticate(&mut self) {
        *self = Self::Authenticated;
    }

    /// Forgets any authorization state.
    pub fn reset(&mut self) {
        *self = Self::Unauthenticated;
    }

    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingCode(_) => "awaiting_code",
            Self::Authenticated => "authenticated",
        }
    }
}
