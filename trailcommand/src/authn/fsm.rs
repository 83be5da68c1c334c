//! Finite state machine for the device auth lifecycle

use serde::{Deserialize, Serialize};

/// Device auth state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Nothing attempted yet
    Unauthenticated,

    /// Logging in as the human principal
    UserAuthenticating,

    /// Ensuring the device record exists
    DeviceRegistering,

    /// Requesting a fresh auth code
    AuthCodePending,

    /// Holding a valid auth code
    Authenticated,

    /// Requesting a replacement code
    Renewing,

    /// Setup failed; operating without a code
    AuthenticatedNoCode,
}

/// Device auth event
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// Start (or restart) the login sequence
    Login,

    /// The principal logged in
    LoggedIn,

    /// The device record exists
    DeviceEnsured,

    /// A new auth code was issued
    CodeIssued,

    /// The renewal timer fired
    RenewalDue,

    /// A step failed
    Failed(String),
}

/// Device auth FSM
#[derive(Debug, Clone)]
pub struct AuthFsm {
    state: AuthState,
    error: Option<String>,
}

impl AuthFsm {
    /// Create a new FSM in the unauthenticated state
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Last failure, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: AuthEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (AuthState::Unauthenticated, AuthEvent::Login)
            | (AuthState::AuthenticatedNoCode, AuthEvent::Login) => {
                self.error = None;
                AuthState::UserAuthenticating
            }

            (AuthState::UserAuthenticating, AuthEvent::LoggedIn) => AuthState::DeviceRegistering,
            (AuthState::DeviceRegistering, AuthEvent::DeviceEnsured) => AuthState::AuthCodePending,
            (AuthState::AuthCodePending, AuthEvent::CodeIssued) => AuthState::Authenticated,

            (AuthState::UserAuthenticating, AuthEvent::Failed(err))
            | (AuthState::DeviceRegistering, AuthEvent::Failed(err))
            | (AuthState::AuthCodePending, AuthEvent::Failed(err)) => {
                self.error = Some(err.clone());
                AuthState::AuthenticatedNoCode
            }

            (AuthState::Authenticated, AuthEvent::RenewalDue) => AuthState::Renewing,
            (AuthState::Renewing, AuthEvent::CodeIssued) => {
                self.error = None;
                AuthState::Authenticated
            }
            // the previous code is kept
            (AuthState::Renewing, AuthEvent::Failed(err)) => {
                self.error = Some(err.clone());
                AuthState::Authenticated
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    /// Whether a code is held
    pub fn has_code(&self) -> bool {
        matches!(self.state, AuthState::Authenticated | AuthState::Renewing)
    }
}

impl Default for AuthFsm {
    fn default() -> Self {
        Self::new()
    }
}
