use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Tokens are treated as expired this long before the server's deadline.
pub(crate) const TOKEN_EXPIRY_TOLERANCE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
struct TokenState {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expiration_time: Option<SystemTime>,
}

/// ID and refresh tokens held by a signed-in user.
#[derive(Debug, Default)]
pub struct TokenManager {
    state: Mutex<TokenState>,
}

impl Clone for TokenManager {
    fn clone(&self) -> Self {
        Self {
            state: Mutex::new(self.state().clone()),
        }
    }
}

impl TokenManager {
    fn state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn update(&self, update: TokenUpdate) {
        let mut state = self.state();
        if let Some(id_token) = update.id_token {
            state.id_token = Some(id_token);
        }
        if let Some(refresh_token) = update.refresh_token {
            state.refresh_token = Some(refresh_token);
        }
        if let Some(expires_in) = update.expires_in {
            state.expiration_time = SystemTime::now().checked_add(expires_in);
        }
    }

    pub fn clear(&self) {
        *self.state() = TokenState::default();
    }

    pub fn id_token(&self) -> Option<String> {
        self.state().id_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state().refresh_token.clone()
    }

    pub fn expiration_time(&self) -> Option<SystemTime> {
        self.state().expiration_time
    }

    /// True when no ID token is held or it expires within `tolerance`.
    pub fn is_expired(&self, tolerance: Duration) -> bool {
        let state = self.state();
        if state.id_token.is_none() {
            return true;
        }
        match state.expiration_time {
            None => false,
            Some(expiration) => match SystemTime::now().checked_add(tolerance) {
                Some(threshold) => expiration <= threshold,
                None => true,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct TokenUpdate {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
}

impl TokenUpdate {
    pub fn new(id_token: Option<String>, refresh_token: Option<String>, expires_in: Option<Duration>) -> Self {
        Self {
            id_token,
            refresh_token,
            expires_in,
        }
    }
}
