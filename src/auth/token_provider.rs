use async_trait::async_trait;

use crate::auth::Auth;
use crate::platform::token::{AsyncTokenProvider, TokenError};

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AsyncTokenProvider for Auth {
    async fn get_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        Auth::get_token(self, force_refresh)
            .await
            .map_err(TokenError::from_error)
    }
}
