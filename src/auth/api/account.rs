use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{
    ErrorResponse, ResetPasswordRequest, SendOobCodeRequest, SignInResponse, SignInWithEmailLinkRequest,
    SignInWithPasswordRequest, SignUpRequest,
};

fn identity_toolkit_url(base: &str, path: &str, api_key: &str) -> String {
    format!("{}/{}?key={}", base.trim_end_matches('/'), path, api_key)
}

pub(crate) async fn sign_in_with_password(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &SignInWithPasswordRequest<'_>,
) -> AuthResult<SignInResponse> {
    post_json(client, endpoint, "accounts:signInWithPassword", api_key, request).await
}

pub(crate) async fn sign_up(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &SignUpRequest<'_>,
) -> AuthResult<SignInResponse> {
    post_json(client, endpoint, "accounts:signUp", api_key, request).await
}

pub(crate) async fn sign_in_with_email_link(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &SignInWithEmailLinkRequest<'_>,
) -> AuthResult<SignInResponse> {
    post_json(client, endpoint, "accounts:signInWithEmailLink", api_key, request).await
}

pub(crate) async fn send_oob_code(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &SendOobCodeRequest<'_>,
) -> AuthResult<()> {
    let _: serde_json::Value = post_json(client, endpoint, "accounts:sendOobCode", api_key, request).await?;
    Ok(())
}

pub(crate) async fn reset_password(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &ResetPasswordRequest<'_>,
) -> AuthResult<()> {
    let _: serde_json::Value = post_json(client, endpoint, "accounts:resetPassword", api_key, request).await?;
    Ok(())
}

async fn post_json<Req, Resp>(client: &Client, endpoint: &str, path: &str, api_key: &str, body: &Req) -> AuthResult<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let url = identity_toolkit_url(endpoint, path, api_key);
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| AuthError::Network(err.to_string()))?;

    if !response.status().is_success() {
        return Err(map_error(response).await);
    }

    response
        .json::<Resp>()
        .await
        .map_err(|err| AuthError::Network(format!("Failed to parse {path} response: {err}")))
}

async fn map_error(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(ErrorResponse {
        error: Some(error),
    }) = serde_json::from_str::<ErrorResponse>(&body)
    {
        if let Some(message) = error.message {
            return AuthError::from_server_message(&message);
        }
    }

    AuthError::Network(format!("Request failed with status {status}: {body}"))
}
