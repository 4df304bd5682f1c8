//! Email and password sign-in against the identity toolkit REST API.
//!
//! [`auth_for_app`] returns the app's [`Auth`] instance. Once a user signs in, storage requests
//! made for the same app carry the user's ID token.

mod api;
mod error;
mod logger;
mod model;
mod token_manager;
mod token_provider;
mod types;

#[doc(inline)]
pub use api::{auth_for_app, Auth, AUTH_COMPONENT_NAME, DEFAULT_IDENTITY_TOOLKIT_ENDPOINT};

#[doc(inline)]
pub use error::{AuthError, AuthErrorCode, AuthResult};

pub use logger::LOGGER;

#[doc(inline)]
pub use model::{User, UserCredential, UserInfo, EMAIL_LINK_SIGN_IN_METHOD, EMAIL_PASSWORD_PROVIDER_ID};

#[doc(inline)]
pub use token_manager::{TokenManager, TokenUpdate};

#[doc(inline)]
pub use types::{ActionCodeOperation, ActionCodeSettings, ActionCodeUrl, AndroidSettings, IosSettings, OperationType};
