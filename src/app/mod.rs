//! App registry: named apps holding project options, each owning its product instances.

mod api;
mod constants;
mod errors;
mod logger;
mod registry;
mod services;
mod types;

#[doc(inline)]
pub use api::{delete_app, get_app, get_apps, initialize_app, SDK_VERSION};

#[doc(inline)]
pub use constants::DEFAULT_ENTRY_NAME;

#[doc(inline)]
pub use errors::{AppError, AppResult};

#[doc(inline)]
pub use logger::{LogCallback, LogLevel, Logger, LOGGER};


#[doc(inline)]
pub use services::{AppService, ServiceRegistry};

#[doc(inline)]
pub use types::{get_default_app_config, FirebaseApp, FirebaseAppConfig, FirebaseAppSettings, FirebaseOptions};
