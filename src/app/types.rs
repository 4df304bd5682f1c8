use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::app::errors::{AppError, AppResult};
use crate::app::services::ServiceRegistry;
use crate::platform::environment;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirebaseOptions {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
}

impl FirebaseOptions {
    pub(crate) fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.auth_domain.is_none()
            && self.project_id.is_none()
            && self.storage_bucket.is_none()
            && self.messaging_sender_id.is_none()
            && self.app_id.is_none()
    }

    fn from_json(config: &Map<String, Value>) -> Self {
        let field = |key: &str| config.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            api_key: field("apiKey"),
            auth_domain: field("authDomain"),
            project_id: field("projectId"),
            storage_bucket: field("storageBucket"),
            messaging_sender_id: field("messagingSenderId"),
            app_id: field("appId"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirebaseAppSettings {
    pub name: Option<String>,
    pub automatic_data_collection_enabled: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirebaseAppConfig {
    pub name: Arc<str>,
    pub automatic_data_collection_enabled: bool,
}

impl FirebaseAppConfig {
    pub fn new(name: impl Into<String>, automatic: bool) -> Self {
        Self {
            name: Arc::from(name.into().into_boxed_str()),
            automatic_data_collection_enabled: automatic,
        }
    }
}

/// A named set of project options plus the product instances created for it.
///
/// Cloning is cheap; all clones share the same registry and deletion flag.
#[derive(Clone)]
pub struct FirebaseApp {
    inner: Arc<FirebaseAppInner>,
}

struct FirebaseAppInner {
    options: FirebaseOptions,
    config: FirebaseAppConfig,
    automatic_data_collection_enabled: Mutex<bool>,
    is_deleted: AtomicBool,
    services: ServiceRegistry,
}

impl FirebaseApp {
    pub fn new(options: FirebaseOptions, config: FirebaseAppConfig) -> Self {
        let automatic = config.automatic_data_collection_enabled;
        Self {
            inner: Arc::new(FirebaseAppInner {
                options,
                config,
                automatic_data_collection_enabled: Mutex::new(automatic),
                is_deleted: AtomicBool::new(false),
                services: ServiceRegistry::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn options(&self) -> FirebaseOptions {
        self.inner.options.clone()
    }

    pub fn config(&self) -> FirebaseAppConfig {
        self.inner.config.clone()
    }

    pub fn automatic_data_collection_enabled(&self) -> bool {
        *self
            .inner
            .automatic_data_collection_enabled
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn set_automatic_data_collection_enabled(&self, value: bool) {
        *self
            .inner
            .automatic_data_collection_enabled
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = value;
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.is_deleted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_deleted(&self) {
        if !self.inner.is_deleted.swap(true, Ordering::SeqCst) {
            self.inner.services.shutdown();
        }
    }

    pub fn check_destroyed(&self) -> AppResult<()> {
        if self.is_deleted() {
            return Err(AppError::AppDeleted {
                app_name: self.name().to_owned(),
            });
        }
        Ok(())
    }

    pub fn ptr_eq(&self, other: &FirebaseApp) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for FirebaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseApp")
            .field("name", &self.name())
            .field("options", &self.inner.options)
            .field("is_deleted", &self.is_deleted())
            .finish()
    }
}

/// Reads default options from `__FIREBASE_DEFAULTS__` or `FIREBASE_CONFIG`.
pub fn get_default_app_config() -> Option<FirebaseOptions> {
    let config = environment::default_app_config_json()?;
    let options = FirebaseOptions::from_json(&config);
    (!options.is_empty()).then_some(options)
}
