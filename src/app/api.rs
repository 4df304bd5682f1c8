use crate::app::constants::DEFAULT_ENTRY_NAME;
use crate::app::errors::{AppError, AppResult};
use crate::app::logger::LOGGER;
use crate::app::registry::apps_guard;
use crate::app::types::{get_default_app_config, FirebaseApp, FirebaseAppConfig, FirebaseAppSettings, FirebaseOptions};

pub static SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

fn normalize_name(settings: &FirebaseAppSettings) -> AppResult<String> {
    let name = settings
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_ENTRY_NAME.to_string());
    if name.trim().is_empty() {
        return Err(AppError::BadAppName { app_name: name });
    }
    Ok(name)
}

fn ensure_options(options: FirebaseOptions) -> AppResult<FirebaseOptions> {
    if !options.is_empty() {
        return Ok(options);
    }
    get_default_app_config().ok_or(AppError::NoOptions)
}

/// Creates (or returns the identical existing) app registered under `settings.name`.
///
/// Empty `options` fall back to the environment defaults. Re-initializing a name with
/// different options or settings fails with [`AppError::DuplicateApp`].
pub fn initialize_app(options: FirebaseOptions, settings: Option<FirebaseAppSettings>) -> AppResult<FirebaseApp> {
    let settings = settings.unwrap_or_default();
    let name = normalize_name(&settings)?;
    let automatic = settings.automatic_data_collection_enabled.unwrap_or(true);
    let options = ensure_options(options)?;
    let config = FirebaseAppConfig::new(name.clone(), automatic);

    let mut apps = apps_guard();
    if let Some(existing) = apps.get(&name) {
        if existing.options() == options && existing.config() == config {
            return Ok(existing.clone());
        }
        return Err(AppError::DuplicateApp { app_name: name });
    }

    let app = FirebaseApp::new(options, config);
    apps.insert(name.clone(), app.clone());
    LOGGER.debug(format!("Initialized Firebase app '{name}'"));
    Ok(app)
}

pub fn get_app(name: Option<&str>) -> AppResult<FirebaseApp> {
    let lookup = name.unwrap_or(DEFAULT_ENTRY_NAME);
    apps_guard()
        .get(lookup)
        .cloned()
        .ok_or_else(|| AppError::NoApp {
            app_name: lookup.to_string(),
        })
}

pub fn get_apps() -> Vec<FirebaseApp> {
    apps_guard().values().cloned().collect()
}

/// Removes the app from the registry and tears down every product instance it owns.
pub fn delete_app(app: &FirebaseApp) -> AppResult<()> {
    let name = app.name().to_string();
    let removed = {
        let mut apps = apps_guard();
        match apps.get(&name) {
            Some(registered) if registered.ptr_eq(app) => apps.remove(&name),
            _ => None,
        }
    };

    if removed.is_none() && !app.is_deleted() {
        LOGGER.debug(format!("App '{name}' was not registered"));
    }
    app.mark_deleted();
    Ok(())
}
