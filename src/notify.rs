//! User-facing notices shown when a stop needs elevation
//!
//! Dialog text comes from an injected [`ResourceLookup`] and is shown by an
//! injected [`NotificationPresenter`], so GUI hosts plug in their own
//! resources and dialogs.

use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;

pub const PERMISSIONS_ERROR_TITLE_KEY: &str = "Main__VanguardPermissionsError__Title";
pub const PERMISSIONS_ERROR_BODY_KEY: &str = "Main__VanguardPermissionsError__Body";
pub const OK_BUTTON_TEXT_KEY: &str = "OKButtonText";

/// Resolves localized strings by key
pub trait ResourceLookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl ResourceLookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Built-in English strings
pub struct DefaultResources;

impl ResourceLookup for DefaultResources {
    fn lookup(&self, key: &str) -> Option<String> {
        let text = match key {
            PERMISSIONS_ERROR_TITLE_KEY => "Administrator privileges required",
            PERMISSIONS_ERROR_BODY_KEY => {
                "Vanguard could not be stopped because the application \
                 is not running as administrator."
            }
            OK_BUTTON_TEXT_KEY => "OK",
            _ => return None,
        };
        Some(text.to_string())
    }
}

/// Content of the "requires elevation" notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionNotice {
    pub title: String,
    pub body: String,
    pub button: String,
}

impl PermissionNotice {
    /// Resolve every field, falling back to the key when a resource is missing
    pub fn from_resources(resources: &dyn ResourceLookup) -> Self {
        let resolve = |key: &str| {
            resources.lookup(key).unwrap_or_else(|| {
                warn!("Missing resource '{}'", key);
                key.to_string()
            })
        };
        Self {
            title: resolve(PERMISSIONS_ERROR_TITLE_KEY),
            body: resolve(PERMISSIONS_ERROR_BODY_KEY),
            button: resolve(OK_BUTTON_TEXT_KEY),
        }
    }
}

/// Shows notices to the user
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn show_permissions_error(&self, notice: &PermissionNotice);
}

/// Writes notices to standard error
pub struct ConsolePresenter;

#[async_trait]
impl NotificationPresenter for ConsolePresenter {
    async fn show_permissions_error(&self, notice: &PermissionNotice) {
        eprintln!("{}", notice.title);
        eprintln!("{}", notice.body);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_uses_injected_resources() {
        let mut resources = HashMap::new();
        resources.insert(PERMISSIONS_ERROR_TITLE_KEY.to_string(), "Titel".to_string());
        resources.insert(PERMISSIONS_ERROR_BODY_KEY.to_string(), "Inhalt".to_string());
        resources.insert(OK_BUTTON_TEXT_KEY.to_string(), "Ja".to_string());

        let notice = PermissionNotice::from_resources(&resources);
        assert_eq!(notice.title, "Titel");
        assert_eq!(notice.body, "Inhalt");
        assert_eq!(notice.button, "Ja");
    }

    #[test]
    fn test_missing_resource_falls_back_to_key() {
        let resources: HashMap<String, String> = HashMap::new();
        let notice = PermissionNotice::from_resources(&resources);
        assert_eq!(notice.title, PERMISSIONS_ERROR_TITLE_KEY);
        assert_eq!(notice.button, OK_BUTTON_TEXT_KEY);
    }

    #[test]
    fn test_default_resources_cover_notice() {
        let notice = PermissionNotice::from_resources(&DefaultResources);
        assert_eq!(notice.button, "OK");
        assert!(notice.body.contains("administrator"));
    }
}
