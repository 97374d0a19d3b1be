//! Registry of applications and the code locations they own

use crate::error::RegistrationError;
use crate::types::{AppRegistration, CodeLocation, CodePathType};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// Host-facing capability for registering application info
///
/// The host forwards its `registerAppInfo` call through this trait, passing
/// the raw code path type value.
pub trait AppInfoRegistrar {
    fn register_app_info(
        &self,
        package_name: &str,
        current_profile: &str,
        reference_profile: &str,
        code_paths: &[String],
        code_path_type: i32,
    ) -> Result<(), RegistrationError>;
}

/// Maps application ids to their code locations and profile files
pub struct CodeLocationRegistry {
    apps: RwLock<BTreeMap<String, AppRegistration>>,
}

impl CodeLocationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register an application
    ///
    /// Registering the same `app_id` again replaces the previous entry.
    pub fn register(
        &self,
        app_id: &str,
        current_profile: &str,
        reference_profile: &str,
        code_locations: &[String],
        code_path_type: CodePathType,
    ) -> Result<(), RegistrationError> {
        check_non_empty("app_id", app_id)?;
        check_non_empty("current_profile", current_profile)?;
        check_non_empty("reference_profile", reference_profile)?;
        if code_locations.is_empty() {
            return Err(RegistrationError::invalid(
                "code_locations",
                "at least one code location is required",
            ));
        }
        for (i, path) in code_locations.iter().enumerate() {
            check_non_empty(&format!("code_locations[{}]", i), path)?;
        }

        let mut locations: Vec<CodeLocation> = Vec::with_capacity(code_locations.len());
        for path in code_locations {
            let location = CodeLocation::application(path.as_str());
            if !locations.contains(&location) {
                locations.push(location);
            }
        }

        let registration = AppRegistration {
            app_id: app_id.to_string(),
            current_profile: PathBuf::from(current_profile),
            reference_profile: PathBuf::from(reference_profile),
            code_locations: locations,
            code_path_type,
        };

        let mut apps = self.apps.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = apps.insert(app_id.to_string(), registration) {
            tracing::warn!(
                "Re-registration of {} replaces profile {}",
                app_id,
                previous.current_profile.display()
            );
        } else {
            tracing::info!(
                "Registered {} with {} code location(s), profile {}",
                app_id,
                code_locations.len(),
                current_profile
            );
        }
        Ok(())
    }

    /// Look up a registration
    pub fn lookup(&self, app_id: &str) -> Option<AppRegistration> {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app_id)
            .cloned()
    }

    /// All registrations, ordered by app id
    pub fn registered_apps(&self) -> Vec<AppRegistration> {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Default for CodeLocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppInfoRegistrar for CodeLocationRegistry {
    fn register_app_info(
        &self,
        package_name: &str,
        current_profile: &str,
        reference_profile: &str,
        code_paths: &[String],
        code_path_type: i32,
    ) -> Result<(), RegistrationError> {
        let code_path_type = CodePathType::from_raw(code_path_type)?;
        self.register(
            package_name,
            current_profile,
            reference_profile,
            code_paths,
            code_path_type,
        )
    }
}

fn check_non_empty(field: &str, value: &str) -> Result<(), RegistrationError> {
    if value.trim().is_empty() {
        return Err(RegistrationError::invalid(field, "must not be empty"));
    }
    Ok(())
}
