//! Process-level profiling context
//!
//! Owns the registry, tracker and saver for one process and exposes the
//! entry points a host runtime or test driver calls.

use crate::background::SaverTask;
use crate::saver::{CycleSummary, ProfileSaver};
use crate::tracker::MethodHotnessTracker;
use hotprof_core::serializer;
use hotprof_core::{
    AppInfoRegistrar, CodeLocationRegistry, CodePathType, MethodIdentity, RegistrationError,
    Result, SaverConfig,
};
use std::path::Path;
use std::sync::Arc;

/// Profiling state shared by the engine and the saver
pub struct ProfileRuntime {
    registry: Arc<CodeLocationRegistry>,
    tracker: Arc<MethodHotnessTracker>,
    saver: Arc<ProfileSaver>,
}

impl ProfileRuntime {
    /// Create a runtime with the given configuration
    pub fn new(config: SaverConfig) -> Self {
        let registry = Arc::new(CodeLocationRegistry::new());
        let tracker = Arc::new(MethodHotnessTracker::with_threshold(config.hot_threshold));
        let saver = Arc::new(ProfileSaver::new(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            config,
        ));
        Self {
            registry,
            tracker,
            saver,
        }
    }

    pub fn registry(&self) -> &Arc<CodeLocationRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<MethodHotnessTracker> {
        &self.tracker
    }

    pub fn saver(&self) -> &Arc<ProfileSaver> {
        &self.saver
    }

    /// Register the application whose code is profiled
    pub fn register_application(
        &self,
        package_name: &str,
        current_profile: &str,
        reference_profile: &str,
        code_locations: &[String],
        code_path_type: CodePathType,
    ) -> std::result::Result<(), RegistrationError> {
        self.registry.register(
            package_name,
            current_profile,
            reference_profile,
            code_locations,
            code_path_type,
        )
    }

    /// Make sure `method` has profiling info without executing it
    pub fn ensure_profiling_info(&self, method: &MethodIdentity) {
        self.tracker.mark_has_profiling_info(method);
    }

    /// Count one execution of `method`, waking the saver when it turns hot
    pub fn record_method_execution(&self, method: &MethodIdentity) -> bool {
        let became_hot = self.tracker.record_execution(method);
        if became_hot {
            self.saver.request_save();
        }
        became_hot
    }

    /// Run a save cycle now and wait for it
    pub fn ensure_profile_processing(&self) -> CycleSummary {
        self.saver.trigger_save_and_wait()
    }

    /// Whether the profile at `path` records `method`
    ///
    /// Missing or unreadable files report false.
    pub fn is_method_present_in_profile<P: AsRef<Path>>(
        &self,
        path: P,
        method: &MethodIdentity,
    ) -> bool {
        match serializer::read_profile(path.as_ref()) {
            Ok(contents) => contents.contains_method(method),
            Err(e) => {
                tracing::debug!("Profile {} unavailable: {}", path.as_ref().display(), e);
                false
            }
        }
    }

    /// Whether the profile at `path` is a boot image profile
    pub fn is_boot_image_profile<P: AsRef<Path>>(&self, path: P) -> bool {
        match serializer::read_profile(path.as_ref()) {
            Ok(contents) => contents.is_boot_image(),
            Err(e) => {
                tracing::debug!("Profile {} unavailable: {}", path.as_ref().display(), e);
                false
            }
        }
    }

    /// JSON rendering of the profile at `path`
    pub fn profile_info_dump<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        serializer::dump_profile_info(path)
    }

    /// Start periodic saving on the current tokio runtime
    pub fn start_background_saver(&self) -> SaverTask {
        SaverTask::spawn(Arc::clone(&self.saver))
    }
}

impl Default for ProfileRuntime {
    fn default() -> Self {
        Self::new(SaverConfig::default())
    }
}

impl AppInfoRegistrar for ProfileRuntime {
    fn register_app_info(
        &self,
        package_name: &str,
        current_profile: &str,
        reference_profile: &str,
        code_paths: &[String],
        code_path_type: i32,
    ) -> std::result::Result<(), RegistrationError> {
        self.registry.register_app_info(
            package_name,
            current_profile,
            reference_profile,
            code_paths,
            code_path_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotprof_core::{CodeLocation, MethodSignature};

    fn method(name: &str) -> MethodIdentity {
        MethodIdentity::new(
            CodeLocation::application("/x/y.jar"),
            MethodSignature::new("LMain;", name, "()V"),
        )
    }

    #[test]
    fn test_queries_on_missing_file() {
        let runtime = ProfileRuntime::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.prof");

        assert!(!runtime.is_method_present_in_profile(&path, &method("foo")));
        assert!(!runtime.is_boot_image_profile(&path));
    }

    #[test]
    fn test_queries_on_corrupt_file() {
        let runtime = ProfileRuntime::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.prof");
        std::fs::write(&path, b"not a profile").unwrap();

        assert!(!runtime.is_method_present_in_profile(&path, &method("foo")));
        assert!(!runtime.is_boot_image_profile(&path));
        assert!(runtime.profile_info_dump(&path).is_err());
    }

    #[test]
    fn test_organic_execution_reaches_profile() {
        let runtime = ProfileRuntime::new(SaverConfig {
            hot_threshold: 3,
            ..SaverConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cur.prof");
        let path_str = path.to_str().unwrap();
        runtime
            .register_app_info("test.app", path_str, path_str, &["/x/y.jar".to_string()], 1)
            .unwrap();

        assert!(!runtime.record_method_execution(&method("loop")));
        assert!(!runtime.record_method_execution(&method("loop")));
        assert!(runtime.record_method_execution(&method("loop")));
        runtime.ensure_profile_processing();

        assert!(runtime.is_method_present_in_profile(&path, &method("loop")));
    }

    #[test]
    fn test_ensure_profiling_info_twice_gives_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let once = dir.path().join("once.prof");
        let twice = dir.path().join("twice.prof");
        let code = ["/x/y.jar".to_string()];

        let first = ProfileRuntime::default();
        let p = once.to_str().unwrap();
        first
            .register_application("test.app", p, p, &code, CodePathType::PrimaryApk)
            .unwrap();
        first.ensure_profiling_info(&method("foo"));
        first.ensure_profile_processing();

        let second = ProfileRuntime::default();
        let p = twice.to_str().unwrap();
        second
            .register_application("test.app", p, p, &code, CodePathType::PrimaryApk)
            .unwrap();
        second.ensure_profiling_info(&method("foo"));
        second.ensure_profiling_info(&method("foo"));
        second.ensure_profile_processing();

        assert_eq!(std::fs::read(&once).unwrap(), std::fs::read(&twice).unwrap());
    }
}
