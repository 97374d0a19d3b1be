/// Profile saving tests
///
/// End-to-end runs of register, mark, save and query against a real file.
/// Run with: cargo test --test profile_saving

use hotprof_core::{AppInfoRegistrar, CodeLocation, MethodIdentity, MethodSignature};
use hotprof_saver::ProfileRuntime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

const CODE_PATH: &str = "/data/local/tmp/595-profile-saving.jar";
const CORE_JAR: &str = "/apex/com.android.art/javalib/core-oj.jar";
const CODE_PATH_TYPE_PRIMARY_APK: i32 = 1;

fn registered_runtime() -> (tempfile::TempDir, PathBuf, ProfileRuntime) {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("temp-file");
    let runtime = ProfileRuntime::default();
    let path = profile.to_str().unwrap();
    runtime
        .register_app_info(
            "test.app",
            path,
            path,
            &[CODE_PATH.to_string()],
            CODE_PATH_TYPE_PRIMARY_APK,
        )
        .unwrap();
    (dir, profile, runtime)
}

fn app_method() -> MethodIdentity {
    MethodIdentity::new(
        CodeLocation::application(CODE_PATH),
        MethodSignature::new(
            "LMain;",
            "testAddMethodToProfile",
            "(Ljava/io/File;Ljava/lang/reflect/Method;)V",
        ),
    )
}

fn boot_method(class: &str, name: &str, descriptor: &str) -> MethodIdentity {
    MethodIdentity::new(
        CodeLocation::boot_image(CORE_JAR),
        MethodSignature::new(class, name, descriptor),
    )
}

fn add_method_to_profile(runtime: &ProfileRuntime, profile: &Path, method: &MethodIdentity) {
    runtime.ensure_profiling_info(method);
    runtime.ensure_profile_processing();
    assert!(
        runtime.is_method_present_in_profile(profile, method),
        "Expected method {} to be in the profile",
        method
    );
}

#[test]
fn test_profile_saving_scenario() {
    let (_dir, profile, runtime) = registered_runtime();

    add_method_to_profile(&runtime, &profile, &app_method());

    // The saver must recreate a deleted profile
    std::fs::remove_file(&profile).unwrap();

    let exists = boot_method("Ljava/io/File;", "exists", "()Z");
    add_method_to_profile(&runtime, &profile, &exists);

    let console = boot_method("Ljava/lang/System;", "console", "()Ljava/io/Console;");
    runtime.ensure_profile_processing();
    assert!(
        !runtime.is_method_present_in_profile(&profile, &console),
        "Did not expect method {} to be in the profile",
        console
    );

    // Marks are never forgotten, so the rebuilt file still has the app method
    assert!(runtime.is_method_present_in_profile(&profile, &app_method()));
    assert!(!runtime.is_boot_image_profile(&profile));
}

#[test]
fn test_boot_only_profile_flips_when_app_method_added() {
    let (_dir, profile, runtime) = registered_runtime();

    add_method_to_profile(&runtime, &profile, &boot_method("Ljava/io/File;", "exists", "()Z"));
    assert!(runtime.is_boot_image_profile(&profile));

    add_method_to_profile(&runtime, &profile, &app_method());
    assert!(!runtime.is_boot_image_profile(&profile));
}

#[test]
fn test_unmarked_method_absent() {
    let (_dir, profile, runtime) = registered_runtime();

    runtime.ensure_profile_processing();

    assert!(profile.exists());
    assert!(!runtime.is_method_present_in_profile(&profile, &app_method()));
    assert!(!runtime.is_boot_image_profile(&profile));
}

#[test]
fn test_concurrent_marks_all_saved() {
    let (_dir, profile, runtime) = registered_runtime();
    let runtime = Arc::new(runtime);
    let num_threads = 16;

    let methods: Vec<MethodIdentity> = (0..num_threads)
        .map(|i| {
            MethodIdentity::new(
                CodeLocation::application(CODE_PATH),
                MethodSignature::new("LWorker;", format!("run{}", i), "()V"),
            )
        })
        .collect();

    let handles: Vec<_> = methods
        .iter()
        .cloned()
        .map(|method| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || runtime.ensure_profiling_info(&method))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    runtime.ensure_profile_processing();

    for method in &methods {
        assert!(runtime.is_method_present_in_profile(&profile, method));
    }
}

#[test]
fn test_concurrent_saves_do_not_lose_marks() {
    let (_dir, profile, runtime) = registered_runtime();
    let runtime = Arc::new(runtime);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let method = MethodIdentity::new(
                    CodeLocation::application(CODE_PATH),
                    MethodSignature::new("LSaver;", format!("step{}", i), "()V"),
                );
                runtime.ensure_profiling_info(&method);
                runtime.ensure_profile_processing();
                assert!(runtime.is_method_present_in_profile(&profile_path(&runtime), &method));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let dump = runtime.profile_info_dump(&profile).unwrap();
    for i in 0..8 {
        assert!(dump.contains(&format!("step{}", i)));
    }
}

fn profile_path(runtime: &ProfileRuntime) -> PathBuf {
    runtime.registry().lookup("test.app").unwrap().current_profile
}
