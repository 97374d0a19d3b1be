//! Hotprof Core
//!
//! Data model and on-disk format for method execution profiles.
//! This crate provides the application registry, the versioned profile
//! codec and saver configuration loading.

pub mod config;
pub mod error;
pub mod registry;
pub mod serializer;
pub mod types;

pub use config::{ConfigLoader, SaverConfig};
pub use error::{FormatError, ProfileError, RegistrationError, Result};
pub use registry::{AppInfoRegistrar, CodeLocationRegistry};
pub use serializer::ProfileContents;
pub use types::{
    AppRegistration, CodeLocation, CodeOrigin, CodePathType, MethodIdentity, MethodSignature,
    ProfileSnapshot,
};
