//! Type definitions for code locations, methods and registrations

use crate::error::RegistrationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Where a unit of code comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeOrigin {
    /// Code supplied by the registered application
    Application,
    /// Platform code shipped with the runtime
    BootImage,
}

impl CodeOrigin {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            CodeOrigin::Application => 0,
            CodeOrigin::BootImage => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(CodeOrigin::Application),
            1 => Some(CodeOrigin::BootImage),
            _ => None,
        }
    }
}

/// A unit of loaded code, identified by its path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeLocation {
    /// Filesystem path or opaque locator
    pub path: String,
    /// Application or platform code
    pub origin: CodeOrigin,
}

impl CodeLocation {
    /// Create an application code location
    pub fn application(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin: CodeOrigin::Application,
        }
    }

    /// Create a boot image code location
    pub fn boot_image(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin: CodeOrigin::BootImage,
        }
    }

    pub fn is_boot_image(&self) -> bool {
        self.origin == CodeOrigin::BootImage
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            CodeOrigin::Application => write!(f, "{}", self.path),
            CodeOrigin::BootImage => write!(f, "{} (boot)", self.path),
        }
    }
}

/// Method signature, stable within a code location
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Declaring class descriptor, e.g. `LMain;`
    pub class: String,
    /// Method name
    pub name: String,
    /// Parameter and return descriptor, e.g. `(Ljava/io/File;)V`
    pub descriptor: String,
}

impl MethodSignature {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.descriptor)
    }
}

/// A method together with the code location that owns it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodIdentity {
    pub location: CodeLocation,
    pub signature: MethodSignature,
}

impl MethodIdentity {
    pub fn new(location: CodeLocation, signature: MethodSignature) -> Self {
        Self {
            location,
            signature,
        }
    }

    pub fn is_boot_image(&self) -> bool {
        self.location.is_boot_image()
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.signature, self.location)
    }
}

/// Methods grouped by owning code location
pub type ProfileSnapshot = BTreeMap<CodeLocation, BTreeSet<MethodSignature>>;

/// Kind of code paths passed at registration, using the host's bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePathType {
    PrimaryApk,
    SplitApk,
    SecondaryDex,
}

impl CodePathType {
    /// Convert the raw host value
    pub fn from_raw(raw: i32) -> Result<Self, RegistrationError> {
        match raw {
            1 => Ok(CodePathType::PrimaryApk),
            2 => Ok(CodePathType::SplitApk),
            4 => Ok(CodePathType::SecondaryDex),
            other => Err(RegistrationError::invalid(
                "code_path_type",
                format!("unknown code path type {}", other),
            )),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            CodePathType::PrimaryApk => 1,
            CodePathType::SplitApk => 2,
            CodePathType::SecondaryDex => 4,
        }
    }

    /// Whether the paths are the application's primary code
    pub fn is_primary(self) -> bool {
        self == CodePathType::PrimaryApk
    }
}

/// A registered application and the profile files it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRegistration {
    /// Package name
    pub app_id: String,
    /// Profile written by the saver
    pub current_profile: PathBuf,
    /// Baseline profile, read-only for the saver
    pub reference_profile: PathBuf,
    /// Application code locations
    pub code_locations: Vec<CodeLocation>,
    pub code_path_type: CodePathType,
}

impl AppRegistration {
    /// Whether `location` belongs to this application
    pub fn owns(&self, location: &CodeLocation) -> bool {
        self.code_locations.iter().any(|l| l == location)
    }
}
