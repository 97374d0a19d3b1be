//! On-disk profile format
//!
//! Layout, all integers little endian:
//!
//! ```text
//! magic    "HPRF"
//! version  u16
//! flags    u8          bit 0: boot image profile
//! count    u32         number of code locations
//! per location, sorted:
//!   path     u32 len + UTF-8
//!   origin   u8        0 application, 1 boot image
//!   methods  u32
//!   per method, sorted: class, name, descriptor (u32 len + UTF-8 each)
//! ```
//!
//! A zero-length input decodes to the empty profile.

use crate::error::{FormatError, Result};
use crate::types::{CodeLocation, CodeOrigin, MethodIdentity, MethodSignature, ProfileSnapshot};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::Path;

/// File magic
pub const PROFILE_MAGIC: &[u8; 4] = b"HPRF";
/// Current format version
pub const PROFILE_VERSION: u16 = 1;

const FLAG_BOOT_IMAGE: u8 = 0x01;

/// Decoded profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileContents {
    /// Tagged as a boot image profile at write time
    pub boot_image: bool,
    /// Methods grouped by code location
    #[serde(serialize_with = "serialize_locations")]
    pub locations: ProfileSnapshot,
}

fn serialize_locations<S: Serializer>(
    locations: &ProfileSnapshot,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Entry<'a> {
        path: &'a str,
        origin: CodeOrigin,
        methods: Vec<String>,
    }

    serializer.collect_seq(locations.iter().map(|(location, methods)| Entry {
        path: &location.path,
        origin: location.origin,
        methods: methods.iter().map(ToString::to_string).collect(),
    }))
}

impl ProfileContents {
    pub fn new(locations: ProfileSnapshot, boot_image: bool) -> Self {
        Self {
            boot_image,
            locations,
        }
    }

    /// Whether `method` is recorded in this profile
    pub fn contains_method(&self, method: &MethodIdentity) -> bool {
        self.locations
            .get(&method.location)
            .map(|methods| methods.contains(&method.signature))
            .unwrap_or(false)
    }

    pub fn is_boot_image(&self) -> bool {
        self.boot_image
    }

    /// Total number of methods over all locations
    pub fn method_count(&self) -> usize {
        self.locations.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.method_count() == 0
    }

    /// Whether the profile holds methods and all of them are platform code
    pub fn only_boot_image_methods(&self) -> bool {
        let mut any = false;
        for (location, methods) in &self.locations {
            if methods.is_empty() {
                continue;
            }
            if !location.is_boot_image() {
                return false;
            }
            any = true;
        }
        any
    }

    /// Union `snapshot` into this profile, returning how many methods were new
    pub fn merge(&mut self, snapshot: &ProfileSnapshot) -> usize {
        let mut added = 0;
        for (location, methods) in snapshot {
            let entry = self.locations.entry(location.clone()).or_default();
            for method in methods {
                if entry.insert(method.clone()) {
                    added += 1;
                }
            }
        }
        added
    }
}

/// Encode a snapshot
///
/// Output depends only on the snapshot contents and the flag. Fails with
/// [`FormatError::TooLarge`] when a count or string length exceeds `u32::MAX`.
pub fn encode(
    snapshot: &ProfileSnapshot,
    is_boot_image: bool,
) -> std::result::Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(PROFILE_MAGIC);
    out.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
    out.push(if is_boot_image { FLAG_BOOT_IMAGE } else { 0 });
    put_len(&mut out, snapshot.len(), "location count")?;

    for (location, methods) in snapshot {
        put_str(&mut out, &location.path, "location path")?;
        out.push(location.origin.to_byte());
        put_len(&mut out, methods.len(), "method count")?;
        for method in methods {
            put_str(&mut out, &method.class, "class name")?;
            put_str(&mut out, &method.name, "method name")?;
            put_str(&mut out, &method.descriptor, "descriptor")?;
        }
    }
    Ok(out)
}

/// Decode profile bytes
pub fn decode(bytes: &[u8]) -> std::result::Result<ProfileContents, FormatError> {
    if bytes.is_empty() {
        return Ok(ProfileContents::default());
    }

    let mut reader = Reader::new(bytes);
    if reader.take(PROFILE_MAGIC.len())? != PROFILE_MAGIC {
        return Err(FormatError::BadMagic);
    }
    let version = reader.u16()?;
    if version != PROFILE_VERSION {
        return Err(FormatError::VersionMismatch { found: version });
    }
    let flags = reader.u8()?;
    if flags & !FLAG_BOOT_IMAGE != 0 {
        return Err(FormatError::Corrupt(format!("unknown flags {:#04x}", flags)));
    }

    let mut contents = ProfileContents {
        boot_image: flags & FLAG_BOOT_IMAGE != 0,
        locations: ProfileSnapshot::new(),
    };

    let location_count = reader.u32()?;
    for _ in 0..location_count {
        let path = reader.string()?;
        let origin_byte = reader.u8()?;
        let origin = CodeOrigin::from_byte(origin_byte).ok_or_else(|| {
            FormatError::Corrupt(format!("unknown code origin {}", origin_byte))
        })?;
        let location = CodeLocation { path, origin };

        let method_count = reader.u32()?;
        let mut methods = BTreeSet::new();
        for _ in 0..method_count {
            let class = reader.string()?;
            let name = reader.string()?;
            let descriptor = reader.string()?;
            if !methods.insert(MethodSignature {
                class,
                name,
                descriptor,
            }) {
                return Err(FormatError::Corrupt(format!(
                    "duplicate method in {}",
                    location
                )));
            }
        }

        if contents.locations.contains_key(&location) {
            return Err(FormatError::Corrupt(format!(
                "duplicate code location {}",
                location
            )));
        }
        contents.locations.insert(location, methods);
    }

    if !reader.is_at_end() {
        return Err(FormatError::Corrupt(format!(
            "{} trailing byte(s)",
            reader.remaining()
        )));
    }
    Ok(contents)
}

/// Query containment on decoded contents
pub fn contains_method(contents: &ProfileContents, method: &MethodIdentity) -> bool {
    contents.contains_method(method)
}

/// Query the boot image tag on decoded contents
pub fn is_boot_image_profile(contents: &ProfileContents) -> bool {
    contents.is_boot_image()
}

/// Read and decode a profile file
///
/// A missing file reads as the empty profile.
pub fn read_profile<P: AsRef<Path>>(path: P) -> Result<ProfileContents> {
    let bytes = match std::fs::read(path.as_ref()) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProfileContents::default()),
        Err(e) => return Err(e.into()),
    };
    Ok(decode(&bytes)?)
}

/// Render a profile file as pretty JSON
pub fn dump_profile_info<P: AsRef<Path>>(path: P) -> Result<String> {
    let contents = read_profile(path)?;
    Ok(serde_json::to_string_pretty(&contents)?)
}

fn put_len(out: &mut Vec<u8>, len: usize, field: &str) -> std::result::Result<(), FormatError> {
    let len = u32::try_from(len).map_err(|_| FormatError::TooLarge {
        field: field.to_string(),
        len,
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str, field: &str) -> std::result::Result<(), FormatError> {
    put_len(out, s.len(), field)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Corrupt(format!(
                "truncated at offset {}: need {} byte(s), have {}",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> std::result::Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> std::result::Result<u16, FormatError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> std::result::Result<u32, FormatError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> std::result::Result<String, FormatError> {
        let len = self.u32()? as usize;
        let at = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FormatError::Corrupt(format!("invalid UTF-8 at offset {}", at)))
    }
}
