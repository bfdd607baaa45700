//! Flash map — which binary goes at which flash address.
//!
//! The JSON written next to the packaged binaries looks like:
//!
//! ```json
//! {
//!   "bootloader": [{ "address": "0x1000", "fileName": "bootloader_dev_v1.2.3.hw1.bin" }],
//!   "partitions": [{ "address": "0x8000", "fileName": "partitions_dev_v1.2.3.hw1.bin" }],
//!   "ota": [{ "address": "0xe000", "fileName": "ota_dev_v1.2.3.hw1.bin" }],
//!   "application": [{ "address": "0x10000", "fileName": "dev_v1.2.3.hw1.bin" }]
//! }
//! ```
//!
//! All four keys are always present. Auxiliary images are classified from
//! their file name; anything that is not a bootloader, partition table or
//! OTA data stub is left out of the map.

use core::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::version::VersionTag;

/// Category of a flashable binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Second-stage bootloader.
    Bootloader,
    /// Partition table.
    Partitions,
    /// OTA data stub (`boot_app0`).
    Ota,
    /// The linked firmware itself.
    Application,
}

impl ImageKind {
    /// The auxiliary kinds, in flash map order.
    pub const AUXILIARY: [ImageKind; 3] = [Self::Bootloader, Self::Partitions, Self::Ota];

    /// Lowercase name, used as the flash map key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootloader => "bootloader",
            Self::Partitions => "partitions",
            Self::Ota => "ota",
            Self::Application => "application",
        }
    }

    /// Classify an auxiliary image from the lowercased file name of `path`.
    ///
    /// Matching is by substring and checked in order: `bootloader`,
    /// `partitions`, then `boot_app0` or `ota`. Never returns
    /// [`ImageKind::Application`].
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.contains("bootloader") {
            Some(Self::Bootloader)
        } else if name.contains("partitions") {
            Some(Self::Partitions)
        } else if name.contains("boot_app0") || name.contains("ota") {
            Some(Self::Ota)
        } else {
            None
        }
    }

    /// Version-qualified file name a packaged image of this kind gets.
    ///
    /// The application keeps its program name, `{tag}.bin`.
    pub fn release_file_name(self, tag: &VersionTag) -> String {
        match self {
            Self::Application => format!("{tag}.bin"),
            kind => format!("{}_{tag}.bin", kind.as_str()),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flash offset as the build system spelled it.
///
/// Build environments hand out offsets either as numbers or as hex strings
/// (`"0x10000"`); the flash map repeats whichever form it was given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlashAddress {
    /// Numeric offset, written back as a JSON number.
    Number(u64),
    /// Offset as the build wrote it, usually hex like `"0x1000"`.
    Text(String),
}

impl fmt::Display for FlashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:#x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for FlashAddress {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FlashAddress {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// One `(address, path)` pair from `FLASH_EXTRA_IMAGES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(FlashAddress, PathBuf)", into = "(FlashAddress, PathBuf)")]
pub struct FlashImage {
    /// Flash offset.
    pub address: FlashAddress,
    /// Image file produced by the build.
    pub path: PathBuf,
}

impl FlashImage {
    /// Image at `address` read from `path`.
    pub fn new(address: impl Into<FlashAddress>, path: impl Into<PathBuf>) -> Self {
        Self {
            address: address.into(),
            path: path.into(),
        }
    }

    /// Classification of [`Self::path`], see [`ImageKind::classify`].
    pub fn kind(&self) -> Option<ImageKind> {
        ImageKind::classify(&self.path)
    }
}

impl From<(FlashAddress, PathBuf)> for FlashImage {
    fn from((address, path): (FlashAddress, PathBuf)) -> Self {
        Self { address, path }
    }
}

impl From<FlashImage> for (FlashAddress, PathBuf) {
    fn from(image: FlashImage) -> Self {
        (image.address, image.path)
    }
}

/// A binary placed at a flash address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashEntry {
    /// Flash offset.
    pub address: FlashAddress,
    /// Packaged file name, relative to the output directory.
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// Category → entries mapping written as `flash_map_{tag}.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMap {
    /// Bootloader entries.
    pub bootloader: Vec<FlashEntry>,
    /// Partition table entries.
    pub partitions: Vec<FlashEntry>,
    /// OTA stub entries.
    pub ota: Vec<FlashEntry>,
    /// Always exactly one entry after [`FlashMap::build`].
    pub application: Vec<FlashEntry>,
}

impl FlashMap {
    /// Build the map for one release.
    ///
    /// Every auxiliary image is classified by file name and recorded under
    /// its version-qualified name, keeping input order within a category.
    /// Unclassified images are dropped. `application` becomes the single
    /// application entry.
    pub fn build(images: &[FlashImage], tag: &VersionTag, application: FlashEntry) -> Self {
        let mut map = Self::default();
        for image in images {
            let Some(kind) = image.kind() else {
                continue;
            };
            map.entries_mut(kind).push(FlashEntry {
                address: image.address.clone(),
                file_name: kind.release_file_name(tag),
            });
        }
        map.application = vec![application];
        map
    }

    /// Entries stored under `kind`.
    pub fn entries(&self, kind: ImageKind) -> &[FlashEntry] {
        match kind {
            ImageKind::Bootloader => &self.bootloader,
            ImageKind::Partitions => &self.partitions,
            ImageKind::Ota => &self.ota,
            ImageKind::Application => &self.application,
        }
    }

    fn entries_mut(&mut self, kind: ImageKind) -> &mut Vec<FlashEntry> {
        match kind {
            ImageKind::Bootloader => &mut self.bootloader,
            ImageKind::Partitions => &mut self.partitions,
            ImageKind::Ota => &mut self.ota,
            ImageKind::Application => &mut self.application,
        }
    }

    /// Pretty JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Only fails if serde_json itself fails, which it does not for this type.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a flash map previously written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// [`crate::Error::Json`] if `json` is not a flash map.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
