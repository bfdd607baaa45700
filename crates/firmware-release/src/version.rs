//! Version tag resolution.
//!
//! The tag is the product name for one firmware build: it becomes the
//! program name of the application binary and is stamped into every
//! packaged file name.
//!
//! | firmware version | tag                          |
//! |------------------|------------------------------|
//! | `1.2.3`          | `{model}_v1.2.3.{hw}`        |
//! | `1.2.3-beta1`    | `{model}_v1.2.3.{hw}-beta1`  |

use core::fmt;

use crate::defines::BuildDefines;
use crate::error::Result;

/// Definition holding the firmware version string (usually quoted).
pub const FW_VERSION: &str = "FW_VERSION";
/// Definition holding the hardware revision tag.
pub const HW_TAG: &str = "HW_TAG";
/// Definition holding the product model name.
pub const MODEL: &str = "MODEL";

const PRE_RELEASE_MARKERS: [&str; 2] = ["alpha", "beta"];

/// Canonical version identifier, e.g. `scribble_v1.4.0.rev3-beta2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTag(String);

impl VersionTag {
    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Combine the three build definitions into a [`VersionTag`].
///
/// Surrounding double quotes on `firmware_version` are dropped first. A
/// version mentioning `alpha` or `beta` is split once on its first `-` and
/// the hardware tag goes between the numeric part and the pre-release
/// suffix. A pre-release version without any `-` is used as-is.
pub fn resolve(firmware_version: &str, hardware_tag: &str, model: &str) -> VersionTag {
    let version = strip_quotes(firmware_version);
    let is_pre_release = PRE_RELEASE_MARKERS.iter().any(|m| version.contains(m));

    let body = match version.split_once('-') {
        Some((prefix, suffix)) if is_pre_release => {
            format!("{prefix}.{hardware_tag}-{suffix}")
        }
        _ => format!("{version}.{hardware_tag}"),
    };

    VersionTag(format!("{model}_v{body}"))
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

/// The three definitions the release step depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    /// Firmware version with quotes removed. Names the output directory.
    pub fw_version: String,
    /// Hardware revision, e.g. `rev3`.
    pub hw_tag: String,
    /// Product model. Prefixes the tag and names the output subdirectory.
    pub model: String,
}

impl BuildInfo {
    /// Read `FW_VERSION`, `HW_TAG` and `MODEL` from the definitions.
    ///
    /// # Errors
    ///
    /// [`crate::Error::MissingDefine`] for the first absent definition.
    pub fn from_defines(defines: &BuildDefines) -> Result<Self> {
        Ok(Self {
            fw_version: strip_quotes(defines.require(FW_VERSION)?).to_owned(),
            hw_tag: defines.require(HW_TAG)?.to_owned(),
            model: defines.require(MODEL)?.to_owned(),
        })
    }

    /// Resolved version tag for these values.
    pub fn tag(&self) -> VersionTag {
        resolve(&self.fw_version, &self.hw_tag, &self.model)
    }
}
