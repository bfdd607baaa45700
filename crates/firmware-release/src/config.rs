//! Build environment handed over by the firmware build.
//!
//! The build system writes the handful of values the release step needs to
//! a JSON file next to the project (`release.json` by default):
//!
//! ```json
//! {
//!   "PROJECT_DIR": ".",
//!   "BUILD_DIR": ".pio/build/esp32dev",
//!   "BUILD_FLAGS": ["-DFW_VERSION=\\\"1.2.3\\\"", "-DHW_TAG=hw1", "-DMODEL=dev"],
//!   "FLASH_EXTRA_IMAGES": [
//!     ["0x1000", ".pio/build/esp32dev/bootloader.bin"],
//!     ["0x8000", ".pio/build/esp32dev/partitions.bin"],
//!     ["0xe000", "boot_app0.bin"]
//!   ],
//!   "ESP32_APP_OFFSET": "0x10000"
//! }
//! ```
//!
//! Relative paths are taken relative to the file's own directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::defines::BuildDefines;
use crate::error::{Error, Result};
use crate::flash_map::{FlashAddress, FlashImage};
use crate::version::{BuildInfo, VersionTag};

/// Default file name of the build environment.
pub const DEFAULT_CONFIG_FILE: &str = "release.json";

/// Offset of the application partition on a stock ESP32 partition table.
pub const DEFAULT_APP_OFFSET: u64 = 0x10000;

/// `BUILD_FLAGS` is either one string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BuildFlags {
    /// A single whitespace-separated string.
    One(String),
    /// One flag string per element.
    Many(Vec<String>),
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl BuildFlags {
    /// Flag strings in order.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(flag) => core::slice::from_ref(flag),
            Self::Many(flags) => flags,
        }
    }
}

fn default_app_offset() -> FlashAddress {
    FlashAddress::Number(DEFAULT_APP_OFFSET)
}

/// Everything the release step reads from the build.
///
/// Keys the release step has no use for are ignored, so a fuller dump of the
/// build environment loads as well.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BuildEnv {
    /// Root of the firmware project; `build_outputs/` is created here.
    pub project_dir: PathBuf,
    /// Directory the application binary is linked into.
    pub build_dir: PathBuf,
    /// Compiler flags carrying the `-D` definitions.
    #[serde(default)]
    pub build_flags: BuildFlags,
    /// Program name the build linked the application under. Normally equal
    /// to the version tag; when set it names the default application binary.
    #[serde(default)]
    pub progname: Option<String>,
    /// Bootloader, partition table and OTA stub, each with its flash offset.
    #[serde(default)]
    pub flash_extra_images: Vec<FlashImage>,
    /// Flash offset of the application image.
    #[serde(rename = "ESP32_APP_OFFSET", default = "default_app_offset")]
    pub app_offset: FlashAddress,
    /// Explicit application binary. Defaults to `{build_dir}/{PROGNAME}.bin`,
    /// or `{build_dir}/{tag}.bin` without `PROGNAME`.
    #[serde(default)]
    pub app_binary: Option<PathBuf>,
    /// Extra `NAME=VALUE` definitions layered over `build_flags`.
    #[serde(skip)]
    pub overrides: Vec<String>,
}

impl BuildEnv {
    /// A minimal environment rooted at `project_dir`.
    pub fn new(project_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            build_dir: build_dir.into(),
            build_flags: BuildFlags::default(),
            progname: None,
            flash_extra_images: Vec::new(),
            app_offset: default_app_offset(),
            app_binary: None,
            overrides: Vec::new(),
        }
    }

    /// Read the environment from a JSON file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Config`] if it is
    /// not a valid build environment.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_json(&text, base).map_err(|reason| Error::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse an environment, resolving relative paths against `base`.
    fn from_json(text: &str, base: &Path) -> core::result::Result<Self, String> {
        let mut env: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        env.rebase(base);
        Ok(env)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.project_dir);
        join(&mut self.build_dir);
        for image in &mut self.flash_extra_images {
            join(&mut image.path);
        }
        if let Some(app) = self.app_binary.as_mut() {
            join(app);
        }
    }

    /// Build flags plus any overrides, as a definition table.
    pub fn defines(&self) -> BuildDefines {
        let mut defines = BuildDefines::parse(self.build_flags.as_slice());
        for raw in &self.overrides {
            defines.push_raw(raw);
        }
        defines
    }

    /// # Errors
    ///
    /// [`Error::MissingDefine`] if `FW_VERSION`, `HW_TAG` or `MODEL` is absent.
    pub fn build_info(&self) -> Result<BuildInfo> {
        BuildInfo::from_defines(&self.defines())
    }

    /// The linked application binary for a build named `tag`.
    pub fn app_binary_path(&self, tag: &VersionTag) -> PathBuf {
        if let Some(app) = &self.app_binary {
            return app.clone();
        }
        let stem = self.progname.as_deref().unwrap_or(tag.as_str());
        self.build_dir.join(format!("{stem}.bin"))
    }

    /// `{project_dir}/build_outputs/{fw_version}/{model}`.
    pub fn output_dir(&self, info: &BuildInfo) -> PathBuf {
        self.project_dir
            .join("build_outputs")
            .join(&info.fw_version)
            .join(&info.model)
    }

    /// Log every field at debug level.
    pub fn dump(&self) {
        debug!(project_dir = %self.project_dir.display(), "PROJECT_DIR");
        debug!(build_dir = %self.build_dir.display(), "BUILD_DIR");
        if let Some(progname) = &self.progname {
            debug!(progname = %progname, "PROGNAME");
        }
        for flag in self.build_flags.as_slice() {
            debug!(flag = %flag, "BUILD_FLAGS");
        }
        for image in &self.flash_extra_images {
            debug!(address = %image.address, path = %image.path.display(), "FLASH_EXTRA_IMAGES");
        }
        debug!(offset = %self.app_offset, "ESP32_APP_OFFSET");
        if let Some(app) = &self.app_binary {
            debug!(path = %app.display(), "APP_BINARY");
        }
        for raw in &self.overrides {
            debug!(define = %raw, "override");
        }
    }
}
