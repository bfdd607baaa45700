//! Firmware release packaging — version tag, artifact staging, flash map.
//!
//! # Modules
//!
//! - [`defines`] — `-D` definitions parsed out of the build flags
//! - [`version`] — `VersionTag` resolution from `FW_VERSION`/`HW_TAG`/`MODEL`
//! - [`config`] — `BuildEnv`, the values the firmware build hands over
//! - [`flash_map`] — image classification and the JSON flash map
//! - [`packager`] — the post-build copy/rename/write step
//!
//! # Output
//!
//! A run writes into `build_outputs/{fw_version}/{model}/`: the application
//! binary, the three auxiliary images renamed to `{kind}_{tag}.bin`, and
//! `flash_map_{tag}.json`. The application entry's `fileName` is the name of
//! the copied binary with its extension, `{tag}.bin` unless `APP_BINARY` or
//! `PROGNAME` says otherwise. It is never the bare program name.

#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod defines;
pub mod error;
pub mod flash_map;
pub mod packager;
pub mod version;

// Top-level re-exports for convenience
pub use config::{BuildEnv, BuildFlags, DEFAULT_CONFIG_FILE};
pub use defines::BuildDefines;
pub use error::{Error, Result};
pub use flash_map::{FlashAddress, FlashEntry, FlashImage, FlashMap, ImageKind};
pub use packager::{package, plan_flash_map, resolve_tag, PackageOptions, PackageReport};
pub use version::{resolve, BuildInfo, VersionTag};
