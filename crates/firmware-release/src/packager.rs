//! Release packaging — runs once after the application binary is linked.
//!
//! 1. Create `{project}/build_outputs/{fw_version}/{model}` (optionally
//!    clearing what a previous run left there).
//! 2. Copy the application binary in, name unchanged.
//! 3. Copy each auxiliary image under its version-qualified name. The kind of
//!    an image comes from its file name, the same rule the flash map uses, so
//!    the copied files and the map can never disagree.
//! 4. Write `flash_map_{tag}.json`.
//!
//! Any filesystem failure aborts the run, and so does a source that already
//! is its own destination (e.g. `BUILD_DIR` pointing into `build_outputs/`).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::BuildEnv;
use crate::error::{Error, Result};
use crate::flash_map::{FlashEntry, FlashMap, ImageKind};
use crate::version::{BuildInfo, VersionTag};

/// Packaging knobs that do not come from the build itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageOptions {
    /// Remove files left in the output directory by an earlier run.
    pub clean: bool,
}

/// What a packaging run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// Version tag the files were named after.
    pub tag: VersionTag,
    /// `build_outputs/{fw_version}/{model}` under the project.
    pub output_dir: PathBuf,
    /// Every file written, in write order. The flash map is last.
    pub files: Vec<PathBuf>,
    /// Location of `flash_map_{tag}.json`.
    pub flash_map_path: PathBuf,
    /// The map as written.
    pub flash_map: FlashMap,
}

/// Resolve the version tag for `env` and log it.
///
/// # Errors
///
/// [`Error::MissingDefine`] if a required build definition is absent.
pub fn resolve_tag(env: &BuildEnv) -> Result<(BuildInfo, VersionTag)> {
    let info = env.build_info()?;
    let tag = info.tag();
    info!("Building for version: {tag}");
    Ok((info, tag))
}

/// Flash map for `env` without touching the filesystem.
///
/// # Errors
///
/// [`Error::MissingDefine`] if a required build definition is absent.
pub fn plan_flash_map(env: &BuildEnv) -> Result<FlashMap> {
    let (_, tag) = resolve_tag(env)?;
    Ok(FlashMap::build(
        &env.flash_extra_images,
        &tag,
        application_entry(env, &tag),
    ))
}

/// Application entry of the flash map.
///
/// `fileName` is the name of the binary actually copied, extension included
/// (`{tag}.bin` by default), not the bare program name.
fn application_entry(env: &BuildEnv, tag: &VersionTag) -> FlashEntry {
    let app = env.app_binary_path(tag);
    let file_name = app
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ImageKind::Application.release_file_name(tag));
    FlashEntry {
        address: env.app_offset.clone(),
        file_name,
    }
}

/// Run the whole release step for `env`.
///
/// # Errors
///
/// - [`Error::MissingDefine`] if a build definition is absent
/// - [`Error::MissingImage`] if no bootloader, partition table or OTA image
///   is listed
/// - [`Error::MissingArtifact`] if the application binary does not exist
/// - [`Error::SameFile`] if a source already is its packaged destination
/// - [`Error::Io`] for any copy or write failure
pub fn package(env: &BuildEnv, options: PackageOptions) -> Result<PackageReport> {
    env.dump();
    let (info, tag) = resolve_tag(env)?;
    if let Some(progname) = env.progname.as_deref().filter(|p| *p != tag.as_str()) {
        warn!(progname, tag = %tag, "PROGNAME differs from the resolved version tag");
    }

    for kind in ImageKind::AUXILIARY {
        if !env.flash_extra_images.iter().any(|i| i.kind() == Some(kind)) {
            return Err(Error::MissingImage(kind));
        }
    }

    let app_binary = env.app_binary_path(&tag);
    if !app_binary.is_file() {
        return Err(Error::MissingArtifact(app_binary));
    }

    let output_dir = env.output_dir(&info);
    info!(dir = %output_dir.display(), "output directory");

    let app_entry = application_entry(env, &tag);
    let mut copies = vec![(app_binary, output_dir.join(&app_entry.file_name))];
    for image in &env.flash_extra_images {
        match image.kind() {
            Some(kind) => {
                copies.push((image.path.clone(), output_dir.join(kind.release_file_name(&tag))));
            }
            None => {
                warn!(path = %image.path.display(), "not a bootloader, partition or OTA image; skipped");
            }
        }
    }
    for (src, dest) in &copies {
        if is_same_file(src, dest) {
            return Err(Error::SameFile(dest.clone()));
        }
    }

    if options.clean {
        let sources: Vec<&Path> = copies.iter().map(|(src, _)| src.as_path()).collect();
        clean_dir(&output_dir, &sources)?;
    }
    fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;

    let mut files = Vec::new();

    let mut seen = HashSet::new();
    for (src, dest) in &copies {
        if !seen.insert(dest) {
            warn!(
                src = %src.display(),
                dest = %dest.display(),
                "destination already written by an earlier image; the last one listed is packaged"
            );
        }
        let written = copy_into(src, dest)?;
        if !files.contains(&written) {
            files.push(written);
        }
    }

    let flash_map = FlashMap::build(&env.flash_extra_images, &tag, app_entry);
    let flash_map_path = output_dir.join(format!("flash_map_{tag}.json"));
    fs::write(&flash_map_path, flash_map.to_json()?)
        .map_err(|e| Error::io(&flash_map_path, e))?;
    info!(path = %flash_map_path.display(), "flash map saved");
    files.push(flash_map_path.clone());

    Ok(PackageReport {
        tag,
        output_dir,
        files,
        flash_map_path,
        flash_map,
    })
}

fn copy_into(src: &Path, dest: &Path) -> Result<PathBuf> {
    if !src.is_file() {
        return Err(Error::MissingArtifact(src.to_path_buf()));
    }
    fs::copy(src, dest).map_err(|e| Error::io(dest, e))?;
    debug!(from = %src.display(), to = %dest.display(), "copied");
    Ok(dest.to_path_buf())
}

/// `true` when both paths name one existing file.
///
/// Copying a file onto itself truncates it to zero bytes.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Remove the regular files directly inside `dir`, except `keep`.
/// Subdirectories are kept.
fn clean_dir(dir: &Path, keep: &[&Path]) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(dir, e)),
    };
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && !keep.iter().any(|k| is_same_file(k, &path)) {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            debug!(path = %path.display(), "removed stale file");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::BuildFlags;
    use crate::flash_map::FlashImage;
    use tempfile::TempDir;

    fn env_in(tmp: &TempDir, version: &str) -> BuildEnv {
        let root = tmp.path();
        let build = root.join(".pio/build/esp32dev");
        fs::create_dir_all(&build).unwrap();
        let mut env = BuildEnv::new(root, &build);
        env.build_flags =
            BuildFlags::One(format!("-DFW_VERSION=\\\"{version}\\\" -DHW_TAG=hw1 -DMODEL=dev"));
        for (name, body) in [
            ("bootloader.bin", "BOOT"),
            ("partitions.bin", "PART"),
            ("boot_app0.bin", "OTA0"),
        ] {
            fs::write(build.join(name), body).unwrap();
        }
        env.flash_extra_images = vec![
            FlashImage::new("0x1000", build.join("bootloader.bin")),
            FlashImage::new("0x8000", build.join("partitions.bin")),
            FlashImage::new("0xe000", build.join("boot_app0.bin")),
        ];
        env
    }

    fn write_app(env: &BuildEnv) {
        let tag = env.build_info().unwrap().tag();
        fs::write(env.app_binary_path(&tag), b"APP").unwrap();
    }

    #[test]
    fn plan_does_not_need_files() {
        let mut env = BuildEnv::new("/nowhere", "/nowhere/build");
        env.build_flags = BuildFlags::One("-DFW_VERSION=3.1.0 -DHW_TAG=x -DMODEL=m".into());
        env.flash_extra_images = vec![FlashImage::new("0x1000", "bootloader.bin")];
        let map = plan_flash_map(&env).unwrap();
        assert_eq!(map.bootloader[0].file_name, "bootloader_m_v3.1.0.x.bin");
        assert_eq!(map.application[0].file_name, "m_v3.1.0.x.bin");
    }

    #[test]
    fn package_writes_everything() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(&tmp, "1.2.3");
        write_app(&env);

        let report = package(&env, PackageOptions::default()).unwrap();
        let out = tmp.path().join("build_outputs/1.2.3/dev");
        assert_eq!(report.output_dir, out);
        assert_eq!(report.files.len(), 5);
        assert_eq!(fs::read(out.join("dev_v1.2.3.hw1.bin")).unwrap(), b"APP");
        assert_eq!(fs::read(out.join("bootloader_dev_v1.2.3.hw1.bin")).unwrap(), b"BOOT");
        assert_eq!(fs::read(out.join("partitions_dev_v1.2.3.hw1.bin")).unwrap(), b"PART");
        assert_eq!(fs::read(out.join("ota_dev_v1.2.3.hw1.bin")).unwrap(), b"OTA0");
        assert_eq!(report.flash_map_path, out.join("flash_map_dev_v1.2.3.hw1.json"));
        let written = fs::read_to_string(&report.flash_map_path).unwrap();
        assert_eq!(FlashMap::from_json(&written).unwrap(), report.flash_map);
    }

    #[test]
    fn missing_app_binary_is_reported() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(&tmp, "1.2.3");
        match package(&env, PackageOptions::default()) {
            Err(Error::MissingArtifact(path)) => {
                assert!(path.ends_with("dev_v1.2.3.hw1.bin"));
            }
            other => panic!("expected MissingArtifact, got {other:?}"),
        }
        assert!(!tmp.path().join("build_outputs").exists());
    }

    #[test]
    fn missing_ota_image_is_reported() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(&tmp, "1.2.3");
        write_app(&env);
        env.flash_extra_images.truncate(2);
        assert!(matches!(
            package(&env, PackageOptions::default()),
            Err(Error::MissingImage(ImageKind::Ota))
        ));
    }

    #[test]
    fn clean_removes_stale_files_only_when_asked() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(&tmp, "1.2.3");
        write_app(&env);
        let out = tmp.path().join("build_outputs/1.2.3/dev");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.bin"), b"OLD").unwrap();

        package(&env, PackageOptions::default()).unwrap();
        assert!(out.join("stale.bin").exists());

        package(&env, PackageOptions { clean: true }).unwrap();
        assert!(!out.join("stale.bin").exists());
        assert!(out.join("dev_v1.2.3.hw1.bin").exists());
    }

    #[test]
    fn clean_dir_tolerates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        clean_dir(&tmp.path().join("absent"), &[]).unwrap();
    }

    #[test]
    fn build_dir_inside_output_dir_is_refused_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(&tmp, "1.0.0");
        let out = tmp.path().join("build_outputs/1.0.0/dev");
        fs::create_dir_all(&out).unwrap();
        env.build_dir = out.clone();
        fs::write(out.join("dev_v1.0.0.hw1.bin"), b"APP").unwrap();

        for clean in [false, true] {
            match package(&env, PackageOptions { clean }) {
                Err(Error::SameFile(path)) => assert!(path.ends_with("dev_v1.0.0.hw1.bin")),
                other => panic!("expected SameFile, got {other:?}"),
            }
            assert_eq!(fs::read(out.join("dev_v1.0.0.hw1.bin")).unwrap(), b"APP");
        }
    }

    #[test]
    fn auxiliary_image_from_earlier_output_is_refused() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(&tmp, "1.0.0");
        write_app(&env);
        package(&env, PackageOptions::default()).unwrap();

        let out = tmp.path().join("build_outputs/1.0.0/dev");
        env.flash_extra_images[0] =
            FlashImage::new("0x1000", out.join("bootloader_dev_v1.0.0.hw1.bin"));
        assert!(matches!(
            package(&env, PackageOptions::default()),
            Err(Error::SameFile(_))
        ));
        assert_eq!(
            fs::read(out.join("bootloader_dev_v1.0.0.hw1.bin")).unwrap(),
            b"BOOT"
        );
    }

    #[test]
    fn clean_keeps_sources_that_live_in_output_dir() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(&tmp, "1.0.0");
        write_app(&env);
        let out = tmp.path().join("build_outputs/1.0.0/dev");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("boot_app0.bin"), b"OTA1").unwrap();
        fs::write(out.join("stale.bin"), b"OLD").unwrap();
        env.flash_extra_images[2] = FlashImage::new("0xe000", out.join("boot_app0.bin"));

        package(&env, PackageOptions { clean: true }).unwrap();
        assert!(!out.join("stale.bin").exists());
        assert_eq!(fs::read(out.join("ota_dev_v1.0.0.hw1.bin")).unwrap(), b"OTA1");
    }

    #[test]
    fn copy_failure_names_the_destination() {
        let tmp = TempDir::new().unwrap();
        let env = env_in(&tmp, "1.0.0");
        write_app(&env);
        let blocked = tmp
            .path()
            .join("build_outputs/1.0.0/dev/bootloader_dev_v1.0.0.hw1.bin");
        fs::create_dir_all(&blocked).unwrap();

        match package(&env, PackageOptions::default()) {
            Err(Error::Io { path, .. }) => assert_eq!(path, blocked),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn progname_names_the_application_binary() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(&tmp, "1.0.0");
        env.progname = Some("firmware".to_owned());
        fs::write(env.build_dir.join("firmware.bin"), b"APP").unwrap();

        let report = package(&env, PackageOptions::default()).unwrap();
        assert_eq!(report.flash_map.application[0].file_name, "firmware.bin");
        assert_eq!(fs::read(report.output_dir.join("firmware.bin")).unwrap(), b"APP");
    }
}
