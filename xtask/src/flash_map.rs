use anyhow::{Context, Result};
use colored::Colorize;
use firmware_release::{plan_flash_map, BuildEnv, ImageKind};

pub fn run(env: &BuildEnv) -> Result<()> {
    let map = plan_flash_map(env).context("Failed to build flash map")?;

    for kind in ImageKind::AUXILIARY {
        if map.entries(kind).is_empty() {
            eprintln!(
                "{}",
                format!("⚠ No {kind} image in FLASH_EXTRA_IMAGES").yellow()
            );
        }
    }

    println!("{}", map.to_json()?);
    Ok(())
}
