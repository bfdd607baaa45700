use anyhow::Result;
use firmware_release::{resolve_tag, BuildEnv};

/// Print the tag on stdout, alone, so a build script can capture it.
pub fn run(env: &BuildEnv) -> Result<()> {
    let (_, tag) = resolve_tag(env)?;
    println!("{tag}");
    Ok(())
}
