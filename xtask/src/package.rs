use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use firmware_release::{package, BuildEnv, PackageOptions, PackageReport};

pub fn run(env: &BuildEnv, clean: bool) -> Result<()> {
    println!();
    println!("{}", "📦 Packaging firmware release...".cyan().bold());
    println!();

    let start = Instant::now();
    let report = package(env, PackageOptions { clean }).context("Packaging failed")?;

    print_report(&report);
    println!(
        "{}",
        format!(
            "✓ {} packaged in {:.2}s",
            report.tag,
            start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();
    Ok(())
}

fn print_report(report: &PackageReport) {
    println!("   {}", report.output_dir.display().to_string().dimmed());
    for file in &report.files {
        println!("   {} {}", "•".cyan(), display_name(file));
    }
    println!();
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
