//! Generate snapshot command implementation.
//!
//! Writes a sample site snapshot to start from.

use std::fs;
use std::path::Path;
use tracing::info;

use slymetrics::host::SiteSnapshot;

/// Writes [`SiteSnapshot::sample`] as JSON for `.json` paths, YAML otherwise.
pub fn command_generate_snapshot(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = SiteSnapshot::sample();
    let content = match output.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::to_string_pretty(&snapshot)?,
        _ => serde_yaml::to_string(&snapshot)?,
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
        return Ok(());
    }

    fs::write(output, content)?;
    info!("Sample snapshot written to {}", output.display());
    println!("✅ Sample snapshot written to: {}", output.display());
    Ok(())
}
