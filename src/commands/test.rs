//! Test command implementation.
//!
//! Renders the metrics page without starting the server.

use std::time::Instant;

use slymetrics::config::Config;
use slymetrics::secrets::SecretEnv;
use slymetrics::state::AppState;

/// Renders the metrics page `iterations` times and reports timings.
pub fn command_test(
    iterations: usize,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 slymetrics - Test Mode");
    println!("=========================");

    let state = AppState::from_config(config.clone(), SecretEnv::from_process())?;
    let cache = state.dispatcher.cache();

    for iteration in 1..=iterations.max(1) {
        println!("\n🔄 Iteration {}/{}:", iteration, iterations.max(1));

        let start = Instant::now();
        let body = cache.get_metrics();
        let duration = start.elapsed();

        let families = body.lines().filter(|l| l.starts_with("# TYPE")).count();
        let samples = body
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .count();

        println!(
            "   ⏱️  Render duration: {:.2}ms",
            duration.as_secs_f64() * 1000.0
        );
        println!("   📊 {} metric families, {} samples", families, samples);

        if verbose && iteration == 1 {
            println!();
            print!("{}", body);
        }
    }

    println!("\n✅ Test completed successfully");
    Ok(())
}
