//! Simple layout example: run the pipeline on a network file and print
//! where everything lands.

use oneline::prelude::*;
use std::path::Path;

fn main() -> Result<(), OnelineError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/radial.json".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example simple_layout [path/to/network.json]");
        std::process::exit(1);
    }

    let network = OnelineCore::load_network(path)?;
    let result = OnelineCore::run(network, &PipelineOptions::default())?;

    println!("Layout for: {}", path.display());
    println!("Diagnostics: {}", result.total_diagnostics());
    println!();

    for issue in &result.validation.errors {
        println!("  ERROR {}: {}", issue.code, issue.message);
    }
    for alert in result.all_alerts() {
        println!("  {:?} {}: {}", alert.level, alert.code, alert.message);
    }

    let Some(layout) = result.layout else {
        println!("\nNo layout (errors above).");
        std::process::exit(1);
    };

    println!("Buses:");
    for bus in &layout.buses {
        if let Some(at) = bus.position {
            println!("  {:<12} tier {} at ({:.0}, {:.0})", bus.tag, bus.tier_row, at.x, at.y);
        }
    }

    println!("\nChains:");
    for chain in &layout.chains {
        println!(
            "  {} -> {}: {}",
            chain.from_bus,
            chain.to_bus,
            chain.elements.join(" / ")
        );
    }

    Ok(())
}
