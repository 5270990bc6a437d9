//! Lagrange Hydro CLI - Run a hydro problem from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use lagrange_hydro::{
    compute::{Driver, ForceModels, Hydro, LocalSubstrate},
    schema::HydroConfig,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [zones.json]", args[0]);
        eprintln!();
        eprintln!("Run a Lagrangian hydro problem from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to problem configuration file");
        eprintln!("  zones.json   Optional output file for final zone state");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let zones_path = args.get(2).map(PathBuf::from);

    let config = HydroConfig::from_json_file(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    println!("Lagrange Hydro");
    println!("==============");
    println!(
        "Mesh: {}x{} zones over {} x {} (chunk size {})",
        config.mesh.nzones_x, config.mesh.nzones_y, config.mesh.len_x, config.mesh.len_y, config.mesh.chunk_size
    );
    println!("cfl: {}, cflv: {}", config.cfl, config.cflv);
    println!(
        "Stop: t = {} or cycle {}",
        config.driver.tstop, config.driver.cstop
    );
    println!();

    let hydro = Hydro::from_config(&config, ForceModels::inert(), Arc::new(LocalSubstrate::single()))
        .unwrap_or_else(|e| {
            eprintln!("Error building solver: {}", e);
            std::process::exit(1);
        });

    let initial = hydro.energy_check().unwrap_or_else(|e| {
        eprintln!("Error in energy check: {}", e);
        std::process::exit(1);
    });
    println!("Initial state:");
    println!("  {}", initial);
    println!();

    let mut driver = Driver::new(config.driver.clone(), hydro);

    println!("Running...");
    let start = Instant::now();
    let last = loop {
        if driver.is_done() {
            break None;
        }
        match driver.step() {
            Ok(report) => {
                let every = (config.driver.cstop / 10).max(1);
                if report.cycle % every == 0 {
                    println!(
                        "  Cycle {}: t = {:.6e}, dt = {:.6e} ({})",
                        report.cycle,
                        report.time,
                        report.dt.dt,
                        report.dt.message()
                    );
                }
            }
            Err(e) => break Some(e),
        }
    };
    if let Some(e) = last {
        eprintln!("Error in cycle {}: {}", driver.cycle() + 1, e);
        std::process::exit(1);
    }
    let elapsed = start.elapsed();

    let hydro = driver.hydro();
    let final_energy = hydro.energy_check().unwrap_or_else(|e| {
        eprintln!("Error in energy check: {}", e);
        std::process::exit(1);
    });

    println!();
    println!("Final state:");
    println!("  {}", final_energy);
    println!("  Energy drift: {:.3e}", final_energy.relative_drift(&initial));
    println!(
        "Time: {:.2}s ({} cycles, {:.1} cycles/s)",
        elapsed.as_secs_f32(),
        driver.cycle(),
        driver.cycle() as f32 / elapsed.as_secs_f32()
    );

    if let Some(path) = zones_path {
        let records = hydro.zone_records().unwrap_or_else(|e| {
            eprintln!("Error collecting zones: {}", e);
            std::process::exit(1);
        });
        let json = serde_json::to_string_pretty(&records).unwrap_or_else(|e| {
            eprintln!("Error serializing zones: {}", e);
            std::process::exit(1);
        });
        if let Err(e) = fs::write(&path, json) {
            eprintln!("Error writing {}: {}", path.display(), e);
            std::process::exit(1);
        }
        println!("Wrote {} zones to {}", records.len(), path.display());
    }
}

fn print_example_config() {
    let config = HydroConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
