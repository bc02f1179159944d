use clap::Parser;
use sensorthings_sync::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = commands::run(args) => result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    eprintln!("Failed to listen for CTRL+C: {}", e);
                }
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(sensorthings_sync::Error::processing_interrupted(
                    "Upload interrupted by user",
                ))
            }
        }
    });

    match result {
        Ok(_stats) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("sensorthings-sync - station caches and SensorThings mirroring");
    println!("==============================================================");
    println!();
    println!("Inspect the per-station observation and metadata caches, and mirror");
    println!("them idempotently into a SensorThings-style entity store.");
    println!();
    println!("USAGE:");
    println!("    sensorthings-sync <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    status         List cached stations of a provider");
    println!("    metadata       Print a station's cached metadata as JSON");
    println!("    observations   Query cached observations by time range");
    println!("    upload         Mirror a station into the entity store");
    println!("    help           Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    sensorthings-sync status -p wu");
    println!("    sensorthings-sync observations -p wu -s KCASANFR1 \\");
    println!("                      --start 2020-01-01 --end 2020-01-02 --format json");
    println!("    sensorthings-sync upload -p wu -s KCASANFR1 --start 2020-01-01 \\");
    println!("                      --end 2020-01-31 --remote-url https://host/FROST-Server/v1.1");
    println!();
    println!("For detailed help on any command, use:");
    println!("    sensorthings-sync <COMMAND> --help");
}
