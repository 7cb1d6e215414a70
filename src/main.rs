use schema_builder::builder::BuilderService;
use schema_builder::command::{Command, Dispatcher};
use schema_builder::config::BuilderConfig;
use schema_builder::state::StateRegistry;
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <commands.json> [options]", args[0]);
        eprintln!();
        eprintln!("Options:");
        eprintln!("  -o, --output <file>   Output file (default: stdout)");
        eprintln!("  -c, --config <file>   Builder config (JSON)");
        process::exit(1);
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut config_path: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                i += 1;
                if i < args.len() {
                    output_path = Some(args[i].clone());
                }
            }
            "-c" | "--config" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(args[i].clone());
                }
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            let text = fs::read_to_string(&path).unwrap_or_else(|e| {
                eprintln!("Failed to read {}: {}", path, e);
                process::exit(1);
            });
            BuilderConfig::from_json(&text).unwrap_or_else(|e| {
                eprintln!("Config error: {}", e);
                process::exit(1);
            })
        }
        None => BuilderConfig::default(),
    };

    let input = match fs::read_to_string(input_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", input_path, e);
            process::exit(1);
        }
    };

    let commands: Vec<Command> = match serde_json::from_str(&input) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid command script: {}", e);
            process::exit(1);
        }
    };

    let registry = StateRegistry::new();
    let mut dispatcher = Dispatcher::new(BuilderService::from_registry(&registry, config));
    let sender = dispatcher.sender();
    for command in commands {
        if let Err(e) = sender.send(command) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }

    let report = dispatcher.run_pending();
    for err in &report.failed {
        eprintln!("Command failed: {}", err);
    }

    let output = match serde_json::to_string_pretty(&registry.snapshot()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to serialize state: {}", e);
            process::exit(1);
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &output) {
                eprintln!("Failed to write {}: {}", path, e);
                process::exit(1);
            }
        }
        None => println!("{}", output),
    }

    if !report.is_ok() {
        process::exit(1);
    }
}
