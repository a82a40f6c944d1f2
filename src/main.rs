//! mcpdesk - MCP package manager CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mcpdesk::{Manager, PackageEvent, PackageRecord, Paths, Response, Settings, Toolchain};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcpdesk")]
#[command(about = "MCP package manager - import, install, expose and run MCP servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resolved paths
    Paths,

    /// List managed packages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get or set a package's settings
    Settings {
        /// Package ID
        id: String,

        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Import a package from a zip archive
    Import {
        /// Path to the archive
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install an imported package
    Install {
        /// Package ID
        id: String,

        /// AI tool to expose the package to (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Uninstall a package
    Uninstall {
        /// Package ID
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a package in the foreground until it exits (Ctrl-C stops it)
    Run {
        /// Package ID
        id: String,
    },

    /// Connect or disconnect an AI tool
    ToggleTool {
        /// Package ID
        id: String,

        /// AI tool ID (e.g. claude, cursor)
        tool_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save credentials for an AI tool
    Credentials {
        /// AI tool ID
        tool_id: String,

        /// Credentials as a JSON document
        credentials: String,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show saved settings
    Get {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set values (KEY=VALUE). An empty value removes the key.
    Set {
        /// Settings as KEY=VALUE pairs
        #[arg(required = true)]
        pairs: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let paths = Paths::resolve();
    if let Commands::Paths = cli.command {
        print_paths(&paths);
        return;
    }

    let manager = match Manager::open(paths, Toolchain::resolve()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Paths => {}
        Commands::List { json } => match manager.list_packages() {
            Ok(packages) if json => print_json(&packages),
            Ok(packages) => print_list_table(&packages),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Settings { id, action } => match action {
            SettingsAction::Get { json } => match manager.get_settings(&id) {
                Ok(settings) if json => print_json(&settings),
                Ok(settings) if settings.is_empty() => println!("No settings saved."),
                Ok(settings) => {
                    for (k, v) in &settings {
                        println!("{} = {}", k, v);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            },
            SettingsAction::Set { pairs, json } => {
                let mut settings = match manager.get_settings(&id) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                };
                if let Err(bad) = apply_pairs(&mut settings, &pairs) {
                    eprintln!("Error: expected KEY=VALUE, got '{}'", bad);
                    std::process::exit(1);
                }
                let response = match manager.save_settings(&id, settings) {
                    Ok(warnings) => Response::ok(format!("Saved settings for {}", id)).with_warnings(warnings),
                    Err(e) => Response::from_error(&e),
                };
                finish(response, json);
            }
        },
        Commands::Import { archive, json } => {
            let response = match manager.import_package(&archive).await {
                Ok(outcome) => Response::ok(format!("Imported {} ({})", outcome.id, outcome.package_type))
                    .with_warnings(outcome.warnings.clone())
                    .with_data(&outcome),
                Err(e) => Response::from_error(&e),
            };
            finish(response, json);
        }
        Commands::Install { id, tools, json } => {
            let response = match manager.install(&id, &tools).await {
                Ok(outcome) => {
                    let message = if outcome.entry.degraded() {
                        format!("Installed {} with a placeholder entry point", id)
                    } else {
                        format!("Installed {}", id)
                    };
                    Response::ok(message)
                        .with_warnings(outcome.warnings.clone())
                        .with_data(&outcome.record)
                }
                Err(e) => Response::from_error(&e),
            };
            finish(response, json);
        }
        Commands::Uninstall { id, json } => {
            let response = match manager.uninstall(&id).await {
                Ok(outcome) => Response::ok(format!("Uninstalled {}", id))
                    .with_warnings(outcome.warnings.clone())
                    .with_data(&outcome),
                Err(e) => Response::from_error(&e),
            };
            finish(response, json);
        }
        Commands::Run { id } => run_foreground(&manager, &id).await,
        Commands::ToggleTool { id, tool_id, json } => {
            let response = match manager.toggle_tool_connection(&id, &tool_id) {
                Ok(toggle) => {
                    let state = if toggle.connected { "Connected" } else { "Disconnected" };
                    Response::ok(format!("{} {} for {}", state, tool_id, id))
                        .with_warnings(toggle.warnings.clone())
                        .with_data(&toggle)
                }
                Err(e) => Response::from_error(&e),
            };
            finish(response, json);
        }
        Commands::Credentials { tool_id, credentials } => {
            let value: serde_json::Value = match serde_json::from_str(&credentials) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error: credentials are not valid JSON: {}", e);
                    std::process::exit(1);
                }
            };
            let response = match manager.save_credentials(&tool_id, value) {
                Ok(()) => Response::ok(format!("Saved credentials for {}", tool_id)),
                Err(e) => Response::from_error(&e),
            };
            finish(response, false);
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Start `id` and relay its events until it exits. Ctrl-C requests a stop.
async fn run_foreground(manager: &Manager, id: &str) {
    let mut events = manager.events().subscribe();
    if let Err(e) = manager.start(id) {
        finish(Response::from_error(&e), false);
        return;
    }
    println!("Started {} (Ctrl-C to stop)", id);

    let mut stop_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.package_id() != id => {}
                Ok(PackageEvent::Output { line, .. }) => println!("[{}] {}", id, line),
                Ok(PackageEvent::Error { line, .. }) => eprintln!("[{}] {}", id, line),
                Ok(PackageEvent::Warning { message, .. }) => eprintln!("Warning: {}", message),
                Ok(PackageEvent::Stopped { code, .. }) => {
                    match code {
                        Some(code) => println!("{} exited with code {}", id, code),
                        None => println!("{} terminated", id),
                    }
                    if code.unwrap_or(0) != 0 && !stop_requested {
                        std::process::exit(1);
                    }
                    return;
                }
                Err(RecvError::Lagged(skipped)) => eprintln!("Warning: {} output lines dropped", skipped),
                Err(RecvError::Closed) => return,
            },
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                if let Err(e) = signal {
                    eprintln!("Warning: cannot listen for Ctrl-C: {}", e);
                }
                stop_requested = true;
                if let Err(e) = manager.stop(id) {
                    eprintln!("Error: {}", e);
                    return;
                }
                println!("Stopping {}...", id);
            }
        }
    }
}

/// Merge KEY=VALUE pairs into `settings`. Returns the first malformed pair.
fn apply_pairs(settings: &mut Settings, pairs: &[String]) -> Result<(), String> {
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(pair.clone());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(pair.clone());
        }
        if value.is_empty() {
            settings.remove(key);
        } else {
            settings.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

/// Print the result and exit non-zero on failure.
fn finish(response: Response, json: bool) {
    if json {
        print_json(&response);
    } else {
        for warning in &response.warnings {
            eprintln!("Warning: {}", warning);
        }
        if response.success {
            println!("{}", response.message);
        } else {
            eprintln!("Error: {}", response.message);
            if response.requires_config {
                eprintln!("Missing settings:");
                let fields = response.config_schema.as_ref().map(|s| s.fields()).unwrap_or_default();
                for name in &response.required_fields {
                    match fields.iter().find(|f| &f.name == name) {
                        Some(field) => match &field.description {
                            Some(d) => eprintln!("  {} ({}): {}", name, field.title, d),
                            None => eprintln!("  {} ({})", name, field.title),
                        },
                        None => eprintln!("  {}", name),
                    }
                }
                eprintln!("Set them with: mcpdesk settings <id> set KEY=VALUE");
            }
            if let Some(tool) = &response.tool_id {
                eprintln!("Save credentials first: mcpdesk credentials {} '<json>'", tool);
            }
        }
    }
    if !response.success {
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_paths(paths: &Paths) {
    println!("Data dir:        {}", paths.data_dir.display());
    println!("Packages dir:    {}", paths.packages_dir().display());
    println!("Registry:        {}", paths.store_path().display());
    println!("Registry exists: {}", paths.store_path().exists());
    println!("External config: {}", paths.external_config().display());
}

fn print_list_table(packages: &[PackageRecord]) {
    const INDENT: &str = "        ";

    if packages.is_empty() {
        println!("No packages.");
        return;
    }
    for p in packages {
        let state = match (p.installed, p.running) {
            (_, true) => "running",
            (true, false) => "installed",
            (false, false) => "imported",
        };
        let tools: Vec<&str> = p
            .ai_tools
            .iter()
            .filter(|t| t.connected)
            .map(|t| t.name.as_str())
            .collect();

        println!("{}", p.id);
        println!("{}Name:      {}", INDENT, p.name);
        println!("{}Version:   {}", INDENT, p.version.as_deref().unwrap_or("?"));
        println!("{}Type:      {}", INDENT, p.package_type);
        println!("{}State:     {}", INDENT, state);
        if let Some(dir) = &p.path {
            println!("{}Path:      {}", INDENT, dir.display());
        }
        if !tools.is_empty() {
            println!("{}Tools:     {}", INDENT, tools.join(", "));
        }
        if p.has_config {
            println!("{}Config:    required", INDENT);
        }
        println!();
    }
}
