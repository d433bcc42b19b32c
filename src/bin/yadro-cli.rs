use std::path::PathBuf;

use axum::http::Method;
use clap::{Parser, Subcommand};
use serde_json::json;

use yadro::config::{load_config, AppConfig};
use yadro::http::RequestInfo;
use yadro::pipeline::Pipeline;
use yadro::{demo, Components, Kernel};

#[derive(Parser)]
#[command(name = "yadro-cli")]
#[command(about = "Inspect a yadro configuration without starting a server", long_about = None)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and boot a kernel
    Check,
    /// List the compiled route table
    Routes,
    /// Show which route a request resolves to
    Resolve {
        method: String,
        path: String,
        #[arg(long)]
        ajax: bool,
    },
    /// Print pipeline statistics
    Pipeline,
    /// Run a request through the kernel and print the response
    Handle {
        method: String,
        target: String,
        #[arg(long)]
        ajax: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    let kernel = Kernel::boot(config, &Components::new(demo::registry()))?;

    match cli.command {
        Commands::Check => {
            let stats = kernel.router().stats();
            println!(
                "ok: {} static, {} dynamic, {} rejected routes; {} middleware",
                stats.static_routes,
                stats.dynamic_routes,
                stats.rejected_routes,
                kernel.pipeline().count()
            );
        }
        Commands::Routes => {
            let mut routes = kernel.router().routes();
            routes.sort_by(|a, b| {
                a.pattern()
                    .cmp(b.pattern())
                    .then_with(|| a.method().as_str().cmp(b.method().as_str()))
            });
            for route in routes {
                let marker = if kernel.handlers().contains(route.handler()) {
                    ""
                } else {
                    "  (unregistered)"
                };
                println!(
                    "{:<7} {:<32} {}{}",
                    route.method(),
                    route.pattern(),
                    route.handler(),
                    marker
                );
            }
        }
        Commands::Resolve { method, path, ajax } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let route = kernel.router().resolve(&path, &method, ajax);
            let out = json!({
                "pattern": route.pattern(),
                "method": route.method().as_str(),
                "handler": route.handler().to_string(),
                "parameters": route.parameters(),
                "error": route.error_kind().map(|e| e.status().as_u16()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Pipeline => {
            println!("{}", serde_json::to_string_pretty(&kernel.pipeline().statistics())?);
        }
        Commands::Handle { method, target, ajax } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = RequestInfo::new(method, &target);
            if ajax {
                request = request.with_header("x-requested-with", "XMLHttpRequest");
            }
            let outgoing = kernel.handle(request);
            println!("{}", outgoing.status);
            for (name, value) in &outgoing.headers {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            println!();
            println!("{}", outgoing.body_text());
        }
    }

    Ok(())
}
