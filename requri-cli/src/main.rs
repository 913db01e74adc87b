use clap::Parser;
use colored::Colorize;
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use requri_core::builder::build;
use requri_core::config::HttpMethod;
use requri_core::error::TaskError;
use requri_core::outcome::{self, TaskOutcome};

mod reqwest_client;

/// requri — Run one declarative HTTP request task and print its result record
#[derive(Parser, Debug)]
#[command(name = "requri", version, about = "Run one declarative HTTP request task")]
struct Cli {
    /// Path to a JSON file with the task parameters (`-` reads stdin)
    #[arg(required_unless_present = "args", conflicts_with = "args")]
    file: Option<PathBuf>,

    /// Task parameters as an inline JSON object
    #[arg(short, long)]
    args: Option<String>,

    /// Log request details to stderr and print a colored summary
    #[arg(short, long)]
    verbose: bool,

    /// Validate the parameters and print the request descriptor without sending it
    #[arg(short, long)]
    dry_run: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let raw = match load_params(&cli) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{} {}", "✖".red().bold(), e);
            emit(
                &json!({"changed": false, "failed": true, "stage": "input", "msg": e}),
                cli.pretty,
            );
            process::exit(1);
        }
    };

    if cli.dry_run {
        match build(&raw) {
            Ok(config) => {
                eprintln!("{}", "(dry-run: request not sent)".dimmed().italic());
                emit(&json!({"changed": false, "failed": false, "request": config}), cli.pretty);
                return;
            }
            Err(e) => {
                let outcome = TaskOutcome::from_error(&TaskError::from(e), false);
                finish(&outcome, &cli);
            }
        }
    }

    let client = reqwest_client::ReqwestClient::new();
    let outcome = outcome::run(&client, &raw);
    finish(&outcome, &cli);
}

/// Logs go to stderr; stdout carries only the outcome.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,requri=debug,requri_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_params(cli: &Cli) -> Result<Value, String> {
    let (source, contents) = match (&cli.args, &cli.file) {
        (Some(inline), _) => ("--args".to_string(), inline.clone()),
        (None, Some(path)) if path.as_os_str() == "-" => (
            "stdin".to_string(),
            io::read_to_string(io::stdin()).map_err(|e| format!("Error reading stdin: {}", e))?,
        ),
        (None, Some(path)) => (
            path.display().to_string(),
            fs::read_to_string(path)
                .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?,
        ),
        (None, None) => return Err("no task parameters given".to_string()),
    };

    serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON in {}: {}", source, e))
}

fn finish(outcome: &TaskOutcome, cli: &Cli) -> ! {
    if cli.verbose {
        print_summary(outcome);
    }
    match outcome.to_json() {
        Ok(value) => emit(&value, cli.pretty),
        Err(e) => {
            eprintln!("{} Failed to serialize result: {}", "✖".red().bold(), e);
            process::exit(1);
        }
    }
    process::exit(if outcome.failed { 1 } else { 0 });
}

fn emit(value: &Value, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{} Failed to render output: {}", "✖".red().bold(), e),
    }
}

fn print_summary(outcome: &TaskOutcome) {
    let Some(record) = outcome.record() else {
        eprintln!(
            "{} {}",
            "✖".red().bold(),
            outcome.msg.as_deref().unwrap_or("task failed")
        );
        return;
    };

    let method_colored = match record.method {
        HttpMethod::Get => "GET".green().bold(),
        HttpMethod::Post => "POST".yellow().bold(),
        HttpMethod::Put => "PUT".blue().bold(),
        HttpMethod::Patch => "PATCH".magenta().bold(),
        HttpMethod::Delete => "DELETE".red().bold(),
        HttpMethod::Head => "HEAD".cyan().bold(),
        HttpMethod::Options => "OPTIONS".white().bold(),
    };

    let status = format!("{} {}", record.status_code, record.reason);
    let status_colored = match record.status_code {
        200..=299 => status.green().bold(),
        300..=399 => status.cyan().bold(),
        400..=499 => status.yellow().bold(),
        500..=599 => status.red().bold(),
        _ => status.white().bold(),
    };

    for hop in &record.history {
        eprintln!("  {} {} {}", "↳".dimmed(), hop.status_code, hop.url.dimmed());
    }
    eprintln!(
        "{} {} {} {}",
        method_colored,
        record.url.underline(),
        status_colored,
        format!("({} µs)", record.elapsed).dimmed()
    );
    if record.changed {
        eprintln!("  {}", "changed".yellow());
    }
    if let Some(ref msg) = outcome.msg {
        eprintln!("{} {}", "✖".red().bold(), msg);
    }
}
