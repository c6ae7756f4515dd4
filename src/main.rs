use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use runman::{
    logging, parse_collection_text, parse_environment_text, ExecutionSummary, RunOptions, Runner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Run a Postman-style collection from the command line.
#[derive(Debug, Parser)]
#[command(name = "runman", version, about)]
struct Args {
    /// Collection JSON file to execute.
    collection: PathBuf,

    /// Environment JSON file layered over the collection variables.
    #[arg(long)]
    environment: Option<PathBuf>,

    /// Report format printed to stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Also write the JSON summary to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Per-request timeout; 0 disables the deadline.
    #[arg(long, default_value_t = 30_000)]
    request_timeout_ms: u64,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(summary) if summary.failed == 0 && summary.errors == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<ExecutionSummary, String> {
    let raw = fs::read_to_string(&args.collection)
        .map_err(|err| format!("failed to read `{}`: {err}", args.collection.display()))?;
    let collection = parse_collection_text(&raw).map_err(|err| err.to_string())?;

    let environment = match &args.environment {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|err| format!("failed to read `{}`: {err}", path.display()))?;
            Some(parse_environment_text(&raw).map_err(|err| err.to_string())?)
        }
        None => None,
    };

    let options = RunOptions {
        request_timeout_ms: (args.request_timeout_ms > 0).then_some(args.request_timeout_ms),
        ..RunOptions::default()
    };

    let runner = Runner::new(options);
    let summary = runner.run(&collection, environment.as_ref()).await;

    let json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed to encode summary: {err}"))?;
    match args.output {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Text => print_text(&summary),
    }
    if let Some(path) = &args.report {
        fs::write(path, &json)
            .map_err(|err| format!("failed to write report `{}`: {err}", path.display()))?;
    }

    Ok(summary)
}

fn print_text(summary: &ExecutionSummary) {
    for result in &summary.results {
        let marker = if result.success { "PASS" } else { "FAIL" };
        let status = result
            .status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{marker} {} {} [{status}]", result.request_name, result.request_url);

        if let Some(error) = &result.error {
            println!("     error: {error}");
        }
        for test in &result.test_results {
            let marker = if test.passed { "ok" } else { "failed" };
            match &test.error {
                Some(error) => println!("     {marker}: {} ({error})", test.test_name),
                None => println!("     {marker}: {}", test.test_name),
            }
        }
    }

    println!(
        "{} requests: {} passed, {} failed, {} errors in {} ms",
        summary.total, summary.passed, summary.failed, summary.errors, summary.total_time
    );
}
