pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use brewline_core::recommendations::DEFAULT_MAX_RECOMMENDATIONS;

#[derive(Debug, Parser)]
#[command(
    name = "brewline",
    about = "Brewline operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and query the recommendation datasets.",
    after_help = "Examples:\n  brewline doctor --json\n  brewline config\n  brewline recommend apriori Latte \"Chocolate Croissant\" -k 3\n  brewline recommend popular --category Coffee --category Bakery"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and recommendation dataset readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run deterministic recommendation queries against the configured datasets")]
    Recommend {
        #[command(subcommand)]
        query: RecommendQuery,
    },
}

#[derive(Debug, Subcommand)]
enum RecommendQuery {
    #[command(about = "Items frequently bought together with the given products")]
    Apriori {
        #[arg(required = true, help = "Products already in the basket")]
        products: Vec<String>,
        #[arg(short, long, default_value_t = DEFAULT_MAX_RECOMMENDATIONS)]
        k: usize,
    },
    #[command(about = "Best sellers, optionally restricted to categories")]
    Popular {
        #[arg(long = "category", help = "Restrict to this category (repeatable)")]
        categories: Vec<String>,
        #[arg(short, long, default_value_t = DEFAULT_MAX_RECOMMENDATIONS)]
        k: usize,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Recommend { query: RecommendQuery::Apriori { products, k } } => {
            commands::recommend::apriori(&products, k)
        }
        Command::Recommend { query: RecommendQuery::Popular { categories, k } } => {
            commands::recommend::popular(categories, k)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
