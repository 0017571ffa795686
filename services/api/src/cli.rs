use crate::demo::{run_demo, run_evaluate, DemoArgs, EvaluateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use scheme_finder::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Scheme Finder",
    about = "Match citizen profiles against welfare scheme catalogs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate a single profile against a catalog and print the verdicts
    Evaluate(EvaluateArgs),
    /// Walk through profile updates, cache invalidation, and a catalog swap
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Catalog file (JSON or CSV) to load instead of APP_CATALOG_PATH
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluate(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn evaluate_accepts_repeated_attributes() {
        let cli = Cli::try_parse_from([
            "scheme-finder-api",
            "evaluate",
            "--age",
            "45",
            "--state",
            "gj",
            "--gender",
            "male",
            "--income-bracket",
            "BELOW_1_LAKH",
            "--attr",
            "occupation=farmer",
            "--attr",
            "land_acres=3",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Evaluate(args)) => {
                assert_eq!(args.age, 45);
                assert_eq!(args.attributes.len(), 2);
            }
            other => panic!("expected evaluate command, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_age() {
        let result = Cli::try_parse_from([
            "scheme-finder-api",
            "evaluate",
            "--age",
            "130",
            "--state",
            "GJ",
            "--gender",
            "Male",
            "--income-bracket",
            "BELOW_1_LAKH",
        ]);
        assert!(result.is_err());
    }
}
