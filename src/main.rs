use std::process::ExitCode;

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use falgen::{commands, schema};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "falgen",
    version,
    about = "Generate images and videos with fal.ai hosted models."
)]
pub struct Cli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Raise log verbosity, repeat for more."
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn cli_command() -> clap::Command {
    schema::SCHEMAS
        .iter()
        .fold(Cli::command(), |command, schema| {
            command.subcommand(commands::command_for(schema))
        })
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut command = cli_command();
    let matches = command.get_matches_mut();
    init_tracing(matches.get_count("verbose"));

    if let Some((name, sub_matches)) = matches.subcommand()
        && let Some(schema) = schema::find(name)
    {
        let outcome = commands::process_generation(schema, sub_matches).await;
        return ExitCode::from(outcome.code);
    }

    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.format(&mut command).exit(),
    };
    match cli.command {
        Some(commands::Commands::Config(options)) => {
            if let Err(e) = commands::process_config_options(&options).await {
                eprintln!("[configuration] {e:#}");
                return ExitCode::from(3);
            }
        }
        Some(commands::Commands::Models) => commands::models::process_models(),
        None => {
            let _ = command.print_help();
        }
    }
    ExitCode::SUCCESS
}
