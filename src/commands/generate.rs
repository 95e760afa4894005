use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::MultiProgress;

use crate::{
    configuration::{self, Configuration, Settings},
    errors::GenerationError,
    fal::FalClient,
    pipeline::{Completed, Pipeline},
    report::{self, ConsoleObserver, ExitOutcome},
    schema::{
        Constraint, DefaultValue, GenerationRequest, ModelSchema, OptionSpec, Positional,
        Presence, RawOptions,
    },
};

const INPUT: &str = "input";
const OUTPUT_DIR: &str = "output-dir";
const STRICT: &str = "strict";
const ENV_FILE: &str = "env-file";

/// Flags shared by every generation subcommand.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFlags {
    pub output_dir: Option<PathBuf>,
    pub strict: bool,
    pub env_file: PathBuf,
}

fn flag_default(spec: &OptionSpec) -> bool {
    matches!(spec.presence, Presence::Default(DefaultValue::Flag(true)))
}

fn option_help(spec: &OptionSpec) -> String {
    match spec.presence {
        Presence::Default(value) => format!(
            "{} Expects {}. [default: {value}]",
            spec.help, spec.constraint
        ),
        _ => format!("{} Expects {}.", spec.help, spec.constraint),
    }
}

/// Builds the clap subcommand for one model from its schema table.
pub fn command_for(schema: &'static ModelSchema) -> Command {
    let mut command = Command::new(schema.name).about(schema.summary);

    for positional in schema.positionals {
        let arg = match positional {
            Positional::Input => Arg::new(INPUT)
                .value_name("INPUT")
                .help("Input image, as a local path or a URL.")
                .required(true),
            Positional::Option(key) => {
                let required = schema
                    .option(key)
                    .is_some_and(|spec| spec.presence == Presence::Required);
                Arg::new(*key)
                    .value_name(key.to_uppercase())
                    .help(schema.option(key).map(|spec| spec.help).unwrap_or_default())
                    .required(required)
            }
        };
        command = command.arg(arg);
    }

    for spec in schema.flagged_options() {
        let arg = Arg::new(spec.key).long(spec.flag);
        let arg = match spec.constraint {
            Constraint::Flag => arg.action(ArgAction::SetTrue).help(spec.help),
            _ => arg
                .value_name(spec.key.to_uppercase())
                .help(option_help(spec))
                .allow_hyphen_values(true),
        };
        command = command.arg(arg);
    }

    command
        .arg(
            Arg::new(OUTPUT_DIR)
                .long("output")
                .short('o')
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help(
                    "Write artifacts into this directory instead of the model's output category.",
                ),
        )
        .arg(
            Arg::new(STRICT)
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Fail unless every artifact is saved."),
        )
        .arg(
            Arg::new(ENV_FILE)
                .long("env-file")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(".env")
                .help("Environment file to read the API key from."),
        )
}

/// Collects positionals and flags into a raw request. Values are not checked
/// here; that is the validator's job.
pub fn request_from_matches(
    schema: &'static ModelSchema,
    matches: &ArgMatches,
) -> (GenerationRequest, RunFlags) {
    let mut inputs = Vec::new();
    let mut options = RawOptions::new();

    for positional in schema.positionals {
        match positional {
            Positional::Input => {
                if let Some(input) = matches.get_one::<String>(INPUT) {
                    inputs.push(input.clone());
                }
            }
            Positional::Option(key) => {
                if let Some(value) = matches.get_one::<String>(key) {
                    options.insert(key.to_string(), value.clone());
                }
            }
        }
    }

    for spec in schema.flagged_options() {
        match spec.constraint {
            Constraint::Flag => {
                if matches.get_flag(spec.key) {
                    options.insert(spec.key.to_string(), (!flag_default(spec)).to_string());
                }
            }
            _ => {
                if let Some(value) = matches.get_one::<String>(spec.key) {
                    options.insert(spec.key.to_string(), value.clone());
                }
            }
        }
    }

    let flags = RunFlags {
        output_dir: matches.get_one::<PathBuf>(OUTPUT_DIR).cloned(),
        strict: matches.get_flag(STRICT),
        env_file: matches
            .get_one::<PathBuf>(ENV_FILE)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".env")),
    };
    (GenerationRequest::new(schema, inputs, options), flags)
}

async fn load_settings(env_file: &Path) -> Result<Settings, GenerationError> {
    let configuration_error =
        |e: anyhow::Error| GenerationError::Configuration(format!("{e:#}"));
    configuration::load_env_file(env_file).map_err(configuration_error)?;
    let file = Configuration::load().await.map_err(configuration_error)?;
    Settings::resolve(&file, |key| std::env::var(key).ok())
}

async fn generate(
    request: &GenerationRequest,
    flags: &RunFlags,
) -> Result<Completed, GenerationError> {
    let settings = load_settings(&flags.env_file).await?;
    let progress = MultiProgress::new();
    let client = FalClient::new(&settings, progress.clone())
        .map_err(|e| GenerationError::Configuration(format!("{e:#}")))?;
    let observer = ConsoleObserver::new(progress);

    Pipeline::new(&client, &settings)
        .with_output_dir(flags.output_dir.clone())
        .with_observer(&observer)
        .execute(request)
        .await
}

pub async fn process_generation(
    schema: &'static ModelSchema,
    matches: &ArgMatches,
) -> ExitOutcome {
    let (request, flags) = request_from_matches(schema, matches);
    tracing::debug!(
        model = schema.name,
        inputs = ?request.inputs(),
        options = ?request.options(),
        "parsed request"
    );
    report::run(generate(&request, &flags), flags.strict).await
}
