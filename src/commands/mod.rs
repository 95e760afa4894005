use clap::Subcommand;

mod config;
pub mod generate;
pub mod models;

pub use config::{ConfigOptions, process_config_options};
pub use generate::{command_for, process_generation};

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Inspect or modify the persisted configuration.")]
    Config(ConfigOptions),
    #[command(about = "List the supported models and their options.")]
    Models,
}
