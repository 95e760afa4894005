use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};

use crate::configuration::{
    Configuration, DEFAULT_OUTPUT_ROOT, DEFAULT_POLL_INTERVAL_MS, config_file_path,
};

#[derive(Args)]
pub struct ConfigOptions {
    #[command(subcommand, help = "Inspect or modify falgen configuration.")]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Inspect specific configuration.")]
    Get {
        #[command(subcommand)]
        action: ReadableContent,
    },
    #[command(about = "Modify specific configuration.")]
    Set {
        #[command(subcommand)]
        action: WriteableContent,
    },
    #[command(about = "Clear specific configuration.")]
    Clear {
        #[command(subcommand)]
        action: ReadableContent,
    },
    #[command(about = "Show all configuration.")]
    All,
}

#[derive(Subcommand)]
pub enum WriteableContent {
    #[command(name = "api-key", about = "Operate fal.ai API key.")]
    ApiKey {
        #[arg(help = "fal.ai API key.")]
        key: String,
    },
    #[command(name = "enable-proxy", about = "Switch whether to use a proxy server.")]
    EnableProxy {
        #[arg(help = "Proxy enable state.")]
        flag: Option<bool>,
    },
    #[command(name = "proxy", about = "Operate proxy.")]
    Proxy {
        #[arg(help = "Proxy server URL.")]
        url: String,
        #[arg(long, short = 'u', help = "Username for Proxy server authentication.")]
        username: Option<String>,
        #[arg(long, short = 'p', help = "Password for Proxy server authentication.")]
        password: Option<String>,
    },
    #[command(name = "output", about = "Root directory for generated files.")]
    Output {
        #[arg(help = "Output root directory.")]
        path: PathBuf,
    },
    #[command(name = "poll-interval", about = "Job status polling interval.")]
    PollInterval {
        #[arg(
            help = "Interval in milliseconds.",
            value_parser = clap::value_parser!(u64).range(100..)
        )]
        millis: u64,
    },
}

#[derive(Subcommand)]
pub enum ReadableContent {
    #[command(name = "api-key", about = "Show fal.ai API key.")]
    ApiKey,
    #[command(name = "proxy", about = "Show proxy.")]
    Proxy,
    #[command(name = "output", about = "Show output root directory.")]
    Output,
    #[command(name = "poll-interval", about = "Show job status polling interval.")]
    PollInterval,
}

fn mask(key: &str) -> String {
    let length = key.chars().count();
    if length <= 8 {
        return "*".repeat(length);
    }
    format!("****{}", key.chars().skip(length - 4).collect::<String>())
}

pub async fn process_config_options(options: &ConfigOptions) -> anyhow::Result<()> {
    let mut configuration = Configuration::load().await?;
    match &options.action {
        ConfigAction::Get { action } => show_config(&configuration, action),
        ConfigAction::Set { action } => {
            set_config(&mut configuration, action)?;
            configuration
                .save()
                .await
                .context("Failed to save configuration.")?;
        }
        ConfigAction::Clear { action } => {
            clear_config(&mut configuration, action);
            configuration
                .save()
                .await
                .context("Failed to save configuration.")?;
        }
        ConfigAction::All => show_all_config(&configuration)?,
    }
    Ok(())
}

fn show_config(configuration: &Configuration, action: &ReadableContent) {
    match action {
        ReadableContent::ApiKey => {
            if let Some(key) = &configuration.fal.api_key {
                println!("fal.ai API key: {}", mask(key))
            } else {
                println!("fal.ai API key has not been set.")
            }
        }
        ReadableContent::Proxy => {
            if let Some(proxy) = configuration.proxy.get_proxy_url() {
                if configuration.proxy.use_proxy {
                    println!("Using proxy server: {proxy}")
                } else {
                    println!("Proxy server {proxy} is set but not enabled.")
                }
            } else {
                println!("Proxy has not been set.")
            }
        }
        ReadableContent::Output => match &configuration.output.root {
            Some(root) => println!("Output root: {}", root.display()),
            None => println!("Output root has not been set, using \"{DEFAULT_OUTPUT_ROOT}\"."),
        },
        ReadableContent::PollInterval => println!(
            "Job status is polled every {} ms.",
            configuration
                .queue
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
        ),
    }
}

fn set_config(configuration: &mut Configuration, action: &WriteableContent) -> anyhow::Result<()> {
    match action {
        WriteableContent::ApiKey { key } => {
            configuration.set_api_key(key.clone());
            println!("fal.ai API key has been set.")
        }
        WriteableContent::Proxy {
            url,
            username,
            password,
        } => {
            let parsed_url = reqwest::Url::parse(url).context("Given proxy URL is invalid.")?;
            configuration.set_proxy(&parsed_url, username.clone(), password.clone());
            print!("Proxy server has been set.");
            if configuration.proxy.use_proxy {
                println!()
            } else {
                println!(
                    " Proxy server is not enabled, you need enable it by \"enable-proxy\" command first."
                )
            }
        }
        WriteableContent::EnableProxy { flag } => {
            let enabled = flag.unwrap_or(true);
            configuration.set_use_proxy(enabled);
            if enabled {
                println!("Requests will go through the proxy server.")
            } else {
                println!("Proxy server has been disabled.")
            }
        }
        WriteableContent::Output { path } => {
            configuration.set_output_root(path.clone());
            println!("Output root has been set to {}.", path.display())
        }
        WriteableContent::PollInterval { millis } => {
            configuration.set_poll_interval(*millis);
            println!("Polling interval has been set to {millis} ms.")
        }
    }
    Ok(())
}

fn clear_config(configuration: &mut Configuration, action: &ReadableContent) {
    match action {
        ReadableContent::ApiKey => {
            configuration.clear_api_key();
            println!("fal.ai API key has been cleared.")
        }
        ReadableContent::Proxy => {
            configuration.clear_proxy();
            println!("Proxy server settings have been cleared.")
        }
        ReadableContent::Output => {
            configuration.clear_output_root();
            println!("Output root has been reset.")
        }
        ReadableContent::PollInterval => {
            configuration.clear_poll_interval();
            println!("Polling interval has been reset.")
        }
    }
}

fn show_all_config(configuration: &Configuration) -> anyhow::Result<()> {
    println!("Config file: {}", config_file_path()?.display());
    println!(
        "fal.ai API key: {}",
        configuration
            .fal
            .api_key
            .as_deref()
            .map(mask)
            .unwrap_or("[NOT SET]".to_string())
    );
    println!(
        "Proxy Server: {}",
        configuration
            .proxy
            .get_proxy_url()
            .map(|url| url.to_string())
            .unwrap_or("[NOT SET]".to_string())
    );
    println!("Use Proxy: {}", configuration.proxy.use_proxy);
    println!(
        "Output root: {}",
        configuration
            .output
            .root
            .as_ref()
            .map(|root| root.display().to_string())
            .unwrap_or(format!("{DEFAULT_OUTPUT_ROOT} (default)"))
    );
    println!(
        "Poll interval: {} ms",
        configuration
            .queue
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    );
    Ok(())
}
