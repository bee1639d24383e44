use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use slotwise_serve::client::NluClient;
use slotwise_serve::http::parse_targets;
use slotwise_serve::registry::populate;
use slotwise_serve::{
    Dispatcher, PredictInput, RegistryHandle, ServeConfig, onnx_loader, parse_model_paths,
};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "slotwise")]
#[command(version)]
#[command(about = "Serve and query transformer NLU models (language, intent, slots)")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Logging level.
    #[arg(long, short = 'l', global = true, default_value = "info", value_enum)]
    logging_level: LogLevel,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the configured models over HTTP.
    Serve {
        #[command(flatten)]
        models: ModelArgs,

        #[arg(long, short = 'H', env = "SLOTWISE_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, short, env = "SLOTWISE_PORT", default_value_t = 8000)]
        port: u16,

        /// Origins permitted to make cross-origin requests; `*` allows any.
        #[arg(long, short = 'a', num_args = 0..)]
        allowed_origins: Vec<String>,

        /// Require this token (`?token=` or bearer) on prediction routes.
        #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },
    /// Run models in-process on one text and print the per-model results.
    Predict {
        #[command(flatten)]
        models: ModelArgs,

        /// Comma-separated target models; all when omitted.
        #[arg(long)]
        model: Option<String>,

        text: String,
    },
    /// Language-routed parse of one text, in-process.
    Parse {
        #[command(flatten)]
        models: ModelArgs,

        text: String,
    },
    /// Query a running server.
    Query {
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,

        #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Comma-separated target models; all when omitted.
        #[arg(long)]
        model: Option<String>,

        /// Use the language-routed parse endpoint instead of predict.
        #[arg(long)]
        parse: bool,

        text: String,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model name → directory, as inline JSON or a path to a JSON file.
    #[arg(long, short = 'm', env = "SLOTWISE_MODEL_PATHS")]
    model_paths: String,
}

impl ModelArgs {
    fn resolve(&self) -> anyhow::Result<BTreeMap<String, PathBuf>> {
        parse_model_paths(&self.model_paths)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Notset,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Notset => LevelFilter::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(cli.logging_level))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("slotwise v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve {
            models,
            host,
            port,
            allowed_origins,
            auth_token,
        } => {
            let config = ServeConfig {
                model_paths: models.resolve()?,
                host,
                port,
                allowed_origins,
                auth_token,
            };
            slotwise_serve::serve(config, onnx_loader()).await
        }
        Command::Predict { models, model, text } => {
            let dispatcher = load_local(&models).await?;
            let targets = parse_targets(model.as_deref().unwrap_or_default());
            let results = dispatcher.dispatch(PredictInput::from_text(text), &targets).await?;
            print_json(&results)
        }
        Command::Parse { models, text } => {
            let dispatcher = load_local(&models).await?;
            print_json(&dispatcher.parse(text).await?)
        }
        Command::Query {
            url,
            token,
            model,
            parse,
            text,
        } => {
            let client = NluClient::new(&url, token);
            if parse {
                print_json(&client.parse(&text).await?)
            } else {
                let targets = parse_targets(model.as_deref().unwrap_or_default());
                print_json(&client.predict(&text, &targets).await?)
            }
        }
    }
}

/// Load every configured model before returning, for one-shot commands.
async fn load_local(models: &ModelArgs) -> anyhow::Result<Dispatcher> {
    let paths = models.resolve()?;
    let loader = onnx_loader();
    let registry = tokio::task::spawn_blocking(move || populate(&paths, &loader)).await?;
    for (name, reason) in registry.failed() {
        tracing::warn!(model = %name, reason = %reason, "skipped model");
    }
    anyhow::ensure!(!registry.is_empty(), "no model could be loaded");
    let handle = RegistryHandle::new();
    handle.publish(registry);
    Ok(Dispatcher::new(handle))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
