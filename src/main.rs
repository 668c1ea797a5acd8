use anyhow::Result;
use courier::harness::ModuleRunner;
use courier::module::notifier::Notifier;
use courier::module::{notifier, ops};
use std::str::FromStr;
use structopt::StructOpt;
use tracing::info;

#[derive(Debug, StructOpt)]
#[structopt(about = "Reliable event and work delivery core for the task platform")]
struct MainOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        global = true,
        default_value = "info,hyper=warn,h2=warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    log: String,

    /// Output format of the log stream (text, compact or json)
    #[structopt(
        long,
        global = true,
        env,
        default_value = "text",
        value_name = "format"
    )]
    log_format: LogFormat,

    /// Enable status reporting server which can be used as a readiness probe
    #[structopt(long, global = true, env, value_name = "port")]
    status_server: Option<u16>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Runs the notification pipeline
    Notifier(notifier::Options),
    /// Administrative inspection and repair commands
    Ops(ops::Options),
}

#[derive(Debug)]
enum LogFormat {
    Text,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{}`", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (command, runner) = init()?;

    match command {
        Command::Notifier(options) => runner.run(Notifier::new(options)).await,
        Command::Ops(options) => ops::run(options).await?,
    };

    Ok(())
}

fn init() -> Result<(Command, ModuleRunner)> {
    let options = MainOptions::from_args();

    let formatter = tracing_subscriber::fmt().with_env_filter(options.log);

    match options.log_format {
        LogFormat::Text => formatter.init(),
        LogFormat::Compact => formatter.compact().init(),
        LogFormat::Json => formatter.json().init(),
    };

    let runner = match options.status_server {
        Some(port) => ModuleRunner::new_with_status_server(port),
        None => ModuleRunner::default(),
    };

    info!("courier {}", env!("CARGO_PKG_VERSION"));

    Ok((options.command, runner))
}
