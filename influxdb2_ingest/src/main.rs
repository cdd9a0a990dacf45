//! Entrypoint of the influxdb2_ingest binary
#![warn(clippy::explicit_iter_loop, clippy::use_self)]

use dotenvy::dotenv;

mod commands {
    pub(crate) mod serve;
}
mod logging;
mod socket_addr;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "influxdb2_ingest",
    version,
    about = "InfluxDB 2.x compatible write ingestion server",
    long_about = r#"InfluxDB 2.x compatible write ingestion server

Examples:
    # Run the server with the default organization and bucket
    influxdb2_ingest serve

    # Accept 1.x writes against db=telegraf&rp=autogen
    influxdb2_ingest serve --org acme --bucket metrics --dbrp telegraf/autogen

    # Run with full debug logging specified with LOG_FILTER
    LOG_FILTER=debug influxdb2_ingest serve
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the write ingestion server
    Serve(commands::serve::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("influxdb2_ingest-io")
        .build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Serve(config)) => {
                if let Err(e) = config.logging_config.install_global_subscriber() {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
                if let Err(e) = commands::serve::command(config).await {
                    eprintln!("Serve command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is not an error
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}
