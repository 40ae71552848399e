mod auth;
mod config;
mod db;
mod quiz;
mod reject;
mod routes;
mod runtime;
mod stats;
mod transfer;
mod util;

#[cfg(test)]
mod tests;

use anyhow::Error;
use auth::Level;
use config::Config;
use structopt::StructOpt;
use tracing_subscriber::fmt::format::FmtSpan;
use warp::{Filter, Reply};

#[derive(StructOpt)]
#[structopt(author, about)]
struct Opt {
    /// Configuration file to use
    #[structopt(
        short,
        long,
        name = "FILE",
        env = "QBNOTES_CONFIG",
        default_value = "qbnotes.json"
    )]
    config: String,

    #[structopt(subcommand)]
    command: Option<Command>,
}

#[derive(StructOpt)]
enum Command {
    /// Initialises the configuration file with default values
    Init,
    /// Creates a user
    User {
        /// Name used to log in
        name: String,
        /// Permission level, one of read, write or admin
        level: Level,
        /// Password used to log in
        #[structopt(long, env = "QBNOTES_PASSWORD", hide_env_values = true)]
        password: String,
        /// Replaces the user if it already exists
        #[structopt(long)]
        replace: bool,
    },
}

fn main() -> Result<(), Error> {
    let args: Opt = Opt::from_args();

    if let Some(Command::Init) = &args.command {
        config::write(&args.config)?;
        println!("Default config written");
        return Ok(());
    }

    let config = config::read(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let runtime = runtime::build(config)?;
    runtime.block_on(run(config, args.command))?;

    Ok(())
}

async fn run(config: &'static Config, command: Option<Command>) -> Result<(), Error> {
    let db = db::connect(&config.database)?;

    if let Some(Command::User {
        name,
        level,
        password,
        replace,
    }) = command
    {
        if db::insert_user(&name, &password, level, replace, db, config)? {
            println!("User {} created with {} permissions", name, level);
        } else {
            println!("User {} already exists", name);
        }
        return Ok(());
    }

    let filter = routes::handler(config, db);
    serve(filter, config).await;
    Ok(())
}

#[cfg(feature = "tls")]
async fn serve(
    filter: impl Filter<Extract = (impl Reply,)> + Send + Sync + Clone + 'static,
    config: &Config,
) {
    let address = (config.address, config.port);
    tracing::info!(address = %config.address, port = config.port, "listening");

    match &config.tls {
        Some(tls_config) => {
            warp::serve(filter)
                .tls()
                .cert_path(&tls_config.cert)
                .key_path(&tls_config.key)
                .run(address)
                .await
        }
        None => warp::serve(filter).run(address).await,
    }
}

#[cfg(not(feature = "tls"))]
async fn serve(
    filter: impl Filter<Extract = (impl Reply,)> + Send + Sync + Clone + 'static,
    config: &Config,
) {
    let address = (config.address, config.port);
    tracing::info!(address = %config.address, port = config.port, "listening");

    warp::serve(filter).run(address).await
}
