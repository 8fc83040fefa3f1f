//! The Postboard GraphQL server.

use clap::{FromArgMatches, CommandFactory};
use deadpool_postgres::Pool;
use std::{env, sync::Arc};

use crate::{
    args::{Args, Command},
    auth::JwtContext,
    config::Config,
    events::EventBus,
    prelude::*,
};

mod api;
mod args;
mod auth;
mod config;
mod cmd;
mod db;
mod events;
mod http;
mod logger;
mod prelude;
mod query;
mod util;
mod version;


#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        report_error(&e);
        std::process::exit(1);
    }
}

/// Logs the error (for log files) and prints it with its causes to stderr.
fn report_error(e: &anyhow::Error) {
    error!("{e:?}");

    eprintln!();
    bunt::eprintln!("{$red+bold}Error:{/$} {[yellow+intense]}", e);
    for (depth, cause) in e.chain().skip(1).enumerate() {
        let indent = "  ".repeat(depth + 1);
        bunt::eprintln!("{}{$italic}caused by:{/$} {}", indent, cause);
    }
}

async fn run() -> Result<()> {
    if env::var_os("RUST_BACKTRACE").is_none() {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let matches = Args::command().version(version::full()).get_matches();
    let args = Args::from_arg_matches(&matches)?;
    bunt::set_stdout_color_choice(args.stdout_color());
    bunt::set_stderr_color_choice(args.stderr_color());

    match &args.cmd {
        Command::Serve { shared } => {
            let config = load_config_and_init_logger(shared, &args, "serve")?;
            serve(config).await
        }
        Command::Db { cmd, shared } => {
            let config = load_config_and_init_logger(shared, &args, "db")?;
            db::cmd::run(cmd, &config).await
        }
        Command::IssueToken { options, shared } => {
            let config = load_config_and_init_logger(shared, &args, "other")?;
            cmd::issue_token::run(options, &config)
        }
        Command::Check { shared } => cmd::check::run(shared, &args).await,
        Command::WriteConfig { target } => config::write_template(target.as_ref()),
        Command::ExportApiSchema { options } => cmd::export_api_schema::run(options),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Postboard {}", version::full());
    trace!("Configuration: {config:#?}");

    let db = prepare_db(&config).await?;
    let jwt = JwtContext::new(&config.auth).context("invalid token configuration")?;

    http::serve(config, api::root_node(), db, Arc::new(jwt), EventBus::new())
        .await
        .context("HTTP server failed")
}

/// Reads the config from `--config` or the default locations, sets up logging
/// accordingly and validates the config.
pub(crate) fn load_config_and_init_logger(
    shared: &args::Shared,
    args: &Args,
    cmd: &str,
) -> Result<Config> {
    let (config, path) = match &shared.config {
        None => Config::from_env_or_default_locations()?,
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from '{}'", path.display()))
            .map(|config| (config, path.clone()))?,
    };

    // Logging is configured in the config file, so it starts only now.
    logger::init(&config.log, args, cmd)?;
    info!("Loaded config from '{}'", path.display());
    config.validate()?;

    Ok(config)
}

async fn prepare_db(config: &Config) -> Result<Pool> {
    let pool = db::create_pool(&config.db).await
        .context("could not connect to the database")?;
    let mut client = pool.get().await?;
    db::migrate(&mut client).await.context("database migrations failed")?;
    drop(client);
    Ok(pool)
}
