use std::{
    io,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::Command,
};
use deadpool_postgres::ClientWrapper;
use secrecy::ExposeSecret;
use tokio_postgres::{GenericClient, IsolationLevel};

use crate::{prelude::*, util::Never, config::Config};
use super::{DbConfig, create_pool, query};


#[derive(Debug, clap::Subcommand)]
pub(crate) enum DbCommand {
    /// Drops all users, posts, comments and the migration state.
    Clear {
        /// Do not ask for confirmation.
        #[clap(long)]
        yes_absolutely_clear_db: bool,
    },

    /// Executes the SQL statements in the given file.
    Script {
        script: PathBuf,
    },

    /// Applies outstanding migrations. `serve` does this on startup as well.
    Migrate,

    /// Opens `psql` connected to the configured database.
    Console,

    /// `clear` and `migrate` in one go: leaves an empty, usable database.
    Reset {
        /// Do not ask for confirmation.
        #[clap(long)]
        yes_absolutely_reset: bool,
    },
}

pub(crate) async fn run(cmd: &DbCommand, config: &Config) -> Result<()> {
    let (clear_first, confirmed) = match cmd {
        DbCommand::Console => return console(&config.db).map(|_| ()),
        DbCommand::Clear { yes_absolutely_clear_db: yes } => (true, *yes),
        DbCommand::Reset { yes_absolutely_reset: yes } => (true, *yes),
        DbCommand::Script { .. } | DbCommand::Migrate => (false, false),
    };

    let pool = create_pool(&config.db).await?;
    let mut db = pool.get().await?;

    if clear_first {
        clear(&mut db, config, confirmed).await?;
    }

    match cmd {
        DbCommand::Migrate | DbCommand::Reset { .. } => super::migrate(&mut db).await?,
        DbCommand::Script { script } => run_script(&db, script).await?,
        DbCommand::Clear { .. } | DbCommand::Console => {}
    }

    Ok(())
}


/// Replaces the `public` schema with an empty one, asking first unless
/// `confirmed` is set.
async fn clear(db: &mut ClientWrapper, config: &Config, confirmed: bool) -> Result<()> {
    let tx = db.build_transaction()
        .isolation_level(IsolationLevel::Serializable)
        .start()
        .await?;

    if !confirmed {
        warn!("This deletes the whole 'public' schema of the database, not only Postboard data");
        println!();
        println!("Target: database '{}' on {}:{}", config.db.database, config.db.host, config.db.port);
        for (table, rows) in content_summary(&*tx).await? {
            println!("  {table}: {rows} rows");
        }
        println!();
        println!("Type 'yes' to continue.");
        crate::cmd::prompt_for_yes()?;
    }

    let user = config.db.user.replace('"', "\"\"");
    tx.batch_execute(&format!(
        "drop schema public cascade;
        create schema public;
        grant all on schema public to \"{user}\";
        grant all on schema public to public;"
    )).await?;
    tx.commit().await.context("failed to commit clear transaction")?;

    info!("Cleared database '{}'", config.db.database);
    Ok(())
}

/// Row counts of our own tables that currently exist.
async fn content_summary(db: &impl GenericClient) -> Result<Vec<(&'static str, i64)>> {
    let mut out = Vec::new();
    for table in ["users", "posts", "comments"] {
        if query::does_table_exist(db, table).await? {
            let rows = db.query_one(&format!("select count(*) from {table}"), &[]).await?;
            out.push((table, rows.get::<_, i64>(0)));
        }
    }
    Ok(out)
}

async fn run_script(db: &ClientWrapper, path: &Path) -> Result<()> {
    let sql = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;

    db.batch_execute(&sql).await
        .with_context(|| format!("script '{}' failed", path.display()))?;
    info!("Executed '{}'", path.display());

    Ok(())
}

/// Replaces the current process with `psql`. Only returns on failure.
fn console(config: &DbConfig) -> Result<Never> {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    let encode = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();

    let uri = format!(
        "postgresql://{}:{}@{}:{}/{}",
        encode(&config.user),
        encode(config.password.expose_secret()),
        config.host,
        config.port,
        encode(&config.database),
    );
    let err = Command::new("psql").arg(uri).exec();
    let msg = match err.kind() {
        io::ErrorKind::NotFound => "could not find `psql`: is it installed and in `PATH`?",
        io::ErrorKind::PermissionDenied => "not allowed to execute `psql`",
        _ => "failed to start `psql`",
    };
    Err(err).context(msg)
}
