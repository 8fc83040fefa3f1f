//! A subcommand making sure various things are working. Useful for updating
//! Postboard where you want to check as many things as possible as early as
//! possible.

use crate::{
    args::{self, Args},
    auth::JwtContext,
    config::Config,
    db,
    load_config_and_init_logger,
    prelude::*,
};


pub(crate) async fn run(shared: &args::Shared, args: &Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args, "check")
        .context("failed to load config: cannot proceed with `check` command")?;


    // Perform main checks
    info!("Starting to verify various things...");
    let server_cert = config.db.check_server_cert();
    let token_secret = check_token_secret(&config);
    let db_connection = check_db(&config).await;
    info!("Done verifing various things");


    // Print summary after all log output
    let mut any_errors = false;
    println!();
    bunt::println!("{$bold+blue+intense}Summary{/$}");
    println!();
    print_outcome(&mut any_errors, "Load configuration", &Ok(()));
    print_outcome(&mut any_errors, "DB server certificate", &server_cert);
    print_outcome(&mut any_errors, "Token secret", &token_secret);
    print_outcome(&mut any_errors, "Connection to DB", &db_connection);

    println!();
    if any_errors {
        bunt::println!("{$red+intense}➡  Errors have occured!{/$}");
        std::process::exit(1);
    } else {
        bunt::println!("{$green+intense}⮕  Everything OK{/$} \
            {$dimmed}(Postboard probably works in this environment){/$}");
        println!();
        Ok(())
    }
}

fn print_outcome<T>(any_errors: &mut bool, label: &str, result: &Result<T>) {
    match result {
        Ok(_) => {
            bunt::println!(" ▸ {[bold+intense]}  {$green+bold}✔ ok{/$}", label);
        }
        Err(e) => {
            *any_errors = true;
            bunt::println!(" ▸ {[bold+intense]}  {$red+bold}✘ error{/$}", label);
            bunt::println!("      {$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
            println!();
            if e.chain().len() > 1 {
                bunt::println!("      {$red+italic}Caused by:{/$}");
            }

            for (i, cause) in e.chain().skip(1).enumerate() {
                print!("       {: >1$}", "", i * 2);
                println!("‣ {cause}");
            }
            println!();
        }
    }
}

/// Signs and verifies a token with the configured secret.
fn check_token_secret(config: &Config) -> Result<()> {
    let jwt = JwtContext::new(&config.auth)?;
    let token = jwt.issue(db::types::Key(0))?;
    jwt.verify(&token).context("freshly issued token does not verify")?;
    Ok(())
}

/// Connects to the DB and checks whether Postboard has set it up already.
async fn check_db(config: &Config) -> Result<()> {
    let pool = db::create_pool(&config.db).await?;
    let client = pool.get().await?;
    let exists = db::query::does_table_exist(&**client, "__db_migrations").await?;
    if !exists {
        warn!("Database is empty: migrations will be applied when starting the server");
    }
    Ok(())
}
