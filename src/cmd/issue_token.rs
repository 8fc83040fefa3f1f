//! Signs a token for a user without knowing their password.

use crate::{auth::JwtContext, config::Config, db::types::Key, prelude::*};


#[derive(Debug, clap::Args)]
pub(crate) struct Args {
    /// The ID of the user the token is issued for. Whether that user exists
    /// is not checked.
    pub(crate) user: i64,
}

pub(crate) fn run(args: &Args, config: &Config) -> Result<()> {
    let jwt = JwtContext::new(&config.auth)?;
    let token = jwt.issue(Key(args.user))?;
    info!("Issued token for user {}", args.user);
    println!("{token}");
    Ok(())
}
