//! This module defines the command line arguments Postboard accepts.

use std::path::PathBuf;
use termcolor::ColorChoice;

use crate::{cmd, db::cmd::DbCommand};


#[derive(Debug, clap::Parser)]
#[clap(about = "GraphQL API server for users, posts and comments.")]
pub(crate) struct Args {
    #[clap(subcommand)]
    pub(crate) cmd: Command,

    /// Whether to use colors and other ANSI codes in the output. Possible
    /// values: 'auto', 'always', 'never'.
    #[clap(long, global = true, default_value = "auto", value_parser = parse_color_choice)]
    pub(crate) color: ColorChoice,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Starts the HTTP server serving the GraphQL API.
    Serve {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Database operations.
    Db {
        #[clap(subcommand)]
        cmd: DbCommand,

        #[clap(flatten)]
        shared: Shared,
    },

    /// Signs a token for the given user ID with the configured secret. Useful
    /// for development and for testing the API with tools like GraphiQL.
    IssueToken {
        #[clap(flatten)]
        options: cmd::issue_token::Args,

        #[clap(flatten)]
        shared: Shared,
    },

    /// Checks config, DB connection and the token secret to find problems in
    /// Postboard's environment. Exits with 0 if everything is Ok, and with 1
    /// otherwise.
    Check {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions or all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Exports the API as GraphQL schema.
    ExportApiSchema {
        #[clap(flatten)]
        options: cmd::export_api_schema::Args,
    },
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, Postboard
    /// will try opening `config.toml` or `/etc/postboard/config.toml`.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,
}

impl Args {
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        Self::resolve_auto(self.color, std::io::IsTerminal::is_terminal(&std::io::stdout()))
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        Self::resolve_auto(self.color, std::io::IsTerminal::is_terminal(&std::io::stderr()))
    }

    fn resolve_auto(choice: ColorChoice, is_terminal: bool) -> ColorChoice {
        match choice {
            ColorChoice::Auto if !is_terminal => ColorChoice::Never,
            other => other,
        }
    }
}

fn parse_color_choice(s: &str) -> Result<ColorChoice, String> {
    match s {
        "auto" => Ok(ColorChoice::Auto),
        "always" => Ok(ColorChoice::Always),
        "never" => Ok(ColorChoice::Never),
        other => Err(format!("invalid color choice '{other}', \
            expected 'auto', 'always' or 'never'")),
    }
}
