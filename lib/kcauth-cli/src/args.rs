use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

pub const USAGE: &str = "\
kcauth - client-credentials tokens for identity provider admin APIs

USAGE:
  kcauth [-v] token --config <FILE> --name <CLIENT> [--auth-server-url <URL>]
  kcauth [-v] bootstrap --base-url <URL> --client-id <ID> --client-secret <SECRET>
                        [--realm <REALM>] [--username <USER>] [--password <PASSWORD>]
                        [--role <ROLE>] [--wait]
";

#[derive(Debug, PartialEq, Eq)]
pub struct AppArgs {
    pub verbose: bool,
    pub command: Command,
    /// Arguments left over after parsing, reported once logging is set up.
    pub unused: Vec<OsString>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Token(TokenArgs),
    Bootstrap(BootstrapArgs),
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TokenArgs {
    pub config: PathBuf,
    pub name: String,
    pub auth_server_url: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BootstrapArgs {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub realm: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub wait: bool,
}

impl AppArgs {
    pub fn parse() -> Result<Self> {
        Self::parse_from(std::env::args_os().skip(1).collect())
    }

    pub fn parse_from(args: Vec<OsString>) -> Result<Self> {
        let mut pargs = pico_args::Arguments::from_vec(args);

        let verbose = pargs.contains(["-v", "--verbose"]);
        if pargs.contains("--help") {
            return Ok(Self {
                verbose,
                command: Command::Help,
                unused: pargs.finish(),
            });
        }

        let subcommand = pargs.subcommand().context("parsing subcommand")?;
        let command = match subcommand.as_deref() {
            Some("token") => Command::Token(TokenArgs {
                config: pargs
                    .value_from_str("--config")
                    .context("parsing config argument")?,
                name: pargs
                    .value_from_str("--name")
                    .context("parsing name argument")?,
                auth_server_url: pargs
                    .opt_value_from_str("--auth-server-url")
                    .context("parsing auth-server-url argument")?,
            }),
            Some("bootstrap") => Command::Bootstrap(BootstrapArgs {
                base_url: pargs
                    .value_from_str("--base-url")
                    .context("parsing base-url argument")?,
                client_id: pargs
                    .value_from_str("--client-id")
                    .context("parsing client-id argument")?,
                client_secret: pargs
                    .value_from_str("--client-secret")
                    .context("parsing client-secret argument")?,
                realm: pargs
                    .opt_value_from_str("--realm")
                    .context("parsing realm argument")?,
                username: pargs
                    .opt_value_from_str("--username")
                    .context("parsing username argument")?,
                password: pargs
                    .opt_value_from_str("--password")
                    .context("parsing password argument")?,
                role: pargs
                    .opt_value_from_str("--role")
                    .context("parsing role argument")?,
                wait: pargs.contains("--wait"),
            }),
            Some(other) => bail!("unknown subcommand '{other}'"),
            None => Command::Help,
        };

        Ok(Self {
            verbose,
            command,
            unused: pargs.finish(),
        })
    }
}
