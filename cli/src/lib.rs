//! `songuse` command-line client.
//!
//! Every invocation starts a fresh session: when `--username` and
//! `--password` are given the CLI logs in first, then runs the
//! subcommand against the authenticated client.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use songuse_client::AccountError;
use songuse_client::ApiClient;
use songuse_client::ApiRequest;
use songuse_client::ClientConfig;
use songuse_client::ConfigLoader;
use songuse_client::FetchError;
use songuse_client::PasswordChange;
use songuse_client::Registration;
use songuse_client::models::UserRole;
use songuse_client::models::UserUpdate;
use tracing_subscriber::EnvFilter;

pub const SESSION_EXPIRED_MESSAGE: &str = "session expired, log in again";

#[derive(Debug, Parser)]
#[command(name = "songuse", version, about = "Query the song-usage dashboard backend")]
pub struct Cli {
    /// Configuration file (defaults to ./songuse.toml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the API base URL.
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    #[arg(long, short = 'p', global = true, env = "SONGUSE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the logged-in account.
    Me,
    /// GET an API path and print the JSON body.
    Get {
        /// Path relative to the API base URL, e.g. `/songs`.
        path: String,

        /// Query parameter, repeatable.
        #[arg(long = "query", short = 'q', value_name = "KEY=VALUE", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
    /// Register a new account with --username and --password.
    Register(RegisterArgs),
    /// Change the password of the --username account.
    ChangePassword(ChangePasswordArgs),
    /// List networks, or the churches of one network.
    Networks {
        #[arg(long, value_name = "ID")]
        churches_of: Option<i64>,
    },
    /// List the accounts of your network, or show one (admins only).
    Users(UsersArgs),
    /// End the session on the server.
    Logout,
}

#[derive(Debug, Parser)]
pub struct UsersArgs {
    /// Show this account instead of listing the network.
    #[arg(long, value_name = "ID")]
    pub id: Option<i64>,

    /// Set the role of --id: 0 unapproved, 1 normal, 2 editor, 3 admin.
    #[arg(long, requires = "id", value_parser = parse_role)]
    pub role: Option<UserRole>,
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_role(raw: &str) -> Result<UserRole, String> {
    let value: u8 = raw.parse().map_err(|err| format!("invalid role `{raw}`: {err}"))?;
    UserRole::try_from(value)
}

#[derive(Debug, Parser)]
pub struct RegisterArgs {
    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    /// Network id, see `songuse networks`.
    #[arg(long)]
    pub network: i64,

    /// Church id, see `songuse networks --churches-of <ID>`.
    #[arg(long)]
    pub church: i64,

    /// Defaults to --password.
    #[arg(long)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ChangePasswordArgs {
    #[arg(long)]
    pub new_password: String,

    /// Defaults to --new-password.
    #[arg(long)]
    pub confirm_password: Option<String>,
}

impl Command {
    /// Commands that talk to endpoints behind the session.
    fn needs_session(&self) -> bool {
        matches!(
            self,
            Self::Me | Self::Get { .. } | Self::ChangePassword(_) | Self::Users(_) | Self::Logout
        )
    }
}

pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

impl Cli {
    pub fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::new().with_file(path).load(),
            None => ConfigLoader::load_default(),
        }
        .context("failed to load configuration")?;

        if let Some(base_url) = &self.base_url {
            config.api_base_url = base_url.clone();
            config.validate().context("invalid --base-url")?;
        }
        Ok(config)
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }

    fn require_credentials(&self) -> Result<(&str, &str)> {
        self.credentials()
            .context("--username and --password are required for this command")
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    let client = ApiClient::new(config).context("failed to create API client")?;

    if cli.command.needs_session()
        && let Some((username, password)) = cli.credentials()
    {
        client.login(username, password).await?;
    }

    match &cli.command {
        Command::Me => match client.current_user().await? {
            Some(user) => println!(
                "{} ({}) - {}, {} [{}]",
                user.display_name(),
                user.username,
                user.church.name,
                user.network.name,
                user.role
            ),
            None => println!("not logged in"),
        },
        Command::Get { path, query } => {
            let request = query
                .iter()
                .fold(ApiRequest::get(path.as_str()), |request, (key, value)| {
                    request.query(key.as_str(), value.as_str())
                });
            let body: Value = client
                .auth()
                .request(request)
                .await?
                .json()
                .await
                .context("response is not JSON")?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Register(args) => {
            let (username, password) = cli.require_credentials()?;
            let registration = Registration {
                first_name: args.first_name.clone(),
                last_name: args.last_name.clone(),
                username: username.to_string(),
                password: password.to_string(),
                confirm_password: args
                    .confirm_password
                    .clone()
                    .unwrap_or_else(|| password.to_string()),
                network_id: Some(args.network),
                church_id: Some(args.church),
            };
            client.register(&registration).await?;
            println!("registered {username}; an admin must approve the account");
        }
        Command::ChangePassword(args) => {
            let (_, current) = cli.require_credentials()?;
            let confirm = args
                .confirm_password
                .as_deref()
                .unwrap_or(&args.new_password);
            client
                .change_password(&PasswordChange::new(current, &args.new_password, confirm))
                .await?;
            println!("password changed; log in again with the new password");
        }
        Command::Networks { churches_of } => {
            let body = match churches_of {
                Some(network_id) => {
                    serde_json::to_value(client.network_churches(*network_id).await?)?
                }
                None => serde_json::to_value(client.networks().await?)?,
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Users(args) => manage_users(&client, args).await?,
        Command::Logout => {
            client.logout().await?;
            println!("logged out");
        }
    }
    Ok(())
}

async fn manage_users(client: &ApiClient, args: &UsersArgs) -> Result<()> {
    let admin = client
        .session()
        .user()
        .context("--username and --password are required for this command")?;
    if !admin.role.is_admin() {
        anyhow::bail!("{} is not an admin", admin.username);
    }

    let Some(user_id) = args.id else {
        for entry in client.network_users(admin.network.id).await? {
            println!(
                "{:>5}  {:<20} {:<24} {:<10} {}",
                entry.user.id,
                entry.user.username,
                entry.user.display_name(),
                entry.user.role,
                entry.accesses.names().join(", ")
            );
        }
        return Ok(());
    };

    let mut user = client.user(user_id).await?;
    if let Some(role) = args.role {
        let update = UserUpdate {
            role: Some(role),
            ..UserUpdate::from_user(&user)
        };
        user = client.update_user(user_id, &update).await?;
    }
    let accesses = client.user_access(user_id).await?;
    println!(
        "{} ({}) - {}, {} [{}], joined {}",
        user.display_name(),
        user.username,
        user.church.name,
        user.network.name,
        user.role,
        user.created_at
    );
    println!("access: {}", accesses.names().join(", "));
    Ok(())
}

/// One-line message for a failed run.
pub fn error_message(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(account) = cause.downcast_ref::<AccountError>() {
            if account.is_session_expired() {
                return SESSION_EXPIRED_MESSAGE.to_string();
            }
            return account.user_message();
        }
        if let Some(fetch) = cause.downcast_ref::<FetchError>() {
            if fetch.is_session_expired() {
                return SESSION_EXPIRED_MESSAGE.to_string();
            }
            return fetch.detail_message();
        }
    }
    format!("{err:#}")
}
