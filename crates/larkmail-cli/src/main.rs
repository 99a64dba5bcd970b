//! larkmail - Yahoo Mail from the command line

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use larkmail_auth::{yahoo, AuthManager, Paths, SystemBrowser};
use larkmail_core::{
    check_connection, login_with_app_password, login_with_browser, logout, status, AccountConfig,
    CoreError, ImapVerifier, SmtpVerifier,
};
use std::io::{BufRead, Write};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Read when `--app-password` is given, before falling back to a prompt
const APP_PASSWORD_ENV: &str = "LARKMAIL_APP_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "larkmail", version, about = "Yahoo Mail from the command line")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage the stored credentials
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Debug, Subcommand)]
enum AuthCommand {
    /// Sign in with OAuth2 in the browser, or with an app password
    Login(LoginArgs),
    /// Remove every stored credential
    Logout,
    /// Show how the account is authenticated
    Status {
        /// Also log in to IMAP and SMTP with the stored credentials
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// Yahoo e-mail address
    #[arg(long)]
    email: String,

    /// Use an app password instead of the browser
    #[arg(long)]
    app_password: bool,

    /// Local port for the OAuth2 callback
    #[arg(long, default_value_t = yahoo::DEFAULT_OAUTH_PORT)]
    port: u16,
}

/// Directive used when `RUST_LOG` is unset
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,larkmail=debug"
    } else {
        "warn,larkmail=info"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn read_app_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(APP_PASSWORD_ENV) {
        return Ok(password);
    }
    eprint!("App password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading app password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::from_env().map_err(CoreError::from)?;
    let auth = AuthManager::from_env(&paths);
    let account = AccountConfig::default();

    match cli.command {
        Command::Auth(AuthCommand::Login(args)) if args.app_password => {
            let password = read_app_password()?;
            println!("Verifying app password with IMAP...");
            login_with_app_password(
                &auth,
                &paths,
                &args.email,
                &password,
                &ImapVerifier::new(&account),
            )
            .await?;
            println!("App password stored.");
        }
        Command::Auth(AuthCommand::Login(args)) => {
            println!("Opening browser for Yahoo authentication...");
            login_with_browser(&auth, &paths, &args.email, args.port, &SystemBrowser).await?;
            println!("Authentication successful.");
        }
        Command::Auth(AuthCommand::Logout) => {
            logout(&auth, &paths)?;
            println!("Logged out successfully.");
        }
        Command::Auth(AuthCommand::Status { check }) => {
            let current = status(&auth, &paths)?;
            println!("{}", current);
            if check && current.authenticated {
                let imap = ImapVerifier::new(&account);
                let smtp = SmtpVerifier::new(&account);
                check_connection(&auth, &paths, &[&imap, &smtp]).await?;
                println!("Connection: OK (IMAP and SMTP)");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        let code = match e.downcast_ref::<CoreError>() {
            Some(core) => {
                eprintln!("Error: {}", core);
                if let Some(hint) = core.hint() {
                    eprintln!("Hint: {}", hint);
                }
                core.exit_code()
            }
            None => {
                eprintln!("Error: {:#}", e);
                1
            }
        };
        std::process::exit(code);
    }
}
