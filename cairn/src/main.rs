mod server;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nix::{sys::signal, unistd::Pid};

use cairn_user::config::*;
use cairn_user::login::static_provider::hash_password;

use crate::server::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// A special mode dedicated to developers, NOT INTENDED FOR PRODUCTION
    #[clap(long)]
    dev: bool,

    #[clap(short, long, env = "CAIRN_CONFIG", default_value = "cairn.toml")]
    /// Path to the main Cairn configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the WebDAV server
    Daemon,
    /// Reload the user list of a running daemon
    Reload {
        #[clap(short, long, env = "CAIRN_PID")]
        pid: Option<i32>,
    },
    #[clap(subcommand)]
    /// Specific tooling, should not be part of a normal workflow
    Tools(ToolsCommand),
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Hash a password for the static user list
    PasswordHash {
        #[clap(env = "CAIRN_PASSWORD")]
        maybe_password: Option<String>,
    },
}

#[cfg(tokio_unstable)]
fn tracer() {
    console_subscriber::init();
}

#[cfg(not(tokio_unstable))]
fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,cairn=info,cairn_proto=info")
    }

    // Abort on panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();

    // Hashing a password needs no configuration at all
    if let Command::Tools(ToolsCommand::PasswordHash { maybe_password }) = &args.command {
        let password = match maybe_password {
            Some(pwd) => pwd.clone(),
            None => {
                let password = rpassword::prompt_password("Enter password: ")?;
                let password_confirm = rpassword::prompt_password("Confirm password: ")?;
                if password != password_confirm {
                    bail!("Passwords don't match.");
                }
                password
            }
        };
        println!("{}", hash_password(&password)?);
        return Ok(());
    }

    let config: Config = if args.dev {
        dev_config()
    } else {
        read_config(args.config_file.clone()).context(format!(
            "'{}' must be a Cairn configuration file",
            args.config_file.display()
        ))?
    };

    match &args.command {
        Command::Daemon => {
            let server = Server::from_config(config).await?;
            server.run().await?;
        }
        Command::Reload { pid } => reload(*pid, config.pid)?,
        Command::Tools(_) => (),
    }

    Ok(())
}

fn dev_config() -> Config {
    use std::net::*;
    Config {
        pid: None,
        dav: None,
        dav_unsecure: Some(DavUnsecureConfig {
            bind_addr: SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)), 8087),
        }),
        users: UserManagement::Demo,
        webdav: WebdavConfig::default(),
        repository: RepositoryConfig {
            read_only: false,
            property_types: vec![
                PropertyTypeConfig {
                    namespace: Some("http://example.com/ns".into()),
                    name: "published".into(),
                    value_type: ValueTypeConfig::Timestamp,
                    multiple: false,
                    protected: false,
                },
                PropertyTypeConfig {
                    namespace: Some("http://example.com/ns".into()),
                    name: "tags".into(),
                    value_type: ValueTypeConfig::String,
                    multiple: true,
                    protected: false,
                },
                PropertyTypeConfig {
                    namespace: Some("http://example.com/ns".into()),
                    name: "revision".into(),
                    value_type: ValueTypeConfig::Integer,
                    multiple: false,
                    protected: true,
                },
            ],
        },
    }
}

fn reload(pid: Option<i32>, pid_path: Option<PathBuf>) -> Result<()> {
    let final_pid = match (pid, pid_path) {
        (Some(pid), _) => pid,
        (_, Some(path)) => {
            let mut f = std::fs::OpenOptions::new().read(true).open(path)?;
            let mut pidstr = String::new();
            f.read_to_string(&mut pidstr)?;
            pidstr.trim().parse::<i32>()?
        }
        _ => bail!("Unable to infer your daemon's PID"),
    };
    let pid = Pid::from_raw(final_pid);
    signal::kill(pid, signal::Signal::SIGUSR1)?;
    Ok(())
}
