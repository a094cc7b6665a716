use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::join;
use tokio::sync::watch;

use cairn_proto::dav::{self, DavContext};
use cairn_repo::memory::MemRepository;
use cairn_repo::property::StaticTypeRegistry;
use cairn_user::config::*;
use cairn_user::login::{demo_provider::*, static_provider::*, ArcLoginProvider};

pub struct Server {
    dav_unsecure_server: Option<dav::Server>,
    dav_server: Option<dav::Server>,
    pid_file: Option<PathBuf>,
}

impl Server {
    pub async fn from_config(config: Config) -> Result<Self> {
        tracing::info!("Init as WebDAV server");
        let login: ArcLoginProvider = match config.users {
            UserManagement::Demo => Arc::new(DemoLoginProvider::new()),
            UserManagement::Static(x) => Arc::new(StaticLoginProvider::new(x).await?),
        };

        let context = Arc::new(DavContext {
            repository: Arc::new(MemRepository::new(config.repository.read_only)),
            registry: Arc::new(StaticTypeRegistry::from_config(
                &config.repository.property_types,
            )),
            webdav: config.webdav,
        });

        let dav_unsecure_server = config
            .dav_unsecure
            .map(|dav_config| dav::new_unsecure(dav_config, login.clone(), context.clone()));
        let dav_server = match config.dav {
            Some(dav_config) => Some(dav::new(dav_config, login.clone(), context.clone())?),
            None => None,
        };

        Ok(Self {
            dav_unsecure_server,
            dav_server,
            pid_file: config.pid,
        })
    }

    pub async fn run(self) -> Result<()> {
        let Server {
            dav_unsecure_server,
            dav_server,
            pid_file,
        } = self;

        if let Some(pid_file) = pid_file {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(pid_file)?;
            file.write_all(std::process::id().to_string().as_bytes())?;
            drop(file);
        }

        tracing::info!("Starting Cairn...");

        let (exit_signal, provoke_exit) = watch_ctrl_c();
        let exit_on_err = move |err: anyhow::Error| {
            tracing::error!("Error: {}", err);
            let _ = provoke_exit.send(true);
            err
        };
        let exit_on_err = &exit_on_err;

        // A failing listener asks the other one to drain and stop
        let (unsecure, secure) = join!(
            {
                let exit_signal = exit_signal.clone();
                async move {
                    match dav_unsecure_server {
                        None => Ok(()),
                        Some(s) => s.run(exit_signal).await.map_err(exit_on_err),
                    }
                }
            },
            {
                let exit_signal = exit_signal.clone();
                async move {
                    match dav_server {
                        None => Ok(()),
                        Some(s) => s.run(exit_signal).await.map_err(exit_on_err),
                    }
                }
            }
        );
        unsecure?;
        secure?;

        Ok(())
    }
}

pub fn watch_ctrl_c() -> (watch::Receiver<bool>, Arc<watch::Sender<bool>>) {
    let (send_cancel, watch_cancel) = watch::channel(false);
    let send_cancel = Arc::new(send_cancel);
    let send_cancel_2 = send_cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err=?e, "failed to install CTRL+C signal handler");
            return;
        }
        tracing::info!("Received CTRL+C, shutting down.");
        let _ = send_cancel.send(true);
    });
    (watch_cancel, send_cancel_2)
}
