mod config;
mod error;
mod session;

use std::{env, path::PathBuf, sync::Arc};

use clap::Parser;
use gavel_core::{judge::Judge, problem::DirectoryLoader};
use log::{error, info, warn};
use nix::unistd::geteuid;
use tokio::net::TcpListener;

use crate::{
    config::{ServerConfig, ACCESS_TOKEN_ENV},
    error::{Error, Result},
    session::Session,
};

#[derive(Parser)]
#[command(
    version,
    name = "Gavel Server",
    author = "Kanari",
    about = "Judges submissions streamed over TCP."
)]
struct Opts {
    #[arg(short, long, default_value = "gavel.yml", help = "path of config file")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let config =
        ServerConfig::from_file(&opts.config)?.with_env_token(env::var(ACCESS_TOKEN_ENV).ok());
    config.validate()?;

    if !geteuid().is_root() {
        return Err(Error::Invalid(
            "the sandbox needs root permissions, run the server as root".into(),
        ));
    }

    let judge = Judge::new(
        Arc::new(DirectoryLoader::new(&config.problem_root)),
        Arc::new(config.isolator()?),
    )
    .with_compile_limits(config.compile_limits());
    let session = Arc::new(Session::new(judge, config.access_token.clone()));

    let listener = TcpListener::bind(&config.address).await?;
    info!("listening on {}", config.address);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("failed to accept a connection: {}", err);
                continue;
            }
        };

        let session = session.clone();
        tokio::spawn(async move {
            if let Err(err) = session.serve(stream, peer).await {
                warn!("session with {} ended early: {}", peer, err);
            }
        });
    }
}
