use std::{fs, path::PathBuf};

use clap::Parser;
use gavel_core::{
    error::{Error, Result},
    lang::Languages,
    protocol::{read_message, write_message, Request, Response, SubmitRequest},
};
use log::{debug, info, warn};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(
    version,
    name = "Gavel Client",
    author = "Kanari",
    about = "Submits a source file to a gavel server and prints every event."
)]
struct Opts {
    #[arg(help = "path of the source file")]
    file: PathBuf,
    #[arg(short, long, help = "problem code")]
    problem: String,
    #[arg(short, long, help = "language tag, guessed from the file extension when absent")]
    language: Option<String>,
    #[arg(short, long, default_value = "127.0.0.1:1337", help = "server address")]
    addr: String,
    #[arg(long, env = "GAVEL_ACCESS_TOKEN", hide_env_values = true, help = "access token")]
    token: String,
    #[arg(short, long, default_value = "1000", help = "time limit(MS)")]
    time_limit: u64,
    #[arg(short, long, default_value = "65536", help = "memory limit(KB)")]
    memory_limit: u64,
    #[arg(long, default_value = "0", help = "submission id")]
    id: u64,
}

fn language_of(opts: &Opts) -> Result<String> {
    if let Some(language) = &opts.language {
        return Ok(language.clone());
    }
    Languages::with_builtins()
        .by_path(&opts.file)
        .map(|language| language.tag.to_string())
        .ok_or_else(|| Error::UnknownLanguage(opts.file.display().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let language = language_of(&opts)?;
    let source = String::from_utf8_lossy(&fs::read(&opts.file)?).into_owned();
    let request = Request::Submit(SubmitRequest {
        access_token: opts.token.clone(),
        id: opts.id,
        problem_code: opts.problem.clone(),
        language,
        source,
        time_limit: opts.time_limit,
        memory_limit: opts.memory_limit,
    });

    let mut stream = TcpStream::connect(&opts.addr).await?;
    info!("connected to {}", opts.addr);
    write_message(&mut stream, &request).await?;

    let mut finished = false;
    while let Some(response) = read_message::<_, Response>(&mut stream).await? {
        debug!("received {}", response.header);
        println!("{}", serde_json::to_string(&response)?);
        if response.is_judging_end() {
            finished = true;
            break;
        }
    }

    if !finished {
        warn!("server closed the connection before judging ended");
    }
    Ok(())
}
