//! One client connection.

use std::fmt;

use gavel_core::{
    judge::{Event, Judge},
    protocol::{read_message, write_message, Request, Response},
};
use log::{debug, error, info, warn};
use subtle::ConstantTimeEq;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::error::Result;

pub struct Session {
    judge: Judge,
    access_token: String,
}

impl Session {
    pub fn new(judge: Judge, access_token: String) -> Self {
        Self {
            judge,
            access_token,
        }
    }

    fn authenticate(&self, token: &str) -> bool {
        token.as_bytes().ct_eq(self.access_token.as_bytes()).into()
    }

    /// Serve the single request of a connection. Judge events are streamed
    /// back as they are produced; a client that stops reading abandons the
    /// submission.
    pub async fn serve<S, P>(&self, mut stream: S, peer: P) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        P: fmt::Display + Send + Sync,
    {
        debug!("connected to {}", peer);

        let request = match read_message::<_, Request>(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("{} sent no request", peer);
                return Ok(());
            }
            Err(err) => {
                warn!("malformed request from {}: {}", peer, err);
                return Ok(());
            }
        };

        let submit = match request {
            Request::Submit(submit) => submit,
            Request::Unknown => {
                debug!("ignoring unknown request from {}", peer);
                return Ok(());
            }
        };

        if !self.authenticate(&submit.access_token) {
            warn!(
                "rejected submission {} from {}: bad access token",
                submit.id, peer
            );
            return Ok(());
        }

        let submission = submit.into_submission();
        let id = submission.id;
        info!(
            "judging submission {} ({} on problem {}) from {}",
            id, submission.language, submission.problem_code, peer
        );

        write_message(&mut stream, &Response::judging_begin()).await?;

        let mut events = self.judge.judge(submission);
        loop {
            let pulled = task::spawn_blocking(move || {
                let event = events.next();
                (events, event)
            })
            .await;

            let event = match pulled {
                Ok((rest, Some(event))) => {
                    events = rest;
                    event
                }
                Ok((_, None)) => break,
                Err(err) => {
                    error!("judging submission {} aborted: {}", id, err);
                    let event = Event::internal_error(id);
                    write_message(&mut stream, &Response::from(&event)).await?;
                    break;
                }
            };

            if let Err(err) = write_message(&mut stream, &Response::from(&event)).await {
                info!("{} went away during submission {}", peer, id);
                // releasing boxes blocks
                if let Err(join) = task::spawn_blocking(move || drop(events)).await {
                    error!("releasing boxes of submission {} failed: {}", id, join);
                }
                return Err(err.into());
            }
            if event.is_last() {
                break;
            }
        }

        write_message(&mut stream, &Response::judging_end()).await?;
        info!("finished submission {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        sync::{mpsc, Arc, Mutex},
    };

    use gavel_core::{
        error::{Error, Result as CoreResult},
        problem::DirectoryLoader,
        sandbox::{ExecutionResult, Isolator, Limits},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::io::{duplex, DuplexStream};

    use super::*;

    const TOKEN: &str = "gStYfO3MOFRpLvM3XuZvbYKEgtRojgdEUCXQgOCTC98";

    /// Boxes in a scratch directory; every run prints `3`. With a gate, runs
    /// wait until its sender hangs up.
    struct PrintsThree {
        root: TempDir,
        live: Mutex<usize>,
        runs: Mutex<usize>,
        gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl Isolator for PrintsThree {
        fn init(&self, name: &str) -> CoreResult<PathBuf> {
            let root = self.root.path().join(name);
            fs::create_dir_all(root.join("home"))?;
            *self.live.lock().unwrap() += 1;
            Ok(root)
        }

        fn run(&self, name: &str, _: &[String], _: &Limits) -> CoreResult<ExecutionResult> {
            *self.runs.lock().unwrap() += 1;
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            fs::write(self.root.path().join(name).join("out"), "3\n")?;
            Ok(ExecutionResult {
                exit_code: Some(0),
                ..ExecutionResult::default()
            })
        }

        fn delete(&self, name: &str) -> CoreResult<()> {
            fs::remove_dir_all(self.root.path().join(name)).map_err(Error::from)?;
            *self.live.lock().unwrap() -= 1;
            Ok(())
        }
    }

    struct Fixture {
        problems: TempDir,
        isolator: Arc<PrintsThree>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::build(1, None)
        }

        /// A problem of `cases` cases whose runs block until the returned
        /// sender is dropped.
        fn gated(cases: usize) -> (Self, mpsc::Sender<()>) {
            let (open, gate) = mpsc::channel();
            (Self::build(cases, Some(gate)), open)
        }

        fn build(cases: usize, gate: Option<mpsc::Receiver<()>>) -> Self {
            let problems = tempfile::tempdir().unwrap();
            let dir = problems.path().join("sum");
            fs::create_dir_all(dir.join("data")).unwrap();
            let descriptor = "archive: data\ncases:\n".to_string()
                + &"  - in: 1.in\n    out: 1.out\n".repeat(cases);
            fs::write(dir.join("config.yml"), descriptor).unwrap();
            fs::write(dir.join("data/1.in"), "1 2\n").unwrap();
            fs::write(dir.join("data/1.out"), "3\n").unwrap();

            Self {
                problems,
                isolator: Arc::new(PrintsThree {
                    root: tempfile::tempdir().unwrap(),
                    live: Mutex::new(0),
                    runs: Mutex::new(0),
                    gate: gate.map(Mutex::new),
                }),
            }
        }

        fn session(&self) -> Session {
            let judge = Judge::new(
                Arc::new(DirectoryLoader::new(self.problems.path())),
                self.isolator.clone(),
            );
            Session::new(judge, TOKEN.to_string())
        }
    }

    fn submit(token: &str, problem: &str) -> Value {
        json!({
            "header": "submit",
            "access-token": token,
            "id": 1,
            "problem-code": problem,
            "language": "ruby",
            "source": "puts 3",
            "time-limit": 1000,
            "memory-limit": 65536,
        })
    }

    /// Send `request` and collect every response until the server hangs up.
    async fn exchange(session: Session, request: Value) -> Vec<Response> {
        let (mut client, server): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let served = tokio::spawn(async move { session.serve(server, "test-peer").await });

        write_message(&mut client, &request).await.unwrap();
        let mut responses = Vec::new();
        while let Some(response) = read_message::<_, Response>(&mut client).await.unwrap() {
            responses.push(response);
        }
        served.await.unwrap().unwrap();
        responses
    }

    fn headers(responses: &[Response]) -> Vec<&str> {
        responses.iter().map(|r| r.header.as_str()).collect()
    }

    #[tokio::test]
    async fn judges_a_submission() {
        let fixture = Fixture::new();
        let responses = exchange(fixture.session(), submit(TOKEN, "sum")).await;

        assert_eq!(
            headers(&responses),
            vec![
                "judging-begin",
                "case-begin",
                "case-verdict",
                "case-end",
                "judging-end"
            ]
        );
        let verdict = &responses[2].payload;
        assert_eq!(verdict["status"], "AC");
        assert_eq!(verdict["case-num"], 1);
        assert_eq!(*fixture.isolator.live.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn bad_token_gets_no_answer() {
        let fixture = Fixture::new();
        let responses = exchange(fixture.session(), submit("guess", "sum")).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn unknown_header_is_ignored() {
        let fixture = Fixture::new();
        let responses = exchange(fixture.session(), json!({ "header": "status" })).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn missing_problem_is_an_internal_error() {
        let fixture = Fixture::new();
        let responses = exchange(fixture.session(), submit(TOKEN, "nothing")).await;

        assert_eq!(
            headers(&responses),
            vec!["judging-begin", "internal-error", "judging-end"]
        );
        assert_eq!(
            responses[1].payload["error"],
            "internal error while judging submission 1"
        );
    }

    #[tokio::test]
    async fn client_leaving_abandons_the_submission() {
        let (fixture, open) = Fixture::gated(50);
        let session = fixture.session();
        let (mut client, server) = duplex(64 * 1024);
        let served = tokio::spawn(async move { session.serve(server, "test-peer").await });

        write_message(&mut client, &submit(TOKEN, "sum")).await.unwrap();
        for header in ["judging-begin", "case-begin"] {
            let response = read_message::<_, Response>(&mut client).await.unwrap();
            assert_eq!(response.unwrap().header, header);
        }
        drop(client);
        drop(open);

        assert!(served.await.unwrap().is_err());
        assert_eq!(*fixture.isolator.runs.lock().unwrap(), 1);
        assert_eq!(*fixture.isolator.live.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_connection() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        drop(client);
        fixture.session().serve(server, "test-peer").await.unwrap();
    }
}
