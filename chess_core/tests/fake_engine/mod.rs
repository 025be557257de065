//! In-memory UCI engine driven by a script.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub enum GoReply {
    /// Answers the `go` right away with this line.
    Immediate(&'static str),
    /// Holds the answer until `stop` arrives.
    OnStop(&'static str),
    /// Answers after a pause, whatever arrives meanwhile.
    After(Duration, &'static str),
    Silent,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub handshake: bool,
    pub go: VecDeque<GoReply>,
    pub fallback: GoReply,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            handshake: true,
            go: VecDeque::new(),
            fallback: GoReply::Immediate("bestmove e7e5 ponder g1f3"),
        }
    }
}

impl Script {
    pub fn replies(replies: impl IntoIterator<Item = GoReply>) -> Self {
        Self {
            go: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn mute() -> Self {
        Self {
            handshake: false,
            ..Self::default()
        }
    }
}

pub struct FakeEngine {
    pub received: Arc<Mutex<Vec<String>>>,
    pub task: JoinHandle<()>,
}

impl FakeEngine {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// Runs the engine end of `stream` until the adapter hangs up.
pub fn start(stream: DuplexStream, mut script: Script) -> FakeEngine {
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);
    let (reader, mut writer) = tokio::io::split(stream);
    let (out, mut pending) = mpsc::unbounded_channel::<&'static str>();

    tokio::spawn(async move {
        while let Some(reply) = pending.recv().await {
            if writer.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                return;
            }
        }
    });

    let task = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut held: Option<&'static str> = None;
        while let Ok(Some(line)) = lines.next_line().await {
            log.lock().unwrap().push(line.clone());
            let mut now: Vec<&'static str> = Vec::new();
            match line.split_whitespace().next() {
                Some("uci") if script.handshake => {
                    now.extend(["id name Fake", "option name Skill Level type spin", "uciok"]);
                }
                Some("isready") if script.handshake => now.push("readyok"),
                Some("go") => match script.go.pop_front().unwrap_or(script.fallback) {
                    GoReply::Immediate(reply) => now.extend(["info depth 1 score cp 20", reply]),
                    GoReply::OnStop(reply) => held = Some(reply),
                    GoReply::After(pause, reply) => {
                        let out = out.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(pause).await;
                            let _ = out.send(reply);
                        });
                    }
                    GoReply::Silent => {}
                },
                Some("stop") => now.extend(held.take()),
                Some("quit") => break,
                _ => {}
            }
            for reply in now {
                if out.send(reply).is_err() {
                    return;
                }
            }
        }
    });
    FakeEngine { received, task }
}
