//! Client side of one UCI engine process.
//!
//! Status walks `Initializing -> Ready <-> Thinking`, falls into `Error` on
//! any failure and only leaves it through [`EngineAdapter::terminate`], which
//! parks the adapter in `Idle` for good.

use crate::engine::config::{resolve, to_engine_directives, DifficultyTier, EngineConfig};
use crate::engine::protocol::{self, EngineLine};
use crate::engine::registry::{Expect, ListenerRegistry, Reply};
use crate::engine::{BestMove, EngineError, EngineStatus, MoveSource};
use crate::logic::game::Position;
use async_trait::async_trait;
use log::{debug, error, trace, warn};
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESPONSE_GRACE: Duration = Duration::from_secs(1);
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSettings {
    /// Budget for the whole `uci`/`isready` handshake.
    pub init_timeout: Duration,
    /// Added on top of every search timeout before giving up.
    pub response_grace: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            response_grace: DEFAULT_RESPONSE_GRACE,
        }
    }
}

type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Which search owns the engine right now and whether it was told to stop.
#[derive(Debug, Default)]
struct Preemption {
    next_id: u64,
    running: Option<u64>,
    stopped: Option<u64>,
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    settings: AdapterSettings,
    status: watch::Sender<EngineStatus>,
    registry: Mutex<ListenerRegistry>,
    writer: Mutex<Option<EngineWriter>>,
    failure: Mutex<Option<String>>,
    search_gate: Mutex<()>,
    preemption: Mutex<Preemption>,
    child: std::sync::Mutex<Option<Child>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    terminated: AtomicBool,
}

impl Shared {
    fn new(
        settings: AdapterSettings,
        status: EngineStatus,
        writer: Option<EngineWriter>,
        failure: Option<String>,
    ) -> Self {
        let (status, _) = watch::channel(status);
        Self {
            settings,
            status,
            registry: Mutex::new(ListenerRegistry::new()),
            writer: Mutex::new(writer),
            failure: Mutex::new(failure),
            search_gate: Mutex::new(()),
            preemption: Mutex::new(Preemption::default()),
            child: std::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Moves `from -> to` only if the adapter is still in `from`.
    fn transition(&self, from: EngineStatus, to: EngineStatus) -> bool {
        self.status.send_if_modified(|status| {
            if *status == from {
                *status = to;
                true
            } else {
                false
            }
        })
    }

    async fn send(&self, line: &str) -> Result<(), EngineError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(if self.is_terminated() {
                EngineError::Terminated
            } else {
                EngineError::Disconnected
            });
        };
        trace!("> {line}");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn route(&self, line: &str) {
        let reply = match protocol::parse_line(line) {
            EngineLine::UciOk => Reply::UciOk,
            EngineLine::ReadyOk => Reply::ReadyOk,
            EngineLine::BestMove(address) => Reply::BestMove(address),
            EngineLine::Other => {
                trace!("< {line}");
                return;
            }
        };
        if !self.registry.lock().await.dispatch(reply) {
            trace!("< {line} (nobody waiting)");
        }
    }

    /// Enters `Error`, keeping the first reason, and wakes every listener.
    async fn fail(&self, reason: String) {
        if self.is_terminated() {
            return;
        }
        {
            let mut failure = self.failure.lock().await;
            if failure.is_none() {
                error!("engine failed: {reason}");
                *failure = Some(reason);
            }
        }
        self.status.send_replace(EngineStatus::Error);
        self.registry.lock().await.clear();
    }

    async fn failure_reason(&self) -> String {
        self.failure
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "engine unavailable".to_string())
    }

    async fn handshake(&self) -> Result<(), EngineError> {
        let (_, uciok) = self.registry.lock().await.register(Expect::UciOk);
        self.send(protocol::UCI).await?;
        uciok.await.map_err(|_| EngineError::Disconnected)?;
        debug!("engine acknowledged uci");

        let (_, readyok) = self.registry.lock().await.register(Expect::ReadyOk);
        self.send(protocol::IS_READY).await?;
        readyok.await.map_err(|_| EngineError::Disconnected)?;
        Ok(())
    }

    async fn initialize(self: Arc<Self>) {
        let limit = self.settings.init_timeout;
        match tokio::time::timeout(limit, self.handshake()).await {
            Ok(Ok(())) => {
                if self.transition(EngineStatus::Initializing, EngineStatus::Ready) {
                    debug!("engine ready");
                }
            }
            Ok(Err(e)) => self.fail(format!("handshake failed: {e}")).await,
            Err(_) => self.fail(format!("no handshake within {limit:?}")).await,
        }
    }

    /// Sends `stop` to the search currently holding the engine, once.
    async fn stop_running_search(&self) -> Result<(), EngineError> {
        let mut preemption = self.preemption.lock().await;
        let Some(running) = preemption.running else {
            return Ok(());
        };
        if preemption.stopped == Some(running) {
            return Ok(());
        }
        preemption.stopped = Some(running);
        debug!("stopping superseded search {running}");
        self.send(protocol::STOP).await
    }

    async fn begin_search(&self) -> u64 {
        let mut preemption = self.preemption.lock().await;
        preemption.next_id += 1;
        preemption.running = Some(preemption.next_id);
        preemption.next_id
    }

    async fn end_search(&self, id: u64) {
        let mut preemption = self.preemption.lock().await;
        if preemption.running == Some(id) {
            preemption.running = None;
        }
    }

    async fn write_search(
        &self,
        position: &Position,
        config: &EngineConfig,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        for directive in to_engine_directives(config) {
            self.send(&directive).await?;
        }
        self.send(&protocol::position_command(position.as_fen()))
            .await?;
        self.send(&protocol::go_command(timeout.as_millis())).await
    }
}

async fn read_loop<R: AsyncRead + Unpin>(shared: Arc<Shared>, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => shared.route(&line).await,
            Ok(None) => {
                shared.fail("engine closed its output".to_string()).await;
                break;
            }
            Err(e) => {
                shared.fail(format!("reading engine output: {e}")).await;
                break;
            }
        }
    }
}

/// Owns one engine process (or any line-oriented pipe pair speaking UCI).
pub struct EngineAdapter {
    shared: Arc<Shared>,
}

impl EngineAdapter {
    /// Starts the handshake over an arbitrary reader/writer pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_io<R, W>(reader: R, writer: W, settings: AdapterSettings) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared::new(
            settings,
            EngineStatus::Initializing,
            Some(Box::new(writer)),
            None,
        ));
        let reader_task = tokio::spawn(read_loop(Arc::clone(&shared), reader));
        let init_task = tokio::spawn(Arc::clone(&shared).initialize());
        lock(&shared.tasks).extend([reader_task, init_task]);
        Self { shared }
    }

    /// Launches `program` with piped stdio. A launch failure yields an adapter
    /// that is already in `Error`.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I, settings: AdapterSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Self::failed(
                    settings,
                    format!("could not start {}: {e}", program.to_string_lossy()),
                )
            }
        };
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Self::failed(settings, "engine stdio was not piped".to_string());
        };

        debug!("spawned engine {}", program.to_string_lossy());
        let adapter = Self::from_io(stdout, stdin, settings);
        *lock(&adapter.shared.child) = Some(child);
        adapter
    }

    fn failed(settings: AdapterSettings, reason: String) -> Self {
        error!("engine failed: {reason}");
        Self {
            shared: Arc::new(Shared::new(
                settings,
                EngineStatus::Error,
                None,
                Some(reason),
            )),
        }
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        *self.shared.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.shared.status.subscribe()
    }

    /// Resolves once the handshake has completed. Every caller waits on the
    /// same handshake.
    ///
    /// # Errors
    ///
    /// [`EngineError::Initialization`] if the adapter reached `Error` or was
    /// terminated instead.
    pub async fn ensure_ready(&self) -> Result<(), EngineError> {
        let mut rx = self.shared.status.subscribe();
        let status = *rx
            .wait_for(|status| *status != EngineStatus::Initializing)
            .await
            .map_err(|_| EngineError::Disconnected)?;
        match status {
            EngineStatus::Ready | EngineStatus::Thinking => Ok(()),
            EngineStatus::Idle => Err(EngineError::Initialization(
                "adapter was terminated".to_string(),
            )),
            EngineStatus::Initializing | EngineStatus::Error => Err(
                EngineError::Initialization(self.shared.failure_reason().await),
            ),
        }
    }

    /// Asks for a move at the strength `tier` resolves to.
    ///
    /// # Errors
    ///
    /// See [`EngineAdapter::search`].
    pub async fn get_best_move(
        &self,
        position: &Position,
        tier: DifficultyTier,
        timeout: Duration,
    ) -> Result<BestMove, EngineError> {
        self.search(position, &resolve(tier), timeout).await
    }

    /// Sends the directives of `config`, the position and `go movetime`, then
    /// waits up to `timeout` plus the grace period for `bestmove`.
    ///
    /// A call that finds another search running sends `stop` to it, unless an
    /// earlier caller already did, and waits for it to finish first.
    ///
    /// # Errors
    ///
    /// [`EngineError::Timeout`] when no answer arrives in time, which also
    /// moves the adapter to `Error`. [`EngineError::Terminated`] when the
    /// adapter is shut down mid-call.
    pub async fn search(
        &self,
        position: &Position,
        config: &EngineConfig,
        timeout: Duration,
    ) -> Result<BestMove, EngineError> {
        if self.shared.is_terminated() {
            return Err(EngineError::Terminated);
        }
        self.ensure_ready().await?;

        let _turn = if let Ok(guard) = self.shared.search_gate.try_lock() {
            guard
        } else {
            self.shared.stop_running_search().await?;
            self.shared.search_gate.lock().await
        };
        if self.shared.is_terminated() {
            return Err(EngineError::Terminated);
        }
        self.ensure_ready().await?;

        let id = self.shared.begin_search().await;
        let outcome = self.run_search(position, config, timeout).await;
        self.shared.end_search(id).await;
        outcome
    }

    async fn run_search(
        &self,
        position: &Position,
        config: &EngineConfig,
        timeout: Duration,
    ) -> Result<BestMove, EngineError> {
        self.shared.status.send_replace(EngineStatus::Thinking);
        let started = Instant::now();
        let (id, reply) = self.shared.registry.lock().await.register(Expect::BestMove);
        if let Err(e) = self.shared.write_search(position, config, timeout).await {
            self.shared.registry.lock().await.cancel(id);
            self.shared
                .fail(format!("could not send search: {e}"))
                .await;
            return Err(e);
        }

        let limit = timeout + self.shared.settings.response_grace;
        match tokio::time::timeout(limit, reply).await {
            Ok(Ok(Reply::BestMove(Some(address)))) => {
                self.shared
                    .transition(EngineStatus::Thinking, EngineStatus::Ready);
                let elapsed = started.elapsed();
                debug!("bestmove {address} after {elapsed:?}");
                Ok(BestMove { address, elapsed })
            }
            Ok(Ok(_)) => {
                let reason = "bestmove without a move".to_string();
                self.shared.fail(reason.clone()).await;
                Err(EngineError::Protocol(reason))
            }
            Ok(Err(_)) if self.shared.is_terminated() => Err(EngineError::Terminated),
            Ok(Err(_)) => Err(EngineError::Disconnected),
            Err(_) => {
                self.shared.registry.lock().await.cancel(id);
                self.shared
                    .fail(format!("no bestmove within {limit:?}"))
                    .await;
                Err(EngineError::Timeout(limit))
            }
        }
    }

    /// Kills the process, drops every listener and parks in `Idle`. Safe to
    /// call more than once.
    pub async fn terminate(&self) {
        let already = self.shared.terminated.swap(true, Ordering::SeqCst);
        self.shared.registry.lock().await.clear();
        self.shared.status.send_replace(EngineStatus::Idle);
        if already {
            return;
        }

        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let quit = format!("{}\n", protocol::QUIT);
            if let Err(e) = writer.write_all(quit.as_bytes()).await {
                debug!("could not send quit: {e}");
            }
        }
        let child = lock(&self.shared.child).take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                warn!("could not kill engine process: {e}");
            }
        }
        let tasks = std::mem::take(&mut *lock(&self.shared.tasks));
        for task in tasks {
            task.abort();
        }
        debug!("engine adapter terminated");
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        let tasks = std::mem::take(&mut *lock(&self.shared.tasks));
        for task in tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl MoveSource for EngineAdapter {
    async fn best_move(
        &self,
        position: &Position,
        config: &EngineConfig,
        timeout: Duration,
    ) -> Result<BestMove, EngineError> {
        self.search(position, config, timeout).await
    }

    fn status(&self) -> EngineStatus {
        Self::status(self)
    }

    fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        Self::subscribe(self)
    }

    async fn shutdown(&self) {
        self.terminate().await;
    }
}
