//! Connection supervisor
//!
//! Owns the single tunnel session. All state changes go through
//! `Shared::transition`, which publishes the new state on the watch channel
//! and as a `StatusChanged` event. A session token, claimed with a
//! compare-and-set, keeps a second connect out while one is in flight; only
//! the session that holds the token may clear the handle or release it.

use crate::error::VpnError;
use crate::events::{LogBuffer, LogEvent, SupervisorEvent};
use crate::openconnect::classifier::{Observation, OutputClassifier, Stream};
use crate::openconnect::{ConnectionConfig, LaunchRequest, Locations, TunnelLauncher};
use crate::platform::{send_signal, StopSignal};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;
const NO_SESSION: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Legal edges: Disconnected → Connecting → Connected → Disconnected, plus Connecting → Disconnected
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting) | (Connecting, Connected) | (Connecting, Disconnected) | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Source of the local administrator password
///
/// Returning `None` (or an empty secret) means the user cancelled.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn elevation_credential(&self) -> Option<SecretString>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Time between the interrupt and the kill on disconnect
    pub disconnect_grace: Duration,
    /// Upper bound on reading buffered output after the process exits
    pub drain_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            disconnect_grace: Duration::from_secs(5),
            drain_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Stop(StopSignal),
}

struct TunnelHandle {
    session: u64,
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Control>,
}

struct Shared {
    status: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SupervisorEvent>,
    active_session: AtomicU64,
    next_session: AtomicU64,
    handle: Mutex<Option<TunnelHandle>>,
    logs: Mutex<LogBuffer>,
    launcher: Arc<dyn TunnelLauncher>,
    prompt: Arc<dyn CredentialPrompt>,
    locations: Locations,
    settings: SupervisorSettings,
}

/// Supervises at most one tunnel process
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

impl ConnectionSupervisor {
    pub fn new(
        launcher: Arc<dyn TunnelLauncher>,
        prompt: Arc<dyn CredentialPrompt>,
        locations: Locations,
        settings: SupervisorSettings,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                status,
                events,
                active_session: AtomicU64::new(NO_SESSION),
                next_session: AtomicU64::new(1),
                handle: Mutex::new(None),
                logs: Mutex::new(LogBuffer::default()),
                launcher,
                prompt,
                locations,
                settings,
            }),
        }
    }

    pub fn status(&self) -> ConnectionState {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.events.subscribe()
    }

    /// True while a connect attempt or tunnel session holds the session token
    pub fn is_active(&self) -> bool {
        self.shared.active_session.load(Ordering::Acquire) != NO_SESSION
    }

    /// Pid of the running tunnel driver, if any
    pub fn tunnel_pid(&self) -> Option<u32> {
        self.shared.handle().as_ref().and_then(|h| h.pid)
    }

    /// Most recent log events, oldest first
    pub fn recent_logs(&self) -> Vec<LogEvent> {
        self.shared.logs().iter().cloned().collect()
    }

    /// Start a tunnel session
    ///
    /// Returns once the tunnel process is running; the rest of the lifecycle
    /// is reported through `subscribe()` and `watch_status()`.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), VpnError> {
        let session = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        if self
            .shared
            .active_session
            .compare_exchange(NO_SESSION, session, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VpnError::AlreadyActive);
        }

        let guard = SessionGuard::new(&self.shared, session);
        config.validate()?;

        match self.start(session, config).await {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(e) => {
                warn!("Connect aborted: {}", e);
                self.shared.log(LogEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn start(&self, session: u64, config: ConnectionConfig) -> Result<(), VpnError> {
        let shared = &self.shared;
        shared.transition(ConnectionState::Connecting);
        shared.log(LogEvent::info(format!("Connecting to {}...", config.server_url())));

        let tunnel_binary = shared
            .locations
            .openconnect()
            .path
            .ok_or_else(|| VpnError::BinaryNotFound("openconnect".to_string()))?;

        let vpnc_script = shared.locations.vpnc_script();
        match &vpnc_script {
            Some(path) => shared.log(LogEvent::info(format!("Using vpnc-script at {}", path.display()))),
            None => shared.log(LogEvent::info("vpnc-script not found, using openconnect default")),
        }

        let tunnel_args = config.tunnel_args(vpnc_script.as_deref());
        shared.log(LogEvent::info(format!(
            "Executing: sudo {} {}",
            tunnel_binary.display(),
            tunnel_args.join(" ")
        )));

        let elevation_credential = shared
            .prompt
            .elevation_credential()
            .await
            .filter(|c| !c.expose_secret().is_empty())
            .ok_or(VpnError::CredentialRequired)?;

        let request = LaunchRequest {
            tunnel_binary,
            tunnel_args,
            elevation_credential,
            username: config.username().to_string(),
            password: config.password,
        };
        let child = shared.launcher.launch(request).await?;

        let pid = child.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *shared.handle() = Some(TunnelHandle {
            session,
            pid,
            control: control_tx,
        });
        info!("Tunnel session {} started (pid {:?})", session, pid);

        tokio::spawn(run_session(Arc::clone(shared), session, child, control_rx));
        Ok(())
    }

    /// Ask the tunnel to stop: close its stdin, interrupt it, and kill it
    /// if it is still running after the grace period
    pub fn disconnect(&self) -> Result<(), VpnError> {
        self.stop(StopSignal::Interrupt)
    }

    /// Host teardown: terminate any running tunnel
    pub fn shutdown(&self) {
        match self.stop(StopSignal::Terminate) {
            Ok(()) => info!("Terminating tunnel on shutdown"),
            Err(_) => debug!("No tunnel to terminate"),
        }
    }

    fn stop(&self, signal: StopSignal) -> Result<(), VpnError> {
        let handle = self.shared.handle();
        let handle = handle.as_ref().ok_or(VpnError::NotConnected)?;
        handle
            .control
            .send(Control::Stop(signal))
            .map_err(|_| VpnError::NotConnected)
    }
}

/// Returns a claimed session to idle unless disarmed, including when the
/// `connect` future is dropped before the tunnel session task starts
struct SessionGuard<'a> {
    shared: &'a Shared,
    session: u64,
    armed: bool,
}

impl<'a> SessionGuard<'a> {
    fn new(shared: &'a Shared, session: u64) -> Self {
        Self {
            shared,
            session,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.shared.owns(self.session) {
            return;
        }
        debug!("Releasing session {} before the tunnel started", self.session);
        self.shared.transition(ConnectionState::Disconnected);
        self.shared.release(self.session);
    }
}

impl Shared {
    fn handle(&self) -> MutexGuard<'_, Option<TunnelHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn logs(&self) -> MutexGuard<'_, LogBuffer> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owns(&self, session: u64) -> bool {
        self.active_session.load(Ordering::Acquire) == session
    }

    fn release(&self, session: u64) {
        let _ = self.active_session.compare_exchange(
            session,
            NO_SESSION,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn transition(&self, next: ConnectionState) {
        let mut from = next;
        let changed = self.status.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if changed {
            info!("Status: {} -> {}", from, next);
            let _ = self.events.send(SupervisorEvent::StatusChanged(next));
        } else if from != next {
            warn!("Ignoring illegal transition {} -> {}", from, next);
        }
    }

    fn log(&self, event: LogEvent) {
        self.logs().push(event.clone());
        let _ = self.events.send(SupervisorEvent::Log(event));
    }

    fn apply(&self, session: u64, classifier: &mut OutputClassifier, stream: Stream, line: &str) {
        if !self.owns(session) {
            return;
        }
        for observation in classifier.observe(stream, line) {
            match observation {
                Observation::Line { kind, text } => {
                    debug!("openconnect: {}", text);
                    self.log(LogEvent::new(kind, text));
                }
                Observation::Notice { kind, text } => self.log(LogEvent::new(kind, text)),
                Observation::Connected => self.transition(ConnectionState::Connected),
            }
        }
    }

    /// Clear the handle if this session owns it, go to Disconnected, release the token
    fn end_session(&self, session: u64) {
        {
            let mut handle = self.handle();
            if handle.as_ref().is_some_and(|h| h.session == session) {
                *handle = None;
            }
        }
        if self.owns(session) {
            self.transition(ConnectionState::Disconnected);
            self.release(session);
        }
    }
}

/// Forward each line of `reader`; invalid UTF-8 is replaced, not fatal
async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading {:?}: {}", stream, e);
                break;
            }
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    session: u64,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let (line_tx, mut lines) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, Stream::Stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, Stream::Stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut stdin = child.stdin.take();
    let mut classifier = OutputClassifier::new();
    let mut lines_open = true;
    let mut control_open = true;
    let mut requested = false;
    let mut forced = false;
    let mut deadline: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            line = lines.recv(), if lines_open => match line {
                Some((stream, text)) => shared.apply(session, &mut classifier, stream, &text),
                None => lines_open = false,
            },
            status = child.wait() => break status,
            message = control.recv(), if control_open => match message {
                Some(Control::Stop(signal)) => {
                    requested = true;
                    // Already closed if this is a second stop request
                    drop(stdin.take());
                    shared.log(LogEvent::info("Disconnecting..."));
                    if let Some(pid) = child.id() {
                        if let Err(e) = send_signal(pid, signal) {
                            warn!("{}", e);
                        }
                    }
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + shared.settings.disconnect_grace);
                    }
                }
                None => control_open = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && !forced => {
                warn!(
                    "Tunnel did not exit within {:?}, killing it",
                    shared.settings.disconnect_grace
                );
                if let Some(pid) = child.id() {
                    if let Err(e) = send_signal(pid, StopSignal::Kill) {
                        warn!("{}", e);
                    }
                }
                forced = true;
                shared.log(LogEvent::info("VPN process killed"));
                shared.end_session(session);
            }
        }
    };

    if lines_open {
        let drain = async {
            while let Some((stream, text)) = lines.recv().await {
                shared.apply(session, &mut classifier, stream, &text);
            }
        };
        if timeout(shared.settings.drain_timeout, drain).await.is_err() {
            debug!("Output still open after exit, not waiting for it");
        }
    }

    if forced {
        debug!("Session {} reaped after forced kill", session);
        return;
    }

    let failure = match &status {
        Ok(status) => exit_failure(*status, requested, &classifier),
        Err(e) => Some(format!("Failed to wait for VPN process: {}", e)),
    };
    match &status {
        Ok(status) => info!("Tunnel session {} exited: {}", session, status),
        Err(e) => error!("Tunnel session {} lost: {}", session, e),
    }

    shared.end_session(session);
    match failure {
        Some(message) => {
            shared.log(LogEvent::error(message.clone()));
            let _ = shared.events.send(SupervisorEvent::ConnectionError(message));
        }
        None => shared.log(LogEvent::info("Disconnected")),
    }
}

/// User-facing message for a tunnel exit, `None` when the exit is expected
fn exit_failure(status: ExitStatus, requested: bool, classifier: &OutputClassifier) -> Option<String> {
    if requested {
        return None;
    }
    match status.code() {
        Some(0) if classifier.is_connected() => Some("VPN disconnected unexpectedly".to_string()),
        Some(0) => None,
        Some(code) => Some(if let Some(which) = classifier.auth_failure() {
            VpnError::AuthenticationFailed(which).to_string()
        } else if classifier.timed_out() {
            VpnError::Timeout("no response from the VPN server".to_string()).to_string()
        } else {
            format!("Connection closed with code {}", code)
        }),
        None => Some("VPN process was terminated".to_string()),
    }
}
