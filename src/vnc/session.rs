//! The connection driver.
//!
//! Each `VncSession` owns one background thread running an
//! establish → handle → close loop until it observes the terminate
//! flag. All cross-thread interaction goes through atomics, the command
//! queue, the mutex-guarded host configuration and the framebuffer
//! store's reader-writer lock; blocking I/O stays on the session thread.

use std::cmp;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbaImage;

use super::client::{ClientConfig, RfbClient, RfbClientFactory, RfbHooks};
use super::flags::{ControlFlag, ControlFlags};
use super::framebuffer::{FrameImage, FrameStore};
use super::hooks::HookAdapter;
use super::host::HostAddress;
use super::network;
use super::quality::EncodingProfile;
use super::queue::{CommandQueue, Sleeper, VncCommand};
use super::settings::ConnectionTunables;
use super::stats::{SessionStats, SessionStatsSnapshot};
use super::types::{FramebufferState, VncQuality, VncSessionEvent, VncState};

/// Runs deferred clean-up tasks outside the session thread (for
/// example on a UI event loop). Implementations must not execute tasks
/// on the session thread itself.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

type Observer = Box<dyn Fn(&VncSessionEvent) + Send + Sync>;
type FinalizeTask = Box<dyn FnOnce() + Send>;

// ---- Shared session state ----

struct HostConfig {
    host: String,
    /// Negative means "use the default port".
    port: i32,
    scaled_size: Option<(u32, u32)>,
}

pub(crate) struct SessionShared {
    state: AtomicU8,
    framebuffer_state: AtomicU8,
    pub(crate) flags: ControlFlags,
    pub(crate) framebuffer: FrameStore,
    pub(crate) stats: SessionStats,
    queue: CommandQueue,
    sleeper: Sleeper,
    config: Mutex<HostConfig>,
    quality: AtomicU8,
    use_remote_cursor: AtomicBool,
    update_interval_ms: AtomicI64,
    update_watchdog: Mutex<Instant>,
    tunables: ConnectionTunables,
    observers: RwLock<Vec<Observer>>,
    protocol_logging: AtomicBool,
    running: AtomicBool,
    finalizer: Mutex<Option<FinalizeTask>>,
}

impl SessionShared {
    fn new(tunables: ConnectionTunables) -> Self {
        Self {
            state: AtomicU8::new(VncState::Disconnected as u8),
            framebuffer_state: AtomicU8::new(FramebufferState::Invalid as u8),
            flags: ControlFlags::new(),
            framebuffer: FrameStore::new(),
            stats: SessionStats::new(),
            queue: CommandQueue::new(),
            sleeper: Sleeper::new(),
            config: Mutex::new(HostConfig {
                host: String::new(),
                port: -1,
                scaled_size: None,
            }),
            quality: AtomicU8::new(VncQuality::default() as u8),
            use_remote_cursor: AtomicBool::new(false),
            update_interval_ms: AtomicI64::new(0),
            update_watchdog: Mutex::new(Instant::now()),
            tunables,
            observers: RwLock::new(Vec::new()),
            protocol_logging: AtomicBool::new(false),
            running: AtomicBool::new(false),
            finalizer: Mutex::new(None),
        }
    }

    pub(crate) fn emit(&self, event: &VncSessionEvent) {
        for observer in self.observers.read().unwrap().iter() {
            observer(event);
        }
    }

    fn state(&self) -> VncState {
        VncState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Transition the session state; same-value transitions are
    /// suppressed.
    fn set_state(&self, state: VncState) {
        if self.state.swap(state as u8, Ordering::SeqCst) != state as u8 {
            self.emit(&VncSessionEvent::StateChanged { state });
        }
    }

    pub(crate) fn framebuffer_state(&self) -> FramebufferState {
        FramebufferState::from_u8(self.framebuffer_state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_framebuffer_state(&self, state: FramebufferState) {
        self.framebuffer_state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn quality(&self) -> VncQuality {
        VncQuality::from_u8(self.quality.load(Ordering::SeqCst))
    }

    pub(crate) fn use_remote_cursor(&self) -> bool {
        self.use_remote_cursor.load(Ordering::SeqCst)
    }

    pub(crate) fn protocol_logging_enabled(&self) -> bool {
        self.protocol_logging.load(Ordering::SeqCst)
    }

    fn update_interval_ms(&self) -> i64 {
        self.update_interval_ms.load(Ordering::SeqCst)
    }

    pub(crate) fn restart_update_watchdog(&self) {
        *self.update_watchdog.lock().unwrap() = Instant::now();
    }

    fn update_watchdog_elapsed(&self) -> Duration {
        self.update_watchdog.lock().unwrap().elapsed()
    }
}

// ---- Public session handle ----

/// A single VNC connection to a remote framebuffer server.
///
/// `start()` spawns the session thread; from then on the thread keeps
/// reconnecting until `stop()` (or drop). Observers registered with
/// `on_event` are invoked synchronously on the session thread.
pub struct VncSession {
    shared: Arc<SessionShared>,
    adapter: Arc<HookAdapter>,
    factory: Arc<dyn RfbClientFactory>,
    executor: Option<Arc<dyn TaskExecutor>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl VncSession {
    pub fn new(factory: Arc<dyn RfbClientFactory>) -> Self {
        Self::with_tunables(factory, ConnectionTunables::default())
    }

    pub fn with_tunables(factory: Arc<dyn RfbClientFactory>, tunables: ConnectionTunables) -> Self {
        Self {
            shared: Arc::new(SessionShared::new(tunables)),
            adapter: HookAdapter::new(),
            factory,
            executor: None,
            thread: Mutex::new(None),
        }
    }

    /// Executor used for deferred destruction (`stop_and_delete_later`).
    pub fn set_finalize_executor(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executor = Some(executor);
    }

    pub fn on_event(&self, observer: impl Fn(&VncSessionEvent) + Send + Sync + 'static) {
        self.shared
            .observers
            .write()
            .unwrap()
            .push(Box::new(observer));
    }

    // ---- Lifecycle ----

    pub fn start(&self) {
        let mut slot = self.thread.lock().unwrap();
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                log::warn!("VNC session thread is already running");
                return;
            }
        }

        self.adapter.bind(&self.shared);
        self.shared
            .flags
            .set(ControlFlag::TerminateThread, false);
        self.shared.running.store(true, Ordering::SeqCst);

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            adapter: Arc::clone(&self.adapter),
            factory: Arc::clone(&self.factory),
            executor: self.executor.clone(),
            client: None,
        };

        match thread::Builder::new()
            .name("vnc-session".into())
            .spawn(move || driver.run())
        {
            Ok(handle) => *slot = Some(handle),
            Err(e) => {
                log::error!("failed to spawn VNC session thread: {e}");
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Ask the session thread to drop the current connection and go
    /// back to establishing, without tearing the session down.
    pub fn restart(&self) {
        self.shared.flags.set(ControlFlag::RestartConnection, true);
    }

    /// Request termination. The adapter back-pointer is cleared first so
    /// codec callbacks arriving during shutdown are ignored.
    pub fn stop(&self) {
        self.adapter.unbind();
        self.shared.framebuffer.clear_scaled();
        self.shared.flags.set(ControlFlag::TerminateThread, true);
        self.shared.sleeper.wake_all();
    }

    /// Stop, then hand the session to the finalize executor for
    /// destruction once the thread has exited. Without an executor this
    /// degrades to a synchronous stop-and-drop.
    pub fn stop_and_delete_later(self) {
        let Some(executor) = self.executor.clone() else {
            self.stop();
            return;
        };

        if !self.is_running() {
            executor.execute(Box::new(move || drop(self)));
            return;
        }

        let shared = Arc::clone(&self.shared);
        let adapter = Arc::clone(&self.adapter);
        shared.flags.set(ControlFlag::DeleteAfterFinished, true);
        *shared.finalizer.lock().unwrap() = Some(Box::new(move || drop(self)));

        adapter.unbind();
        shared.framebuffer.clear_scaled();
        shared.flags.set(ControlFlag::TerminateThread, true);
        shared.sleeper.wake_all();

        // The thread may have exited before the finalizer was armed; in
        // that case schedule it ourselves. `take()` keeps this single-shot.
        if !shared.running.load(Ordering::SeqCst) {
            if let Some(task) = shared.finalizer.lock().unwrap().take() {
                executor.execute(task);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> VncState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == VncState::Connected && self.is_running()
    }

    /// Whether at least one full framebuffer update has been received.
    pub fn has_valid_framebuffer(&self) -> bool {
        self.shared.framebuffer_state() == FramebufferState::Valid
    }

    pub fn host(&self) -> String {
        self.shared.config.lock().unwrap().host.clone()
    }

    pub fn tunables(&self) -> &ConnectionTunables {
        &self.shared.tunables
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.shared.stats.snapshot()
    }

    // ---- Configuration ----

    /// Set the host, peeling off a trailing port and normalising
    /// IPv4-mapped IPv6 forms.
    pub fn set_host(&self, host: &str) {
        let parsed = HostAddress::parse(host);
        let mut config = self.shared.config.lock().unwrap();
        config.host = parsed.host;
        if let Some(port) = parsed.port {
            config.port = i32::from(port);
        }
    }

    pub fn set_port(&self, port: i32) {
        if port >= 0 {
            self.shared.config.lock().unwrap().port = port;
        }
    }

    pub fn set_quality(&self, quality: VncQuality) {
        self.shared.quality.store(quality as u8, Ordering::SeqCst);
        self.enqueue(VncCommand::RefreshFormatAndEncodings);
    }

    pub fn set_use_remote_cursor(&self, enabled: bool) {
        self.shared
            .use_remote_cursor
            .store(enabled, Ordering::SeqCst);
        self.enqueue(VncCommand::RefreshFormatAndEncodings);
    }

    /// Mark the host as reachable at the TCP level; used by the failed
    /// connect classifier.
    pub fn set_server_reachable(&self) {
        self.shared.flags.set(ControlFlag::ServerReachable, true);
    }

    pub fn set_skip_host_ping(&self, on: bool) {
        self.shared.flags.set(ControlFlag::SkipHostPing, on);
    }

    pub fn set_requires_manual_update_rate_control(&self, on: bool) {
        self.shared
            .flags
            .set(ControlFlag::RequiresManualUpdateRateControl, on);
    }

    pub fn set_scaled_size(&self, width: u32, height: u32) {
        let size = if width == 0 || height == 0 {
            None
        } else {
            Some((width, height))
        };
        let mut config = self.shared.config.lock().unwrap();
        if config.scaled_size != size {
            config.scaled_size = size;
            self.shared
                .flags
                .set(ControlFlag::ScaledFramebufferNeedsUpdate, true);
        }
    }

    pub fn set_framebuffer_update_interval(&self, interval_ms: i64) {
        self.shared
            .update_interval_ms
            .store(interval_ms, Ordering::SeqCst);

        if interval_ms <= 0 {
            self.shared
                .flags
                .set(ControlFlag::TriggerFramebufferUpdate, true);
        }

        self.shared.sleeper.wake_all();
    }

    /// Route codec-internal log lines to `log::debug!`. Silent by
    /// default.
    pub fn set_protocol_logging(&self, enabled: bool) {
        self.shared
            .protocol_logging
            .store(enabled, Ordering::SeqCst);
    }

    // ---- Framebuffer access ----

    /// Snapshot of the current framebuffer. The handle stays readable
    /// even if the server resizes and the backing store is reallocated.
    pub fn image(&self) -> FrameImage {
        self.shared.framebuffer.snapshot()
    }

    /// Recompute the scaled view if it is stale.
    pub fn rescale_framebuffer(&self) {
        let scaled_size = self.shared.config.lock().unwrap().scaled_size;

        let Some((width, height)) = scaled_size else {
            self.shared.framebuffer.clear_scaled();
            return;
        };
        if !self.has_valid_framebuffer() {
            self.shared.framebuffer.clear_scaled();
            return;
        }
        if !self
            .shared
            .flags
            .is_set(ControlFlag::ScaledFramebufferNeedsUpdate)
        {
            return;
        }

        if self.shared.framebuffer.rescale_to(width, height) {
            self.shared
                .flags
                .set(ControlFlag::ScaledFramebufferNeedsUpdate, false);
        }
    }

    /// The framebuffer resampled to the configured scaled size; an
    /// empty image while no valid framebuffer or scaled size exists.
    pub fn scaled_framebuffer(&self) -> RgbaImage {
        self.rescale_framebuffer();
        self.shared
            .framebuffer
            .scaled()
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    // ---- Input ----

    pub fn mouse_event(&self, x: u16, y: u16, button_mask: u8) {
        self.enqueue(VncCommand::PointerMove { x, y, button_mask });
    }

    pub fn key_event(&self, keysym: u32, pressed: bool) {
        self.enqueue(VncCommand::Key { keysym, pressed });
    }

    pub fn client_cut(&self, text: impl Into<String>) {
        self.enqueue(VncCommand::ClientCut { text: text.into() });
    }

    pub fn is_event_queue_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Commands are only accepted while connected; anything else is
    /// silently dropped.
    fn enqueue(&self, command: VncCommand) {
        if self.shared.state() != VncState::Connected {
            return;
        }
        self.shared.queue.push(command);
        self.shared.sleeper.wake_all();
    }
}

impl Drop for VncSession {
    fn drop(&mut self) {
        self.stop();

        let handle = self.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            if !handle.is_finished() {
                log::warn!("waiting for VNC session thread to finish");
            }
            let deadline = Instant::now() + self.shared.tunables.thread_termination_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // no safe way to kill a thread; leave it detached
                log::warn!("VNC session thread did not terminate in time, detaching");
            }
        }
    }
}

// ---- Driver (session thread) ----

struct Driver {
    shared: Arc<SessionShared>,
    adapter: Arc<HookAdapter>,
    factory: Arc<dyn RfbClientFactory>,
    executor: Option<Arc<dyn TaskExecutor>>,
    client: Option<Box<dyn RfbClient>>,
}

impl Driver {
    fn run(mut self) {
        while !self.shared.flags.is_set(ControlFlag::TerminateThread) {
            self.establish();
            self.handle();
            self.close();
        }

        self.shared.running.store(false, Ordering::SeqCst);

        if self.shared.flags.is_set(ControlFlag::DeleteAfterFinished) {
            if let Some(executor) = self.executor.clone() {
                if let Some(task) = self.shared.finalizer.lock().unwrap().take() {
                    executor.execute(task);
                }
            }
        }
    }

    fn establish(&mut self) {
        let shared = Arc::clone(&self.shared);
        let tunables = &shared.tunables;

        shared.set_state(VncState::Connecting);
        shared.flags.set(ControlFlag::RestartConnection, false);
        shared.set_framebuffer_state(FramebufferState::Invalid);

        // try to connect for as long as the server allows
        while !shared.flags.is_set(ControlFlag::TerminateThread)
            && shared.state() != VncState::Connected
        {
            let (host, port) = {
                let config = shared.config.lock().unwrap();
                let port = if config.port < 0 {
                    tunables.default_port
                } else {
                    config.port as u16
                };
                (config.host.clone(), port)
            };

            let client_config = ClientConfig {
                host: host.clone(),
                port,
                connect_timeout: tunables.connect_timeout,
                read_timeout: tunables.read_timeout,
            };
            let hooks: Arc<dyn RfbHooks> = Arc::clone(&self.adapter) as Arc<dyn RfbHooks>;
            let mut client = self.factory.create(&client_config, hooks);

            shared.emit(&VncSessionEvent::ConnectionPrepared);
            shared.flags.set(ControlFlag::ServerReachable, false);
            shared
                .stats
                .connect_attempts
                .fetch_add(1, Ordering::Relaxed);

            log::info!("VNC session: connecting to {host}:{port}");
            let initialized = match client.init() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("VNC session: connect to {host}:{port} failed: {e}");
                    shared.stats.set_last_error(&e.to_string());
                    false
                }
            };

            // do not continue or sleep when already asked to stop
            if shared.flags.is_set(ControlFlag::TerminateThread) {
                if initialized {
                    self.client = Some(client);
                }
                return;
            }

            if initialized {
                shared.restart_update_watchdog();

                if let Some(stream) = client.stream() {
                    network::configure_socket_keepalive(
                        stream,
                        true,
                        tunables.socket_keepalive_idle_time,
                        tunables.socket_keepalive_interval,
                        tunables.socket_keepalive_count,
                    );
                }

                let (width, height) = client.framebuffer_size();
                self.client = Some(client);
                shared.stats.mark_connected();
                shared.set_state(VncState::Connected);
                log::info!("VNC session: connected to {host}:{port} ({width}x{height})");
            } else {
                drop(client);

                // guess why the connection failed
                let failure = if !shared.flags.is_set(ControlFlag::ServerReachable) {
                    if shared.flags.is_set(ControlFlag::SkipHostPing) || !network::ping(&host) {
                        VncState::HostOffline
                    } else {
                        VncState::ServerNotRunning
                    }
                } else if shared.framebuffer_state() == FramebufferState::Invalid {
                    VncState::AuthenticationFailed
                } else {
                    VncState::ConnectionFailed
                };
                shared.set_state(failure);

                // wait a bit until the next attempt
                let interval_ms = shared.update_interval_ms();
                let backoff = if interval_ms > 0 {
                    Duration::from_millis(interval_ms as u64)
                } else {
                    tunables.connection_retry_interval
                };
                shared.sleeper.wait(backoff);
            }
        }
    }

    fn handle(&mut self) {
        let shared = Arc::clone(&self.shared);
        let tunables = &shared.tunables;

        while shared.state() == VncState::Connected
            && !shared.flags.is_set(ControlFlag::TerminateThread)
            && !shared.flags.is_set(ControlFlag::RestartConnection)
        {
            let Some(client) = self.client.as_mut() else {
                break;
            };

            let loop_start = Instant::now();
            let interval_ms = shared.update_interval_ms();

            // With periodic updates active the server paces us, so the
            // wait can be generous; otherwise poll at the base timeout.
            let wait_timeout = if interval_ms > 0 {
                tunables.message_wait_timeout * 100
            } else {
                tunables.message_wait_timeout
            };

            let waited = client.wait_for_message(wait_timeout);
            if shared.flags.is_set(ControlFlag::TerminateThread) {
                break;
            }

            match waited {
                Err(e) => {
                    log::warn!("VNC session: socket failure while waiting for messages: {e}");
                    shared.stats.set_last_error(&e.to_string());
                    break;
                }
                Ok(true) => {
                    // drain every message that is already available
                    let mut handled_okay = true;
                    loop {
                        handled_okay &= client.handle_server_message();
                        if !handled_okay {
                            break;
                        }
                        if !matches!(client.wait_for_message(Duration::ZERO), Ok(true)) {
                            break;
                        }
                    }
                    if !handled_okay {
                        log::warn!("VNC session: server message handling failed, reconnecting");
                        break;
                    }
                }
                Ok(false) => {
                    let elapsed = shared.update_watchdog_elapsed();
                    let watchdog_limit = cmp::max(
                        Duration::from_millis((interval_ms.max(0) as u64).saturating_mul(2)),
                        tunables.framebuffer_update_watchdog_timeout,
                    );

                    if elapsed >= watchdog_limit {
                        // updates stalled: request a full refresh to resync
                        let (width, height) = client.framebuffer_size();
                        client.send_framebuffer_update_request(
                            0,
                            0,
                            width as i32,
                            height as i32,
                            false,
                        );
                        shared
                            .stats
                            .update_requests_sent
                            .fetch_add(1, Ordering::Relaxed);
                        shared.restart_update_watchdog();
                    } else if interval_ms > 0
                        && elapsed > Duration::from_millis(interval_ms as u64)
                    {
                        client.send_incremental_framebuffer_update_request();
                        shared
                            .stats
                            .update_requests_sent
                            .fetch_add(1, Ordering::Relaxed);
                        shared.restart_update_watchdog();
                    } else if shared.flags.take(ControlFlag::TriggerFramebufferUpdate) {
                        client.send_incremental_framebuffer_update_request();
                        shared
                            .stats
                            .update_requests_sent
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            // rate control for servers that do not pace update delivery
            // themselves
            if interval_ms > 0 {
                let interval = Duration::from_millis(interval_ms as u64);
                let elapsed = loop_start.elapsed();
                if elapsed < interval
                    && shared
                        .flags
                        .is_set(ControlFlag::RequiresManualUpdateRateControl)
                    && !shared.flags.is_set(ControlFlag::TerminateThread)
                {
                    shared.sleeper.wait(interval - elapsed);
                }
            }

            Self::send_commands(&shared, client.as_mut());
        }
    }

    /// Drain the command queue; the queue lock is not held across codec
    /// sends, and commands arriving after terminate are discarded.
    fn send_commands(shared: &SessionShared, client: &mut dyn RfbClient) {
        while let Some(command) = shared.queue.pop() {
            if shared.flags.is_set(ControlFlag::TerminateThread) {
                continue;
            }

            let sent = match command {
                VncCommand::PointerMove { x, y, button_mask } => {
                    client.send_pointer_event(x, y, button_mask)
                }
                VncCommand::Key { keysym, pressed } => client.send_key_event(keysym, pressed),
                VncCommand::ClientCut { text } => client.send_client_cut_text(&text),
                VncCommand::RefreshFormatAndEncodings => {
                    let profile = EncodingProfile::for_quality(shared.quality());
                    client.update_format_and_encodings(&profile, shared.use_remote_cursor())
                }
            };

            if sent {
                shared.stats.commands_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                log::debug!("VNC session: dropping command the codec failed to send");
            }
        }
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            log::debug!("VNC session: codec client released");
        }
        self.shared.stats.mark_disconnected();
        self.shared.set_state(VncState::Disconnected);
    }
}
