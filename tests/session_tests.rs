//! End-to-end tests of the session driver against a scripted mock codec.

use std::collections::VecDeque;
use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sorng_vnc::{
    ClientConfig, EncodingProfile, FrameSurface, RfbClient, RfbClientFactory, RfbHooks,
    ServerPixelFormat, TaskExecutor, VncError, VncQuality, VncSession, VncSessionEvent,
    VncSettingsPayload, VncState,
};

// ---- Scripted mock codec ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitBehavior {
    /// Handshake succeeds; the server announces the given geometry and
    /// pixel depth and pushes one full framebuffer update.
    Succeed {
        width: u32,
        height: u32,
        bits_per_pixel: u8,
    },
    /// Nothing is listening on the target port.
    Refused,
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    FullUpdateRequest,
    IncrementalUpdateRequest,
    Pointer(u16, u16, u8),
    Key(u32, bool),
    Cut(String),
    FormatAndEncodings,
}

#[derive(Debug, Clone)]
enum ServerMessage {
    CutText(String),
    CursorMove(i32, i32),
    Resize(u32, u32),
}

#[derive(Default)]
struct MockScript {
    /// Behavior per connect attempt; the last entry repeats forever.
    init_behaviors: Mutex<VecDeque<InitBehavior>>,
    /// Marks the host as reachable during every handshake, as the
    /// surrounding control layer would on TCP-level contact.
    reachable_on_init: AtomicBool,
    session: Mutex<Option<Arc<VncSession>>>,
    pending: Mutex<VecDeque<ServerMessage>>,
    sent: Mutex<Vec<Sent>>,
    attempts: AtomicU64,
}

impl MockScript {
    fn new(behaviors: Vec<InitBehavior>) -> Arc<Self> {
        let script = Arc::new(Self::default());
        *script.init_behaviors.lock().unwrap() = behaviors.into();
        script
    }

    fn next_behavior(&self) -> InitBehavior {
        let mut behaviors = self.init_behaviors.lock().unwrap();
        if behaviors.len() > 1 {
            behaviors.pop_front().unwrap()
        } else {
            *behaviors.front().expect("script has at least one behavior")
        }
    }

    fn push_server_message(&self, message: ServerMessage) {
        self.pending.lock().unwrap().push_back(message);
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn count_sent(&self, wanted: &Sent) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| *s == wanted).count()
    }
}

struct MockClient {
    script: Arc<MockScript>,
    hooks: Arc<dyn RfbHooks>,
    surface: Option<FrameSurface>,
    size: (u32, u32),
}

impl MockClient {
    fn push_full_update(&self) {
        if let Some(surface) = &self.surface {
            surface.fill(0x336699);
            let (w, h) = self.size;
            self.hooks.framebuffer_updated(0, 0, w as i32, h as i32);
            self.hooks.framebuffer_update_finished();
        }
    }
}

impl RfbClient for MockClient {
    fn init(&mut self) -> Result<(), VncError> {
        self.script.attempts.fetch_add(1, Ordering::SeqCst);
        if self.script.reachable_on_init.load(Ordering::SeqCst) {
            if let Some(session) = self.script.session.lock().unwrap().as_ref() {
                session.set_server_reachable();
            }
        }

        match self.script.next_behavior() {
            InitBehavior::Refused => Err(VncError::connection_failed("connection refused")),
            InitBehavior::Succeed {
                width,
                height,
                bits_per_pixel,
            } => {
                let format = ServerPixelFormat {
                    bits_per_pixel,
                    depth: 24,
                    big_endian: false,
                    true_colour: true,
                };
                match self.hooks.init_framebuffer(width, height, &format) {
                    Some(setup) => {
                        self.surface = Some(setup.surface);
                        self.size = (width, height);
                        self.push_full_update();
                        Ok(())
                    }
                    None => Err(VncError::protocol("server pixel format rejected")),
                }
            }
        }
    }

    fn wait_for_message(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.script.pending.lock().unwrap().is_empty() {
            return Ok(true);
        }
        if !timeout.is_zero() {
            thread::sleep(timeout.min(Duration::from_millis(5)));
        }
        Ok(!self.script.pending.lock().unwrap().is_empty())
    }

    fn handle_server_message(&mut self) -> bool {
        let message = self.script.pending.lock().unwrap().pop_front();
        match message {
            None => true,
            Some(ServerMessage::CutText(text)) => {
                self.hooks.server_cut_text(text.as_bytes());
                true
            }
            Some(ServerMessage::CursorMove(x, y)) => {
                self.hooks.cursor_moved(x, y);
                true
            }
            Some(ServerMessage::Resize(width, height)) => {
                let format = ServerPixelFormat {
                    bits_per_pixel: 32,
                    depth: 24,
                    big_endian: false,
                    true_colour: true,
                };
                match self.hooks.init_framebuffer(width, height, &format) {
                    Some(setup) => {
                        self.surface = Some(setup.surface);
                        self.size = (width, height);
                        self.push_full_update();
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn send_framebuffer_update_request(
        &mut self,
        _x: i32,
        _y: i32,
        _width: i32,
        _height: i32,
        incremental: bool,
    ) -> bool {
        self.script.sent.lock().unwrap().push(if incremental {
            Sent::IncrementalUpdateRequest
        } else {
            Sent::FullUpdateRequest
        });
        true
    }

    fn send_incremental_framebuffer_update_request(&mut self) -> bool {
        self.script
            .sent
            .lock()
            .unwrap()
            .push(Sent::IncrementalUpdateRequest);
        true
    }

    fn send_pointer_event(&mut self, x: u16, y: u16, button_mask: u8) -> bool {
        self.script
            .sent
            .lock()
            .unwrap()
            .push(Sent::Pointer(x, y, button_mask));
        true
    }

    fn send_key_event(&mut self, keysym: u32, pressed: bool) -> bool {
        self.script.sent.lock().unwrap().push(Sent::Key(keysym, pressed));
        true
    }

    fn send_client_cut_text(&mut self, text: &str) -> bool {
        self.script.sent.lock().unwrap().push(Sent::Cut(text.into()));
        true
    }

    fn update_format_and_encodings(
        &mut self,
        _profile: &EncodingProfile,
        _use_remote_cursor: bool,
    ) -> bool {
        self.script.sent.lock().unwrap().push(Sent::FormatAndEncodings);
        true
    }

    fn read_from_server(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write_to_server(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn stream(&self) -> Option<&TcpStream> {
        None
    }
}

struct MockFactory {
    script: Arc<MockScript>,
}

impl RfbClientFactory for MockFactory {
    fn create(&self, _config: &ClientConfig, hooks: Arc<dyn RfbHooks>) -> Box<dyn RfbClient> {
        Box::new(MockClient {
            script: Arc::clone(&self.script),
            hooks,
            surface: None,
            size: (0, 0),
        })
    }
}

// ---- Helpers ----

fn fast_settings() -> VncSettingsPayload {
    VncSettingsPayload {
        connection_retry_interval_ms: Some(20),
        message_wait_timeout_ms: Some(5),
        framebuffer_update_watchdog_timeout_ms: Some(10_000),
        thread_termination_timeout_ms: Some(2_000),
        ..Default::default()
    }
}

fn make_session(script: &Arc<MockScript>, settings: &VncSettingsPayload) -> Arc<VncSession> {
    let factory = Arc::new(MockFactory {
        script: Arc::clone(script),
    });
    let session = Arc::new(VncSession::with_tunables(factory, settings.resolve()));
    session.set_host("mock-host");
    *script.session.lock().unwrap() = Some(Arc::clone(&session));
    session
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn record_events(session: &VncSession) -> Arc<Mutex<Vec<VncSessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

fn states_of(events: &Mutex<Vec<VncSessionEvent>>) -> Vec<VncState> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            VncSessionEvent::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

const CONNECT: InitBehavior = InitBehavior::Succeed {
    width: 64,
    height: 48,
    bits_per_pixel: 32,
};

// ---- Tests ----

#[test]
fn connects_and_exposes_framebuffer() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
    assert!(wait_until(Duration::from_secs(2), || {
        session.has_valid_framebuffer()
    }));

    let image = session.image();
    assert_eq!((image.width(), image.height()), (64, 48));
    assert_eq!(image.pixel(10, 10), Some(0x336699));

    let states = states_of(&events);
    assert_eq!(states[0], VncState::Connecting);
    assert!(states.contains(&VncState::Connected));

    session.stop();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert_eq!(session.state(), VncState::Disconnected);
}

#[test]
fn input_commands_are_delivered_in_order() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    session.mouse_event(10, 20, 1);
    session.key_event(0xff0d, true);
    session.key_event(0xff0d, false);
    session.client_cut("copied text");

    assert!(wait_until(Duration::from_secs(2), || {
        script.count_sent(&Sent::Cut("copied text".into())) == 1
    }));

    let sent: Vec<Sent> = script
        .sent()
        .into_iter()
        .filter(|s| !matches!(s, Sent::FullUpdateRequest | Sent::IncrementalUpdateRequest))
        .collect();
    assert_eq!(
        sent,
        vec![
            Sent::Pointer(10, 20, 1),
            Sent::Key(0xff0d, true),
            Sent::Key(0xff0d, false),
            Sent::Cut("copied text".into()),
        ]
    );
    assert!(session.is_event_queue_empty());

    session.stop();
}

#[test]
fn commands_outside_connected_state_are_dropped() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.mouse_event(1, 2, 0);
    assert!(session.is_event_queue_empty());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(script.count_sent(&Sent::Pointer(1, 2, 0)), 0);

    session.stop();
}

#[test]
fn quality_change_requests_format_refresh() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    session.set_quality(VncQuality::Lowest);
    assert!(wait_until(Duration::from_secs(2), || {
        script.count_sent(&Sent::FormatAndEncodings) >= 1
    }));

    session.stop();
}

#[test]
fn unreachable_host_classifies_as_offline_and_retries() {
    let script = MockScript::new(vec![InitBehavior::Refused]);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.set_skip_host_ping(true);
    session.start();

    assert!(wait_until(Duration::from_secs(2), || {
        script.attempts.load(Ordering::SeqCst) >= 3
    }));
    session.stop();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));

    let states = states_of(&events);
    assert_eq!(states[0], VncState::Connecting);
    assert!(states.contains(&VncState::HostOffline));
    assert!(!states.contains(&VncState::Connected));
    // back-off between attempts keeps the pace near the retry interval
    let attempts = script.attempts.load(Ordering::SeqCst);
    assert!(attempts < 60, "retried {attempts} times in under a second");
}

#[test]
fn wrong_pixel_depth_fails_without_exposing_a_framebuffer() {
    let script = MockScript::new(vec![InitBehavior::Succeed {
        width: 64,
        height: 48,
        bits_per_pixel: 16,
    }]);
    script.reachable_on_init.store(true, Ordering::SeqCst);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || {
        script.attempts.load(Ordering::SeqCst) >= 2
    }));
    session.stop();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));

    assert!(session.image().is_null());
    assert!(!session.has_valid_framebuffer());

    let states = states_of(&events);
    assert_eq!(states[0], VncState::Connecting);
    assert!(states.contains(&VncState::AuthenticationFailed));
    assert!(!states.contains(&VncState::Connected));
}

#[test]
fn stalled_updates_trigger_watchdog_full_refreshes() {
    let script = MockScript::new(vec![CONNECT]);
    let mut settings = fast_settings();
    settings.framebuffer_update_watchdog_timeout_ms = Some(40);
    let session = make_session(&script, &settings);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    // no server messages arrive; the watchdog must keep requesting full
    // refreshes roughly every 40 ms
    assert!(wait_until(Duration::from_secs(2), || {
        script.count_sent(&Sent::FullUpdateRequest) >= 3
    }));

    session.stop();
}

#[test]
fn periodic_interval_sends_incremental_requests() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    session.set_framebuffer_update_interval(10);
    assert!(wait_until(Duration::from_secs(2), || {
        script.count_sent(&Sent::IncrementalUpdateRequest) >= 2
    }));

    session.stop();
}

#[test]
fn disabling_the_interval_triggers_one_update() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    session.set_framebuffer_update_interval(0);
    assert!(wait_until(Duration::from_secs(2), || {
        script.count_sent(&Sent::IncrementalUpdateRequest) >= 1
    }));

    session.stop();
}

#[test]
fn scaled_framebuffer_matches_requested_size() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || {
        session.has_valid_framebuffer()
    }));

    session.set_scaled_size(30, 20);
    let scaled = session.scaled_framebuffer();
    assert_eq!(scaled.dimensions(), (30, 20));

    session.set_scaled_size(0, 0);
    let scaled = session.scaled_framebuffer();
    assert_eq!(scaled.dimensions(), (0, 0));

    session.stop();
}

#[test]
fn snapshot_outlives_server_resize() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || {
        session.has_valid_framebuffer()
    }));

    let before = session.image();
    script.push_server_message(ServerMessage::Resize(128, 96));

    assert!(wait_until(Duration::from_secs(2), || {
        session.image().width() == 128
    }));

    // the old snapshot still reads the old allocation
    assert_eq!((before.width(), before.height()), (64, 48));
    assert_eq!(before.pixel(10, 10), Some(0x336699));

    let resized = events.lock().unwrap().iter().any(|e| {
        matches!(
            e,
            VncSessionEvent::FramebufferSizeChanged {
                width: 128,
                height: 96
            }
        )
    });
    assert!(resized);

    session.stop();
}

#[test]
fn server_cut_text_and_cursor_motion_reach_observers() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    script.push_server_message(ServerMessage::CutText(String::new()));
    script.push_server_message(ServerMessage::CutText("from server".into()));
    script.push_server_message(ServerMessage::CursorMove(5, 7));

    assert!(wait_until(Duration::from_secs(2), || {
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, VncSessionEvent::CursorPosChanged { x: 5, y: 7 }))
    }));

    let cuts: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            VncSessionEvent::GotCut { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    // the empty cut was swallowed
    assert_eq!(cuts, vec!["from server".to_string()]);

    session.stop();
}

#[test]
fn restart_reestablishes_the_connection() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());
    let events = record_events(&session);

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    session.restart();
    assert!(wait_until(Duration::from_secs(2), || {
        script.attempts.load(Ordering::SeqCst) >= 2
    }));
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    let states = states_of(&events);
    let reconnects = states.iter().filter(|s| **s == VncState::Connected).count();
    assert_eq!(reconnects, 2);
    assert!(states.contains(&VncState::Disconnected));

    session.stop();
}

#[test]
fn stop_terminates_the_thread_promptly() {
    let script = MockScript::new(vec![CONNECT]);
    let session = make_session(&script, &fast_settings());

    session.start();
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    let stop_requested = Instant::now();
    session.stop();
    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert!(stop_requested.elapsed() < Duration::from_secs(2));
}

// ---- Deferred destruction ----

struct ThreadExecutor {
    sender: mpsc::Sender<Box<dyn FnOnce() + Send>>,
}

impl ThreadExecutor {
    fn spawn() -> (Arc<Self>, Arc<AtomicUsize>) {
        let (sender, receiver) = mpsc::channel::<Box<dyn FnOnce() + Send>>();
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executed);
        thread::spawn(move || {
            while let Ok(task) = receiver.recv() {
                task();
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (Arc::new(Self { sender }), executed)
    }
}

impl TaskExecutor for ThreadExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        self.sender.send(task).expect("executor thread is alive");
    }
}

#[test]
fn stop_and_delete_later_finalizes_on_the_executor() {
    let script = MockScript::new(vec![CONNECT]);
    let factory = Arc::new(MockFactory {
        script: Arc::clone(&script),
    });
    let (executor, executed) = ThreadExecutor::spawn();

    let mut session = VncSession::with_tunables(factory, fast_settings().resolve());
    session.set_finalize_executor(executor);
    session.set_host("mock-host");
    session.start();

    let session = Arc::new(session);
    *script.session.lock().unwrap() = Some(Arc::clone(&session));
    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

    let session = Arc::try_unwrap({
        *script.session.lock().unwrap() = None;
        session
    })
    .unwrap_or_else(|_| panic!("no outstanding session handles"));

    session.stop_and_delete_later();
    assert!(wait_until(Duration::from_secs(2), || {
        executed.load(Ordering::SeqCst) == 1
    }));
}
