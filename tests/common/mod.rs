//! Helpers shared by the integration tests.
//!
//! Use TEST_LOG environment variable to control tracing verbosity (like -v, -vv, -vvv):
//!
//! ```bash
//! TEST_LOG=2 cargo test --test failover -- --nocapture
//! ```

#![allow(dead_code)]

use openwire_transport::prelude::*;
use std::sync::{Condvar, Mutex, Once};
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing based on TEST_LOG environment variable
///
/// - TEST_LOG=1: Info level
/// - TEST_LOG=2: Debug level
/// - TEST_LOG=3: Trace level
pub fn init_tracing() {
    INIT.call_once(|| {
        if let Ok(level_str) = std::env::var("TEST_LOG") {
            let verbosity = level_str.parse::<u8>().unwrap_or(0);

            if verbosity > 0 {
                let level = match verbosity {
                    1 => "info",
                    2 => "debug",
                    _ => "trace", // 3 or more
                };

                let filter = format!("openwire_transport={}", level);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                    .with_target(true)
                    .with_test_writer()
                    .try_init();
            }
        }
    });
}

// ============================================================================
// Recording Listener
// ============================================================================

#[derive(Debug, Default)]
pub struct Recorded {
    pub commands: Vec<Command>,
    pub errors: Vec<String>,
    pub interrupted: usize,
    pub resumed: usize,
}

/// Listener that records every event it sees.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Recorded>,
    changed: Condvar,
}

impl RecordingListener {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    fn record(&self, f: impl FnOnce(&mut Recorded)) {
        let mut events = self.events.lock().unwrap();
        f(&mut events);
        self.changed.notify_all();
    }

    /// Waits until `predicate` holds for the recorded events.
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&Recorded) -> bool) -> bool {
        let events = self.events.lock().unwrap();
        let (events, _) = self
            .changed
            .wait_timeout_while(events, timeout, |events| !predicate(events))
            .unwrap();
        predicate(&events)
    }

    pub fn commands(&self) -> Vec<Command> {
        self.events.lock().unwrap().commands.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events.lock().unwrap().errors.clone()
    }

    pub fn interrupted(&self) -> usize {
        self.events.lock().unwrap().interrupted
    }

    pub fn resumed(&self) -> usize {
        self.events.lock().unwrap().resumed
    }
}

impl TransportListener for RecordingListener {
    fn on_command(&self, command: Command) {
        self.record(|events| events.commands.push(command));
    }

    fn on_exception(&self, error: Error) {
        self.record(|events| events.errors.push(error.to_string()));
    }

    fn transport_interrupted(&self) {
        self.record(|events| events.interrupted += 1);
    }

    fn transport_resumed(&self) {
        self.record(|events| events.resumed += 1);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

pub const WAIT: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn config(pairs: &[(&str, &str)]) -> config::Config {
    let mut builder = config::Config::builder();
    for (key, value) in pairs {
        builder = builder.set_override(*key, *value).unwrap();
    }
    builder.build().unwrap()
}
