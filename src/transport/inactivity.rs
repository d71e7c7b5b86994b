//! Connection liveness checks.
//!
//! Once both sides' `WireFormatInfo` have passed through, [`InactivityMonitor`]
//! runs a checker thread driven by the smaller of the two
//! `maxInactivityDuration` values. Idle writes are covered with a
//! `KeepAliveInfo`; a read period with nothing received fails the transport.

use super::{lock, ListenerSlot, Transport, TransportListener, Upstream};
use crate::commands::{Command, KeepAliveInfo, WireFormatInfo};
use crate::config::get_namespaced_bool_or;
use crate::error::Error;
use ::config::Config;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

const CONFIG_NAMESPACE: &str = "transport";

#[derive(Debug, Clone, Copy, PartialEq)]
struct Timing {
    read_check: Duration,
    write_check: Duration,
    initial_delay: Duration,
}

impl Timing {
    // `None` when either side disabled monitoring.
    fn negotiate(local: &WireFormatInfo, remote: &WireFormatInfo) -> Option<Self> {
        let read = local
            .max_inactivity_duration()
            .min(remote.max_inactivity_duration());
        let read = u64::try_from(read).ok().filter(|read| *read > 0)?;
        let initial = local
            .max_inactivity_duration_initial_delay()
            .min(remote.max_inactivity_duration_initial_delay());
        let write = if read > 3 { read / 3 } else { read };
        Some(Self {
            read_check: Duration::from_millis(read),
            write_check: Duration::from_millis(write),
            initial_delay: Duration::from_millis(u64::try_from(initial).unwrap_or(0)),
        })
    }
}

#[derive(Default)]
struct Checks {
    local: Option<WireFormatInfo>,
    remote: Option<WireFormatInfo>,
    running: bool,
    checker: Option<JoinHandle<()>>,
}

/// Filter that watches a connection for silence in either direction.
///
/// # Configuration Keys
///
/// Looked up as `transport.{key}` and then `{key}`:
///
/// - `keepAliveResponseRequired`: ask the peer to answer our keep-alives
///   (default false)
///
/// Inbound keep-alives that require a response are answered here and not
/// passed up. After the monitor has failed, every send fails.
pub struct InactivityMonitor {
    next: Arc<dyn Transport>,
    listener: ListenerSlot,
    keep_alive_response_required: bool,
    checks: Mutex<Checks>,
    wake: Condvar,
    command_sent: AtomicBool,
    command_received: AtomicBool,
    failed: AtomicBool,
    send_lock: Mutex<()>,
    this: Weak<Self>,
}

impl InactivityMonitor {
    pub fn new(next: Arc<dyn Transport>, config: &Config) -> Result<Arc<Self>, Error> {
        let keep_alive_response_required =
            get_namespaced_bool_or(config, CONFIG_NAMESPACE, "keepAliveResponseRequired", false)?;
        let monitor = Arc::new_cyclic(|this| Self {
            next,
            listener: ListenerSlot::default(),
            keep_alive_response_required,
            checks: Mutex::new(Checks::default()),
            wake: Condvar::new(),
            command_sent: AtomicBool::new(false),
            command_received: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            send_lock: Mutex::new(()),
            this: this.clone(),
        });
        monitor
            .next
            .set_transport_listener(Some(Upstream::listener(Arc::downgrade(&monitor))));
        Ok(monitor)
    }

    /// True while the checker thread is running.
    pub fn is_monitoring(&self) -> bool {
        lock(&self.checks).running
    }

    pub fn is_keep_alive_response_required(&self) -> bool {
        self.keep_alive_response_required
    }

    fn inactive_error(&self) -> Error {
        Error::TransportFailure(format!(
            "Channel was inactive for too long: {}",
            self.next.remote_address().unwrap_or_default()
        ))
    }

    fn record_wire_format(&self, info: &WireFormatInfo, remote: bool) {
        let mut checks = lock(&self.checks);
        if remote {
            checks.remote = Some(info.clone());
        } else {
            checks.local = Some(info.clone());
        }
        if checks.running || self.failed.load(Ordering::Acquire) {
            return;
        }
        let (Some(local), Some(remote)) = (&checks.local, &checks.remote) else {
            return;
        };
        let Some(timing) = Timing::negotiate(local, remote) else {
            debug!("Inactivity monitoring disabled by wire format");
            return;
        };

        let this = self.this.clone();
        let spawned = thread::Builder::new()
            .name("openwire-inactivity".into())
            .spawn(move || Self::check_loop(this, timing));
        match spawned {
            Ok(handle) => {
                debug!(read_check = ?timing.read_check, write_check = ?timing.write_check, "Started inactivity monitor");
                checks.running = true;
                checks.checker = Some(handle);
            }
            Err(err) => warn!(%err, "Failed to start inactivity monitor"),
        }
    }

    fn stop_checks(&self) {
        let checker = {
            let mut checks = lock(&self.checks);
            checks.running = false;
            self.wake.notify_all();
            checks.checker.take()
        };
        if let Some(handle) = checker {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Inactivity checker panicked");
            }
        }
    }

    // Fixed-rate schedule: both checks first run after the initial delay.
    fn check_loop(this: Weak<Self>, timing: Timing) {
        let start = Instant::now() + timing.initial_delay;
        let mut next_read = start;
        let mut next_write = start;
        loop {
            let Some(monitor) = this.upgrade() else {
                return;
            };
            {
                let checks = lock(&monitor.checks);
                let deadline = next_read.min(next_write);
                let timeout = deadline.saturating_duration_since(Instant::now());
                let (checks, _) = monitor
                    .wake
                    .wait_timeout_while(checks, timeout, |checks| checks.running)
                    .unwrap_or_else(PoisonError::into_inner);
                if !checks.running {
                    return;
                }
            }

            let now = Instant::now();
            if now >= next_write {
                monitor.write_check();
                next_write += timing.write_check;
            }
            if now >= next_read {
                if !monitor.read_check() {
                    return;
                }
                next_read += timing.read_check;
            }
        }
    }

    fn write_check(&self) {
        if self.command_sent.swap(false, Ordering::AcqRel) {
            return;
        }
        trace!("No writes in the last period, sending KeepAliveInfo");
        let mut info = KeepAliveInfo::default();
        info.base.response_required = self.keep_alive_response_required;
        if let Err(err) = self.oneway(info.into()) {
            self.on_exception(err);
        }
    }

    // Returns false once the transport has been failed.
    fn read_check(&self) -> bool {
        if self.command_received.swap(false, Ordering::AcqRel) {
            return true;
        }
        let error = self.inactive_error();
        warn!(%error, "No reads in the last period");
        self.on_exception(error);
        false
    }
}

impl Transport for InactivityMonitor {
    fn start(&self) -> Result<(), Error> {
        self.next.start()
    }

    fn stop(&self) -> Result<(), Error> {
        self.stop_checks();
        self.next.stop()
    }

    #[instrument(skip(self))]
    fn close(&self) -> Result<(), Error> {
        self.stop_checks();
        self.next.close()
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        let _send = lock(&self.send_lock);
        if self.failed.load(Ordering::Acquire) {
            return Err(self.inactive_error());
        }
        if let Command::WireFormatInfo(info) = &command {
            self.record_wire_format(info, false);
        }
        let result = self.next.oneway(command);
        self.command_sent.store(true, Ordering::Release);
        result
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.listener.set(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.get()
    }

    fn is_connected(&self) -> bool {
        self.next.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.next.is_closed()
    }

    fn is_fault_tolerant(&self) -> bool {
        self.next.is_fault_tolerant()
    }

    fn is_reconnect_supported(&self) -> bool {
        self.next.is_reconnect_supported()
    }

    fn remote_address(&self) -> Option<String> {
        self.next.remote_address()
    }

    fn untrack_request(&self, command_id: i32) {
        self.next.untrack_request(command_id);
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        if type_id == TypeId::of::<Self>() {
            return Some(self);
        }
        self.next.clone().narrow(type_id)
    }
}

impl TransportListener for InactivityMonitor {
    fn on_command(&self, command: Command) {
        self.command_received.store(true, Ordering::Release);
        match command {
            Command::KeepAliveInfo(mut info) => {
                if info.base.response_required {
                    info.base.response_required = false;
                    if let Err(err) = self.oneway(info.into()) {
                        debug!(%err, "Failed to answer KeepAliveInfo");
                    }
                }
            }
            Command::WireFormatInfo(info) => {
                self.record_wire_format(&info, true);
                self.listener.on_command(info.into());
            }
            command => self.listener.on_command(command),
        }
    }

    fn on_exception(&self, error: Error) {
        if self.failed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_checks();
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Response;
    use crate::transport::{MockTransport, ResponseBuilder};

    const WAIT: Duration = Duration::from_secs(5);

    // Answers the handshake with a peer that wants `millis` of inactivity
    // checking and otherwise stays silent.
    struct SilentPeer {
        millis: i64,
    }

    impl ResponseBuilder for SilentPeer {
        fn build_response(&self, _command: &Command) -> Option<Response> {
            None
        }

        fn build_incoming_commands(&self, command: &Command) -> Vec<Command> {
            match command {
                Command::WireFormatInfo(_) => vec![wire_format_info(self.millis).into()],
                _ => Vec::new(),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<Command>>,
        errors: Mutex<Vec<Error>>,
    }

    impl TransportListener for Recorder {
        fn on_command(&self, command: Command) {
            lock(&self.commands).push(command);
        }

        fn on_exception(&self, error: Error) {
            lock(&self.errors).push(error);
        }
    }

    fn wire_format_info(millis: i64) -> WireFormatInfo {
        let mut info = WireFormatInfo::new(9);
        info.set_max_inactivity_duration(millis);
        info.set_max_inactivity_duration_initial_delay(0);
        info
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn stack(
        peer_millis: i64,
    ) -> (Arc<MockTransport>, Arc<InactivityMonitor>, Arc<Recorder>) {
        let mock = Arc::new(MockTransport::new("idle"));
        mock.set_response_builder(Arc::new(SilentPeer {
            millis: peer_millis,
        }));
        let monitor = InactivityMonitor::new(mock.clone(), &Config::default()).unwrap();
        let recorder = Arc::new(Recorder::default());
        monitor.set_transport_listener(Some(recorder.clone()));
        monitor.start().unwrap();
        (mock, monitor, recorder)
    }

    fn sent_keep_alives(mock: &MockTransport) -> Vec<KeepAliveInfo> {
        mock.sent_commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::KeepAliveInfo(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn timing_uses_the_smaller_duration() {
        let timing = Timing::negotiate(&wire_format_info(30_000), &wire_format_info(90)).unwrap();
        assert_eq!(timing.read_check, Duration::from_millis(90));
        assert_eq!(timing.write_check, Duration::from_millis(30));
        assert_eq!(timing.initial_delay, Duration::ZERO);

        let short = Timing::negotiate(&wire_format_info(3), &wire_format_info(3)).unwrap();
        assert_eq!(short.write_check, Duration::from_millis(3));
        assert!(Timing::negotiate(&wire_format_info(30_000), &wire_format_info(0)).is_none());
    }

    #[test]
    fn idle_writes_send_keep_alives() {
        let (mock, monitor, recorder) = stack(150);
        monitor.oneway(wire_format_info(150).into()).unwrap();

        assert!(wait_until(|| !sent_keep_alives(&mock).is_empty()));
        assert!(!sent_keep_alives(&mock)[0].base.response_required);
        assert!(wait_until(|| lock(&recorder.commands).len() == 1));
        assert!(matches!(lock(&recorder.commands)[0], Command::WireFormatInfo(_)));
        monitor.close().unwrap();
        assert!(!monitor.is_monitoring());
    }

    #[test]
    fn idle_reads_fail_the_transport_once() {
        let (_mock, monitor, recorder) = stack(60);
        monitor.oneway(wire_format_info(60).into()).unwrap();

        assert!(wait_until(|| !lock(&recorder.errors).is_empty()));
        assert!(lock(&recorder.errors)[0]
            .to_string()
            .contains("inactive for too long"));
        assert!(!monitor.is_monitoring());
        let err = monitor.oneway(KeepAliveInfo::default().into()).unwrap_err();
        assert!(err.is_connection_failure());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(lock(&recorder.errors).len(), 1);
    }

    #[test]
    fn inbound_traffic_keeps_the_connection_alive() {
        let (mock, monitor, recorder) = stack(150);
        monitor.oneway(wire_format_info(150).into()).unwrap();

        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            mock.fire_command(KeepAliveInfo::default().into());
            thread::sleep(Duration::from_millis(20));
        }
        assert!(lock(&recorder.errors).is_empty());
        assert!(monitor.is_monitoring());
        monitor.close().unwrap();
    }

    #[test]
    fn keep_alive_requests_are_answered_and_not_passed_up() {
        let (mock, monitor, recorder) = stack(0);
        let mut request = KeepAliveInfo::default();
        request.base.command_id = 5;
        request.base.response_required = true;
        mock.fire_command(request.into());

        let answers = sent_keep_alives(&mock);
        assert_eq!(answers.len(), 1);
        assert!(!answers[0].base.response_required);
        assert!(lock(&recorder.commands).is_empty());
        monitor.close().unwrap();
    }

    #[test]
    fn zero_duration_disables_monitoring() {
        let (mock, monitor, recorder) = stack(0);
        monitor.oneway(wire_format_info(30_000).into()).unwrap();
        assert!(wait_until(|| lock(&recorder.commands).len() == 1));

        thread::sleep(Duration::from_millis(100));
        assert!(!monitor.is_monitoring());
        assert!(sent_keep_alives(&mock).is_empty());
        assert!(lock(&recorder.errors).is_empty());
    }

    #[test]
    fn keep_alive_response_flag_is_configurable() {
        let config = Config::builder()
            .set_override("transport.keepAliveResponseRequired", true)
            .unwrap()
            .build()
            .unwrap();
        let monitor =
            InactivityMonitor::new(Arc::new(MockTransport::new("flag")), &config).unwrap();
        assert!(monitor.is_keep_alive_response_required());
    }
}
