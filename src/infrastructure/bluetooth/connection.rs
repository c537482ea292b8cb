//! Droid Connection Session
//!
//! Owns the one GATT link to a droid: resolution, link setup, the logon
//! handshake, command dispatch and teardown.
//!
//! ```text
//! Idle -> Connecting -> Handshaking -> Ready -> Closing -> Idle
//!            \______________\____> Failed -> Idle
//! ```
//!
//! Every write to the command characteristic goes through one lock, so at most
//! one packet is in flight no matter which command issued it.

use crate::domain::models::{AppEvent, LinkState, MessageSeverity, RadioUse, StatusMessage};
use crate::domain::settings::TimingSettings;
use crate::error::{DroidError, Result};
use crate::infrastructure::bluetooth::coordinator::{RadioCoordinator, RadioLease};
use crate::infrastructure::bluetooth::protocol::{
    DroidCommand, Motor, MotorDirection, COMMAND_CHAR_UUID,
};
use crate::infrastructure::bluetooth::radio::{LinkHandle, RadioControl};
use btleplug::api::BDAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// The firmware drops single logon writes; it is always sent this many times
const LOGON_REPEAT: usize = 3;

/// Audio played once the handshake is through
const CONNECTED_AUDIO: (u8, u8) = (0, 2);

#[derive(Default)]
struct SessionState {
    link_state: LinkState,
    peer: Option<BDAddr>,
    link: Option<LinkHandle>,
    last_error: Option<String>,
    lease: Option<RadioLease>,
    /// Held while a connect is in flight; its receiver lives in that connect
    cancel: Option<watch::Sender<bool>>,
    /// Bumped by every connect and disconnect; a connect whose generation is
    /// stale has been cancelled
    generation: u64,
}

/// Connection to at most one droid
pub struct DroidSession<R: RadioControl> {
    radio: Arc<R>,
    coordinator: RadioCoordinator,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    timing: TimingSettings,
    state: Mutex<SessionState>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<R: RadioControl> DroidSession<R> {
    pub fn new(
        radio: Arc<R>,
        coordinator: RadioCoordinator,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        timing: TimingSettings,
    ) -> Self {
        Self {
            radio,
            coordinator,
            event_sender,
            timing,
            state: Mutex::new(SessionState::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.lock_state().link_state
    }

    /// Address of the droid being connected or connected
    pub fn peer(&self) -> Option<BDAddr> {
        self.lock_state().peer
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Connect to `address` and run the logon handshake.
    ///
    /// Only valid from `Idle`. On any failure the session passes through
    /// `Failed` back to `Idle` and the radio is released.
    pub async fn connect(&self, address: BDAddr) -> Result<()> {
        let (generation, mut cancel) = self.begin(address)?;
        info!("Connecting to droid {}", address);
        self.send_log(&format!("Connecting to {}...", address), MessageSeverity::Info);

        // Dropping `establish` drops whatever radio call it is waiting on
        let outcome = tokio::select! {
            biased;
            Ok(()) = cancel.changed() => Err(DroidError::Aborted),
            outcome = self.establish(address, generation) => outcome,
        };

        match outcome {
            Ok(()) => {
                info!("Droid {} ready", address);
                self.send_log("Droid connected", MessageSeverity::Success);
                Ok(())
            }
            Err(DroidError::Aborted) => {
                info!("Connection to {} cancelled", address);
                Err(DroidError::Aborted)
            }
            Err(e) => {
                error!("Connection to {} failed: {}", address, e);
                self.fail(generation, &e).await;
                Err(e)
            }
        }
    }

    /// Tear the link down. Always succeeds; teardown errors are only logged.
    ///
    /// A connect still in flight is cancelled, and the radio is only released
    /// once that connect has returned.
    pub async fn disconnect(&self) {
        let (link, cancel) = {
            let mut state = self.lock_state();
            if state.link_state == LinkState::Idle {
                return;
            }
            state.generation += 1;
            self.transition(&mut state, LinkState::Closing);
            (state.link.take(), state.cancel.take())
        };

        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
            cancel.closed().await;
        }

        if let Some(link) = link {
            if let Err(e) = self.radio.gatt_disconnect(link).await {
                debug!("Ignoring teardown error on {}: {}", link, e);
            }
        }

        let mut state = self.lock_state();
        state.lease = None;
        state.peer = None;
        self.transition(&mut state, LinkState::Idle);
        info!("Droid disconnected");
    }

    /// Select `group`, then play `clip` from it (clip 0 plays a random one)
    pub async fn send_audio(&self, group: u8, clip: u8) -> Result<()> {
        self.dispatch(
            &[
                DroidCommand::AudioGroupSelect(group),
                DroidCommand::AudioClipPlay(clip),
            ],
            self.timing.audio_interval(),
        )
        .await
    }

    /// Run a built-in script.
    ///
    /// The caller must refuse [`crate::domain::catalog::UNSAFE_SCRIPT_ID`];
    /// it is not checked here.
    pub async fn run_script(&self, script_id: u8) -> Result<()> {
        self.dispatch(&[DroidCommand::RunScript(script_id)], Duration::ZERO)
            .await
    }

    pub async fn set_pairing_led(&self, on: bool) -> Result<()> {
        self.dispatch(&[DroidCommand::PairingLed(on)], Duration::ZERO)
            .await
    }

    /// Start a motor; it keeps running until stopped
    pub async fn drive_motor(
        &self,
        direction: MotorDirection,
        motor: Motor,
        speed: u8,
        ramp: u16,
    ) -> Result<()> {
        let command = DroidCommand::MotorDirect {
            direction,
            motor,
            speed,
            ramp,
        };
        self.dispatch(&[command], Duration::ZERO).await
    }

    pub async fn stop_motor(&self, motor: Motor) -> Result<()> {
        self.dispatch(&[DroidCommand::MotorStop(motor)], Duration::ZERO)
            .await
    }

    pub async fn stop_all_motors(&self) -> Result<()> {
        let commands = Motor::ALL.map(DroidCommand::MotorStop);
        self.dispatch(&commands, self.timing.audio_interval())
            .await
    }

    /// Claim the session and the radio, or refuse
    fn begin(&self, address: BDAddr) -> Result<(u64, watch::Receiver<bool>)> {
        let mut state = self.lock_state();
        if state.link_state != LinkState::Idle {
            warn!("Connect to {} refused, session is {}", address, state.link_state);
            return Err(DroidError::SessionBusy);
        }
        let lease = match self.coordinator.try_acquire(RadioUse::Connection) {
            Ok(lease) => lease,
            Err(DroidError::RadioBusy {
                holder: RadioUse::Connection,
            }) => return Err(DroidError::SessionBusy),
            Err(e) => return Err(e),
        };

        let (cancel, cancelled) = watch::channel(false);
        state.generation += 1;
        state.lease = Some(lease);
        state.cancel = Some(cancel);
        state.peer = Some(address);
        state.last_error = None;
        self.transition(&mut state, LinkState::Connecting);
        Ok((state.generation, cancelled))
    }

    async fn establish(&self, address: BDAddr, generation: u64) -> Result<()> {
        let resolve_timeout = self.timing.resolve_timeout();
        match tokio::time::timeout(resolve_timeout, self.radio.resolve_peer(&address)).await {
            Ok(Ok(true)) => debug!("Resolved {}", address),
            Ok(Ok(false)) | Err(_) => {
                return Err(DroidError::PeerNotFound {
                    address,
                    timeout: resolve_timeout,
                })
            }
            Ok(Err(e)) => return Err(DroidError::transport("resolve device", e)),
        }

        let link_timeout = self.timing.link_timeout();
        let link = match tokio::time::timeout(
            link_timeout,
            self.radio.gatt_connect(&address, link_timeout),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(DroidError::transport("gatt connect", e)),
            Err(_) => {
                return Err(DroidError::LinkTimeout {
                    address,
                    timeout: link_timeout,
                })
            }
        };

        if !self.attach_link(generation, link) {
            // Disconnected while the link was coming up
            let _ = self.radio.gatt_disconnect(link).await;
            return Err(DroidError::Aborted);
        }
        debug!("GATT link {} open to {}", link, address);

        for _ in 0..LOGON_REPEAT {
            self.handshake_write(generation, link, DroidCommand::Logon)
                .await?;
            tokio::time::sleep(self.timing.handshake_interval()).await;
        }

        let (group, clip) = CONNECTED_AUDIO;
        self.handshake_write(generation, link, DroidCommand::AudioGroupSelect(group))
            .await?;
        tokio::time::sleep(self.timing.audio_interval()).await;
        self.handshake_write(generation, link, DroidCommand::AudioClipPlay(clip))
            .await?;

        self.advance(generation, LinkState::Ready)
    }

    /// Record the open link and move to `Handshaking`; false if cancelled
    fn attach_link(&self, generation: u64, link: LinkHandle) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        state.link = Some(link);
        self.transition(&mut state, LinkState::Handshaking);
        true
    }

    async fn handshake_write(
        &self,
        generation: u64,
        link: LinkHandle,
        command: DroidCommand,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.lock_state().generation;
        if current != generation {
            return Err(DroidError::Aborted);
        }
        self.write(link, command).await
    }

    fn advance(&self, generation: u64, next: LinkState) -> Result<()> {
        let mut state = self.lock_state();
        if state.generation != generation {
            return Err(DroidError::Aborted);
        }
        state.cancel = None;
        self.transition(&mut state, next);
        Ok(())
    }

    /// Failed, then tear down and return to Idle. A no-op once disconnect took over.
    async fn fail(&self, generation: u64, err: &DroidError) {
        let link = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.last_error = Some(err.to_string());
            self.transition(&mut state, LinkState::Failed);
            state.link.take()
        };
        self.send_log(&err.status_message(), MessageSeverity::Error);

        if let Some(link) = link {
            if let Err(e) = self.radio.gatt_disconnect(link).await {
                debug!("Ignoring teardown error on {}: {}", link, e);
            }
        }

        let mut state = self.lock_state();
        if state.generation == generation {
            state.lease = None;
            state.cancel = None;
            state.peer = None;
            self.transition(&mut state, LinkState::Idle);
        }
    }

    /// Ready-gated, serialized write of `commands` with `spacing` between them.
    /// Stops at the first failed write.
    async fn dispatch(&self, commands: &[DroidCommand], spacing: Duration) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let link = self.ready_link()?;

        for (index, command) in commands.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(spacing).await;
            }
            if let Err(e) = self.write(link, *command).await {
                warn!("Command {:?} failed: {}", command, e);
                self.lock_state().last_error = Some(e.to_string());
                return Err(e);
            }
        }
        Ok(())
    }

    fn ready_link(&self) -> Result<LinkHandle> {
        let state = self.lock_state();
        match (state.link_state, state.link) {
            (LinkState::Ready, Some(link)) => Ok(link),
            _ => Err(DroidError::NotConnected),
        }
    }

    /// Caller holds the write lock
    async fn write(&self, link: LinkHandle, command: DroidCommand) -> Result<()> {
        let packet = command.encode();
        debug!("Writing {:02X?} on {}", packet, link);
        self.radio
            .gatt_write(link, COMMAND_CHAR_UUID, &packet)
            .await
            .map_err(|e| DroidError::transport("gatt write", e))
    }

    fn transition(&self, state: &mut SessionState, next: LinkState) {
        debug!("Session {} -> {}", state.link_state, next);
        state.link_state = next;
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(next));
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::MemoryNicknames;
    use crate::infrastructure::bluetooth::scanner::DroidScanner;
    use crate::infrastructure::bluetooth::testing::{FakeRadio, RadioCall};
    use tokio::time::Instant;

    const DROID: &str = "F0:13:C3:00:00:2A";

    fn addr() -> BDAddr {
        DROID.parse().unwrap()
    }

    fn session(
        radio: &Arc<FakeRadio>,
        coordinator: &RadioCoordinator,
    ) -> (DroidSession<FakeRadio>, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = DroidSession::new(
            radio.clone(),
            coordinator.clone(),
            tx,
            TimingSettings::default(),
        );
        (session, rx)
    }

    fn transitions(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<LinkState> {
        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AppEvent::ConnectionStatus(state) = event {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test(start_paused = true)]
    async fn connect_runs_the_logon_handshake() {
        let radio = Arc::new(FakeRadio::new());
        let coordinator = RadioCoordinator::new();
        let (session, mut events) = session(&radio, &coordinator);

        session.connect(addr()).await.unwrap();

        let logon = vec![0x22, 0x20, 0x01, 0x42];
        assert_eq!(
            radio.writes(),
            vec![
                logon.clone(),
                logon.clone(),
                logon,
                vec![0x27, 0x42, 0x0F, 0x44, 0x44, 0x00, 0x1F, 0x00],
                vec![0x27, 0x42, 0x0F, 0x44, 0x44, 0x00, 0x18, 0x02],
            ]
        );
        assert_eq!(session.link_state(), LinkState::Ready);
        assert_eq!(session.peer(), Some(addr()));
        assert_eq!(coordinator.holder(), Some(RadioUse::Connection));
        assert_eq!(
            transitions(&mut events),
            vec![LinkState::Connecting, LinkState::Handshaking, LinkState::Ready]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_peer_times_out_after_five_seconds() {
        let radio = Arc::new(FakeRadio::new().unresolvable());
        let coordinator = RadioCoordinator::new();
        let (session, mut events) = session(&radio, &coordinator);
        let started = Instant::now();

        let err = session.connect(addr()).await.unwrap_err();

        assert!(matches!(err, DroidError::PeerNotFound { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(session.link_state(), LinkState::Idle);
        assert!(session.last_error().is_some());
        assert_eq!(coordinator.holder(), None);
        assert_eq!(radio.count(&RadioCall::GattConnect(addr())), 0);
        assert_eq!(
            transitions(&mut events),
            vec![LinkState::Connecting, LinkState::Failed, LinkState::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_link_reports_link_timeout() {
        let radio = Arc::new(FakeRadio::new().link_hangs());
        let (session, _events) = session(&radio, &RadioCoordinator::new());

        let err = session.connect(addr()).await.unwrap_err();

        assert!(matches!(err, DroidError::LinkTimeout { .. }));
        assert_eq!(session.link_state(), LinkState::Idle);
        assert!(radio.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_handshake_write_tears_the_link_down() {
        let radio = Arc::new(FakeRadio::new().failing_write(2));
        let coordinator = RadioCoordinator::new();
        let (session, _events) = session(&radio, &coordinator);

        let err = session.connect(addr()).await.unwrap_err();

        assert!(matches!(err, DroidError::Transport { .. }));
        assert_eq!(session.link_state(), LinkState::Idle);
        assert_eq!(radio.writes().len(), 2);
        assert_eq!(radio.count(&RadioCall::GattDisconnect(LinkHandle(1))), 1);
        assert_eq!(coordinator.holder(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_outside_ready_never_reach_the_radio() {
        let radio = Arc::new(FakeRadio::new());
        let (session, _events) = session(&radio, &RadioCoordinator::new());

        for _ in 0..2 {
            let err = session.send_audio(0, 2).await.unwrap_err();
            assert!(matches!(err, DroidError::NotConnected));
        }
        assert!(matches!(
            session.run_script(0x01).await,
            Err(DroidError::NotConnected)
        ));
        assert!(radio.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn audio_clip_is_skipped_when_group_select_fails() {
        // Five handshake writes succeed, the sixth is the group select
        let radio = Arc::new(FakeRadio::new().failing_write(6));
        let (session, _events) = session(&radio, &RadioCoordinator::new());
        session.connect(addr()).await.unwrap();

        let err = session.send_audio(3, 4).await.unwrap_err();

        assert!(matches!(err, DroidError::Transport { .. }));
        assert_eq!(radio.writes().len(), 6);
        assert_eq!(session.link_state(), LinkState::Ready);
        assert!(session.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_encoded_onto_the_link() {
        let radio = Arc::new(FakeRadio::new());
        let (session, _events) = session(&radio, &RadioCoordinator::new());
        session.connect(addr()).await.unwrap();

        session.run_script(0x05).await.unwrap();
        session.set_pairing_led(true).await.unwrap();
        session
            .drive_motor(MotorDirection::Reverse, Motor::Right, 0x80, 0x012C)
            .await
            .unwrap();
        session.stop_all_motors().await.unwrap();
        session.stop_motor(Motor::Head).await.unwrap();

        let writes = radio.writes();
        assert_eq!(
            writes[5..].to_vec(),
            vec![
                vec![0x25, 0x00, 0x0C, 0x42, 0x05, 0x02],
                vec![0x23, 0x00, 0x02, 0x41, 0x01],
                vec![0x27, 0x00, 0x05, 0x44, 0x81, 0x80, 0x01, 0x2C],
                vec![0x27, 0x00, 0x05, 0x44, 0x00, 0x00, 0x00, 0x00],
                vec![0x27, 0x00, 0x05, 0x44, 0x01, 0x00, 0x00, 0x00],
                vec![0x27, 0x00, 0x05, 0x44, 0x02, 0x00, 0x00, 0x00],
                vec![0x27, 0x00, 0x05, 0x44, 0x02, 0x00, 0x00, 0x00],
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_connect_is_session_busy() {
        let radio = Arc::new(FakeRadio::new());
        let (session, _events) = session(&radio, &RadioCoordinator::new());
        session.connect(addr()).await.unwrap();

        let err = session.connect(addr()).await.unwrap_err();

        assert!(matches!(err, DroidError::SessionBusy));
        assert_eq!(session.link_state(), LinkState::Ready);
        assert_eq!(radio.count(&RadioCall::ResolvePeer(addr())), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_scanning_is_radio_busy() {
        let radio = Arc::new(FakeRadio::new());
        let coordinator = RadioCoordinator::new();
        let (session, _events) = session(&radio, &coordinator);
        let _scan = coordinator.try_acquire(RadioUse::Scan).unwrap();

        let err = session.connect(addr()).await.unwrap_err();

        assert!(matches!(err, DroidError::RadioBusy { holder: RadioUse::Scan }));
        assert_eq!(session.link_state(), LinkState::Idle);
        assert!(radio.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_during_ready_session_leaves_the_link_alone() {
        let radio = Arc::new(FakeRadio::new().with_peer(DROID, "DROID"));
        let coordinator = RadioCoordinator::new();
        let (session, _events) = session(&radio, &coordinator);
        let (tx, _scan_events) = mpsc::unbounded_channel();
        let scanner = DroidScanner::new(
            radio.clone(),
            coordinator.clone(),
            Arc::new(MemoryNicknames::default()),
            tx,
            &TimingSettings::default(),
        );
        session.connect(addr()).await.unwrap();
        let calls_before = radio.calls().len();

        let err = scanner.scan(Duration::from_secs(2)).await.unwrap_err();

        assert!(matches!(err, DroidError::RadioBusy { holder: RadioUse::Connection }));
        assert_eq!(radio.calls().len(), calls_before);
        assert_eq!(session.link_state(), LinkState::Ready);
        session.send_audio(1, 0).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_returns_to_idle_and_frees_the_radio() {
        let radio = Arc::new(FakeRadio::new());
        let coordinator = RadioCoordinator::new();
        let (session, mut events) = session(&radio, &coordinator);
        session.connect(addr()).await.unwrap();
        transitions(&mut events);

        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.link_state(), LinkState::Idle);
        assert_eq!(session.peer(), None);
        assert_eq!(coordinator.holder(), None);
        assert_eq!(radio.count(&RadioCall::GattDisconnect(LinkHandle(1))), 1);
        assert_eq!(transitions(&mut events), vec![LinkState::Closing, LinkState::Idle]);
        assert!(matches!(
            session.send_audio(0, 1).await,
            Err(DroidError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_a_pending_connect() {
        let radio = Arc::new(FakeRadio::new().unresolvable());
        let coordinator = RadioCoordinator::new();
        let (session, _events) = session(&radio, &coordinator);
        let session = Arc::new(session);
        let started = Instant::now();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(addr()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.link_state(), LinkState::Connecting);
        assert!(matches!(
            coordinator.try_acquire(RadioUse::Scan),
            Err(DroidError::RadioBusy { holder: RadioUse::Connection })
        ));

        session.disconnect().await;

        // The radio is free only because the pending connect already gave up
        let lease = coordinator.try_acquire(RadioUse::Scan).unwrap();
        assert!(matches!(pending.await.unwrap(), Err(DroidError::Aborted)));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(session.link_state(), LinkState::Idle);
        assert_eq!(radio.count(&RadioCall::GattConnect(addr())), 0);
        drop(lease);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_link_setup_keeps_the_radio_until_connect_returns() {
        let radio = Arc::new(FakeRadio::new().link_hangs());
        let coordinator = RadioCoordinator::new();
        let (session, mut events) = session(&radio, &coordinator);
        let session = Arc::new(session);

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(addr()).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(radio.count(&RadioCall::GattConnect(addr())), 1);

        session.disconnect().await;
        assert_eq!(coordinator.holder(), None);

        assert!(matches!(pending.await.unwrap(), Err(DroidError::Aborted)));
        assert!(radio.writes().is_empty());
        assert_eq!(session.last_error(), None);
        assert_eq!(
            transitions(&mut events),
            vec![LinkState::Connecting, LinkState::Closing, LinkState::Idle]
        );

        // A fresh connect is accepted straight away
        let (tx, _fresh_events) = mpsc::unbounded_channel();
        let fresh = DroidSession::new(
            Arc::new(FakeRadio::new()),
            coordinator.clone(),
            tx,
            TimingSettings::default(),
        );
        fresh.connect(addr()).await.unwrap();
        assert_eq!(coordinator.holder(), Some(RadioUse::Connection));
    }
}
