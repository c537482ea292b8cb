//! Beacon Advertiser
//!
//! Owns the single beacon slot. The radio stack cannot swap advertising data
//! while transmitting, so every change is stop, reconfigure, start, in that order.

use crate::domain::models::RadioUse;
use crate::error::{DroidError, Result};
use crate::infrastructure::bluetooth::coordinator::RadioCoordinator;
use crate::infrastructure::bluetooth::protocol::{format_payload, BeaconFrame};
use crate::infrastructure::bluetooth::radio::RadioControl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What is on air right now. Empty payload means nothing is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingState {
    pub current_payload: Vec<u8>,
    pub label: String,
}

impl AdvertisingState {
    pub fn is_active(&self) -> bool {
        !self.current_payload.is_empty()
    }

    fn clear(&mut self) {
        self.current_payload.clear();
        self.label.clear();
    }
}

pub struct BeaconAdvertiser<R: RadioControl> {
    radio: Arc<R>,
    coordinator: RadioCoordinator,
    stop_delay: Duration,
    state: Mutex<AdvertisingState>,
}

impl<R: RadioControl> BeaconAdvertiser<R> {
    pub fn new(radio: Arc<R>, coordinator: RadioCoordinator, stop_delay: Duration) -> Self {
        Self {
            radio,
            coordinator,
            stop_delay,
            state: Mutex::new(AdvertisingState::default()),
        }
    }

    pub async fn state(&self) -> AdvertisingState {
        self.state.lock().await.clone()
    }

    /// Put `frame` on air. Re-activating the frame already on air does nothing.
    pub async fn activate(&self, frame: &BeaconFrame, label: &str) -> Result<()> {
        let payload = frame.encode();
        let mut state = self.state.lock().await;
        if state.current_payload == payload {
            debug!("Beacon '{}' already on air", label);
            return Ok(());
        }

        let _lease = self.coordinator.try_acquire(RadioUse::Advertise)?;
        info!("Switching beacon to '{}': {}", label, format_payload(&payload));

        // Anything on air is gone once stop is issued, confirmed or not
        state.clear();
        self.radio
            .set_advertisement_enabled(false)
            .await
            .map_err(|e| advertise_failed("stop", e))?;
        tokio::time::sleep(self.stop_delay).await;

        self.radio
            .set_advertisement_payload(frame.manufacturer_id, &payload[2..])
            .await
            .map_err(|e| advertise_failed("reconfigure", e))?;
        self.radio
            .set_advertisement_enabled(true)
            .await
            .map_err(|e| advertise_failed("start", e))?;

        state.current_payload = payload;
        state.label = label.to_string();
        Ok(())
    }

    /// Take the beacon off air; succeeds when nothing was active
    pub async fn stop(&self) -> Result<()> {
        let _lease = self.coordinator.try_acquire(RadioUse::Advertise)?;
        self.stop_with_radio().await
    }

    /// Stop once the radio is free, for process shutdown
    pub async fn shutdown(&self) -> Result<()> {
        let _lease = self.coordinator.acquire(RadioUse::Advertise).await;
        self.stop_with_radio().await
    }

    async fn stop_with_radio(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_active() {
            info!("Stopping beacon '{}'", state.label);
        }
        state.clear();
        if let Err(e) = self.radio.set_advertisement_enabled(false).await {
            warn!("Advertising stop failed: {}", e);
            return Err(advertise_failed("stop", e));
        }
        Ok(())
    }
}

fn advertise_failed(step: &str, source: anyhow::Error) -> DroidError {
    warn!("Beacon {} step failed: {:#}", step, source);
    DroidError::AdvertiseFailed {
        reason: format!("{step}: {source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::MANUFACTURER_ID;
    use crate::infrastructure::bluetooth::testing::{FakeRadio, RadioCall};

    fn advertiser(radio: &Arc<FakeRadio>) -> (BeaconAdvertiser<FakeRadio>, RadioCoordinator) {
        let coordinator = RadioCoordinator::new();
        let advertiser =
            BeaconAdvertiser::new(radio.clone(), coordinator.clone(), Duration::from_millis(100));
        (advertiser, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn activation_is_stop_reconfigure_start() {
        let radio = Arc::new(FakeRadio::new());
        let (advertiser, _) = advertiser(&radio);

        advertiser
            .activate(&BeaconFrame::location(0x05, 0x02), "Droid Depot")
            .await
            .unwrap();

        assert_eq!(
            radio.calls(),
            vec![
                RadioCall::SetAdvertisementEnabled(false),
                RadioCall::SetAdvertisementPayload(
                    MANUFACTURER_ID,
                    vec![0x0A, 0x04, 0x05, 0x02, 0xA6, 0x01]
                ),
                RadioCall::SetAdvertisementEnabled(true),
            ]
        );
        let state = advertiser.state().await;
        assert_eq!(state.label, "Droid Depot");
        assert_eq!(state.current_payload, vec![0x01, 0x83, 0x0A, 0x04, 0x05, 0x02, 0xA6, 0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_frame_is_activated_once() {
        let radio = Arc::new(FakeRadio::new());
        let (advertiser, _) = advertiser(&radio);
        let frame = BeaconFrame::droid(0x0E, 0x05).unwrap();

        advertiser.activate(&frame, "Resistance: BD-Unit").await.unwrap();
        advertiser.activate(&frame, "Resistance: BD-Unit").await.unwrap();

        assert_eq!(radio.count(&RadioCall::SetAdvertisementEnabled(false)), 1);
        assert_eq!(radio.count(&RadioCall::SetAdvertisementEnabled(true)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_leaves_nothing_on_air() {
        let radio = Arc::new(FakeRadio::new().failing_advertise_start());
        let (advertiser, coordinator) = advertiser(&radio);

        let err = advertiser
            .activate(&BeaconFrame::location(0x07, 0xFF), "First Order Alert")
            .await
            .unwrap_err();

        assert!(matches!(err, DroidError::AdvertiseFailed { .. }));
        assert!(!advertiser.state().await.is_active());
        assert_eq!(coordinator.holder(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_frames_replaces_the_payload() {
        let radio = Arc::new(FakeRadio::new());
        let (advertiser, _) = advertiser(&radio);

        advertiser.activate(&BeaconFrame::location(0x01, 0x02), "Ronto Roasters").await.unwrap();
        advertiser.activate(&BeaconFrame::location(0x02, 0x02), "Oil Baths").await.unwrap();

        assert_eq!(radio.count(&RadioCall::SetAdvertisementEnabled(true)), 2);
        assert_eq!(advertiser.state().await.label, "Oil Baths");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_clears_state() {
        let radio = Arc::new(FakeRadio::new());
        let (advertiser, _) = advertiser(&radio);

        advertiser.stop().await.unwrap();
        advertiser.activate(&BeaconFrame::location(0x03, 0x02), "Resistance Base").await.unwrap();
        advertiser.stop().await.unwrap();
        advertiser.stop().await.unwrap();

        assert_eq!(advertiser.state().await, AdvertisingState::default());
        // A stopped beacon can be activated again
        advertiser.activate(&BeaconFrame::location(0x03, 0x02), "Resistance Base").await.unwrap();
        assert_eq!(radio.count(&RadioCall::SetAdvertisementEnabled(true)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_radio_is_reported_without_touching_it() {
        let radio = Arc::new(FakeRadio::new());
        let (advertiser, coordinator) = advertiser(&radio);
        let _scan = coordinator.try_acquire(RadioUse::Scan).unwrap();

        let err = advertiser
            .activate(&BeaconFrame::location(0x06, 0x02), "Den of Antiquities")
            .await
            .unwrap_err();

        assert!(matches!(err, DroidError::RadioBusy { holder: RadioUse::Scan }));
        assert!(radio.calls().is_empty());
    }
}
