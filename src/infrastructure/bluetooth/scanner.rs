//! Droid Scanner
//!
//! Time-boxed discovery of nearby droids with best-effort identity resolution.
//! Each scan produces a fresh result set; peers that stopped advertising simply
//! disappear.

use crate::domain::models::{
    AppEvent, DecodedIdentity, MessageSeverity, RadioUse, ScanResult, StatusMessage,
};
use crate::domain::settings::{NicknameStore, TimingSettings};
use crate::error::{DroidError, Result};
use crate::infrastructure::bluetooth::coordinator::RadioCoordinator;
use crate::infrastructure::bluetooth::protocol::decode_advertisement;
use crate::infrastructure::bluetooth::radio::RadioControl;
use btleplug::api::BDAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Name fragment every production droid advertises
const DROID_NAME_TAG: &str = "DROID";

/// BLE Scanner for discovering droids
pub struct DroidScanner<R: RadioControl> {
    radio: Arc<R>,
    coordinator: RadioCoordinator,
    nicknames: Arc<dyn NicknameStore>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settle_delay: Duration,
    retry_delay: Duration,
    scanning: AtomicBool,
    results: Mutex<Vec<ScanResult>>,
}

/// Resets the scanning flag however the scan ends
struct ScanningFlag<'a>(&'a AtomicBool);

impl Drop for ScanningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: RadioControl> DroidScanner<R> {
    pub fn new(
        radio: Arc<R>,
        coordinator: RadioCoordinator,
        nicknames: Arc<dyn NicknameStore>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        timing: &TimingSettings,
    ) -> Self {
        Self {
            radio,
            coordinator,
            nicknames,
            event_sender,
            settle_delay: timing.scan_settle(),
            retry_delay: timing.identity_retry(),
            scanning: AtomicBool::new(false),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Check if a scan is in flight
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Results of the last completed scan
    pub fn results(&self) -> Vec<ScanResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_results(&self) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Scan for `duration` and resolve every droid found.
    ///
    /// Returns `Ok(None)` without touching the radio when another scan is
    /// already running.
    pub async fn scan(&self, duration: Duration) -> Result<Option<Vec<ScanResult>>> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan requested while one is running; ignoring");
            return Ok(None);
        }
        let _flag = ScanningFlag(&self.scanning);
        let _lease = self.coordinator.try_acquire(RadioUse::Scan)?;

        info!("Starting droid scan for {:?}", duration);
        self.send_log("Scanning for droids...", MessageSeverity::Info);

        if let Err(e) = self.radio.power(true).await {
            warn!("Adapter power on failed: {}", e);
        }
        self.radio
            .set_scan(true)
            .await
            .map_err(|e| DroidError::transport("scan on", e))?;
        tokio::time::sleep(duration).await;
        self.radio
            .set_scan(false)
            .await
            .map_err(|e| DroidError::transport("scan off", e))?;

        // Let the final advertisements land before enumerating
        tokio::time::sleep(self.settle_delay).await;

        let peers = self
            .radio
            .list_visible_peers()
            .await
            .map_err(|e| DroidError::transport("list devices", e))?;

        let mut results = Vec::new();
        for peer in peers
            .into_iter()
            .filter(|p| p.name.to_uppercase().contains(DROID_NAME_TAG))
        {
            let (decoded_identity, raw_record) = self.resolve_identity(&peer.address).await;
            let result = ScanResult {
                address: peer.address,
                advertised_name: peer.name,
                nickname: self.nicknames.lookup_nickname(&peer.address),
                decoded_identity,
                raw_record,
            };
            debug!("Found {} as {}", result.address, result.label());
            results.push(result);
        }

        info!("Scan finished, {} droid(s) found", results.len());
        *self.results.lock().unwrap_or_else(PoisonError::into_inner) = results.clone();
        let _ = self.event_sender.send(AppEvent::ScanFinished(results.clone()));
        Ok(Some(results))
    }

    /// Query and decode, retrying exactly once after a short backoff
    async fn resolve_identity(&self, address: &BDAddr) -> (Option<DecodedIdentity>, String) {
        let mut record = self.query_record(address).await;
        let mut identity = decode_advertisement(&record);
        if identity.is_none() {
            tokio::time::sleep(self.retry_delay).await;
            record = self.query_record(address).await;
            identity = decode_advertisement(&record);
        }
        if identity.is_none() {
            debug!("Identity of {} unknown", address);
        }
        (identity, record)
    }

    async fn query_record(&self, address: &BDAddr) -> String {
        match self.radio.query_peer_record(address).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Info query for {} failed: {}", address, e);
                String::new()
            }
        }
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
