mod domain;
mod error;
mod infrastructure;
mod presentation;

use crate::domain::settings::{NicknameStore, SettingsService};
use crate::infrastructure::bluetooth::{
    BeaconAdvertiser, BluezRadio, DroidScanner, DroidSession, RadioCoordinator,
};
use crate::presentation::ConsoleApp;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = infrastructure::logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Droid Toolbox");

    let settings_service = Arc::new(Mutex::new(settings_service));
    let nicknames: Arc<dyn NicknameStore> = settings_service.clone();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let radio = Arc::new(BluezRadio::new(&settings.timing).await?);
    let coordinator = RadioCoordinator::new();

    let advertiser = Arc::new(BeaconAdvertiser::new(
        radio.clone(),
        coordinator.clone(),
        settings.timing.advertise_stop(),
    ));
    let scanner = Arc::new(DroidScanner::new(
        radio.clone(),
        coordinator.clone(),
        nicknames,
        event_tx.clone(),
        &settings.timing,
    ));
    let session = Arc::new(DroidSession::new(
        radio.clone(),
        coordinator,
        event_tx,
        settings.timing.clone(),
    ));

    let mut app = ConsoleApp::new(
        settings_service,
        advertiser.clone(),
        scanner,
        session.clone(),
        event_rx,
    );
    let outcome = app.run().await;

    session.disconnect().await;
    if let Err(e) = advertiser.shutdown().await {
        warn!("Beacon shutdown failed: {}", e);
    }
    radio.close().await;
    info!("Droid Toolbox stopped");

    outcome
}
