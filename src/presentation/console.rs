//! Console menus.
//!
//! Every action renders its outcome as a one-line status and returns to the
//! menu it was started from.

use crate::domain::catalog::{
    audio_group_name, is_unsafe_script, Faction, AUDIO_GROUPS, LOCATIONS, MAX_AUDIO_CLIP, SCRIPTS,
};
use crate::domain::models::{AppEvent, LinkState, MessageSeverity, ScanResult, StatusMessage};
use crate::domain::settings::{Favorite, NicknameStore, Settings, SettingsService};
use crate::error::DroidError;
use crate::infrastructure::bluetooth::protocol::{
    format_payload, BeaconFrame, Motor, MotorDirection, MOTOR_DEFAULT_RAMP, MOTOR_MIN_SPEED,
};
use crate::infrastructure::bluetooth::radio::RadioControl;
use crate::infrastructure::bluetooth::{BeaconAdvertiser, DroidScanner, DroidSession};
use btleplug::api::BDAddr;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{error, info};

pub struct ConsoleApp<R: RadioControl> {
    settings: Arc<Mutex<SettingsService>>,
    advertiser: Arc<BeaconAdvertiser<R>>,
    scanner: Arc<DroidScanner<R>>,
    session: Arc<DroidSession<R>>,
    events: mpsc::UnboundedReceiver<AppEvent>,
    input: Lines<BufReader<Stdin>>,
    status_message: Option<StatusMessage>,
}

/// A command typed on the droid menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DroidAction {
    Audio { group: u8, clip: u8 },
    Script(u8),
    PairingLed(bool),
    Drive {
        motor: Motor,
        direction: MotorDirection,
        speed: u8,
    },
    StopMotor(Motor),
    StopMotors,
    Disconnect,
}

impl<R: RadioControl> ConsoleApp<R> {
    pub fn new(
        settings: Arc<Mutex<SettingsService>>,
        advertiser: Arc<BeaconAdvertiser<R>>,
        scanner: Arc<DroidScanner<R>>,
        session: Arc<DroidSession<R>>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        Self {
            settings,
            advertiser,
            scanner,
            session,
            events,
            input: BufReader::new(tokio::io::stdin()).lines(),
            status_message: None,
        }
    }

    /// Main menu loop; returns on quit or end of input
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.render_header().await;
            println!("  1) Scan for droids");
            println!("  2) Beacons");
            println!("  3) Favorites");
            println!("  q) Quit");
            let Some(choice) = self.prompt("> ").await? else {
                return Ok(());
            };
            match choice.as_str() {
                "1" => self.scan_menu().await?,
                "2" => self.beacon_menu().await?,
                "3" => self.favorites_menu().await?,
                "q" | "Q" => return Ok(()),
                "" => {}
                other => self.set_status(format!("Unknown option '{other}'"), MessageSeverity::Warning),
            }
        }
    }

    async fn scan_menu(&mut self) -> anyhow::Result<()> {
        loop {
            let duration = self.settings_snapshot(|s| s.scan_duration());
            println!("Scanning for {:.1}s...", duration.as_secs_f32());
            let results = match self.scanner.scan(duration).await {
                Ok(Some(results)) => results,
                Ok(None) => {
                    self.set_status("A scan is already running", MessageSeverity::Warning);
                    return Ok(());
                }
                Err(e) => {
                    self.report(&e);
                    return Ok(());
                }
            };
            self.drain_events();
            self.set_status(format!("{} droid(s) found", results.len()), MessageSeverity::Success);

            if !self.results_menu(&results).await? {
                return Ok(());
            }
        }
    }

    /// Returns true when a rescan was asked for
    async fn results_menu(&mut self, results: &[ScanResult]) -> anyhow::Result<bool> {
        loop {
            self.render_header().await;
            if results.is_empty() {
                println!("  No droids in range.");
            }
            for (index, result) in results.iter().enumerate() {
                println!("  {}) {} [{}]", index + 1, result.label(), result.address);
            }
            println!("  r) Rescan   b) Back");
            let Some(choice) = self.prompt("> ").await? else {
                return Ok(false);
            };
            match choice.as_str() {
                "b" | "B" => return Ok(false),
                "r" | "R" => return Ok(true),
                other => match pick(other, results) {
                    Some(result) => self.result_menu(result.clone()).await?,
                    None => self.set_status("Pick a droid by number", MessageSeverity::Warning),
                },
            }
        }
    }

    async fn result_menu(&mut self, result: ScanResult) -> anyhow::Result<()> {
        println!("{} [{}]", result.label(), result.address);
        if let Some(identity) = &result.decoded_identity {
            println!("  Personality: {identity}");
        }
        println!("  c) Connect   n) Set nickname   s) Save favorite   b) Back");
        let Some(choice) = self.prompt("> ").await? else {
            return Ok(());
        };
        match choice.as_str() {
            "c" | "C" => self.connect_and_control(result.address).await?,
            "n" | "N" => {
                let Some(nickname) = self.prompt("Nickname: ").await? else {
                    return Ok(());
                };
                if nickname.is_empty() {
                    return Ok(());
                }
                match self.settings.store_nickname(&result.address, &nickname) {
                    Ok(()) => self.set_status(format!("Saved as '{nickname}'"), MessageSeverity::Success),
                    Err(e) => self.set_status(format!("Could not save nickname: {e}"), MessageSeverity::Error),
                }
            }
            "s" | "S" => {
                let favorite = Favorite {
                    nickname: result.label(),
                    personality: result.decoded_identity.map(|identity| identity.to_string()),
                };
                let saved = self
                    .settings
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .save_favorite(&result.address, favorite);
                match saved {
                    Ok(()) => self.set_status("Favorite saved", MessageSeverity::Success),
                    Err(e) => self.set_status(format!("Could not save favorite: {e}"), MessageSeverity::Error),
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn favorites_menu(&mut self) -> anyhow::Result<()> {
        loop {
            let favorites: Vec<(String, Favorite)> =
                self.settings_snapshot(|s| s.favorites.clone().into_iter().collect());
            self.render_header().await;
            if favorites.is_empty() {
                println!("  No favorites saved.");
            }
            for (index, (address, favorite)) in favorites.iter().enumerate() {
                let personality = favorite.personality.as_deref().unwrap_or("unknown");
                println!("  {}) {} [{}] {}", index + 1, favorite.nickname, address, personality);
            }
            println!("  c<n>) Connect   d<n>) Delete   b) Back");
            let Some(choice) = self.prompt("> ").await? else {
                return Ok(());
            };
            if choice.eq_ignore_ascii_case("b") {
                return Ok(());
            }
            let (action, number) = if choice.is_char_boundary(1) {
                choice.split_at(1)
            } else {
                ("", "")
            };
            let Some((address, _)) = pick(number, &favorites) else {
                self.set_status("Use c<n> or d<n>", MessageSeverity::Warning);
                continue;
            };
            let Ok(address) = address.parse::<BDAddr>() else {
                self.set_status(format!("Stored address '{address}' is invalid"), MessageSeverity::Error);
                continue;
            };
            match action {
                "c" | "C" => self.connect_and_control(address).await?,
                "d" | "D" => match self.settings.remove_nickname(&address) {
                    Ok(()) => self.set_status("Favorite deleted", MessageSeverity::Success),
                    Err(e) => self.set_status(format!("Could not delete favorite: {e}"), MessageSeverity::Error),
                },
                _ => self.set_status("Use c<n> or d<n>", MessageSeverity::Warning),
            }
        }
    }

    async fn beacon_menu(&mut self) -> anyhow::Result<()> {
        loop {
            self.render_header().await;
            for (index, location) in LOCATIONS.iter().enumerate() {
                println!("  {}) {}", index + 1, location.name);
            }
            for faction in Faction::ALL {
                println!("  {}) {} droids", faction_key(faction), faction);
            }
            println!("  x) Stop beacon   b) Back");
            let Some(choice) = self.prompt("> ").await? else {
                return Ok(());
            };
            match choice.as_str() {
                "b" | "B" => return Ok(()),
                "x" | "X" => match self.advertiser.stop().await {
                    Ok(()) => self.set_status("Beacon stopped", MessageSeverity::Info),
                    Err(e) => self.report(&e),
                },
                other => {
                    if let Some(faction) = Faction::ALL
                        .into_iter()
                        .find(|f| faction_key(*f).eq_ignore_ascii_case(other))
                    {
                        self.droid_beacon_menu(faction).await?;
                    } else if let Some(location) = pick(other, LOCATIONS) {
                        let frame = BeaconFrame::location(location.location_id, location.cooldown);
                        self.activate(frame, location.name).await;
                    } else {
                        self.set_status("Pick a beacon by number or letter", MessageSeverity::Warning);
                    }
                }
            }
        }
    }

    async fn droid_beacon_menu(&mut self, faction: Faction) -> anyhow::Result<()> {
        let personalities = faction.personalities();
        for (index, personality) in personalities.iter().enumerate() {
            println!("  {}) {}", index + 1, personality.name);
        }
        println!("  b) Back");
        let Some(choice) = self.prompt("> ").await? else {
            return Ok(());
        };
        if let Some(personality) = pick(&choice, personalities) {
            match BeaconFrame::droid(personality.id, faction.id()) {
                Ok(frame) => {
                    let label = format!("{}: {}", faction, personality.name);
                    self.activate(frame, &label).await;
                }
                Err(e) => self.report(&e),
            }
        }
        Ok(())
    }

    async fn activate(&mut self, frame: BeaconFrame, label: &str) {
        match self.advertiser.activate(&frame, label).await {
            Ok(()) => self.set_status(format!("Broadcasting {label}"), MessageSeverity::Success),
            Err(e) => self.report(&e),
        }
    }

    async fn connect_and_control(&mut self, address: BDAddr) -> anyhow::Result<()> {
        println!("Connecting to {address}...");
        if let Err(e) = self.session.connect(address).await {
            self.drain_events();
            self.report(&e);
            return Ok(());
        }
        self.drain_events();
        self.droid_menu().await?;
        self.session.disconnect().await;
        self.drain_events();
        Ok(())
    }

    async fn droid_menu(&mut self) -> anyhow::Result<()> {
        loop {
            if self.session.link_state() != LinkState::Ready {
                self.set_status("Droid link lost", MessageSeverity::Warning);
                return Ok(());
            }
            self.render_header().await;
            println!("  Audio: G<group>C<clip>  (groups 0-{}, clips 0-{MAX_AUDIO_CLIP}, 0 = random)", AUDIO_GROUPS.len() - 1);
            println!("  Scripts: S<id>");
            for script in SCRIPTS.iter().filter(|s| !is_unsafe_script(s.id)) {
                println!("    S{:<3} {:<12} {}", script.id, script.name, script.description);
            }
            println!("  Motors: D<L|R|H><F|R><speed>  (speed {MOTOR_MIN_SPEED}-255)   X<L|R|H> stops one");
            println!("  led on / led off   m) Stop motors   q) Disconnect");
            let Some(choice) = self.prompt("droid> ").await? else {
                return Ok(());
            };
            let action = match parse_droid_action(&choice) {
                Ok(action) => action,
                Err(message) => {
                    self.set_status(message, MessageSeverity::Warning);
                    continue;
                }
            };
            let outcome = match action {
                DroidAction::Disconnect => return Ok(()),
                DroidAction::Audio { group, clip } => self
                    .session
                    .send_audio(group, clip)
                    .await
                    .map(|()| format!("Playing {} clip {clip}", audio_group_name(group).unwrap_or("?"))),
                DroidAction::Script(id) => self
                    .session
                    .run_script(id)
                    .await
                    .map(|()| format!("Running script {id}")),
                DroidAction::PairingLed(on) => self
                    .session
                    .set_pairing_led(on)
                    .await
                    .map(|()| format!("Pairing LED {}", if on { "on" } else { "off" })),
                DroidAction::Drive {
                    motor,
                    direction,
                    speed,
                } => self
                    .session
                    .drive_motor(direction, motor, speed, MOTOR_DEFAULT_RAMP)
                    .await
                    .map(|()| format!("{motor:?} motor {direction:?} at {speed}")),
                DroidAction::StopMotor(motor) => self
                    .session
                    .stop_motor(motor)
                    .await
                    .map(|()| format!("{motor:?} motor stopped")),
                DroidAction::StopMotors => self
                    .session
                    .stop_all_motors()
                    .await
                    .map(|()| "Motors stopped".to_string()),
            };
            match outcome {
                Ok(message) => self.set_status(message, MessageSeverity::Success),
                Err(e) => self.report(&e),
            }
        }
    }

    async fn render_header(&mut self) {
        self.drain_events();
        let beacon = self.advertiser.state().await;
        println!();
        println!("==== Droid Toolbox ====");
        if beacon.is_active() {
            println!("Beacon: {} ({})", beacon.label, format_payload(&beacon.current_payload));
        } else {
            println!("Beacon: off");
        }
        match self.session.peer() {
            Some(peer) => println!("Droid:  {} ({})", peer, self.session.link_state()),
            None => println!("Droid:  not connected"),
        }
        if let Some(status) = &self.status_message {
            println!("{} {}", severity_tag(status.severity), status.message);
        }
    }

    async fn prompt(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        print!("{label}");
        std::io::stdout().flush()?;
        Ok(self
            .input
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                AppEvent::LogMessage(message) => self.status_message = Some(message),
                AppEvent::ConnectionStatus(state) => info!("Link {}", state),
                AppEvent::ScanFinished(results) => info!("Scan delivered {} result(s)", results.len()),
            }
        }
    }

    fn report(&mut self, err: &DroidError) {
        error!("{}", err);
        let severity = if err.is_retryable() {
            MessageSeverity::Warning
        } else {
            MessageSeverity::Error
        };
        self.set_status(err.status_message(), severity);
    }

    fn set_status(&mut self, message: impl Into<String>, severity: MessageSeverity) {
        self.status_message = Some(StatusMessage {
            message: message.into(),
            severity,
        });
    }

    fn settings_snapshot<T>(&self, read: impl FnOnce(&Settings) -> T) -> T {
        read(self.settings.lock().unwrap_or_else(PoisonError::into_inner).get())
    }
}

fn faction_key(faction: Faction) -> &'static str {
    match faction {
        Faction::Scoundrel => "s",
        Faction::Resistance => "r",
        Faction::FirstOrder => "f",
    }
}

fn severity_tag(severity: MessageSeverity) -> &'static str {
    match severity {
        MessageSeverity::Info => "[..]",
        MessageSeverity::Success => "[ok]",
        MessageSeverity::Warning => "[!!]",
        MessageSeverity::Error => "[XX]",
    }
}

/// 1-based menu selection
fn pick<'a, T>(choice: &str, items: &'a [T]) -> Option<&'a T> {
    let index = choice.trim().parse::<usize>().ok()?;
    index.checked_sub(1).and_then(|i| items.get(i))
}

fn parse_droid_action(input: &str) -> Result<DroidAction, String> {
    let input = input.trim().to_ascii_uppercase();
    match input.as_str() {
        "Q" => return Ok(DroidAction::Disconnect),
        "M" => return Ok(DroidAction::StopMotors),
        "LED ON" => return Ok(DroidAction::PairingLed(true)),
        "LED OFF" => return Ok(DroidAction::PairingLed(false)),
        _ => {}
    }

    if let Some(rest) = input.strip_prefix('G') {
        let (group, clip) = rest
            .split_once('C')
            .ok_or_else(|| "Audio is G<group>C<clip>".to_string())?;
        let group: u8 = group.parse().map_err(|_| format!("Bad audio group '{group}'"))?;
        let clip: u8 = clip.parse().map_err(|_| format!("Bad audio clip '{clip}'"))?;
        if audio_group_name(group).is_none() {
            return Err(format!("No audio group {group}"));
        }
        if clip > MAX_AUDIO_CLIP {
            return Err(format!("Clips go up to {MAX_AUDIO_CLIP}"));
        }
        return Ok(DroidAction::Audio { group, clip });
    }

    if let Some(rest) = input.strip_prefix('S') {
        let id: u8 = rest.parse().map_err(|_| format!("Bad script id '{rest}'"))?;
        if is_unsafe_script(id) {
            return Err(format!("Script {id} drives the motors unattended and is blocked"));
        }
        if !SCRIPTS.iter().any(|s| s.id == id) {
            return Err(format!("No script {id}"));
        }
        return Ok(DroidAction::Script(id));
    }

    if let Some(rest) = input.strip_prefix('D') {
        const USAGE: &str = "Drive is D<L|R|H><F|R><speed>";
        let mut chars = rest.chars();
        let motor = chars.next().and_then(motor_key).ok_or(USAGE)?;
        let direction = match chars.next() {
            Some('F') => MotorDirection::Forward,
            Some('R') => MotorDirection::Reverse,
            _ => return Err(USAGE.to_string()),
        };
        let speed = chars.as_str();
        let speed: u8 = speed.parse().map_err(|_| format!("Bad motor speed '{speed}'"))?;
        // Below this the motors stall
        let speed = speed.max(MOTOR_MIN_SPEED);
        return Ok(DroidAction::Drive {
            motor,
            direction,
            speed,
        });
    }

    if let Some(rest) = input.strip_prefix('X') {
        let mut chars = rest.chars();
        return match (chars.next().and_then(motor_key), chars.next()) {
            (Some(motor), None) => Ok(DroidAction::StopMotor(motor)),
            _ => Err("Stop is X<L|R|H>".to_string()),
        };
    }

    Err(format!("Unknown command '{input}'"))
}

fn motor_key(key: char) -> Option<Motor> {
    match key {
        'L' => Some(Motor::Left),
        'R' => Some(Motor::Right),
        'H' => Some(Motor::Head),
        _ => None,
    }
}
