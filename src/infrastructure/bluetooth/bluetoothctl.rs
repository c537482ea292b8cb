//! bluetoothctl Driver
//!
//! Drives a long-lived `bluetoothctl` process for adapter power, discovery,
//! info dumps and advertising. Output lines are fanned out through a bounded
//! broadcast channel; a slow reader loses the oldest lines, never blocks the
//! process.

use crate::domain::settings::TimingSettings;
use crate::infrastructure::bluetooth::radio::VisiblePeer;
use anyhow::{anyhow, Context, Result};
use btleplug::api::BDAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

const PROGRAM: &str = "bluetoothctl";

/// Lines kept for slow subscribers before the oldest are dropped
const LINE_BUFFER: usize = 500;

const INIT_SEQUENCE: [&str; 5] = [
    "power on",
    "agent NoInputNoOutput",
    "default-agent",
    "pairable off",
    "discoverable off",
];

/// An info dump is complete once the output goes quiet for this long
const RECORD_LINE_GAP: Duration = Duration::from_millis(50);

const RECORD_MARKERS: [&str; 6] = [
    "Device",
    "Name",
    "Alias",
    "Paired",
    "Connected",
    "ManufacturerData",
];

struct Process {
    child: Child,
    stdin: ChildStdin,
}

pub struct BluetoothCtl {
    process: Mutex<Option<Process>>,
    lines: broadcast::Sender<String>,
    command_delay: Duration,
    record_window: Duration,
}

impl BluetoothCtl {
    /// Start `bluetoothctl` and run the one-time adapter setup
    pub async fn spawn(timing: &TimingSettings) -> Result<Self> {
        let (lines, _) = broadcast::channel(LINE_BUFFER);
        let ctl = Self {
            process: Mutex::new(None),
            lines,
            command_delay: timing.command_delay(),
            record_window: timing.record_query(),
        };
        ctl.ensure_running().await?;
        Ok(ctl)
    }

    /// Live output, ANSI codes stripped
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.lines.subscribe()
    }

    /// Send one command and wait the configured spacing
    pub async fn send(&self, command: &str) -> Result<()> {
        self.send_with_delay(command, self.command_delay).await
    }

    pub async fn send_with_delay(&self, command: &str, delay: Duration) -> Result<()> {
        self.ensure_running().await?;
        let mut guard = self.process.lock().await;
        let process = guard
            .as_mut()
            .ok_or_else(|| anyhow!("{PROGRAM} is not running"))?;
        trace!("{} <- {}", PROGRAM, command);
        process
            .stdin
            .write_all(format!("{command}\n").as_bytes())
            .await
            .with_context(|| format!("Command failed: {command}"))?;
        process.stdin.flush().await?;
        drop(guard);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// `info <address>`, filtered down to the lines describing that device
    pub async fn info(&self, address: &BDAddr) -> Result<String> {
        let mac = address.to_string().to_uppercase();
        // Subscribe first so the reply cannot slip past
        let mut rx = self.subscribe();
        self.send_with_delay(&format!("info {mac}"), Duration::ZERO)
            .await?;

        let deadline = Instant::now() + self.record_window;
        let mut filter = RecordFilter::new(&mac);
        let mut output = String::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match tokio::time::timeout(RECORD_LINE_GAP.min(deadline - now), rx.recv()).await {
                Ok(Ok(line)) => {
                    if filter.keep(&line) {
                        output.push_str(&line);
                        output.push('\n');
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    debug!("Info capture lagged, {} lines lost", skipped);
                }
                Ok(Err(RecvError::Closed)) => break,
                Err(_) if !output.is_empty() => break,
                Err(_) => {}
            }
        }
        Ok(output)
    }

    /// Replace the advertising data through the advertise submenu
    pub async fn set_manufacturer_data(&self, manufacturer_id: u16, data: &[u8]) -> Result<()> {
        self.send("menu advertise").await?;
        self.send("clear").await?;
        self.send(&manufacturer_command(manufacturer_id, data)).await?;
        self.send("back").await
    }

    /// Devices known to BlueZ, from a separate one-shot invocation
    pub async fn devices(&self) -> Result<Vec<VisiblePeer>> {
        let output = Command::new(PROGRAM)
            .arg("devices")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {PROGRAM} devices"))?;
        Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Quit the process, killing it if it does not exit promptly
    pub async fn close(&self) {
        let Some(mut process) = self.process.lock().await.take() else {
            return;
        };
        let _ = process.stdin.write_all(b"quit\n").await;
        let _ = process.stdin.flush().await;
        match tokio::time::timeout(Duration::from_millis(500), process.child.wait()).await {
            Ok(_) => debug!("{} exited", PROGRAM),
            Err(_) => {
                warn!("{} did not quit, killing it", PROGRAM);
                let _ = process.child.kill().await;
            }
        }
    }

    /// Start the process, or restart it if it died
    async fn ensure_running(&self) -> Result<()> {
        let mut guard = self.process.lock().await;
        if let Some(process) = guard.as_mut() {
            match process.child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => warn!("{} exited ({}), restarting", PROGRAM, status),
                Err(e) => warn!("{} state unknown ({}), restarting", PROGRAM, e),
            }
        }

        let mut child = Command::new(PROGRAM)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {PROGRAM}"))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("{PROGRAM} stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("{PROGRAM} stdout unavailable"))?;

        let lines = self.lines.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        // No subscribers is fine
                        let _ = lines.send(strip_ansi(&line));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("{} output read failed: {}", PROGRAM, e);
                        break;
                    }
                }
            }
            debug!("{} output closed", PROGRAM);
        });

        for command in INIT_SEQUENCE {
            stdin.write_all(format!("{command}\n").as_bytes()).await?;
            stdin.flush().await?;
            tokio::time::sleep(self.command_delay).await;
        }
        info!("{} started", PROGRAM);

        *guard = Some(Process { child, stdin });
        Ok(())
    }
}

/// Keeps device lines plus the hex dump under `ManufacturerData.Value`
struct RecordFilter<'a> {
    mac: &'a str,
    in_value: bool,
}

impl<'a> RecordFilter<'a> {
    fn new(mac: &'a str) -> Self {
        Self {
            mac,
            in_value: false,
        }
    }

    fn keep(&mut self, line: &str) -> bool {
        if line.contains("ManufacturerData.Value") {
            self.in_value = true;
            return true;
        }
        if self.in_value && is_hex_dump_line(line) {
            return true;
        }
        self.in_value = false;
        line.to_uppercase().contains(self.mac) || RECORD_MARKERS.iter().any(|m| line.contains(m))
    }
}

/// `  01 83 03 04 44 81 8a 0e   ....D...`
fn is_hex_dump_line(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.len() == 2 && token.chars().all(|c| c.is_ascii_hexdigit()))
}

fn manufacturer_command(manufacturer_id: u16, data: &[u8]) -> String {
    let mut command = format!("manufacturer 0x{manufacturer_id:04X}");
    for byte in data {
        command.push_str(&format!(" 0x{byte:02X}"));
    }
    command
}

/// Parse `Device <addr> <name>` lines; devices without a name are skipped
pub fn parse_devices(output: &str) -> Vec<VisiblePeer> {
    output
        .lines()
        .filter_map(|line| {
            let line = strip_ansi(line);
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = rest.split_once(' ')?;
            let address = address.parse::<BDAddr>().ok()?;
            let name = name.trim();
            (!name.is_empty()).then(|| VisiblePeer {
                address,
                name: name.to_string(),
            })
        })
        .collect()
}

/// Remove terminal escape sequences and prompt redraw noise
pub fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    // CSI: parameters then one final byte in @..~
                    for next in chars.by_ref() {
                        if ('@'..='~').contains(&next) {
                            break;
                        }
                    }
                }
            }
            '\u{1}' | '\u{2}' | '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
