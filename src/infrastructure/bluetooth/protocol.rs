//! Droid Beacon and Command Protocol
//!
//! Byte layouts for the manufacturer-data beacons droids broadcast and react to,
//! and for the packets written to the droid command characteristic. Everything
//! here is pure: no I/O and no state.
//!
//! # Beacon layout
//!
//! ```text
//! [0-1] : Manufacturer id (0x0183, big-endian)
//! [2]   : Beacon type (0x0A location, 0x03 droid)
//! [3]   : Length of the remaining data (always 0x04)
//!
//! Location body:
//! [4]   : Location id
//! [5]   : Cooldown (x5 seconds, 0xFF overrides)
//! [6]   : RSSI threshold
//! [7]   : Active flag
//!
//! Droid body:
//! [4]   : Header guard (0x44)
//! [5]   : Status (0x01 unpaired, 0x81 paired with a remote)
//! [6]   : Affiliation (0x80 + faction_id * 2)
//! [7]   : Personality id
//! ```

use crate::domain::catalog::{Faction, LOCATIONS};
use crate::domain::models::DecodedIdentity;
use crate::error::{DroidError, Result};
use std::fmt::Write as _;
use uuid::Uuid;

/// Droid GATT service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x09b600a0_3e42_41fc_b474_e9c0c8f0c801);

/// Command characteristic - every droid command is written here
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0x09b600b1_3e42_41fc_b474_e9c0c8f0c801);

pub const MANUFACTURER_ID: u16 = 0x0183;
pub const DATA_LEN: u8 = 0x04;
pub const DROID_HEADER: u8 = 0x44;
pub const STATUS_PAIRED: u8 = 0x81;
pub const ACTIVE_FLAG: u8 = 0x01;
const AFFILIATION_BASE: u8 = 0x80;

/// Beacon type + length pair that opens a droid body
const DROID_MARKER: &str = "0304";
/// Hex characters from the marker through the personality id
const DROID_WINDOW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconType {
    Location,
    Droid,
}

impl BeaconType {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Location => 0x0A,
            Self::Droid => 0x03,
        }
    }
}

/// Minimum signal strength at which a droid reacts to a location beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RssiThreshold {
    /// -70 dBm
    Near,
    /// -90 dBm
    Mid,
    /// -100 dBm
    Far,
    /// -116 dBm
    Max,
}

impl RssiThreshold {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Near => 0xBA,
            Self::Mid => 0xA6,
            Self::Far => 0x9C,
            Self::Max => 0x8C,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconBody {
    Location {
        location_id: u8,
        cooldown: u8,
        rssi_threshold: u8,
        active: bool,
    },
    Droid {
        status_flag: u8,
        affiliation: u8,
        personality_id: u8,
    },
}

/// A manufacturer-data beacon, decoded or about to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconFrame {
    pub manufacturer_id: u16,
    pub body: BeaconBody,
}

impl BeaconFrame {
    /// Location beacon at the standard room-size threshold
    pub fn location(location_id: u8, cooldown: u8) -> Self {
        Self {
            manufacturer_id: MANUFACTURER_ID,
            body: BeaconBody::Location {
                location_id,
                cooldown,
                rssi_threshold: RssiThreshold::Mid.as_byte(),
                active: true,
            },
        }
    }

    /// Droid beacon as a paired droid of `faction_id` would send it
    pub fn droid(personality_id: u8, faction_id: u8) -> Result<Self> {
        let faction = Faction::from_id(faction_id).ok_or(DroidError::InvalidFaction { faction_id })?;
        Ok(Self {
            manufacturer_id: MANUFACTURER_ID,
            body: BeaconBody::Droid {
                status_flag: STATUS_PAIRED,
                affiliation: affiliation_byte(faction),
                personality_id,
            },
        })
    }

    pub fn beacon_type(&self) -> BeaconType {
        match self.body {
            BeaconBody::Location { .. } => BeaconType::Location,
            BeaconBody::Droid { .. } => BeaconType::Droid,
        }
    }

    pub fn data_length(&self) -> u8 {
        DATA_LEN
    }

    /// Catalog name of what this beacon imitates, e.g. `Resistance: BD-Unit (Default)`
    pub fn label(&self) -> String {
        match self.body {
            BeaconBody::Location {
                location_id,
                cooldown,
                ..
            } => LOCATIONS
                .iter()
                .find(|l| l.location_id == location_id && l.cooldown == cooldown)
                .or_else(|| LOCATIONS.iter().find(|l| l.location_id == location_id))
                .map(|l| l.name.to_string())
                .unwrap_or_else(|| format!("Location {location_id:#04x}")),
            BeaconBody::Droid {
                affiliation,
                personality_id,
                ..
            } => match lookup_identity(affiliation, personality_id) {
                Some(identity) => format!("{}: {}", identity.faction, identity.personality_name),
                None => format!("Droid {affiliation:#04x}/{personality_id:#04x}"),
            },
        }
    }

    /// Full payload, manufacturer id first
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.extend_from_slice(&self.manufacturer_id.to_be_bytes());
        out.push(self.beacon_type().as_byte());
        out.push(self.data_length());
        match self.body {
            BeaconBody::Location {
                location_id,
                cooldown,
                rssi_threshold,
                active,
            } => out.extend_from_slice(&[location_id, cooldown, rssi_threshold, if active { ACTIVE_FLAG } else { 0x00 }]),
            BeaconBody::Droid {
                status_flag,
                affiliation,
                personality_id,
            } => out.extend_from_slice(&[DROID_HEADER, status_flag, affiliation, personality_id]),
        }
        out
    }
}

pub fn affiliation_byte(faction: Faction) -> u8 {
    AFFILIATION_BASE + faction.id() * 2
}

/// Inverse of [`affiliation_byte`]; `None` for bytes no faction can produce
pub fn faction_from_affiliation(byte: u8) -> Option<Faction> {
    let offset = byte.checked_sub(AFFILIATION_BASE)?;
    if offset % 2 != 0 {
        return None;
    }
    Faction::from_id(offset / 2)
}

pub fn encode_location_beacon(location_id: u8, cooldown: u8) -> Vec<u8> {
    BeaconFrame::location(location_id, cooldown).encode()
}

pub fn encode_droid_beacon(personality_id: u8, faction_id: u8) -> Result<Vec<u8>> {
    Ok(BeaconFrame::droid(personality_id, faction_id)?.encode())
}

/// Render a payload the way the beacon header shows it: `0x0183 0x03 0x04 ...`
pub fn format_payload(payload: &[u8]) -> String {
    if payload.len() < 2 {
        return String::new();
    }
    let mut out = format!("0x{:02X}{:02X}", payload[0], payload[1]);
    for byte in &payload[2..] {
        let _ = write!(out, " 0x{byte:02X}");
    }
    out
}

/// Resolve a droid identity from an advertisement record.
///
/// The record is usually the text of a `bluetoothctl info` dump, but any blob
/// containing the manufacturer bytes as hex pairs works. Returns `None` when no
/// droid body is present, the body is truncated, or the faction/personality pair
/// is not in the catalog.
pub fn decode_advertisement(raw: &str) -> Option<DecodedIdentity> {
    let hex = extract_hex(manufacturer_section(raw));

    let mut from = 0;
    while let Some(found) = hex[from..].find(DROID_MARKER) {
        let start = from + found;
        from = start + 1;
        if start % 2 != 0 {
            continue;
        }
        let window = hex.get(start..start + DROID_WINDOW)?;
        let affiliation = u8::from_str_radix(&window[8..10], 16).ok()?;
        let personality_id = u8::from_str_radix(&window[10..12], 16).ok()?;
        if let Some(identity) = lookup_identity(affiliation, personality_id) {
            return Some(identity);
        }
    }
    None
}

/// Same algorithm as [`decode_advertisement`], fed with raw manufacturer bytes
pub fn decode_manufacturer_data(data: &[u8]) -> Option<DecodedIdentity> {
    let mut dump = String::with_capacity(data.len() * 3);
    for byte in data {
        let _ = write!(dump, "{byte:02x} ");
    }
    decode_advertisement(&dump)
}

fn lookup_identity(affiliation: u8, personality_id: u8) -> Option<DecodedIdentity> {
    let faction = faction_from_affiliation(affiliation)?;
    let personality = faction.personality(personality_id)?;
    Some(DecodedIdentity {
        faction,
        personality_id,
        personality_name: personality.name,
    })
}

/// Narrow an info dump to its manufacturer value, if it has one
fn manufacturer_section(raw: &str) -> &str {
    const VALUE_KEY: &str = "ManufacturerData.Value";
    const NEXT_KEYS: [&str; 5] = [
        "AdvertisingFlags",
        "RSSI",
        "TxPower",
        "ServiceData",
        "ManufacturerData.Key",
    ];

    let Some(index) = raw.find(VALUE_KEY) else {
        return raw;
    };
    let mut section = &raw[index + VALUE_KEY.len()..];
    section = section.strip_prefix(':').unwrap_or(section);
    let end = NEXT_KEYS
        .iter()
        .filter_map(|key| section.find(key))
        .min()
        .unwrap_or(section.len());
    &section[..end]
}

/// Concatenate every whitespace-separated token that is a run of hex byte pairs
fn extract_hex(section: &str) -> String {
    let mut hex = String::new();
    for token in section.split_whitespace() {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if !token.is_empty()
            && token.len() % 2 == 0
            && token.chars().all(|c| c.is_ascii_hexdigit())
        {
            hex.push_str(&token.to_ascii_lowercase());
        }
    }
    hex
}

/// Motor selector for direct motor control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    Left,
    Right,
    Head,
}

impl Motor {
    pub const ALL: [Motor; 3] = [Motor::Left, Motor::Right, Motor::Head];

    fn id(&self) -> u8 {
        match self {
            Self::Left => 0x00,
            Self::Right => 0x01,
            Self::Head => 0x02,
        }
    }
}

/// Forward for drive motors, left for the head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Reverse,
}

impl MotorDirection {
    fn nibble(&self) -> u8 {
        match self {
            Self::Forward => 0x00,
            Self::Reverse => 0x80,
        }
    }
}

pub const MOTOR_MIN_SPEED: u8 = 0x60;
pub const MOTOR_DEFAULT_RAMP: u16 = 0x012C;

const LOGON: [u8; 4] = [0x22, 0x20, 0x01, 0x42];
const PAIRING_LED: [u8; 4] = [0x23, 0x00, 0x02, 0x41];
const AUDIO_BASE: [u8; 6] = [0x27, 0x42, 0x0F, 0x44, 0x44, 0x00];
const AUDIO_GROUP_SELECT: u8 = 0x1F;
const AUDIO_CLIP_PLAY: u8 = 0x18;
const MOTOR_DIRECT: [u8; 4] = [0x27, 0x00, 0x05, 0x44];

/// Packets written to the command characteristic.
///
/// Arguments are raw bytes; range checks are the caller's job. In particular
/// [`crate::domain::catalog::UNSAFE_SCRIPT_ID`] must be refused before a
/// `RunScript` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroidCommand {
    /// Required before the droid accepts anything else
    Logon,
    /// Select the audio group; the firmware takes one field per write
    AudioGroupSelect(u8),
    /// Play a clip from the selected group (0 = random)
    AudioClipPlay(u8),
    RunScript(u8),
    PairingLed(bool),
    MotorDirect {
        direction: MotorDirection,
        motor: Motor,
        speed: u8,
        ramp: u16,
    },
    /// Motors keep running until this is sent
    MotorStop(Motor),
}

impl DroidCommand {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Logon => LOGON.to_vec(),
            Self::AudioGroupSelect(group) => packet(&AUDIO_BASE, &[AUDIO_GROUP_SELECT, group]),
            Self::AudioClipPlay(clip) => packet(&AUDIO_BASE, &[AUDIO_CLIP_PLAY, clip]),
            Self::RunScript(script_id) => vec![0x25, 0x00, 0x0C, 0x42, script_id, 0x02],
            Self::PairingLed(on) => packet(&PAIRING_LED, &[on as u8]),
            Self::MotorDirect {
                direction,
                motor,
                speed,
                ramp,
            } => {
                let [ramp_hi, ramp_lo] = ramp.to_be_bytes();
                let selector = direction.nibble() | motor.id();
                packet(&MOTOR_DIRECT, &[selector, speed, ramp_hi, ramp_lo])
            }
            Self::MotorStop(motor) => packet(&MOTOR_DIRECT, &[motor.id(), 0x00, 0x00, 0x00]),
        }
    }
}

fn packet(prefix: &[u8], args: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + args.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(args);
    out
}

pub fn encode_command(command: DroidCommand) -> Vec<u8> {
    command.encode()
}
