use crate::domain::catalog::Faction;
use btleplug::api::BDAddr;
use std::fmt;

/// Identity recovered from a droid beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedIdentity {
    pub faction: Faction,
    pub personality_id: u8,
    pub personality_name: &'static str,
}

impl DecodedIdentity {
    pub fn faction_id(&self) -> u8 {
        self.faction.id()
    }
}

impl fmt::Display for DecodedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.personality_name, self.faction)
    }
}

/// One droid seen during a scan cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: BDAddr,
    pub advertised_name: String,
    pub nickname: Option<String>,
    pub decoded_identity: Option<DecodedIdentity>,
    pub raw_record: String,
}

impl ScanResult {
    /// Nickname first, then the decoded identity.
    pub fn label(&self) -> String {
        if let Some(nickname) = &self.nickname {
            return nickname.clone();
        }
        match &self.decoded_identity {
            Some(identity) => identity.to_string(),
            None => "Droid Found".to_string(),
        }
    }
}

/// Link state of the connection session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Handshaking,
    Ready,
    Closing,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Subsystem currently holding the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioUse {
    Scan,
    Advertise,
    Connection,
}

impl fmt::Display for RadioUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Scan => "scanning",
            Self::Advertise => "updating beacon",
            Self::Connection => "droid connected",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(LinkState),
    ScanFinished(Vec<ScanResult>),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
