//! Error types for droid control.
//!
//! Every failure the core can report is a variant of [`DroidError`]. None of them
//! is fatal to the process: the radio coordinator always ends up idle again and the
//! presentation layer renders [`DroidError::status_message`] before returning to the
//! previous menu.
//!
//! A missing or unrecognised advertisement is *not* an error. Decoding returns
//! `Option` and callers treat `None` as "identity unknown".

use crate::domain::models::RadioUse;
use btleplug::api::BDAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for droid operations.
pub type Result<T, E = DroidError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DroidError {
    #[error("Unsupported faction id {faction_id:#04x}")]
    InvalidFaction { faction_id: u8 },

    #[error("Droid {address} was not found within {timeout:?}")]
    PeerNotFound { address: BDAddr, timeout: Duration },

    #[error("GATT link to {address} timed out after {timeout:?}")]
    LinkTimeout { address: BDAddr, timeout: Duration },

    #[error("No droid is connected")]
    NotConnected,

    #[error("A droid session is already active")]
    SessionBusy,

    #[error("Radio is busy ({holder})")]
    RadioBusy { holder: RadioUse },

    #[error("Advertising failed: {reason}")]
    AdvertiseFailed { reason: String },

    #[error("Connection attempt was aborted")]
    Aborted,

    #[error("Radio command failed: {operation}")]
    Transport {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DroidError {
    /// Helper constructor for collaborator failures.
    pub fn transport(operation: impl Into<String>, source: anyhow::Error) -> Self {
        DroidError::Transport {
            operation: operation.into(),
            source,
        }
    }

    /// Returns whether the same call may succeed if simply issued again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            DroidError::InvalidFaction { .. } => false,
            DroidError::NotConnected => false,
            DroidError::PeerNotFound { .. } => true,
            DroidError::LinkTimeout { .. } => true,
            DroidError::SessionBusy => true,
            DroidError::RadioBusy { .. } => true,
            DroidError::AdvertiseFailed { .. } => true,
            DroidError::Aborted => true,
            DroidError::Transport { .. } => true,
        }
    }

    /// Short status line for the menu header.
    pub fn status_message(&self) -> String {
        match self {
            DroidError::InvalidFaction { .. } => "Unknown faction".to_string(),
            DroidError::PeerNotFound { address, .. } => format!("{address} not in range"),
            DroidError::LinkTimeout { address, .. } => format!("{address} did not answer"),
            DroidError::NotConnected => "Not connected".to_string(),
            DroidError::SessionBusy => "Already connected to a droid".to_string(),
            DroidError::RadioBusy { holder } => format!("Radio busy: {holder}"),
            DroidError::AdvertiseFailed { .. } => "Beacon could not be started".to_string(),
            DroidError::Aborted => "Connection cancelled".to_string(),
            DroidError::Transport { operation, .. } => format!("Bluetooth error ({operation})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DroidError>();

        let error = DroidError::NotConnected;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn transport_errors_keep_their_source() {
        let error = DroidError::transport("gatt write", anyhow::anyhow!("broken pipe"));
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("broken pipe"));
        assert!(error.to_string().contains("gatt write"));
    }

    #[test]
    fn status_messages_are_short_and_non_empty() {
        let errors = [
            DroidError::InvalidFaction { faction_id: 0x02 },
            DroidError::NotConnected,
            DroidError::SessionBusy,
            DroidError::RadioBusy {
                holder: RadioUse::Scan,
            },
            DroidError::AdvertiseFailed {
                reason: "start".to_string(),
            },
            DroidError::Aborted,
        ];
        for error in &errors {
            let message = error.status_message();
            assert!(!message.is_empty());
            assert!(message.len() < 48, "too long: {message}");
        }
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!DroidError::InvalidFaction { faction_id: 0 }.is_retryable());
        assert!(!DroidError::NotConnected.is_retryable());
        assert!(DroidError::RadioBusy {
            holder: RadioUse::Advertise
        }
        .is_retryable());
    }
}
