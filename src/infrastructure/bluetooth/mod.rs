//! Bluetooth Module
//!
//! Droid-facing radio work: beacons, discovery and the command link.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐  ┌─────────────┐  ┌──────────────┐
//!  │  Advertiser  │  │   Scanner   │  │   Session    │
//!  └──────┬───────┘  └──────┬──────┘  └──────┬───────┘
//!         │   RadioLease    │                │
//!         └────────► RadioCoordinator ◄──────┘
//!                           │
//!                    RadioControl (trait)
//!                           │
//!              BluezRadio = bluetoothctl + btleplug
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Beacon and command byte layouts, advertisement decoding
//! - [`radio`] - The radio collaborator trait
//! - [`coordinator`] - Exclusive access to the single radio
//! - [`advertiser`] - Beacon slot
//! - [`scanner`] - Droid discovery
//! - [`connection`] - Command link session
//! - [`bluetoothctl`], [`gatt`], [`bluez`] - Linux backend

pub mod advertiser;
pub mod bluetoothctl;
pub mod bluez;
pub mod connection;
pub mod coordinator;
pub mod gatt;
pub mod protocol;
pub mod radio;
pub mod scanner;

#[cfg(test)]
pub mod testing;

pub use advertiser::BeaconAdvertiser;
pub use bluez::BluezRadio;
pub use connection::DroidSession;
pub use coordinator::RadioCoordinator;
pub use scanner::DroidScanner;
