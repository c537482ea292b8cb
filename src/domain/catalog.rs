//! Droid Catalogs
//!
//! Static lookup tables for factions, personality chips, park locations, audio
//! groups and stored scripts. Everything here is immutable and shared freely.
//!
//! Personality ids are only unique within a faction, so every personality lookup
//! goes through its [`Faction`] first.

use std::fmt;

/// Droid affiliation carried in droid beacons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Faction {
    Scoundrel,
    Resistance,
    FirstOrder,
}

impl Faction {
    pub const ALL: [Faction; 3] = [Faction::Scoundrel, Faction::Resistance, Faction::FirstOrder];

    /// Faction id as used on the wire (sparse: 0x01, 0x05, 0x09)
    pub fn id(&self) -> u8 {
        match self {
            Self::Scoundrel => 0x01,
            Self::Resistance => 0x05,
            Self::FirstOrder => 0x09,
        }
    }

    pub fn from_id(id: u8) -> Option<Faction> {
        Self::ALL.into_iter().find(|faction| faction.id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scoundrel => "Scoundrel",
            Self::Resistance => "Resistance",
            Self::FirstOrder => "First Order",
        }
    }

    pub fn personalities(&self) -> &'static [Personality] {
        match self {
            Self::Scoundrel => SCOUNDREL_PERSONALITIES,
            Self::Resistance => RESISTANCE_PERSONALITIES,
            Self::FirstOrder => FIRST_ORDER_PERSONALITIES,
        }
    }

    /// First personality with `id` in this faction's table
    pub fn personality(&self, id: u8) -> Option<&'static Personality> {
        self.personalities().iter().find(|p| p.id == id)
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personality {
    pub id: u8,
    pub name: &'static str,
}

const fn personality(id: u8, name: &'static str) -> Personality {
    Personality { id, name }
}

const SCOUNDREL_PERSONALITIES: &[Personality] = &[
    personality(0x01, "R-Series (Default)"),
    personality(0x02, "BB-Series (Default)"),
    personality(0x04, "Gray (U9-C4)"),
    personality(0x07, "Purple (M5-BZ)"),
    // Shipped cyan with CB-23, later sold separately as red
    personality(0x09, "Cyan/Red (CB-23)"),
    personality(0x0D, "Blue (R5-D4)"),
    personality(0x0F, "A-LT Series (Default)"),
    personality(0x10, "White (Drum Kit)"),
];

// Both 2025 chips report 0x01; lookups resolve to the first entry.
const RESISTANCE_PERSONALITIES: &[Personality] = &[
    personality(0x03, "Blue (R5-D8)"),
    personality(0x06, "Orange (R4-P17)"),
    personality(0x0A, "Yellow (CH-33P)"),
    personality(0x0B, "C-Series (Default)"),
    personality(0x0C, "D-Unit (Default)"),
    personality(0x0E, "BD-Unit (Default)"),
    personality(0x01, "Green (R2-H15)"),
    personality(0x01, "Orange (SPOOK-E)"),
];

const FIRST_ORDER_PERSONALITIES: &[Personality] = &[
    personality(0x05, "Red (0-0-0)"),
    personality(0x08, "Black (BB-9E)"),
];

/// A park location a droid reacts to.
///
/// `cooldown` is in units of 5 seconds; 0xFF overrides the droid's own cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub location_id: u8,
    pub name: &'static str,
    pub cooldown: u8,
}

pub const COOLDOWN_OVERRIDE: u8 = 0xFF;

const fn location(location_id: u8, name: &'static str, cooldown: u8) -> Location {
    Location {
        location_id,
        name,
        cooldown,
    }
}

pub const LOCATIONS: &[Location] = &[
    location(0x01, "Ronto Roasters", 0x02),
    location(0x02, "Oil Baths", 0x02),
    location(0x03, "Resistance Base", 0x02),
    location(0x04, "Unknown", 0x02),
    location(0x05, "Droid Depot", 0x02),
    location(0x06, "Den of Antiquities", 0x02),
    location(0x07, "First Order Base", 0x02),
    location(0x05, "Oga's Droid Detector", COOLDOWN_OVERRIDE),
    location(0x07, "First Order Alert", COOLDOWN_OVERRIDE),
];

/// Audio groups, indexed by group id. Clip 0 picks a random clip of the group.
pub const AUDIO_GROUPS: &[&str] = &[
    "Generic",
    "Droid Depot",
    "Resistance",
    "Unknown",
    "Droid Detector",
    "Dok-Ondar's",
    "First Order",
    "Activation",
    "Motor / Internal",
    "Empty",
    "Accessory: Blaster",
    "Accessory: Thruster",
];

pub const MAX_AUDIO_CLIP: u8 = 7;

pub fn audio_group_name(group: u8) -> Option<&'static str> {
    AUDIO_GROUPS.get(group as usize).copied()
}

/// Script that drives the motors raw and may not stop by itself
pub const UNSAFE_SCRIPT_ID: u8 = 0x13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    pub id: u8,
    pub name: &'static str,
    pub description: &'static str,
}

const fn script(id: u8, name: &'static str, description: &'static str) -> Script {
    Script {
        id,
        name,
        description,
    }
}

pub const SCRIPTS: &[Script] = &[
    script(0x01, "R2 Dance 1", "Center head, group 4 sound, rotate right/left"),
    script(0x02, "R2 Dance 2", "Group 3 sound, complex turns"),
    script(0x03, "R2 Dance 3", "Group 2 sound, rotate right/left, wait"),
    script(0x04, "R2 Dance 4", "Group 0 sound, pivot turns"),
    script(0x05, "R2 Dance 5", "Group 1 sound, rhythmic pivot pulses"),
    script(0x06, "R2 Dance 6", "Group 6 sound, long dance with waits"),
    script(0x07, "R2 Dance 7", "Group 5 sound, oscillating pivots"),
    script(0x08, "R2 Dance 8", "Group 7 sound, head rotations only"),
    script(0x09, "BB Dance 1", "Sphere roll sequences"),
    script(0x0A, "BB Dance 2", "Sphere wobble and roll"),
    script(0x0B, "BB Dance 3", "Short roll sequence"),
    script(0x0C, "BB Dance 4", "High speed pivots"),
    script(0x0D, "BB Dance 5", "Figure-eight rolls"),
    script(0x0E, "BB Dance 6", "Short sound, roll and stop"),
    script(0x0F, "BB Dance 7", "Complex roll sequence"),
    script(0x10, "BB Dance 8", "Long dance with waits"),
    script(UNSAFE_SCRIPT_ID, "Debug Roll", "Raw motor forward, may not stop"),
];

/// Scripts callers must refuse to send.
pub fn is_unsafe_script(script_id: u8) -> bool {
    script_id == UNSAFE_SCRIPT_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faction_ids_are_sparse_and_round_trip() {
        let ids: Vec<u8> = Faction::ALL.iter().map(Faction::id).collect();
        assert_eq!(ids, vec![0x01, 0x05, 0x09]);
        for faction in Faction::ALL {
            assert_eq!(Faction::from_id(faction.id()), Some(faction));
        }
        assert_eq!(Faction::from_id(0x02), None);
    }

    #[test]
    fn personality_lookup_is_scoped_to_faction() {
        assert_eq!(
            Faction::Scoundrel.personality(0x01).map(|p| p.name),
            Some("R-Series (Default)")
        );
        assert_eq!(
            Faction::Resistance.personality(0x01).map(|p| p.name),
            Some("Green (R2-H15)")
        );
        assert_eq!(Faction::FirstOrder.personality(0x01), None);
    }

    #[test]
    fn duplicate_resistance_entries_are_preserved() {
        let duplicates = Faction::Resistance
            .personalities()
            .iter()
            .filter(|p| p.id == 0x01)
            .count();
        assert_eq!(duplicates, 2);
    }

    #[test]
    fn override_locations_reuse_ids() {
        let detector = LOCATIONS
            .iter()
            .find(|l| l.name == "Oga's Droid Detector")
            .unwrap();
        assert_eq!(detector.location_id, 0x05);
        assert_eq!(detector.cooldown, COOLDOWN_OVERRIDE);
    }

    #[test]
    fn only_debug_roll_is_unsafe() {
        let unsafe_scripts: Vec<u8> = SCRIPTS
            .iter()
            .map(|s| s.id)
            .filter(|id| is_unsafe_script(*id))
            .collect();
        assert_eq!(unsafe_scripts, vec![0x13]);
        assert_eq!(audio_group_name(11), Some("Accessory: Thruster"));
        assert_eq!(audio_group_name(12), None);
    }
}
