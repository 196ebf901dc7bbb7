//! Receiver message classification
//!
//! The receiver prints free-form text lines. [`classify`] maps each line to
//! exactly one [`Event`]. The marker checks run in a fixed order and the
//! first hit wins, because several markers can appear in the same line.
//!
//! Marker checks are case-sensitive substring matches. Only the legacy
//! fallback, kept for older firmware that prints bare codes such as `R` or
//! `BTN_W`, compares case-insensitively.

/// Substring present in every button-receipt line
pub const RECEIPT_MARKER: &str = "RX: BTN";
/// Sub-marker identifying the primary ("right") button
pub const PRIMARY_MARKER: &str = "BTN1";
/// Sub-marker identifying the secondary ("wrong") button
pub const SECONDARY_MARKER: &str = "BTN2";

pub const CONNECTED_MARKER: &str = "Authorized transmitter connected";
pub const STATUS_MARKER: &str = "Status:";
pub const REJECTED_MARKER: &str = "Rejected message from unauthorized MAC";
pub const STARTING_MARKER: &str = "Receiver starting";
pub const READY_MARKER: &str = "Receiver ready";
pub const INIT_FAILED_MARKER: &str = "ESP-NOW init failed";

// Legacy firmware codes, matched against the uppercased trimmed line
const LEGACY_PRIMARY_CODE: &str = "R";
const LEGACY_PRIMARY_ALIASES: [&str; 3] = ["RIGHT", "BTN1", "BTN_R"];
const LEGACY_SECONDARY_CODE: &str = "W";
const LEGACY_SECONDARY_ALIASES: [&str; 3] = ["WRONG", "BTN2", "BTN_W"];

/// Classification result for one receiver line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RightPress,
    WrongPress,
    TransmitterConnected,
    StatusUpdate,
    SecurityRejected,
    ReceiverStarting,
    ReceiverReady,
    LinkInitFailed,
    /// Any other non-empty line, carried verbatim for passthrough logging
    Unclassified(String),
    Empty,
}

impl Event {
    /// Button presses are the only events that trigger playback.
    pub fn is_press(&self) -> bool {
        matches!(self, Event::RightPress | Event::WrongPress)
    }
}

/// Map a raw receiver line to its event. Pure and total.
pub fn classify(raw_line: &str) -> Event {
    if raw_line.contains(RECEIPT_MARKER) {
        if raw_line.contains(PRIMARY_MARKER) {
            return Event::RightPress;
        }
        if raw_line.contains(SECONDARY_MARKER) {
            return Event::WrongPress;
        }
    }

    if raw_line.contains(CONNECTED_MARKER) {
        return Event::TransmitterConnected;
    }
    if raw_line.contains(STATUS_MARKER) {
        return Event::StatusUpdate;
    }
    if raw_line.contains(REJECTED_MARKER) {
        return Event::SecurityRejected;
    }
    if raw_line.contains(STARTING_MARKER) {
        return Event::ReceiverStarting;
    }
    if raw_line.contains(READY_MARKER) {
        return Event::ReceiverReady;
    }
    if raw_line.contains(INIT_FAILED_MARKER) {
        return Event::LinkInitFailed;
    }

    let trimmed = raw_line.trim();
    if let Some(event) = classify_legacy(trimmed) {
        return event;
    }

    if trimmed.is_empty() {
        Event::Empty
    } else {
        Event::Unclassified(raw_line.to_string())
    }
}

fn classify_legacy(trimmed: &str) -> Option<Event> {
    let upper = trimmed.to_uppercase();

    if upper == LEGACY_PRIMARY_CODE || LEGACY_PRIMARY_ALIASES.iter().any(|a| upper.contains(a)) {
        return Some(Event::RightPress);
    }
    if upper == LEGACY_SECONDARY_CODE || LEGACY_SECONDARY_ALIASES.iter().any(|a| upper.contains(a)) {
        return Some(Event::WrongPress);
    }
    None
}
