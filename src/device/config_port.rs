//! ICAP / PCAP configuration port model.
//!
//! The port is an opaque word sink with enable, write-strobe and busy
//! signals. A word transfers on a cycle where `write` is high and `busy` is
//! low; the writer holds the word otherwise. A configuration session runs from the rising to the falling edge
//! of `enable`; the sink expects a SYNC word, the payload, then a DESYNC
//! command.
//!
//! ICAP takes each 32-bit word with its byte lanes reversed relative to
//! PCAP. The controller applies [`ConfigPortKind::to_wire`] before driving
//! the data lines and the port undoes it, so captured payloads are always in
//! logical order.

use serde::{Deserialize, Serialize};

use super::platform_spec::{CONFIG_DESYNC_WORD, CONFIG_SYNC_WORD};

/// Physical configuration port flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigPortKind {
    /// Internal Configuration Access Port (byte-reversed words)
    #[default]
    Icap,
    /// Processor Configuration Access Port
    Pcap,
}

impl ConfigPortKind {
    /// Convert a logical word to the port's wire order.
    #[inline]
    pub fn to_wire(self, word: u32) -> u32 {
        match self {
            ConfigPortKind::Icap => word.swap_bytes(),
            ConfigPortKind::Pcap => word,
        }
    }

    /// Convert a wire word back to logical order.
    #[inline]
    pub fn from_wire(self, word: u32) -> u32 {
        // Byte reversal is an involution
        self.to_wire(word)
    }
}

impl std::fmt::Display for ConfigPortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigPortKind::Icap => write!(f, "ICAP"),
            ConfigPortKind::Pcap => write!(f, "PCAP"),
        }
    }
}

/// Signals driven into the port by the DFX controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigPortSignals {
    /// Port enable (chip select)
    pub enable: bool,
    /// Write strobe for `data`
    pub write: bool,
    /// Wire-order data word
    pub data: u32,
}

/// Summary of one enable-to-disable configuration session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSession {
    /// SYNC word was seen
    pub synced: bool,
    /// Session ended with DESYNC
    pub desynced: bool,
    /// Payload words between SYNC and DESYNC
    pub payload_words: usize,
    /// Wrapping 32-bit sum of the payload words
    pub checksum: u32,
}

/// Configuration port sink.
#[derive(Debug)]
pub struct ConfigPort {
    kind: ConfigPortKind,
    /// Busy cycles inserted after each accepted word
    busy_cycles: u32,
    busy_left: u32,
    enabled: bool,
    synced: bool,
    /// Words accepted since SYNC (includes a trailing DESYNC until close)
    capture: Vec<u32>,
    last_payload: Vec<u32>,
    sessions: Vec<ConfigSession>,
    /// Cycles a write was held off by busy
    stall_cycles: u64,
    /// Words written before SYNC
    unsynced_words: u64,
}

impl ConfigPort {
    /// Create a port of the given flavour.
    pub fn new(kind: ConfigPortKind, busy_cycles: u32) -> Self {
        Self {
            kind,
            busy_cycles,
            busy_left: 0,
            enabled: false,
            synced: false,
            capture: Vec::new(),
            last_payload: Vec::new(),
            sessions: Vec::new(),
            stall_cycles: 0,
            unsynced_words: 0,
        }
    }

    /// Port flavour.
    pub fn kind(&self) -> ConfigPortKind {
        self.kind
    }

    /// Registered busy output.
    #[inline]
    pub fn busy(&self) -> bool {
        self.busy_left > 0
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &ConfigPortSignals) {
        if input.enable && !self.enabled {
            self.capture.clear();
            self.synced = false;
        }

        if self.busy_left > 0 {
            self.busy_left -= 1;
            if input.enable && input.write {
                self.stall_cycles += 1;
            }
        } else if input.enable && input.write {
            self.accept(self.kind.from_wire(input.data));
            self.busy_left = self.busy_cycles;
        }

        if !input.enable && self.enabled {
            self.close_session();
        }
        self.enabled = input.enable;
    }

    fn accept(&mut self, word: u32) {
        if self.synced {
            self.capture.push(word);
        } else if word == CONFIG_SYNC_WORD {
            log::trace!("{} synced", self.kind);
            self.synced = true;
        } else {
            self.unsynced_words += 1;
        }
    }

    fn close_session(&mut self) {
        let desynced = self.synced && self.capture.last() == Some(&CONFIG_DESYNC_WORD);
        if desynced {
            self.capture.pop();
        }

        let session = ConfigSession {
            synced: self.synced,
            desynced,
            payload_words: self.capture.len(),
            checksum: self.capture.iter().fold(0u32, |acc, w| acc.wrapping_add(*w)),
        };
        log::debug!(
            "{} session closed: {} words, checksum 0x{:08x}, desync={}",
            self.kind, session.payload_words, session.checksum, session.desynced
        );

        self.sessions.push(session);
        self.last_payload = std::mem::take(&mut self.capture);
        self.synced = false;
    }

    /// Completed sessions, oldest first.
    pub fn sessions(&self) -> &[ConfigSession] {
        &self.sessions
    }

    /// Payload of the most recent completed session.
    pub fn last_payload(&self) -> &[u32] {
        &self.last_payload
    }

    /// True while a session is open.
    pub fn is_active(&self) -> bool {
        self.enabled
    }

    /// Cycles a writer waited on busy.
    pub fn stall_cycles(&self) -> u64 {
        self.stall_cycles
    }

    /// Words written before SYNC.
    pub fn unsynced_words(&self) -> u64 {
        self.unsynced_words
    }

    /// Abandon any open session and clear busy.
    pub fn reset(&mut self) {
        self.busy_left = 0;
        self.enabled = false;
        self.synced = false;
        self.capture.clear();
    }
}
