//! Shared control-bus arbitration.
//!
//! Ensemble cores and the Interrupt Controller share one control bus that
//! carries a 2-bit instruction per cycle. Each requester holds its request
//! line until it sees its grant pulse; the arbiter grants at most one port per
//! cycle and registers the granted message for delivery on the next cycle.
//!
//! # Priority Rotation
//!
//! The request vector is split into a masked subset (port index at or above
//! the priority pointer) and the full subset. The masked subset wins if it is
//! non-empty. After a grant the pointer moves to one past the granted port.
//!
//! ```text
//! requests  = 0b1011     pointer = 2
//! masked    = 0b1000  -> grant port 3, pointer = 0
//! requests  = 0b0011     pointer = 0
//! masked    = 0b0011  -> grant port 1 (highest-index) or 0 (rotating)
//! ```
//!
//! # Usage
//!
//! ```
//! use ensemble_emu::control::arbiter::{BusArbiter, BusInstruction, BusRequest, PriorityScheme};
//!
//! let mut arbiter = BusArbiter::new(4, PriorityScheme::HighestIndex);
//! let requests = [None, Some(BusRequest::broadcast(BusInstruction::Done)), None, None];
//! arbiter.tick(&requests);
//!
//! let msg = arbiter.message().unwrap();
//! assert_eq!(msg.source, 1);
//! assert_eq!(msg.recv_valid, 0b1101);
//! ```

use serde::{Deserialize, Serialize};

/// 2-bit bus instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusInstruction {
    HaltPause = 0b00,
    Stop = 0b01,
    Continue = 0b10,
    Done = 0b11,
}

impl BusInstruction {
    /// Wire encoding.
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Decode the low two bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => BusInstruction::HaltPause,
            0b01 => BusInstruction::Stop,
            0b10 => BusInstruction::Continue,
            _ => BusInstruction::Done,
        }
    }
}

impl std::fmt::Display for BusInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BusInstruction::HaltPause => "HALT_PAUSE",
            BusInstruction::Stop => "STOP",
            BusInstruction::Continue => "CONTINUE",
            BusInstruction::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Destination encoding of a bus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Every port except the sender.
    Broadcast,
    /// A single explicit port.
    Port(usize),
}

/// A request line held by one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRequest {
    pub instruction: BusInstruction,
    pub destination: Destination,
}

impl BusRequest {
    /// Broadcast request.
    pub fn broadcast(instruction: BusInstruction) -> Self {
        Self { instruction, destination: Destination::Broadcast }
    }

    /// Point-to-point request.
    pub fn to_port(instruction: BusInstruction, port: usize) -> Self {
        Self { instruction, destination: Destination::Port(port) }
    }
}

/// The message granted in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMessage {
    /// Granted port
    pub source: usize,
    pub instruction: BusInstruction,
    /// Receive-valid vector, one bit per port
    pub recv_valid: u32,
}

impl BusMessage {
    /// True if `port` is a recipient.
    #[inline]
    pub fn delivers_to(&self, port: usize) -> bool {
        port < 32 && self.recv_valid & (1 << port) != 0
    }
}

/// Tie-break inside a request subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityScheme {
    /// Highest index wins within the masked subset, then within all requests.
    #[default]
    HighestIndex,
    /// Lowest index at or after the pointer wins (strict round-robin).
    Rotating,
}

impl std::fmt::Display for PriorityScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityScheme::HighestIndex => write!(f, "highest-index"),
            PriorityScheme::Rotating => write!(f, "rotating"),
        }
    }
}

/// Arbitration statistics.
#[derive(Debug, Clone, Default)]
pub struct ArbiterStats {
    /// Grants per port.
    pub grants: Vec<u64>,
    /// Cycles with more than one request.
    pub contention_cycles: u64,
    /// Broadcast messages sent.
    pub broadcasts: u64,
    /// Point-to-point messages sent.
    pub unicasts: u64,
}

/// Rotating-priority bus arbiter.
#[derive(Debug)]
pub struct BusArbiter {
    num_ports: usize,
    scheme: PriorityScheme,
    /// Port with top priority next cycle.
    pointer: usize,
    /// One-hot grant pulse.
    grant: u32,
    message: Option<BusMessage>,
    stats: ArbiterStats,
}

impl BusArbiter {
    /// Create an arbiter for `num_ports` ports (at most 32).
    pub fn new(num_ports: usize, scheme: PriorityScheme) -> Self {
        let num_ports = num_ports.clamp(1, 32);
        Self {
            num_ports,
            scheme,
            pointer: 0,
            grant: 0,
            message: None,
            stats: ArbiterStats { grants: vec![0; num_ports], ..Default::default() },
        }
    }

    /// Number of request ports.
    pub fn num_ports(&self) -> usize {
        self.num_ports
    }

    /// Active tie-break scheme.
    pub fn scheme(&self) -> PriorityScheme {
        self.scheme
    }

    /// Current priority pointer.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Registered grant vector.
    #[inline]
    pub fn grant(&self) -> u32 {
        self.grant
    }

    /// True if `port` holds the grant pulse.
    #[inline]
    pub fn granted(&self, port: usize) -> bool {
        port < self.num_ports && self.grant & (1 << port) != 0
    }

    /// Registered message, if a port was granted last cycle.
    #[inline]
    pub fn message(&self) -> Option<BusMessage> {
        self.message
    }

    /// Statistics.
    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    /// All-ones mask over the ports.
    fn full_mask(&self) -> u32 {
        if self.num_ports >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_ports) - 1
        }
    }

    /// Pick a port from a request vector without changing state.
    pub fn select(&self, requests: u32) -> Option<usize> {
        let requests = requests & self.full_mask();
        if requests == 0 {
            return None;
        }
        let masked = requests & !((1u32 << self.pointer) - 1);
        let pick = |set: u32| -> usize {
            match self.scheme {
                PriorityScheme::HighestIndex => 31 - set.leading_zeros() as usize,
                PriorityScheme::Rotating => set.trailing_zeros() as usize,
            }
        };
        if masked != 0 {
            Some(pick(masked))
        } else {
            Some(pick(requests))
        }
    }

    /// Advance one cycle. `requests[i]` is the request line of port `i`.
    pub fn tick(&mut self, requests: &[Option<BusRequest>]) {
        let vector = requests
            .iter()
            .take(self.num_ports)
            .enumerate()
            .filter(|(_, r)| r.is_some())
            .fold(0u32, |acc, (i, _)| acc | (1 << i));

        if vector.count_ones() > 1 {
            self.stats.contention_cycles += 1;
        }

        let winner = self
            .select(vector)
            .and_then(|source| requests[source].map(|request| (source, request)));
        let Some((source, request)) = winner else {
            self.grant = 0;
            self.message = None;
            return;
        };

        let recv_valid = match request.destination {
            Destination::Broadcast => {
                self.stats.broadcasts += 1;
                self.full_mask() & !(1 << source)
            }
            Destination::Port(dest) if dest < self.num_ports => {
                self.stats.unicasts += 1;
                1 << dest
            }
            Destination::Port(dest) => {
                log::warn!("bus: port {} addressed nonexistent port {}", source, dest);
                0
            }
        };

        log::trace!(
            "bus: grant port {} {} recv=0b{:b} (pointer {} -> {})",
            source,
            request.instruction,
            recv_valid,
            self.pointer,
            (source + 1) % self.num_ports
        );

        self.grant = 1 << source;
        self.message = Some(BusMessage { source, instruction: request.instruction, recv_valid });
        self.pointer = (source + 1) % self.num_ports;
        self.stats.grants[source] += 1;
    }

    /// Clear pointer, grant and message.
    pub fn reset(&mut self) {
        self.pointer = 0;
        self.grant = 0;
        self.message = None;
    }
}
