use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubcarrierKind {
    Pilot,
    Data,
}

/// Modulation schemes ordered from most-robust to highest-throughput; used
/// as array indices when stepping modulation up/down under hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modulation {
    Bpsk,
    Qpsk,
    Qam16,
    Qam64,
    Qam256,
}

impl Modulation {
    pub const LADDER: [Modulation; 5] = [
        Modulation::Bpsk,
        Modulation::Qpsk,
        Modulation::Qam16,
        Modulation::Qam64,
        Modulation::Qam256,
    ];

    /// Bits per symbol, used to estimate bitrate for a given lane bandwidth.
    pub fn bits_per_symbol(self) -> u32 {
        match self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
            Modulation::Qam256 => 8,
        }
    }

    pub fn step_up(self) -> Modulation {
        let idx = Self::LADDER.iter().position(|m| *m == self).unwrap_or(0);
        Self::LADDER[(idx + 1).min(Self::LADDER.len() - 1)]
    }

    pub fn step_down(self) -> Modulation {
        let idx = Self::LADDER.iter().position(|m| *m == self).unwrap_or(0);
        Self::LADDER[idx.saturating_sub(1)]
    }
}

/// One logical OFDM lane. Pilots never carry data; quality is clamped to
/// `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Subcarrier {
    pub id: u32,
    pub kind: SubcarrierKind,
    pub current_modulation: Modulation,
    pub quality: f32,
    pub allocation: Option<(String, u32)>,
    pub estimated_bitrate: u32,
    pub(super) consecutive_above: u8,
    pub(super) consecutive_below: u8,
}

impl Subcarrier {
    pub fn new(id: u32, kind: SubcarrierKind) -> Self {
        Self {
            id,
            kind,
            current_modulation: Modulation::Bpsk,
            quality: 0.5,
            allocation: None,
            estimated_bitrate: 0,
            consecutive_above: 0,
            consecutive_below: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.kind == SubcarrierKind::Data && self.allocation.is_none()
    }
}
