//! Per-aircraft CPR frame buffer.
//!
//! Holds the most recent even and odd report. The owner (usually the registry)
//! decides the record's lifetime; decoders only read and write the slots.

use crate::types::{Parity, RawReport};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CprState {
    pub even_slot: Option<RawReport>,
    pub odd_slot: Option<RawReport>,
}

impl CprState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, parity: Parity) -> Option<&RawReport> {
        match parity {
            Parity::Even => self.even_slot.as_ref(),
            Parity::Odd => self.odd_slot.as_ref(),
        }
    }

    /// Store a report in the slot matching its parity. The other slot is left as is.
    pub fn store(&mut self, report: RawReport) {
        match report.parity {
            Parity::Even => self.even_slot = Some(report),
            Parity::Odd => self.odd_slot = Some(report),
        }
    }

    /// The stored report of opposite parity to `parity`.
    pub fn complement(&self, parity: Parity) -> Option<&RawReport> {
        self.slot(parity.opposite())
    }

    /// Drop both buffered frames. The resolver does this when a pair decodes
    /// to bad data, then stores the newest frame again.
    pub fn clear(&mut self) {
        self.even_slot = None;
        self.odd_slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.even_slot.is_none() && self.odd_slot.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
