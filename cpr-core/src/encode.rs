//! CPR encoding of a known position.
//!
//! The inverse of the decoders: used to build synthetic frame pairs for the
//! self-test and round-trip tests.

use crate::cpr::modulo;
use crate::nl::zone_count;
use crate::types::{FormatKind, Parity, Position, RawAxis, RawReport, CPR_MAX};

/// Encode `pos` into 17-bit latitude/longitude values for one parity.
pub fn encode(pos: &Position, parity: Parity, format: FormatKind) -> (RawAxis, RawAxis) {
    let scale = CPR_MAX as f64;
    let span = format.span();

    let dlat = span / parity.lat_zones();
    let yz = (scale * modulo(pos.latitude, dlat) / dlat + 0.5).floor();
    let rlat = dlat * (yz / scale + (pos.latitude / dlat).floor());

    let ni = (zone_count(rlat) as i32 - parity.offset()).max(1) as f64;
    let dlon = span / ni;
    let xz = (scale * modulo(pos.longitude, dlon) / dlon + 0.5).floor();

    // yz/xz may round up to exactly 2^17; the wire value keeps the low 17 bits.
    (RawAxis::wrapping(yz as u32), RawAxis::wrapping(xz as u32))
}

/// Encode `pos` as a complete report.
pub fn encode_report(
    pos: &Position,
    parity: Parity,
    format: FormatKind,
    timestamp: f64,
) -> RawReport {
    let (lat, lon) = encode(pos, parity, format);
    RawReport::new(lat, lon, parity, format, timestamp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_even_airborne() {
        let (lat, lon) = encode(
            &Position::new(52.2572, 3.9194),
            Parity::Even,
            FormatKind::Airborne,
        );
        assert_eq!((lat.get(), lon.get()), (93000, 51372));
    }

    #[test]
    fn test_encode_southern_pair() {
        let pos = Position::new(-33.9, 151.2);
        let (lat, lon) = encode(&pos, Parity::Even, FormatKind::Airborne);
        assert_eq!((lat.get(), lon.get()), (45875, 76022));
        let (lat, lon) = encode(&pos, Parity::Odd, FormatKind::Airborne);
        assert_eq!((lat.get(), lon.get()), (58218, 20972));
    }

    #[test]
    fn test_encode_surface() {
        let pos = Position::new(-33.9, 151.2);
        let (lat, lon) = encode(&pos, Parity::Even, FormatKind::Surface);
        assert_eq!((lat.get(), lon.get()), (52429, 41943));
        let (lat, lon) = encode(&pos, Parity::Odd, FormatKind::Surface);
        assert_eq!((lat.get(), lon.get()), (101799, 83886));
    }

    #[test]
    fn test_encode_report_carries_metadata() {
        let r = encode_report(
            &Position::new(10.0, 10.0),
            Parity::Odd,
            FormatKind::Surface,
            4.5,
        );
        assert_eq!(r.parity, Parity::Odd);
        assert_eq!(r.format, FormatKind::Surface);
        assert_eq!(r.timestamp, 4.5);
        assert_eq!(r.nuc, 0);
    }
}
