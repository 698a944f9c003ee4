//! Encode a grid of positions and decode them back.

use cpr_core::{
    decode_global, decode_local, encode_report, CprState, FormatKind, Parity, Position,
    ReferencePosition,
};

const TOLERANCE: f64 = 5e-3;

fn grid() -> Vec<Position> {
    let mut out = Vec::new();
    let mut i = 0;
    loop {
        let lat = -84.0 + i as f64 * 3.7;
        if lat > 84.0 {
            break;
        }
        let mut k = 0;
        loop {
            let lon = -179.0 + k as f64 * 11.3;
            if lon >= 180.0 {
                break;
            }
            out.push(Position::new(lat, lon));
            k += 1;
        }
        i += 1;
    }
    out
}

fn global_pair(pos: &Position, format: FormatKind, first: Parity, reference: &ReferencePosition) -> Position {
    let mut state = CprState::new();
    let a = encode_report(pos, first, format, 100.0);
    let b = encode_report(pos, first.opposite(), format, 101.0);

    assert!(decode_global(&mut state, a, 100.0, reference).is_err());
    match decode_global(&mut state, b, 101.0, reference) {
        Ok(p) => p,
        Err(e) => panic!("{pos} ({format}, {first} first): {e}"),
    }
}

#[test]
fn test_airborne_global_grid() {
    let points = grid();
    assert!(points.len() > 1000);
    for pos in &points {
        for first in [Parity::Even, Parity::Odd] {
            let got = global_pair(pos, FormatKind::Airborne, first, &ReferencePosition::UNKNOWN);
            assert!(
                got.approx_eq(pos, TOLERANCE),
                "airborne {pos}, {first} first: got {got}"
            );
        }
    }
}

#[test]
fn test_surface_global_grid() {
    for pos in &grid() {
        let reference = ReferencePosition::new(pos.latitude + 0.3, pos.longitude - 0.3);
        for first in [Parity::Even, Parity::Odd] {
            let got = global_pair(pos, FormatKind::Surface, first, &reference);
            assert!(
                got.approx_eq(pos, TOLERANCE),
                "surface {pos}, {first} first: got {got}"
            );
        }
    }
}

#[test]
fn test_local_grid() {
    for pos in &grid() {
        let reference = ReferencePosition::new(pos.latitude + 0.2, pos.longitude - 0.2);
        for format in [FormatKind::Airborne, FormatKind::Surface] {
            for parity in [Parity::Even, Parity::Odd] {
                let report = encode_report(pos, parity, format, 0.0);
                let got = decode_local(&report, &reference, 0.0)
                    .unwrap_or_else(|e| panic!("{pos} ({format}, {parity}): {e}"));
                assert!(
                    got.approx_eq(pos, TOLERANCE),
                    "local {format} {parity} {pos}: got {got}"
                );
            }
        }
    }
}
