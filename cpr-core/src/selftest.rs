//! Startup self-test: known CPR vectors through both decoders.
//!
//! A broken decoder does not crash, it produces believable wrong positions.
//! Callers run this once before decoding anything and refuse to continue if
//! it fails.

use crate::cpr::{Decoder, FreshnessWindows};
use crate::encode::encode_report;
use crate::nl::zone_count;
use crate::state::CprState;
use crate::trace::{TraceEvent, TraceSink, TraceStage, TRACING};
use crate::types::FormatKind::{Airborne, Surface};
use crate::types::Parity::{Even, Odd};
use crate::types::*;

/// Maximum error, in degrees, for a vector to pass.
pub const TOLERANCE: f64 = 1e-4;

/// Error a vector is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    ZoneMismatch,
    OutOfRange,
    NoReference,
    Ambiguous,
    Stale,
}

impl Failure {
    fn matches(self, err: &CprError) -> bool {
        matches!(
            (self, err),
            (Failure::ZoneMismatch, CprError::ZoneMismatch)
                | (Failure::OutOfRange, CprError::OutOfRange)
                | (Failure::NoReference, CprError::NoReference)
                | (Failure::Ambiguous, CprError::SurfaceHemisphereAmbiguous)
                | (Failure::Stale, CprError::StaleFrame { .. })
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Expect {
    At(f64, f64),
    Fails(Failure),
}

/// Frame as (parity, raw lat, raw lon, timestamp).
type Frame = (Parity, u32, u32, f64);

#[derive(Debug, Clone, Copy)]
enum Check {
    Zones {
        lat: f64,
        zones: u8,
    },
    /// `first` is stored, then `second` is decoded globally at its own timestamp.
    Global {
        format: FormatKind,
        first: Frame,
        second: Frame,
        reference: Option<(f64, f64)>,
        expect: Expect,
    },
    Local {
        format: FormatKind,
        frame: Frame,
        reference: Option<(f64, f64)>,
        range_limit_m: Option<f64>,
        expect: Expect,
    },
    /// Encode a position as an even/odd pair, decode it back.
    RoundTrip {
        format: FormatKind,
        lat: f64,
        lon: f64,
        reference: Option<(f64, f64)>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Vector {
    name: &'static str,
    check: Check,
}

const VECTORS: &[Vector] = &[
    Vector {
        name: "nl equator",
        check: Check::Zones { lat: 0.0, zones: 59 },
    },
    Vector {
        name: "nl 45",
        check: Check::Zones { lat: 45.0, zones: 42 },
    },
    Vector {
        name: "nl south 52",
        check: Check::Zones { lat: -52.2572, zones: 36 },
    },
    Vector {
        name: "nl pole",
        check: Check::Zones { lat: 87.0, zones: 1 },
    },
    Vector {
        name: "global airborne, even latest",
        check: Check::Global {
            format: Airborne,
            first: (Odd, 74158, 50194, 0.0),
            second: (Even, 93000, 51372, 1.0),
            reference: None,
            expect: Expect::At(52.257202, 3.919373),
        },
    },
    Vector {
        name: "global airborne, odd latest",
        check: Check::Global {
            format: Airborne,
            first: (Even, 93000, 51372, 0.0),
            second: (Odd, 74158, 50194, 1.0),
            reference: None,
            expect: Expect::At(52.265780, 3.938913),
        },
    },
    Vector {
        name: "global airborne, southern hemisphere",
        check: Check::Global {
            format: Airborne,
            first: (Odd, 58218, 20972, 0.0),
            second: (Even, 45875, 76022, 1.0),
            reference: None,
            expect: Expect::At(-33.900009, 151.200013),
        },
    },
    Vector {
        name: "global airborne, zone boundary straddle",
        check: Check::Global {
            format: Airborne,
            first: (Even, 97430, 36409, 0.0),
            second: (Odd, 94051, 21845, 1.0),
            reference: None,
            expect: Expect::Fails(Failure::ZoneMismatch),
        },
    },
    Vector {
        name: "global airborne, stale pair",
        check: Check::Global {
            format: Airborne,
            first: (Odd, 74158, 50194, 0.0),
            second: (Even, 93000, 51372, 10.5),
            reference: None,
            expect: Expect::Fails(Failure::Stale),
        },
    },
    Vector {
        name: "global surface, southern hemisphere",
        check: Check::Global {
            format: Surface,
            first: (Even, 52429, 41943, 0.0),
            second: (Odd, 101799, 83886, 1.0),
            reference: Some((-33.6, 150.9)),
            expect: Expect::At(-33.900003, 151.199999),
        },
    },
    Vector {
        name: "global surface, antimeridian",
        check: Check::Global {
            format: Surface,
            first: (Odd, 42962, 8447, 0.0),
            second: (Even, 43691, 8592, 1.0),
            reference: Some((0.8, 179.9)),
            expect: Expect::At(0.500004, -179.900006),
        },
    },
    Vector {
        name: "global surface, no reference",
        check: Check::Global {
            format: Surface,
            first: (Even, 52429, 41943, 0.0),
            second: (Odd, 101799, 83886, 1.0),
            reference: None,
            expect: Expect::Fails(Failure::Ambiguous),
        },
    },
    Vector {
        name: "local airborne even",
        check: Check::Local {
            format: Airborne,
            frame: (Even, 93000, 51372, 0.0),
            reference: Some((52.258, 3.918)),
            range_limit_m: None,
            expect: Expect::At(52.257202, 3.919373),
        },
    },
    Vector {
        name: "local airborne odd",
        check: Check::Local {
            format: Airborne,
            frame: (Odd, 74158, 50194, 0.0),
            reference: Some((52.258, 3.918)),
            range_limit_m: None,
            expect: Expect::At(52.265780, 3.938913),
        },
    },
    Vector {
        name: "local surface",
        check: Check::Local {
            format: Surface,
            frame: (Even, 52429, 41943, 0.0),
            reference: Some((-33.8, 151.1)),
            range_limit_m: None,
            expect: Expect::At(-33.899998, 151.199999),
        },
    },
    Vector {
        name: "local reference past the pole",
        check: Check::Local {
            format: Airborne,
            frame: (Even, 13107, 0, 0.0),
            reference: Some((89.9, 0.0)),
            range_limit_m: None,
            expect: Expect::Fails(Failure::OutOfRange),
        },
    },
    Vector {
        name: "local beyond range limit",
        check: Check::Local {
            format: Airborne,
            frame: (Even, 93000, 51372, 0.0),
            reference: Some((52.258, 3.918)),
            range_limit_m: Some(50.0),
            expect: Expect::Fails(Failure::OutOfRange),
        },
    },
    Vector {
        name: "local surface, no reference",
        check: Check::Local {
            format: Surface,
            frame: (Even, 52429, 41943, 0.0),
            reference: None,
            range_limit_m: None,
            expect: Expect::Fails(Failure::NoReference),
        },
    },
    Vector {
        name: "round trip airborne north-west",
        check: Check::RoundTrip {
            format: Airborne,
            lat: 71.3,
            lon: -156.8,
            reference: None,
        },
    },
    Vector {
        name: "round trip airborne south-west",
        check: Check::RoundTrip {
            format: Airborne,
            lat: -45.0,
            lon: -120.5,
            reference: None,
        },
    },
    Vector {
        name: "round trip surface near equator",
        check: Check::RoundTrip {
            format: Surface,
            lat: 10.4,
            lon: 100.0,
            reference: Some((10.7, 99.7)),
        },
    },
];

/// A vector whose result did not match.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfTestFailure {
    pub name: &'static str,
    pub detail: String,
}

impl std::fmt::Display for SelfTestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

/// Run every vector. True when all pass.
pub fn run_self_tests() -> bool {
    run_self_tests_with(&TRACING)
}

/// Run every vector, reporting failures through `trace`.
pub fn run_self_tests_with(trace: &dyn TraceSink) -> bool {
    self_test_report(trace).is_empty()
}

/// Run every vector and return the ones that failed.
pub fn self_test_report(trace: &dyn TraceSink) -> Vec<SelfTestFailure> {
    check_vectors(VECTORS, TOLERANCE, trace)
}

fn reference_from(reference: Option<(f64, f64)>) -> ReferencePosition {
    match reference {
        Some((lat, lon)) => ReferencePosition::new(lat, lon),
        None => ReferencePosition::UNKNOWN,
    }
}

fn report_from(format: FormatKind, (parity, lat, lon, ts): Frame) -> RawReport {
    RawReport::new(
        RawAxis::wrapping(lat),
        RawAxis::wrapping(lon),
        parity,
        format,
        ts,
    )
}

fn compare(got: &Result<Position>, expect: Expect, tolerance: f64) -> Option<String> {
    match (got, expect) {
        (Ok(pos), Expect::At(lat, lon)) => {
            let want = Position::new(lat, lon);
            (!pos.approx_eq(&want, tolerance)).then(|| format!("expected {want}, got {pos}"))
        }
        (Ok(pos), Expect::Fails(f)) => Some(format!("expected {f:?}, got {pos}")),
        (Err(e), Expect::At(lat, lon)) => Some(format!("expected {lat}, {lon}, got error: {e}")),
        (Err(e), Expect::Fails(f)) => (!f.matches(e)).then(|| format!("expected {f:?}, got {e}")),
    }
}

fn check_vectors(
    vectors: &[Vector],
    tolerance: f64,
    trace: &dyn TraceSink,
) -> Vec<SelfTestFailure> {
    // Vectors carry their own diagnostics; individual decode attempts stay quiet.
    let quiet = crate::trace::NullSink;
    let decoder = Decoder::new(FreshnessWindows::default()).with_trace(&quiet);
    let mut failures = Vec::new();

    for v in vectors {
        let (parity, format, result, detail) = match v.check {
            Check::Zones { lat, zones } => {
                let got = zone_count(lat);
                if got != zones {
                    let detail = format!("NL({lat}) expected {zones}, got {got}");
                    trace.note(TraceStage::SelfTest, &format!("{}: {detail}", v.name));
                    failures.push(SelfTestFailure {
                        name: v.name,
                        detail,
                    });
                }
                continue;
            }
            Check::Global {
                format,
                first,
                second,
                reference,
                expect,
            } => {
                let mut state = CprState::new();
                state.store(report_from(format, first));
                let report = report_from(format, second);
                let reference = reference_from(reference);
                let result = decoder.global(&mut state, report, report.timestamp, &reference);
                let detail = compare(&result, expect, tolerance);
                (report.parity, format, result, detail)
            }
            Check::Local {
                format,
                frame,
                reference,
                range_limit_m,
                expect,
            } => {
                let report = report_from(format, frame);
                let mut reference = reference_from(reference);
                reference.range_limit_m = range_limit_m;
                let result = decoder.local(&report, &reference, report.timestamp);
                let detail = compare(&result, expect, tolerance);
                (report.parity, format, result, detail)
            }
            Check::RoundTrip {
                format,
                lat,
                lon,
                reference,
            } => {
                let truth = Position::new(lat, lon);
                let mut state = CprState::new();
                state.store(encode_report(&truth, Even, format, 0.0));
                let odd = encode_report(&truth, Odd, format, 1.0);
                let result = decoder.global(&mut state, odd, 1.0, &reference_from(reference));
                let detail = compare(&result, Expect::At(lat, lon), tolerance);
                (Odd, format, result, detail)
            }
        };

        if let Some(detail) = detail {
            trace.event(&TraceEvent {
                stage: TraceStage::SelfTest,
                parity,
                format,
                now: 0.0,
                outcome: result.as_ref().copied(),
                detail: Some(&detail),
            });
            failures.push(SelfTestFailure {
                name: v.name,
                detail,
            });
        }
    }

    failures
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
