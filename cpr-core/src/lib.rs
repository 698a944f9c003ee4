//! cpr-core: Compact Position Reporting decode for Mode S / ADS-B.
//!
//! No async, no I/O in the decode path, just algorithms. Frame parsing is the
//! caller's job; this crate takes the raw 17-bit CPR fields and turns pairs of
//! them (or one of them plus a reference) into positions.

pub mod config;
pub mod cpr;
pub mod encode;
pub mod geo;
pub mod nl;
pub mod registry;
pub mod resolve;
pub mod selftest;
pub mod state;
pub mod trace;
pub mod types;

// Re-export commonly used types at crate root
pub use cpr::{decode_global, decode_local, Decoder, FreshnessWindows};
pub use encode::{encode, encode_report};
pub use nl::zone_count;
pub use registry::CprRegistry;
pub use resolve::{AircraftCpr, Resolver, ResolverConfig, StatsSnapshot};
pub use selftest::{run_self_tests, run_self_tests_with};
pub use state::CprState;
pub use trace::{MemorySink, NullSink, TraceEvent, TraceSink, TracingSink};
pub use types::*;
