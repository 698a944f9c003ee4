//! Shared types, error enum, and CPR report/position types for cpr-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by cpr-core.
///
/// Every decode variant is recoverable: the caller keeps the aircraft's last
/// good position and waits for the next report.
#[derive(Debug, Error)]
pub enum CprError {
    #[error("no complementary frame of opposite parity")]
    NoComplementaryFrame,
    #[error("complementary frame is too old ({age:.1}s > {window:.1}s)")]
    StaleFrame { age: f64, window: f64 },
    #[error("even/odd frames straddle a longitude zone boundary")]
    ZoneMismatch,
    #[error("surface position needs a reference to resolve its quadrant")]
    SurfaceHemisphereAmbiguous,
    #[error("no valid reference position")]
    NoReference,
    #[error("decoded position is out of range of the reference")]
    OutOfRange,
    #[error("decoded latitude {0:.4} outside [-90, 90]")]
    LatitudeOutOfBounds(f64),
    #[error("implied speed from last fix is implausible ({distance_m:.0}m > {limit_m:.0}m)")]
    ImplausibleSpeed { distance_m: f64, limit_m: f64 },
    #[error("raw CPR value {0} does not fit in 17 bits")]
    AxisOutOfRange(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CprError>;

// ---------------------------------------------------------------------------
// Encoded report
// ---------------------------------------------------------------------------

/// Number of distinct values of a 17-bit CPR axis.
pub const CPR_MAX: u32 = 1 << 17;

/// One 17-bit CPR encoded axis, always in `[0, 131072)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RawAxis(u32);

impl RawAxis {
    pub fn new(value: u32) -> Result<Self> {
        if value >= CPR_MAX {
            return Err(CprError::AxisOutOfRange(value));
        }
        Ok(RawAxis(value))
    }

    /// Build from an arbitrary integer by keeping the low 17 bits.
    pub fn wrapping(value: u32) -> Self {
        RawAxis(value & (CPR_MAX - 1))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Position of this value within its zone, in `[0, 1)`.
    pub fn fraction(self) -> f64 {
        self.0 as f64 / CPR_MAX as f64
    }
}

impl TryFrom<u32> for RawAxis {
    type Error = CprError;

    fn try_from(value: u32) -> Result<Self> {
        RawAxis::new(value)
    }
}

/// Frame parity (the F bit of a position message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn from_odd_flag(odd: bool) -> Self {
        if odd {
            Parity::Odd
        } else {
            Parity::Even
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    /// Number of latitude zones: 60 for even frames, 59 for odd.
    pub fn lat_zones(self) -> f64 {
        match self {
            Parity::Even => 60.0,
            Parity::Odd => 59.0,
        }
    }

    /// Amount subtracted from NL to get the longitude zone count.
    pub fn offset(self) -> i32 {
        match self {
            Parity::Even => 0,
            Parity::Odd => 1,
        }
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parity::Even => write!(f, "even"),
            Parity::Odd => write!(f, "odd"),
        }
    }
}

/// Airborne (TC 9-18, 20-22) or surface (TC 5-8) position format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormatKind {
    Airborne,
    Surface,
}

impl FormatKind {
    /// Angular span covered by the full set of zones, in degrees.
    pub fn span(self) -> f64 {
        match self {
            FormatKind::Airborne => 360.0,
            FormatKind::Surface => 90.0,
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatKind::Airborne => write!(f, "airborne"),
            FormatKind::Surface => write!(f, "surface"),
        }
    }
}

/// Navigation Uncertainty Category, taken from the message subtype.
pub type Nuc = u8;

/// A single CPR position report as handed over by the message parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReport {
    pub latitude: RawAxis,
    pub longitude: RawAxis,
    pub parity: Parity,
    pub format: FormatKind,
    /// Receive time in seconds on a monotonic clock.
    pub timestamp: f64,
    pub nuc: Nuc,
}

impl RawReport {
    pub fn new(
        latitude: RawAxis,
        longitude: RawAxis,
        parity: Parity,
        format: FormatKind,
        timestamp: f64,
    ) -> Self {
        RawReport {
            latitude,
            longitude,
            parity,
            format,
            timestamp,
            nuc: 0,
        }
    }

    /// Build from unchecked parser output. Fails when an axis exceeds 17 bits.
    pub fn from_raw(
        lat: u32,
        lon: u32,
        parity: Parity,
        format: FormatKind,
        timestamp: f64,
    ) -> Result<Self> {
        Ok(RawReport::new(
            RawAxis::new(lat)?,
            RawAxis::new(lon)?,
            parity,
            format,
            timestamp,
        ))
    }

    pub fn with_nuc(mut self, nuc: Nuc) -> Self {
        self.nuc = nuc;
        self
    }
}

// ---------------------------------------------------------------------------
// Decoded positions
// ---------------------------------------------------------------------------

/// Decoded WGS-84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Position {
            latitude,
            longitude,
        }
    }

    /// True when both axes are within `tolerance` degrees of `other`.
    pub fn approx_eq(&self, other: &Position, tolerance: f64) -> bool {
        (self.latitude - other.latitude).abs() <= tolerance
            && lon_delta(self.longitude, other.longitude).abs() <= tolerance
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Signed longitude difference wrapped into `[-180, 180)`.
pub fn lon_delta(a: f64, b: f64) -> f64 {
    let d = a - b;
    d - 360.0 * ((d + 180.0) / 360.0).floor()
}

/// Reference point for local decoding and surface quadrant selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePosition {
    pub latitude: f64,
    pub longitude: f64,
    pub valid: bool,
    /// Maximum distance (meters) a local decode may lie from this point.
    pub range_limit_m: Option<f64>,
}

impl ReferencePosition {
    pub const UNKNOWN: ReferencePosition = ReferencePosition {
        latitude: 0.0,
        longitude: 0.0,
        valid: false,
        range_limit_m: None,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        ReferencePosition {
            latitude,
            longitude,
            valid: true,
            range_limit_m: None,
        }
    }

    pub fn with_range_limit(mut self, meters: f64) -> Self {
        self.range_limit_m = Some(meters);
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

impl From<Position> for ReferencePosition {
    fn from(pos: Position) -> Self {
        ReferencePosition::new(pos.latitude, pos.longitude)
    }
}

/// How a fix was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMethod {
    Global,
    Local,
}

/// A position accepted by the resolver, with its uncertainty category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fix {
    pub position: Position,
    pub nuc: Nuc,
    pub timestamp: f64,
    pub method: DecodeMethod,
    pub format: FormatKind,
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some([
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
