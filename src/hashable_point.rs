use geo::Point;
use std::fmt;

/// Decimal places kept for a coordinate bucket (about 0.11 m at the equator).
pub const COORDINATE_PRECISION: u32 = 6;

const SCALE: f64 = 10_i64.pow(COORDINATE_PRECISION) as f64;

pub fn round6(value: f64) -> f64 {
    (value * SCALE).round() / SCALE
}

/// A (latitude, longitude) pair rounded to six decimals. Equality and hashing
/// use the rounded integer micro-degrees, so near-identical GPS readings land
/// in the same bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey {
    lat_micro: i64,
    lon_micro: i64,
}

impl CoordinateKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        CoordinateKey {
            lat_micro: (latitude * SCALE).round() as i64,
            lon_micro: (longitude * SCALE).round() as i64,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_micro as f64 / SCALE
    }

    pub fn longitude(&self) -> f64 {
        self.lon_micro as f64 / SCALE
    }
}

// geo points are x = longitude, y = latitude
impl From<Point> for CoordinateKey {
    fn from(point: Point) -> Self {
        CoordinateKey::new(point.y(), point.x())
    }
}

impl From<CoordinateKey> for Point {
    fn from(key: CoordinateKey) -> Self {
        Point::new(key.longitude(), key.latitude())
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude(), self.longitude())
    }
}
