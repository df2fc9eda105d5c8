use crate::error::{FrameError, Result};

/// Serialized width of a [`GpsRecord`]: two f64 and three f32 fields.
pub const GPS_RECORD_SIZE: usize = 28;

/// One GPS fix.
///
/// Plain value type: copied between producer, frame codec and sink, never
/// shared mutably.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsRecord {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Metres above mean sea level.
    pub altitude: f32,
    /// Metres per second over ground.
    pub speed: f32,
    /// Degrees clockwise from true north.
    pub heading: f32,
}

impl GpsRecord {
    pub fn new(latitude: f64, longitude: f64, altitude: f32, speed: f32, heading: f32) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            speed,
            heading,
        }
    }

    /// Reject records the float packer cannot encode.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() {
            return Err(FrameError::NonFinite { field: "latitude" });
        }
        if !self.longitude.is_finite() {
            return Err(FrameError::NonFinite { field: "longitude" });
        }
        if !self.altitude.is_finite() {
            return Err(FrameError::NonFinite { field: "altitude" });
        }
        if !self.speed.is_finite() {
            return Err(FrameError::NonFinite { field: "speed" });
        }
        if !self.heading.is_finite() {
            return Err(FrameError::NonFinite { field: "heading" });
        }
        Ok(())
    }
}

impl std::fmt::Display for GpsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat={:.6} lon={:.6} alt={:.1} speed={:.2} heading={:.1}",
            self.latitude, self.longitude, self.altitude, self.speed, self.heading
        )
    }
}
