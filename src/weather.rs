use serde::{Deserialize, Serialize};

/// Weather readings carried by an APRS weather packet or overlay.
///
/// All fields are optional; rain values are hundredths of an inch,
/// pressure is tenths of a millibar, temperature is degrees Fahrenheit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherData {
    pub wind_direction: Option<i32>,
    pub wind_speed: Option<i32>,
    pub wind_gust: Option<i32>,
    pub temperature: Option<i32>,
    pub rain_1h: Option<i32>,
    pub rain_24h: Option<i32>,
    pub rain_midnight: Option<i32>,
    pub humidity: Option<i32>,
    pub pressure: Option<i32>,
}

impl WeatherData {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the record is substantial enough to reclassify a position
    /// packet as a weather packet.
    pub fn has_wind_or_temperature(&self) -> bool {
        self.temperature.is_some() || self.wind_speed.is_some()
    }
}
