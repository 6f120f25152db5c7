//! APRS weather-field decoder.
//!
//! Scans for fixed-length numeric runs keyed by prefix character:
//! `c` wind direction, `s` wind speed, `g` gust, `t` temperature,
//! `r`/`p`/`P` rain (last hour / 24 h / since midnight), `h` humidity,
//! `b` pressure. Wind not found via `c`/`s` is retried against a
//! `DDD/SSS` pattern anywhere in the input.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::weather::WeatherData;

static WIND_DIRECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"c([0-9.]{3})").unwrap());
static WIND_SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"s([0-9.]{3})").unwrap());
static WIND_GUST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"g([0-9.]{3})").unwrap());
static TEMPERATURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"t([0-9.]{3})").unwrap());
static RAIN_1H_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"r([0-9.]{3})").unwrap());
static RAIN_24H_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"p([0-9.]{3})").unwrap());
static RAIN_MIDNIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"P([0-9.]{3})").unwrap());
static HUMIDITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"h([0-9.]{2})").unwrap());
static PRESSURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"b([0-9.]{5})").unwrap());
static WIND_FALLBACK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]{3})/([0-9]{3})").unwrap());

fn capture_number(re: &Regex, input: &str) -> Option<i32> {
    re.captures(input)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|value| value as i32)
}

pub fn decode(input: &str) -> WeatherData {
    let mut wx = WeatherData {
        wind_direction: capture_number(&WIND_DIRECTION_RE, input),
        wind_speed: capture_number(&WIND_SPEED_RE, input),
        wind_gust: capture_number(&WIND_GUST_RE, input),
        temperature: capture_number(&TEMPERATURE_RE, input),
        rain_1h: capture_number(&RAIN_1H_RE, input),
        rain_24h: capture_number(&RAIN_24H_RE, input),
        rain_midnight: capture_number(&RAIN_MIDNIGHT_RE, input),
        humidity: capture_number(&HUMIDITY_RE, input),
        pressure: capture_number(&PRESSURE_RE, input),
    };

    if wx.wind_direction.is_none() && wx.wind_speed.is_none() {
        if let Some(caps) = WIND_FALLBACK_RE.captures(input) {
            wx.wind_direction = caps[1].parse().ok();
            wx.wind_speed = caps[2].parse().ok();
        }
    }

    wx.wind_direction = wx.wind_direction.filter(|d| (0..=360).contains(d));
    wx.humidity = wx.humidity.filter(|h| (0..=100).contains(h));
    wx
}

/// Format a full record back into the wire field layout. Used by tests to
/// pin the decoder round trip; all fields must be present.
#[cfg(test)]
pub fn format_fields(wx: &WeatherData) -> String {
    format!(
        "c{:03}s{:03}g{:03}t{:03}r{:03}p{:03}P{:03}h{:02}b{:05}",
        wx.wind_direction.unwrap(),
        wx.wind_speed.unwrap(),
        wx.wind_gust.unwrap(),
        wx.temperature.unwrap(),
        wx.rain_1h.unwrap(),
        wx.rain_24h.unwrap(),
        wx.rain_midnight.unwrap(),
        wx.humidity.unwrap(),
        wx.pressure.unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_field_run() {
        let wx = decode("c090s010g015t072r001p010P020h50b10135");
        assert_eq!(wx.wind_direction, Some(90));
        assert_eq!(wx.wind_speed, Some(10));
        assert_eq!(wx.wind_gust, Some(15));
        assert_eq!(wx.temperature, Some(72));
        assert_eq!(wx.rain_1h, Some(1));
        assert_eq!(wx.rain_24h, Some(10));
        assert_eq!(wx.rain_midnight, Some(20));
        assert_eq!(wx.humidity, Some(50));
        assert_eq!(wx.pressure, Some(10135));
    }

    #[test]
    fn missing_fields_are_null() {
        let wx = decode("g012t068");
        assert_eq!(wx.wind_gust, Some(12));
        assert_eq!(wx.temperature, Some(68));
        assert_eq!(wx.wind_direction, None);
        assert_eq!(wx.pressure, None);
        assert_eq!(wx.rain_1h, None);
    }

    #[test]
    fn wind_falls_back_to_slash_pattern() {
        let wx = decode("045/007g010t060");
        assert_eq!(wx.wind_direction, Some(45));
        assert_eq!(wx.wind_speed, Some(7));
    }

    #[test]
    fn out_of_range_direction_and_humidity_are_dropped() {
        let wx = decode("c999t050");
        assert_eq!(wx.wind_direction, None);
        assert_eq!(wx.temperature, Some(50));
    }

    #[test]
    fn round_trips_every_field() {
        let original = WeatherData {
            wind_direction: Some(270),
            wind_speed: Some(12),
            wind_gust: Some(25),
            temperature: Some(88),
            rain_1h: Some(0),
            rain_24h: Some(42),
            rain_midnight: Some(99),
            humidity: Some(63),
            pressure: Some(10213),
        };
        let formatted = format_fields(&original);
        assert_eq!(decode(&formatted), original);
    }
}
