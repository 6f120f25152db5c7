use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A WGS-84 coordinate, range-checked on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::validation(
                "latitude",
                format!("out of range [-90, 90]: {latitude}"),
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::validation(
                "longitude",
                format!("out of range [-180, 180]: {longitude}"),
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

static LOCATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-R]{2}[0-9]{2}(?:[A-X]{2}(?:[0-9]{2})?)?$").unwrap());

// Cell sizes in degrees, per nesting level (longitude, latitude)
const FIELD: (f64, f64) = (20.0, 10.0);
const SQUARE: (f64, f64) = (2.0, 1.0);
const SUBSQUARE: (f64, f64) = (2.0 / 24.0, 1.0 / 24.0);
const EXTENDED: (f64, f64) = (2.0 / 240.0, 1.0 / 240.0);

/// A Maidenhead grid locator of 4, 6, or 8 characters, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaidenheadLocator {
    value: String,
}

impl MaidenheadLocator {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let value = input.trim().to_uppercase();
        if !LOCATOR_RE.is_match(&value) {
            return Err(AppError::validation(
                "locator",
                format!("malformed grid locator: {input:?}"),
            ));
        }
        Ok(Self { value })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Coordinate of the center of the grid cell.
    pub fn to_center_position(&self) -> GeoCoordinate {
        let b = self.value.as_bytes();
        let mut longitude = -180.0 + f64::from(b[0] - b'A') * FIELD.0;
        let mut latitude = -90.0 + f64::from(b[1] - b'A') * FIELD.1;
        longitude += f64::from(b[2] - b'0') * SQUARE.0;
        latitude += f64::from(b[3] - b'0') * SQUARE.1;
        let mut cell = SQUARE;

        if b.len() >= 6 {
            longitude += f64::from(b[4] - b'A') * SUBSQUARE.0;
            latitude += f64::from(b[5] - b'A') * SUBSQUARE.1;
            cell = SUBSQUARE;
        }
        if b.len() == 8 {
            longitude += f64::from(b[6] - b'0') * EXTENDED.0;
            latitude += f64::from(b[7] - b'0') * EXTENDED.1;
            cell = EXTENDED;
        }

        GeoCoordinate {
            latitude: latitude + cell.1 / 2.0,
            longitude: longitude + cell.0 / 2.0,
        }
    }

    /// Encode a coordinate as a locator of the given precision (4, 6, or 8).
    pub fn from_coordinates(position: GeoCoordinate, precision: usize) -> Result<Self, AppError> {
        if !matches!(precision, 4 | 6 | 8) {
            return Err(AppError::validation(
                "precision",
                format!("must be 4, 6, or 8: {precision}"),
            ));
        }
        let mut lon = position.longitude + 180.0;
        let mut lat = position.latitude + 90.0;
        let mut value = String::with_capacity(precision);

        // Index into each nesting level, clamping the upper edge into the last cell
        let lon_field = ((lon / FIELD.0).floor() as u8).min(17);
        let lat_field = ((lat / FIELD.1).floor() as u8).min(17);
        value.push((b'A' + lon_field) as char);
        value.push((b'A' + lat_field) as char);
        lon -= f64::from(lon_field) * FIELD.0;
        lat -= f64::from(lat_field) * FIELD.1;

        let lon_square = ((lon / SQUARE.0).floor() as u8).min(9);
        let lat_square = ((lat / SQUARE.1).floor() as u8).min(9);
        value.push((b'0' + lon_square) as char);
        value.push((b'0' + lat_square) as char);
        lon -= f64::from(lon_square) * SQUARE.0;
        lat -= f64::from(lat_square) * SQUARE.1;

        if precision >= 6 {
            let lon_sub = ((lon / SUBSQUARE.0).floor() as u8).min(23);
            let lat_sub = ((lat / SUBSQUARE.1).floor() as u8).min(23);
            value.push((b'A' + lon_sub) as char);
            value.push((b'A' + lat_sub) as char);
            lon -= f64::from(lon_sub) * SUBSQUARE.0;
            lat -= f64::from(lat_sub) * SUBSQUARE.1;
        }
        if precision == 8 {
            let lon_ext = ((lon / EXTENDED.0).floor() as u8).min(9);
            let lat_ext = ((lat / EXTENDED.1).floor() as u8).min(9);
            value.push((b'0' + lon_ext) as char);
            value.push((b'0' + lat_ext) as char);
        }

        Ok(Self { value })
    }
}

impl std::fmt::Display for MaidenheadLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_range_is_enforced() {
        assert!(GeoCoordinate::new(52.2, 21.0).is_ok());
        assert!(GeoCoordinate::new(90.0, 180.0).is_ok());
        assert!(GeoCoordinate::new(-90.0, -180.0).is_ok());
        assert!(GeoCoordinate::new(90.1, 0.0).is_err());
        assert!(GeoCoordinate::new(0.0, -180.5).is_err());
        assert!(GeoCoordinate::new(-91.0, 181.0).is_err());
    }

    #[test]
    fn locator_validation() {
        assert!(MaidenheadLocator::parse("KO02").is_ok());
        assert!(MaidenheadLocator::parse("ko02md").is_ok());
        assert!(MaidenheadLocator::parse("KO02MD12").is_ok());
        assert!(MaidenheadLocator::parse("KO0").is_err());
        assert!(MaidenheadLocator::parse("SS02").is_err());
        assert!(MaidenheadLocator::parse("KO02YD").is_err());
        assert!(MaidenheadLocator::parse("KO02MD123").is_err());
    }

    #[test]
    fn locator_is_stored_uppercase() {
        let locator = MaidenheadLocator::parse("jo62qm").unwrap();
        assert_eq!(locator.as_str(), "JO62QM");
    }

    #[test]
    fn four_char_center() {
        // KO02: fields K (10) and O (14), squares 0 and 2
        let center = MaidenheadLocator::parse("KO02")
            .unwrap()
            .to_center_position();
        assert!((center.longitude - 21.0).abs() < 1e-9);
        assert!((center.latitude - 52.5).abs() < 1e-9);
    }

    #[test]
    fn six_char_center_is_inside_four_char_cell() {
        let coarse = MaidenheadLocator::parse("JO62")
            .unwrap()
            .to_center_position();
        let fine = MaidenheadLocator::parse("JO62QM")
            .unwrap()
            .to_center_position();
        assert!((fine.longitude - coarse.longitude).abs() <= 1.0);
        assert!((fine.latitude - coarse.latitude).abs() <= 0.5);
    }

    #[test]
    fn round_trips_at_all_precisions() {
        for grid in ["KO02", "JO62QM", "FN31PR21", "AA00AA00", "RR99XX99"] {
            let locator = MaidenheadLocator::parse(grid).unwrap();
            let center = locator.to_center_position();
            let back = MaidenheadLocator::from_coordinates(center, grid.len()).unwrap();
            assert_eq!(back, locator, "round trip failed for {grid}");
        }
    }
}
