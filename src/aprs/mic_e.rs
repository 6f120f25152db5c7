//! Mic-E decoder.
//!
//! Mic-E splits a position report between the 6-character destination
//! address (latitude digits, N/S, longitude offset, E/W) and the first
//! 9 bytes of the information field (longitude, speed, course, symbol),
//! the latter carried with a +28 offset.

/// Decoded Mic-E payload. Range filtering of speed and course happens at
/// packet construction, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicEData {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: f64,
    pub course_degrees: i32,
    pub symbol_table: char,
    pub symbol_code: char,
}

/// Decode the destination address plus information field.
///
/// Any malformed byte yields `None`; the caller treats that as a parse
/// miss. Ambiguity digits (`K`/`L`/`Z` in the destination) contribute a
/// blank latitude digit, read as zero, so ambiguous positions decode at
/// reduced precision instead of missing.
pub fn decode(destination: &str, info: &str) -> Option<MicEData> {
    let dest = destination.split('-').next().unwrap_or(destination);
    let dest_chars: Vec<char> = dest.chars().collect();
    if dest_chars.len() != 6 {
        return None;
    }

    let mut digits = [0u32; 6];
    for (i, &c) in dest_chars.iter().enumerate() {
        digits[i] = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'A'..='J' => c as u32 - 'A' as u32,
            'P'..='Y' => c as u32 - 'P' as u32,
            // ambiguity digit: blank, read as zero
            'K' | 'L' | 'Z' => 0,
            _ => return None,
        };
    }

    let south = matches!(dest_chars[3], '0'..='9' | 'L');
    let lon_offset = if matches!(dest_chars[4], 'P'..='Z') {
        100
    } else {
        0
    };
    let west = matches!(dest_chars[5], 'P'..='Z');

    let lat_degrees = digits[0] * 10 + digits[1];
    let lat_minutes = digits[2] * 10 + digits[3];
    let lat_hundredths = digits[4] * 10 + digits[5];
    let mut latitude =
        f64::from(lat_degrees) + (f64::from(lat_minutes) + f64::from(lat_hundredths) / 100.0) / 60.0;
    if south {
        latitude = -latitude;
    }

    let info_chars: Vec<char> = info.chars().collect();
    if info_chars.len() < 9 {
        return None;
    }
    // byte 0 is the data-type indicator; bytes 1..=6 carry +28-offset values
    let offset_byte = |index: usize| -> Option<i32> {
        let value = info_chars[index] as i32 - 28;
        (value >= 0).then_some(value)
    };

    let mut lon_degrees = offset_byte(1)? + lon_offset;
    if (180..=189).contains(&lon_degrees) {
        lon_degrees -= 80;
    } else if (190..=199).contains(&lon_degrees) {
        lon_degrees -= 190;
    }
    let mut lon_minutes = offset_byte(2)?;
    if lon_minutes >= 60 {
        lon_minutes %= 60;
    }
    let lon_hundredths = offset_byte(3)?;
    let mut longitude = f64::from(lon_degrees)
        + (f64::from(lon_minutes) + f64::from(lon_hundredths) / 100.0) / 60.0;
    if west {
        longitude = -longitude;
    }

    let speed_tens = offset_byte(4)?;
    let shared = offset_byte(5)?;
    let course_low = offset_byte(6)?;
    let speed_knots = f64::from(speed_tens * 10 + shared / 10);
    let course_degrees = (shared % 10) * 100 + course_low;

    Some(MicEData {
        latitude,
        longitude,
        speed_knots,
        course_degrees,
        symbol_table: info_chars[8],
        symbol_code: info_chars[7],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_field(values: [u8; 6], symbol_code: char, symbol_table: char) -> String {
        let mut info = String::from("`");
        for v in values {
            info.push((28 + v) as char);
        }
        info.push(symbol_code);
        info.push(symbol_table);
        info
    }

    #[test]
    fn decodes_southern_eastern_position() {
        // destination 111111: digits 11 11 11, index 3 digit => South,
        // index 4 not P-Z => no offset, index 5 not P-Z => East
        let info = info_field([10, 20, 50, 0, 0, 0], '-', '/');
        let data = decode("111111", &info).unwrap();
        assert!((data.latitude - -(11.0 + 11.11 / 60.0)).abs() < 1e-9);
        assert!((data.longitude - (10.0 + 20.50 / 60.0)).abs() < 1e-9);
        assert_eq!(data.speed_knots, 0.0);
        assert_eq!(data.course_degrees, 0);
        assert_eq!(data.symbol_table, '/');
        assert_eq!(data.symbol_code, '-');
    }

    #[test]
    fn northern_western_with_longitude_offset() {
        // A-J digits with P-Z at indexes 4 and 5: offset +100 and West
        let info = info_field([10, 5, 0, 3, 45, 2], '>', '/');
        let data = decode("ABCDPP", &info).unwrap();
        assert!(data.latitude > 0.0);
        assert!(data.longitude < 0.0);
        // lon degrees 10 + 100 = 110
        assert_eq!(data.longitude.trunc(), -110.0);
        // speed 3*10 + 45/10 = 34; course (45 % 10)*100 + 2 = 502
        assert_eq!(data.speed_knots, 34.0);
        assert_eq!(data.course_degrees, 502);
    }

    #[test]
    fn degree_adjustment_bands() {
        // raw byte 28+188 would not be ASCII; use offset to land in band:
        // deg byte 85 + offset 100 = 185 -> 105 after the -80 adjustment
        let info = info_field([85, 0, 0, 0, 0, 0], '-', '/');
        let data = decode("000SPP", &info).unwrap();
        assert_eq!(data.longitude.trunc(), -105.0);
    }

    #[test]
    fn ambiguity_digits_decode_as_zero() {
        let info = info_field([10, 20, 50, 0, 0, 0], '-', '/');
        // K contributes a blank first digit
        let data = decode("K11111", &info).unwrap();
        assert!((data.latitude - -(1.0 + 11.11 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn ambiguous_direction_char_still_selects_south() {
        let info = info_field([10, 20, 50, 0, 0, 0], '-', '/');
        // L at index 3: blank digit and the southern hemisphere
        let data = decode("111L11", &info).unwrap();
        assert!(data.latitude < 0.0);
        assert!((data.latitude - -(11.0 + 10.11 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn ambiguous_offset_char_still_applies_the_band() {
        let info = info_field([10, 20, 50, 0, 0, 0], '-', '/');
        // Z at index 4: blank digit and the +100 degree longitude band
        let data = decode("1111Z1", &info).unwrap();
        assert_eq!(data.longitude.trunc(), 110.0);
    }

    #[test]
    fn short_fields_miss() {
        assert!(decode("11111", "`abcdefgh").is_none());
        assert!(decode("111111", "`abc").is_none());
    }

    #[test]
    fn bytes_below_offset_miss() {
        let mut info = String::from("`");
        info.push('\u{1b}');
        info.push_str("00000-/");
        assert!(decode("111111", &info).is_none());
    }
}
