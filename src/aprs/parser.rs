//! TNC2 line parser.
//!
//! Turns one raw APRS-IS line into a [`Packet`]. Pure and deterministic
//! for a pinned `now` hint. Only frame-level problems fail the line;
//! malformed fields degrade the packet type to `Unknown` while keeping
//! the raw content.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::callsign::Callsign;
use crate::error::AppError;
use crate::packet::{Packet, PacketType};
use crate::position::{GeoCoordinate, MaidenheadLocator};

use super::{mic_e, timestamp, wx};

static FRAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^([^>]+)>([^:]+):(.*)$").unwrap());
static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^([0-9 .NS]{8})(.)([0-9 .EW]{9})(.)(.*)$").unwrap());
static COURSE_SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]{3})/([0-9]{3})").unwrap());
static GRID_BEACON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\[([A-Ra-r]{2}[0-9]{2}(?:[A-Xa-x]{2}(?:[0-9]{2})?)?)\](.*)$").unwrap()
});

/// Parse one TNC2 line into a packet.
///
/// `now` is the receipt-time hint used to resolve packet timestamps and
/// becomes the packet's `received_at`.
pub fn parse_packet(line: &str, now: DateTime<Utc>) -> Result<Packet, AppError> {
    let caps = FRAME_RE
        .captures(line)
        .ok_or_else(|| AppError::Format(format!("not a TNC2 frame: {line:?}")))?;

    let sender = Callsign::parse(&caps[1])
        .map_err(|_| AppError::Format(format!("invalid sender callsign: {:?}", &caps[1])))?;
    let dest_and_path = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let payload = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    // Destination is the prefix of the path up to the first comma
    let dest_str = dest_and_path.split(',').next().unwrap_or(dest_and_path);

    let mut packet = Packet::new(sender, line, now);
    packet.set_path(dest_and_path);
    packet.destination = Callsign::parse(dest_str).ok();

    let mut chars = payload.chars();
    let Some(type_byte) = chars.next() else {
        return Ok(packet);
    };
    let rest = &payload[type_byte.len_utf8()..];

    match type_byte {
        '!' | '=' => decode_position(&mut packet, rest, PacketType::PositionWithoutTimestamp),
        '/' | '@' => match timestamp::take_timestamp(rest, now) {
            Some((sent_at, consumed)) => {
                packet.sent_at = Some(sent_at);
                decode_position(&mut packet, &rest[consumed..], PacketType::PositionWithTimestamp);
            }
            None => downgrade(&mut packet, rest),
        },
        ':' => {
            packet.packet_type = PacketType::Message;
            packet.comment = non_empty(rest);
        }
        '>' => {
            packet.packet_type = PacketType::Status;
            packet.comment = non_empty(rest);
        }
        '[' => decode_grid_beacon(&mut packet, payload),
        '_' => decode_positionless_weather(&mut packet, rest, now),
        '`' | '\'' | '\u{1c}' | '\u{1d}' => decode_mic_e(&mut packet, dest_str, payload),
        _ => {
            packet.comment = non_empty(payload);
        }
    }

    Ok(packet)
}

fn downgrade(packet: &mut Packet, remainder: &str) {
    packet.packet_type = PacketType::Unknown;
    packet.comment = non_empty(remainder);
}

/// §uncompressed position: `DDMM.hhN` `sym` `DDDMM.hhW` `sym` comment,
/// with an optional `CSE/SPD` extension and a weather overlay.
fn decode_position(packet: &mut Packet, input: &str, kind: PacketType) {
    let Some(caps) = POSITION_RE.captures(input) else {
        downgrade(packet, input);
        return;
    };

    let latitude = parse_latitude(&caps[1]);
    let longitude = parse_longitude(&caps[3]);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        downgrade(packet, input);
        return;
    };
    let Ok(position) = GeoCoordinate::new(round6(latitude), round6(longitude)) else {
        downgrade(packet, input);
        return;
    };

    packet.packet_type = kind;
    packet.position = Some(position);
    packet.symbol_table = caps[2].chars().next();
    packet.symbol_code = caps[4].chars().next();

    let comment = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
    if let Some(extension) = COURSE_SPEED_RE.captures(comment) {
        if let Ok(course) = extension[1].parse::<i32>() {
            packet.set_course(course);
        }
        if let Ok(speed) = extension[2].parse::<f64>() {
            packet.set_speed(speed);
        }
    }
    packet.comment = non_empty(comment);

    // Weather overlay: `_` weather-station symbol, or wind/temperature
    // prefixes in the comment. TODO: tighten to a wind-extension match
    // directly after the symbol code once verified against live traffic.
    if packet.symbol_code == Some('_') || comment.contains("g0") || comment.contains("t0") {
        let weather = wx::decode(comment);
        if weather.has_wind_or_temperature() {
            packet.packet_type = PacketType::Weather;
            packet.weather = Some(weather);
        }
    }
}

/// `DDMM.hhN`, 8 chars; degrees negated for the southern hemisphere.
fn parse_latitude(raw: &str) -> Option<f64> {
    let degrees: f64 = raw[0..2].parse().ok()?;
    let minutes: f64 = raw[2..7].parse().ok()?;
    let value = degrees + minutes / 60.0;
    match raw.chars().nth(7)? {
        'N' => Some(value),
        'S' => Some(-value),
        _ => None,
    }
}

/// `DDDMM.hhW`, 9 chars; degrees negated for the western hemisphere.
fn parse_longitude(raw: &str) -> Option<f64> {
    let degrees: f64 = raw[0..3].parse().ok()?;
    let minutes: f64 = raw[3..8].parse().ok()?;
    let value = degrees + minutes / 60.0;
    match raw.chars().nth(8)? {
        'E' => Some(value),
        'W' => Some(-value),
        _ => None,
    }
}

/// `[GRID]comment` beacon: position at the grid-cell center.
fn decode_grid_beacon(packet: &mut Packet, payload: &str) {
    let parsed = GRID_BEACON_RE
        .captures(payload)
        .and_then(|caps| {
            let locator = MaidenheadLocator::parse(&caps[1]).ok()?;
            let comment = caps.get(2).map(|m| m.as_str().to_string());
            Some((locator, comment))
        });
    match parsed {
        Some((locator, comment)) => {
            packet.packet_type = PacketType::PositionWithoutTimestamp;
            packet.position = Some(locator.to_center_position());
            packet.comment = comment.filter(|c| !c.is_empty());
        }
        None => downgrade(packet, payload),
    }
}

/// `_MMDDHHMM` then weather fields.
fn decode_positionless_weather(packet: &mut Packet, rest: &str, now: DateTime<Utc>) {
    match timestamp::take_timestamp(rest, now) {
        Some((sent_at, 8)) => {
            packet.sent_at = Some(sent_at);
            packet.packet_type = PacketType::Weather;
            let weather = wx::decode(&rest[8..]);
            if !weather.is_empty() {
                packet.weather = Some(weather);
            }
        }
        _ => downgrade(packet, rest),
    }
}

/// Mic-E: latitude from the destination address, the rest from the
/// information field. Any decode miss degrades to `Unknown`.
fn decode_mic_e(packet: &mut Packet, destination: &str, payload: &str) {
    let decoded = mic_e::decode(destination, payload).and_then(|data| {
        let position = GeoCoordinate::new(round6(data.latitude), round6(data.longitude)).ok()?;
        Some((data, position))
    });
    match decoded {
        Some((data, position)) => {
            packet.packet_type = PacketType::MicE;
            packet.position = Some(position);
            packet.set_speed(data.speed_knots);
            packet.set_course(data.course_degrees);
            packet.symbol_table = Some(data.symbol_table);
            packet.symbol_code = Some(data.symbol_code);
            let comment: String = payload.chars().skip(9).collect();
            packet.comment = non_empty(&comment);
        }
        None => {
            let remainder: String = payload.chars().skip(1).collect();
            downgrade(packet, &remainder);
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn non_empty(input: &str) -> Option<String> {
    if input.is_empty() {
        None
    } else {
        Some(input.to_string())
    }
}
