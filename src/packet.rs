use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::callsign::Callsign;
use crate::position::GeoCoordinate;
use crate::weather::WeatherData;

pub const MAX_RAW_CONTENT_CHARS: usize = 1024;
pub const MAX_PATH_CHARS: usize = 100;

const SPEED_RANGE_KNOTS: std::ops::RangeInclusive<f64> = 0.0..=3500.0;
const COURSE_RANGE_DEGREES: std::ops::RangeInclusive<i32> = 0..=360;

/// The decoded kind of an APRS packet. Stored as the variant name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    PositionWithoutTimestamp,
    PositionWithTimestamp,
    Message,
    Telemetry,
    Status,
    Object,
    Item,
    Weather,
    MicE,
    Unknown,
}

impl PacketType {
    pub const ALL: [PacketType; 10] = [
        PacketType::PositionWithoutTimestamp,
        PacketType::PositionWithTimestamp,
        PacketType::Message,
        PacketType::Telemetry,
        PacketType::Status,
        PacketType::Object,
        PacketType::Item,
        PacketType::Weather,
        PacketType::MicE,
        PacketType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::PositionWithoutTimestamp => "PositionWithoutTimestamp",
            PacketType::PositionWithTimestamp => "PositionWithTimestamp",
            PacketType::Message => "Message",
            PacketType::Telemetry => "Telemetry",
            PacketType::Status => "Status",
            PacketType::Object => "Object",
            PacketType::Item => "Item",
            PacketType::Weather => "Weather",
            PacketType::MicE => "MicE",
            PacketType::Unknown => "Unknown",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(input))
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single decoded APRS packet. Created by the parser, then persisted and
/// broadcast without further mutation.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Store-assigned identity; `None` until persisted.
    pub id: Option<i64>,
    pub sender: Callsign,
    pub destination: Option<Callsign>,
    /// The full destination-plus-digipeater string from the frame header.
    pub path: String,
    pub packet_type: PacketType,
    pub position: Option<GeoCoordinate>,
    pub speed_knots: Option<f64>,
    pub course_degrees: Option<i32>,
    pub weather: Option<WeatherData>,
    /// Reconstructed from the packet timestamp plus the receipt-time hint.
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub raw_content: String,
    pub comment: Option<String>,
    pub symbol_table: Option<char>,
    pub symbol_code: Option<char>,
}

impl Packet {
    pub fn new(sender: Callsign, raw_content: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sender,
            destination: None,
            path: String::new(),
            packet_type: PacketType::Unknown,
            position: None,
            speed_knots: None,
            course_degrees: None,
            weather: None,
            sent_at: None,
            received_at,
            raw_content: truncate_chars(raw_content, MAX_RAW_CONTENT_CHARS),
            comment: None,
            symbol_table: None,
            symbol_code: None,
        }
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = truncate_chars(path, MAX_PATH_CHARS);
    }

    /// GPS-glitch filter: out-of-range speeds are silently dropped.
    pub fn set_speed(&mut self, speed_knots: f64) {
        self.speed_knots = Some(speed_knots).filter(|s| SPEED_RANGE_KNOTS.contains(s));
    }

    /// GPS-glitch filter: out-of-range courses are silently dropped.
    pub fn set_course(&mut self, course_degrees: i32) {
        self.course_degrees = Some(course_degrees).filter(|c| COURSE_RANGE_DEGREES.contains(c));
    }
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionDto {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_gust: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<i32>,
    #[serde(rename = "rain1h", skip_serializing_if = "Option::is_none")]
    pub rain_1h: Option<i32>,
    #[serde(rename = "rain24h", skip_serializing_if = "Option::is_none")]
    pub rain_24h: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_midnight: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<i32>,
}

impl From<&WeatherData> for WeatherDto {
    fn from(wx: &WeatherData) -> Self {
        Self {
            wind_direction: wx.wind_direction,
            wind_speed: wx.wind_speed,
            wind_gust: wx.wind_gust,
            temperature: wx.temperature,
            rain_1h: wx.rain_1h,
            rain_24h: wx.rain_24h,
            rain_midnight: wx.rain_midnight,
            humidity: wx.humidity,
            pressure: wx.pressure,
        }
    }
}

/// The public JSON shape of a packet, shared by the query API and the
/// websocket hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub path: String,
    #[serde(rename = "type")]
    pub packet_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub raw_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_code: Option<String>,
}

impl From<&Packet> for PacketDto {
    fn from(packet: &Packet) -> Self {
        Self {
            id: packet.id,
            sender: packet.sender.value().to_string(),
            destination: packet.destination.as_ref().map(|d| d.value().to_string()),
            path: packet.path.clone(),
            packet_type: packet.packet_type.as_str().to_string(),
            position: packet.position.map(|p| PositionDto {
                latitude: p.latitude,
                longitude: p.longitude,
            }),
            speed: packet.speed_knots,
            course: packet.course_degrees,
            weather: packet.weather.as_ref().map(WeatherDto::from),
            sent_time: packet.sent_at,
            received_at: packet.received_at,
            raw_content: packet.raw_content.clone(),
            comment: packet.comment.clone(),
            symbol_table: packet.symbol_table.map(|c| c.to_string()),
            symbol_code: packet.symbol_code.map(|c| c.to_string()),
        }
    }
}
