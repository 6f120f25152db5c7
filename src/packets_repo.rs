use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::callsign::Callsign;
use crate::packet::{Packet, PacketType};
use crate::position::GeoCoordinate;
use crate::schema::packets;
use crate::weather::WeatherData;
use crate::web::PgPool;

#[derive(Insertable)]
#[diesel(table_name = packets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NewPacketRow {
    sender_callsign: String,
    sender_base: String,
    sender_ssid: i16,
    dest_callsign: Option<String>,
    dest_base: Option<String>,
    dest_ssid: Option<i16>,
    path: String,
    packet_type: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
    course: Option<i32>,
    wx_wind_direction: Option<i32>,
    wx_wind_speed: Option<i32>,
    wx_wind_gust: Option<i32>,
    wx_temperature: Option<i32>,
    wx_rain_1h: Option<i32>,
    wx_rain_24h: Option<i32>,
    wx_rain_midnight: Option<i32>,
    wx_humidity: Option<i32>,
    wx_pressure: Option<i32>,
    sent_time: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
    raw_content: String,
    comment: Option<String>,
    symbol_table: Option<String>,
    symbol_code: Option<String>,
}

impl From<&Packet> for NewPacketRow {
    fn from(packet: &Packet) -> Self {
        let weather = packet.weather.unwrap_or_default();
        Self {
            sender_callsign: packet.sender.value().to_string(),
            sender_base: packet.sender.base().to_string(),
            sender_ssid: i16::from(packet.sender.ssid()),
            dest_callsign: packet.destination.as_ref().map(|d| d.value().to_string()),
            dest_base: packet.destination.as_ref().map(|d| d.base().to_string()),
            dest_ssid: packet.destination.as_ref().map(|d| i16::from(d.ssid())),
            path: packet.path.clone(),
            packet_type: packet.packet_type.as_str().to_string(),
            latitude: packet.position.map(|p| p.latitude),
            longitude: packet.position.map(|p| p.longitude),
            speed: packet.speed_knots,
            course: packet.course_degrees,
            wx_wind_direction: weather.wind_direction,
            wx_wind_speed: weather.wind_speed,
            wx_wind_gust: weather.wind_gust,
            wx_temperature: weather.temperature,
            wx_rain_1h: weather.rain_1h,
            wx_rain_24h: weather.rain_24h,
            wx_rain_midnight: weather.rain_midnight,
            wx_humidity: weather.humidity,
            wx_pressure: weather.pressure,
            sent_time: packet.sent_at,
            received_at: packet.received_at,
            raw_content: packet.raw_content.clone(),
            comment: packet.comment.clone(),
            symbol_table: packet.symbol_table.map(|c| c.to_string()),
            symbol_code: packet.symbol_code.map(|c| c.to_string()),
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = packets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PacketRow {
    id: i64,
    sender_callsign: String,
    #[allow(dead_code)]
    sender_base: String,
    #[allow(dead_code)]
    sender_ssid: i16,
    dest_callsign: Option<String>,
    #[allow(dead_code)]
    dest_base: Option<String>,
    #[allow(dead_code)]
    dest_ssid: Option<i16>,
    path: String,
    packet_type: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
    course: Option<i32>,
    wx_wind_direction: Option<i32>,
    wx_wind_speed: Option<i32>,
    wx_wind_gust: Option<i32>,
    wx_temperature: Option<i32>,
    wx_rain_1h: Option<i32>,
    wx_rain_24h: Option<i32>,
    wx_rain_midnight: Option<i32>,
    wx_humidity: Option<i32>,
    wx_pressure: Option<i32>,
    sent_time: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
    raw_content: String,
    comment: Option<String>,
    symbol_table: Option<String>,
    symbol_code: Option<String>,
}

impl PacketRow {
    fn into_domain(self) -> Result<Packet> {
        let weather = WeatherData {
            wind_direction: self.wx_wind_direction,
            wind_speed: self.wx_wind_speed,
            wind_gust: self.wx_wind_gust,
            temperature: self.wx_temperature,
            rain_1h: self.wx_rain_1h,
            rain_24h: self.wx_rain_24h,
            rain_midnight: self.wx_rain_midnight,
            humidity: self.wx_humidity,
            pressure: self.wx_pressure,
        };
        let position = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoCoordinate::new(latitude, longitude)?),
            _ => None,
        };
        let mut packet = Packet::new(
            Callsign::parse(&self.sender_callsign)?,
            &self.raw_content,
            self.received_at,
        );
        packet.id = Some(self.id);
        packet.destination = self
            .dest_callsign
            .as_deref()
            .and_then(|d| Callsign::parse(d).ok());
        packet.path = self.path;
        packet.packet_type = PacketType::parse(&self.packet_type).unwrap_or(PacketType::Unknown);
        packet.position = position;
        packet.speed_knots = self.speed;
        packet.course_degrees = self.course;
        packet.weather = (!weather.is_empty()).then_some(weather);
        packet.sent_at = self.sent_time;
        packet.comment = self.comment;
        packet.symbol_table = self.symbol_table.and_then(|s| s.chars().next());
        packet.symbol_code = self.symbol_code.and_then(|s| s.chars().next());
        Ok(packet)
    }
}

/// Filter and page parameters for [`PacketsRepository::search`].
#[derive(Debug, Clone)]
pub struct PacketSearch {
    /// Matches either the full callsign or the base.
    pub sender: Option<String>,
    pub packet_type: Option<PacketType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-indexed.
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct PacketsRepository {
    pool: PgPool,
}

impl PacketsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a packet and return its store-assigned id.
    pub async fn insert(&self, packet: &Packet) -> Result<i64> {
        let row = NewPacketRow::from(packet);
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let id = diesel::insert_into(packets::table)
                .values(&row)
                .returning(packets::id)
                .get_result::<i64>(&mut conn)?;
            Ok::<i64, anyhow::Error>(id)
        })
        .await?
    }

    pub async fn get_by_id(&self, packet_id: i64) -> Result<Option<Packet>> {
        let pool = self.pool.clone();

        let row = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = packets::table
                .find(packet_id)
                .select(PacketRow::as_select())
                .first::<PacketRow>(&mut conn)
                .optional()?;
            Ok::<Option<PacketRow>, anyhow::Error>(row)
        })
        .await??;

        row.map(PacketRow::into_domain).transpose()
    }

    /// Filtered, paginated read: received-at descending, id-descending
    /// tiebreak. Returns the page rows and the total filtered count.
    pub async fn search(&self, search: PacketSearch) -> Result<(Vec<Packet>, i64)> {
        let pool = self.pool.clone();

        let (rows, total_count) = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let mut count_query = packets::table.into_boxed();
            let mut page_query = packets::table.into_boxed();

            if let Some(sender) = &search.sender {
                count_query = count_query.filter(
                    packets::sender_callsign
                        .eq(sender.clone())
                        .or(packets::sender_base.eq(sender.clone())),
                );
                page_query = page_query.filter(
                    packets::sender_callsign
                        .eq(sender.clone())
                        .or(packets::sender_base.eq(sender.clone())),
                );
            }
            if let Some(packet_type) = search.packet_type {
                count_query = count_query.filter(packets::packet_type.eq(packet_type.as_str()));
                page_query = page_query.filter(packets::packet_type.eq(packet_type.as_str()));
            }
            if let Some(from) = search.from {
                count_query = count_query.filter(packets::received_at.ge(from));
                page_query = page_query.filter(packets::received_at.ge(from));
            }
            if let Some(to) = search.to {
                count_query = count_query.filter(packets::received_at.le(to));
                page_query = page_query.filter(packets::received_at.le(to));
            }

            let total_count: i64 = count_query.count().get_result(&mut conn)?;
            let rows = page_query
                .order((packets::received_at.desc(), packets::id.desc()))
                .offset((search.page - 1) * search.page_size)
                .limit(search.page_size)
                .select(PacketRow::as_select())
                .load::<PacketRow>(&mut conn)?;

            Ok::<(Vec<PacketRow>, i64), anyhow::Error>((rows, total_count))
        })
        .await??;

        let packets = rows
            .into_iter()
            .map(PacketRow::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((packets, total_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn row_round_trips_through_the_flattened_layout() {
        let mut packet = Packet::new(
            Callsign::parse("N0CALL-9").unwrap(),
            "N0CALL-9>APRS,WIDE1-1:!4903.50N/07201.75W-hi",
            Utc.with_ymd_and_hms(2026, 8, 2, 10, 30, 0).unwrap(),
        );
        packet.destination = Callsign::parse("APRS").ok();
        packet.set_path("APRS,WIDE1-1");
        packet.packet_type = PacketType::PositionWithoutTimestamp;
        packet.position = GeoCoordinate::new(49.058333, -72.029167).ok();
        packet.set_speed(36.0);
        packet.set_course(90);
        packet.symbol_table = Some('/');
        packet.symbol_code = Some('-');
        packet.comment = Some("hi".to_string());

        let row = NewPacketRow::from(&packet);
        assert_eq!(row.sender_callsign, "N0CALL-9");
        assert_eq!(row.sender_base, "N0CALL");
        assert_eq!(row.sender_ssid, 9);
        assert_eq!(row.dest_callsign.as_deref(), Some("APRS"));
        assert_eq!(row.packet_type, "PositionWithoutTimestamp");
        assert_eq!(row.latitude, Some(49.058333));
        assert_eq!(row.speed, Some(36.0));
        assert_eq!(row.symbol_table.as_deref(), Some("/"));

        let fetched = PacketRow {
            id: 7,
            sender_callsign: row.sender_callsign,
            sender_base: row.sender_base,
            sender_ssid: row.sender_ssid,
            dest_callsign: row.dest_callsign,
            dest_base: row.dest_base,
            dest_ssid: row.dest_ssid,
            path: row.path,
            packet_type: row.packet_type,
            latitude: row.latitude,
            longitude: row.longitude,
            speed: row.speed,
            course: row.course,
            wx_wind_direction: row.wx_wind_direction,
            wx_wind_speed: row.wx_wind_speed,
            wx_wind_gust: row.wx_wind_gust,
            wx_temperature: row.wx_temperature,
            wx_rain_1h: row.wx_rain_1h,
            wx_rain_24h: row.wx_rain_24h,
            wx_rain_midnight: row.wx_rain_midnight,
            wx_humidity: row.wx_humidity,
            wx_pressure: row.wx_pressure,
            sent_time: row.sent_time,
            received_at: row.received_at,
            raw_content: row.raw_content,
            comment: row.comment,
            symbol_table: row.symbol_table,
            symbol_code: row.symbol_code,
        };
        let restored = fetched.into_domain().unwrap();
        assert_eq!(restored.id, Some(7));
        assert_eq!(restored.sender, packet.sender);
        assert_eq!(restored.packet_type, packet.packet_type);
        assert_eq!(restored.position, packet.position);
        assert_eq!(restored.weather, None);
        assert_eq!(restored.received_at, packet.received_at);
    }
}
