// Hand-maintained to match migrations/ (diesel print-schema layout).

diesel::table! {
    packets (id) {
        id -> Int8,
        #[max_length = 15]
        sender_callsign -> Varchar,
        #[max_length = 6]
        sender_base -> Varchar,
        sender_ssid -> Int2,
        #[max_length = 15]
        dest_callsign -> Nullable<Varchar>,
        #[max_length = 6]
        dest_base -> Nullable<Varchar>,
        dest_ssid -> Nullable<Int2>,
        #[max_length = 100]
        path -> Varchar,
        #[sql_name = "type"]
        #[max_length = 32]
        packet_type -> Varchar,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        speed -> Nullable<Float8>,
        course -> Nullable<Int4>,
        wx_wind_direction -> Nullable<Int4>,
        wx_wind_speed -> Nullable<Int4>,
        wx_wind_gust -> Nullable<Int4>,
        wx_temperature -> Nullable<Int4>,
        wx_rain_1h -> Nullable<Int4>,
        wx_rain_24h -> Nullable<Int4>,
        wx_rain_midnight -> Nullable<Int4>,
        wx_humidity -> Nullable<Int4>,
        wx_pressure -> Nullable<Int4>,
        sent_time -> Nullable<Timestamptz>,
        received_at -> Timestamptz,
        #[max_length = 1024]
        raw_content -> Varchar,
        comment -> Nullable<Text>,
        #[max_length = 1]
        symbol_table -> Nullable<Varchar>,
        #[max_length = 1]
        symbol_code -> Nullable<Varchar>,
    }
}
