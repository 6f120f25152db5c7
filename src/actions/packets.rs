use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::error::AppError;
use crate::packet::{PacketDto, PacketType};
use crate::packets_repo::{PacketSearch, PacketsRepository};
use crate::web::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

static SENDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,6}(-[0-9]{1,2})?$").unwrap());

#[derive(Debug, Default, Deserialize)]
pub struct PacketsQueryParams {
    pub sender: Option<String>,
    #[serde(rename = "type")]
    pub packet_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketsResponse {
    pub items: Vec<PacketDto>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

fn validate_query(params: PacketsQueryParams) -> Result<PacketSearch, AppError> {
    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::validation("page", "must be at least 1"));
    }
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AppError::validation(
            "pageSize",
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(AppError::validation("from", "must not be after `to`"));
        }
    }

    let sender = match params.sender {
        None => None,
        Some(sender) => {
            let sender = sender.trim().to_uppercase();
            if sender.len() > 15 {
                return Err(AppError::validation(
                    "sender",
                    "must be at most 15 characters",
                ));
            }
            if !SENDER_RE.is_match(&sender) {
                return Err(AppError::validation(
                    "sender",
                    format!("malformed callsign: {sender:?}"),
                ));
            }
            Some(sender)
        }
    };

    let packet_type = match params.packet_type {
        None => None,
        Some(name) => Some(PacketType::parse(&name).ok_or_else(|| {
            AppError::validation("type", format!("unknown packet type: {name:?}"))
        })?),
    };

    Ok(PacketSearch {
        sender,
        packet_type,
        from: params.from,
        to: params.to,
        page,
        page_size,
    })
}

fn page_envelope(
    items: Vec<PacketDto>,
    page: i64,
    page_size: i64,
    total_count: i64,
) -> PacketsResponse {
    let total_pages = ((total_count as f64) / (page_size as f64)).ceil() as i64;
    PacketsResponse {
        items,
        page,
        page_size,
        total_count,
        total_pages,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

/// GET /api/v1/packets
pub async fn get_packets(
    State(state): State<AppState>,
    Query(params): Query<PacketsQueryParams>,
) -> ApiResult<Json<PacketsResponse>> {
    let search = validate_query(params)?;
    let (page, page_size) = (search.page, search.page_size);

    let repo = PacketsRepository::new(state.pool.clone());
    let (packets, total_count) = repo.search(search).await.map_err(ApiError::from)?;
    let items = packets.iter().map(PacketDto::from).collect();

    Ok(Json(page_envelope(items, page, page_size, total_count)))
}

/// GET /api/v1/packets/{id}
pub async fn get_packet(
    State(state): State<AppState>,
    Path(packet_id): Path<i64>,
) -> ApiResult<Json<PacketDto>> {
    let repo = PacketsRepository::new(state.pool.clone());
    match repo.get_by_id(packet_id).await.map_err(ApiError::from)? {
        Some(packet) => Ok(Json(PacketDto::from(&packet))),
        None => Err(ApiError(AppError::NotFound)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PacketsQueryParams {
        PacketsQueryParams::default()
    }

    #[test]
    fn defaults_are_page_one_of_one_hundred() {
        let search = validate_query(params()).unwrap();
        assert_eq!(search.page, 1);
        assert_eq!(search.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_and_size_bounds() {
        let mut bad_page = params();
        bad_page.page = Some(0);
        assert!(validate_query(bad_page).is_err());

        let mut bad_size = params();
        bad_size.page_size = Some(0);
        assert!(validate_query(bad_size).is_err());

        let mut oversized = params();
        oversized.page_size = Some(MAX_PAGE_SIZE + 1);
        assert!(validate_query(oversized).is_err());

        let mut max = params();
        max.page_size = Some(MAX_PAGE_SIZE);
        assert!(validate_query(max).is_ok());
    }

    #[test]
    fn from_must_not_be_after_to() {
        let mut p = params();
        p.from = Some(Utc::now());
        p.to = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(validate_query(p).is_err());
    }

    #[test]
    fn sender_is_normalised_and_checked() {
        let mut p = params();
        p.sender = Some("n0call-9".to_string());
        let search = validate_query(p).unwrap();
        assert_eq!(search.sender.as_deref(), Some("N0CALL-9"));

        let mut bad = params();
        bad.sender = Some("NOT A CALL".to_string());
        assert!(validate_query(bad).is_err());

        let mut long = params();
        long.sender = Some("A".repeat(16));
        assert!(validate_query(long).is_err());
    }

    #[test]
    fn type_must_be_a_known_variant() {
        let mut p = params();
        p.packet_type = Some("MicE".to_string());
        assert_eq!(
            validate_query(p).unwrap().packet_type,
            Some(PacketType::MicE)
        );

        let mut bad = params();
        bad.packet_type = Some("Bogus".to_string());
        assert!(validate_query(bad).is_err());
    }

    #[test]
    fn paging_laws() {
        for (total, page_size, expected_pages) in
            [(0, 10, 0), (1, 10, 1), (10, 10, 1), (11, 10, 2), (95, 10, 10)]
        {
            let envelope = page_envelope(Vec::new(), 1, page_size, total);
            assert_eq!(envelope.total_pages, expected_pages, "total={total}");
        }

        let envelope = page_envelope(Vec::new(), 2, 10, 35);
        assert_eq!(envelope.total_pages, 4);
        assert!(envelope.has_next);
        assert!(envelope.has_prev);

        let first = page_envelope(Vec::new(), 1, 10, 35);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = page_envelope(Vec::new(), 4, 10, 35);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }
}
