use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;

/// `BASE` or `BASE-SSID`: 2-6 alphanumeric base, SSID 0-15
static CALLSIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9]{2,6})(?:-([0-9]{1,2}))?$").unwrap());

/// An amateur-radio callsign with optional SSID, normalised to uppercase.
///
/// Two callsigns are equal iff their full values match; the base and SSID
/// are derived fields kept for group routing and storage.
#[derive(Debug, Clone)]
pub struct Callsign {
    value: String,
    base: String,
    ssid: u8,
}

impl Callsign {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let value = input.trim().to_uppercase();
        if value.len() < 3 || value.len() > 15 {
            return Err(AppError::validation(
                "callsign",
                format!("must be 3-15 characters: {input:?}"),
            ));
        }
        let caps = CALLSIGN_RE.captures(&value).ok_or_else(|| {
            AppError::validation("callsign", format!("malformed callsign: {input:?}"))
        })?;
        let base = caps[1].to_string();
        let ssid = match caps.get(2) {
            Some(m) => {
                // 1-2 digits, always parses
                let ssid: u8 = m.as_str().parse().unwrap_or(u8::MAX);
                if ssid > 15 {
                    return Err(AppError::validation(
                        "callsign",
                        format!("SSID must be 0-15: {input:?}"),
                    ));
                }
                ssid
            }
            None => 0,
        };
        Ok(Self { value, base, ssid })
    }

    /// The full normalised value, e.g. `N0CALL-9`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The base without SSID, e.g. `N0CALL`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn ssid(&self) -> u8 {
        self.ssid
    }
}

impl FromStr for Callsign {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Callsign::parse(s)
    }
}

impl Display for Callsign {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for Callsign {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Callsign {}

impl Hash for Callsign {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl serde::Serialize for Callsign {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}
