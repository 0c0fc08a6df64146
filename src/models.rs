// Request/response types shared by the aggregator, the cache and the providers

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("city parameter is required")]
    MissingCity,

    #[error("checkin must be in YYYY-MM-DD format: {0}")]
    InvalidCheckIn(String),

    #[error("nights must be a positive integer")]
    InvalidNights,

    #[error("adults must be a positive integer")]
    InvalidAdults,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub city: String,
    pub checkin: NaiveDate,
    pub nights: u32,
    pub adults: u32,
}

impl Query {
    pub fn new(city: impl Into<String>, checkin: NaiveDate, nights: u32, adults: u32) -> Self {
        Self {
            city: city.into(),
            checkin,
            nights,
            adults,
        }
    }

    pub fn parse(city: &str, checkin: &str, nights: u32, adults: u32) -> Result<Self, QueryError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(QueryError::MissingCity);
        }

        let checkin = NaiveDate::parse_from_str(checkin, "%Y-%m-%d")
            .map_err(|_| QueryError::InvalidCheckIn(checkin.to_string()))?;

        if nights == 0 {
            return Err(QueryError::InvalidNights);
        }
        if adults == 0 {
            return Err(QueryError::InvalidAdults);
        }

        Ok(Self::new(city, checkin, nights, adults))
    }

    pub fn matches_city(&self, city: &str) -> bool {
        self.city.to_lowercase() == city.to_lowercase()
    }
}

// Raw record as reported by a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    pub hotel_id: String,
    pub name: String,
    pub city: String,
    pub currency: String,
    pub price: f64,
    pub nights: u32,
}

// Normalized hotel as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHotel {
    pub hotel_id: String,
    pub name: String,
    pub currency: String,
    pub price: f64,
}

impl From<BackendRecord> for RankedHotel {
    fn from(record: BackendRecord) -> Self {
        Self {
            hotel_id: record.hotel_id,
            name: record.name,
            currency: record.currency,
            price: record.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub city: String,
    pub checkin: NaiveDate,
    pub nights: u32,
    pub adults: u32,
}

impl From<&Query> for SearchInfo {
    fn from(query: &Query) -> Self {
        Self {
            city: query.city.clone(),
            checkin: query.checkin,
            nights: query.nights,
            adults: query.adults,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub providers_total: usize,
    pub providers_succeeded: usize,
    pub providers_failed: usize,
    pub cache: CacheStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub search: SearchInfo,
    pub stats: SearchStats,
    pub hotels: Vec<RankedHotel>,
}
