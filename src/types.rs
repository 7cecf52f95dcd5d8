use rand::Rng;
use serde::{Deserialize, Serialize};

/// Verification codes live for five minutes; saved searches for a week.
pub const OTP_TTL_SECS: i64 = 300;
pub const SEARCH_TTL_SECS: i64 = 7 * 86_400;

/// A request body posted to the API endpoint, dispatched on its `action` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum ApiRequest {
    #[serde(rename = "SEND_OTP")]
    SendOtp { contact: String },
    #[serde(rename = "VERIFY_OTP")]
    VerifyOtp {
        contact: String,
        otp: String,
        #[serde(flatten)]
        search: SearchRequest,
    },
    #[serde(rename = "ANALYZE_REQUEST")]
    AnalyzeRequest { text: String },
    #[serde(rename = "SCRAPE_ONE")]
    ScrapeOne { url: String },
}

/// Search fields as the frontend sends them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default = "default_username")]
    pub username: String,
    pub origin_sky_id: String,
    pub destination_sky_id: String,
    pub departure_date: String,
    #[serde(default)]
    pub return_date: Option<String>,
    #[serde(default = "default_adults")]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub infants: u32,
    #[serde(default = "default_cabin_class")]
    pub cabin_class: String,
    #[serde(default = "default_stops")]
    pub stops: String,
    #[serde(default)]
    pub notes: String,
}

fn default_username() -> String {
    "Guest".to_owned()
}

fn default_adults() -> u32 {
    1
}

fn default_cabin_class() -> String {
    "economy".to_owned()
}

fn default_stops() -> String {
    "direct,1stop,2stops".to_owned()
}

/// A saved search, keyed by contact address in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSearch {
    pub contact: String,
    pub username: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub return_date: Option<String>,
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub cabin_class: String,
    pub stops: String,
    pub notes: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl TrackedSearch {
    pub fn from_request(contact: &str, request: SearchRequest, now: i64) -> Self {
        Self {
            contact: contact.to_owned(),
            username: request.username,
            origin: request.origin_sky_id,
            destination: request.destination_sky_id,
            departure_date: request.departure_date,
            return_date: request.return_date,
            adults: request.adults,
            children: request.children,
            infants: request.infants,
            cabin_class: request.cabin_class,
            stops: request.stops,
            notes: request.notes,
            created_at: now,
            expires_at: now + SEARCH_TTL_SECS,
        }
    }

    /// The store's TTL deletion is lazy, so readers check the clock themselves.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// A pending one-time verification code, also keyed by contact address.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationCode {
    pub contact: String,
    pub code: String,
    pub expires_at: i64,
}

impl VerificationCode {
    pub fn generate(contact: &str, now: i64) -> Self {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        Self {
            contact: contact.to_owned(),
            code,
            expires_at: now + OTP_TTL_SECS,
        }
    }

    /// The store's TTL deletion is lazy, so readers check the clock themselves.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Deserialize)]
pub struct FlightSearchResponse {
    #[serde(default)]
    pub data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub itineraries: Vec<Itinerary>,
}

#[derive(Debug, Deserialize)]
pub struct Itinerary {
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Price {
    pub raw: Option<f64>,
    pub formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Leg {
    #[serde(default)]
    pub carriers: Carriers,
}

#[derive(Debug, Default, Deserialize)]
pub struct Carriers {
    #[serde(default)]
    pub marketing: Vec<Carrier>,
}

#[derive(Debug, Deserialize)]
pub struct Carrier {
    pub name: Option<String>,
}

/// The one itinerary we alert on, flattened out of the API response.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightQuote {
    pub price: String,
    pub airline: String,
}

impl FlightQuote {
    /// The API orders itineraries best-first; take the first one.
    pub fn best(response: &FlightSearchResponse) -> Option<Self> {
        let itinerary = response.data.itineraries.first()?;

        let price = match (&itinerary.price.formatted, itinerary.price.raw) {
            (Some(formatted), _) => formatted.clone(),
            (None, Some(raw)) => format!("${raw}"),
            (None, None) => "unknown".to_owned(),
        };

        let airline = itinerary
            .legs
            .first()
            .and_then(|leg| leg.carriers.marketing.first())
            .and_then(|carrier| carrier.name.clone())
            .unwrap_or_else(|| "Unknown".to_owned());

        Some(Self { price, airline })
    }
}
