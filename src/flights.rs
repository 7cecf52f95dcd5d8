use anyhow::{Result, anyhow};
use log::debug;
use reqwest::Client;

use crate::config::SecretString;
use crate::types::{FlightQuote, FlightSearchResponse, TrackedSearch};

const API_URL: &str = "https://fly-scraper.p.rapidapi.com/v2/flights/search-roundtrip";
const API_HOST: &str = "fly-scraper.p.rapidapi.com";

pub struct FlightClient {
    client: Client,
    api_key: SecretString,
}

impl FlightClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    /// Queries the roundtrip search endpoint and flattens the best itinerary.
    /// A successful response with no itineraries is an error so the sweep can
    /// report it like any other API failure.
    pub async fn search_roundtrip(&self, search: &TrackedSearch) -> Result<FlightQuote> {
        let mut query: Vec<(&str, String)> = vec![
            ("originSkyId", search.origin.clone()),
            ("destinationSkyId", search.destination.clone()),
            ("departureDate", search.departure_date.clone()),
            ("adults", search.adults.to_string()),
            ("children", search.children.to_string()),
            ("infants", search.infants.to_string()),
            ("cabinClass", search.cabin_class.clone()),
            ("currency", "USD".to_owned()),
            ("locale", "en-US".to_owned()),
            ("market", "US".to_owned()),
        ];
        if let Some(return_date) = &search.return_date {
            query.push(("returnDate", return_date.clone()));
        }

        debug!(
            "Querying flights {} -> {} on {}",
            search.origin, search.destination, search.departure_date
        );

        let response = self
            .client
            .get(API_URL)
            .header("X-RapidAPI-Key", self.api_key.expose())
            .header("X-RapidAPI-Host", API_HOST)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("flight API {status}: {body}"));
        }

        let parsed: FlightSearchResponse = response.json().await?;
        FlightQuote::best(&parsed).ok_or_else(|| anyhow!("flight API returned 0 itineraries"))
    }
}
