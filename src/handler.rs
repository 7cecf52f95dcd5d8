use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::{Value, json};

use crate::config::Config;
use crate::flights::FlightClient;
use crate::llm::GeminiClient;
use crate::notify::{Notifier, verification_message};
use crate::store::SearchStore;
use crate::types::{ApiRequest, FlightQuote, SearchRequest, TrackedSearch, VerificationCode};

pub struct App {
    store: SearchStore,
    notifier: Notifier,
    flights: FlightClient,
    llm: Option<GeminiClient>,
}

impl App {
    pub async fn from_env() -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ssm = aws_sdk_ssm::Client::new(&aws_config);
        let config = Config::from_env(&ssm).await?;

        Ok(Self {
            store: SearchStore::new(aws_sdk_dynamodb::Client::new(&aws_config), config.table_name),
            notifier: Notifier::new(aws_sdk_sns::Client::new(&aws_config), config.topic_arn),
            flights: FlightClient::new(config.rapidapi_key),
            llm: config.gemini_api_key.map(GeminiClient::new),
        })
    }

    /// Dispatches a raw API-Gateway proxy event. CORS preflights and bodied
    /// requests come from the frontend; an event with no body is the hourly
    /// schedule firing.
    pub async fn handle(&self, event: &Value) -> Value {
        if event["httpMethod"] == "OPTIONS" {
            return api_response(200, json!({"message": "CORS OK"}));
        }

        if let Some(body) = event.get("body").and_then(Value::as_str) {
            return self.dispatch(body).await;
        }

        self.sweep().await
    }

    async fn dispatch(&self, body: &str) -> Value {
        let request: ApiRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed request: {e}");
                return api_response(400, json!({"message": format!("Invalid request: {e}")}));
            }
        };

        let result = match request {
            ApiRequest::SendOtp { contact } => self.send_otp(&contact).await,
            ApiRequest::VerifyOtp {
                contact,
                otp,
                search,
            } => self.verify_otp(&contact, &otp, search).await,
            ApiRequest::AnalyzeRequest { text } => self.analyze_request(&text).await,
            ApiRequest::ScrapeOne { url } => {
                debug!("Declining scrape request for {url}");
                Ok(api_response(
                    501,
                    json!({"message": "Scraping is not supported."}),
                ))
            }
        };

        result.unwrap_or_else(|e| {
            error!("Request failed: {e:#}");
            api_response(500, json!({"message": e.to_string()}))
        })
    }

    async fn send_otp(&self, contact: &str) -> Result<Value> {
        let code = VerificationCode::generate(contact, Utc::now().timestamp());
        self.store.put_verification_code(&code).await?;
        self.notifier
            .send_sms(contact, &verification_message(&code.code))
            .await?;

        info!("Verification code sent to {contact}");
        Ok(api_response(200, json!({"message": "OTP sent"})))
    }

    async fn verify_otp(&self, contact: &str, otp: &str, request: SearchRequest) -> Result<Value> {
        let now = Utc::now().timestamp();
        let stored = self.store.verification_code(contact).await?;

        let valid = stored
            .as_ref()
            .is_some_and(|code| code.code == otp && !code.is_expired(now));
        if !valid {
            info!("Rejected verification attempt for {contact}");
            return Ok(api_response(
                403,
                json!({"message": "Invalid or expired OTP."}),
            ));
        }

        let search = TrackedSearch::from_request(contact, request, now);
        self.store.put_search(&search).await?;

        info!(
            "Saved search for {contact}: {} -> {} on {}",
            search.origin, search.destination, search.departure_date
        );
        Ok(api_response(
            200,
            json!({"message": "Verified! Search active."}),
        ))
    }

    async fn analyze_request(&self, text: &str) -> Result<Value> {
        let Some(llm) = &self.llm else {
            return Ok(api_response(
                503,
                json!({"message": "Request analysis is not configured."}),
            ));
        };

        let fields = llm.extract_search(text).await?;
        Ok(api_response(200, fields))
    }

    /// The scheduled pass over every stored search. A failing search is logged
    /// and skipped so one bad route cannot starve the rest of the batch.
    pub async fn sweep(&self) -> Value {
        let searches = match self.store.active_searches(Utc::now().timestamp()).await {
            Ok(searches) => searches,
            Err(e) => {
                error!("Sweep could not load searches: {e:#}");
                return api_response(500, json!({"message": e.to_string()}));
            }
        };

        info!("Sweeping {} active searches", searches.len());
        let mut results = Vec::with_capacity(searches.len());
        for search in &searches {
            results.push((search.contact.as_str(), self.check_search(search).await));
        }

        let outcome = sweep_outcome(results);
        api_response(
            200,
            json!({
                "status": "Batch polling completed",
                "processed": outcome.processed,
                "failed": outcome.failed,
            }),
        )
    }

    async fn check_search(&self, search: &TrackedSearch) -> Result<()> {
        match self.flights.search_roundtrip(search).await {
            Ok(quote) => {
                let (send, message) = self.evaluate(search, &quote).await;
                if send {
                    self.notifier.publish_alert(&message).await?;
                    info!("Alert sent to {}", search.contact);
                } else {
                    debug!("Filtered by model: {} at {}", search.contact, quote.price);
                }
            }
            Err(e) => {
                // The admin still hears about broken searches, with the model's
                // one-line diagnosis when it is available.
                let message = match &self.llm {
                    Some(llm) => llm.explain_error(search, &format!("{e:#}")).await,
                    None => format!("SYSTEM ERROR: {e:#}"),
                };
                self.notifier.publish_alert(&message).await?;
            }
        }

        Ok(())
    }

    /// Whether to alert on a quote, and with what message. Searches without
    /// notes always alert; searches with notes go through the model, and a
    /// failed or malformed evaluation suppresses the alert.
    async fn evaluate(&self, search: &TrackedSearch, quote: &FlightQuote) -> (bool, String) {
        let llm = match &self.llm {
            Some(llm) if !search.notes.is_empty() => llm,
            _ => return (true, default_alert(search, quote)),
        };

        match llm.evaluate_deal(search, quote).await {
            Ok(verdict) => (verdict.matched, verdict.sms),
            Err(e) => {
                warn!("Deal evaluation failed for {}: {e:#}", search.contact);
                (false, String::new())
            }
        }
    }
}

#[derive(Debug, PartialEq)]
struct SweepOutcome {
    processed: usize,
    failed: usize,
}

/// Tallies per-search results. Every search counts as processed whether or not
/// it failed; failures are logged, never propagated.
fn sweep_outcome<'a, I>(results: I) -> SweepOutcome
where
    I: IntoIterator<Item = (&'a str, Result<()>)>,
{
    let mut outcome = SweepOutcome {
        processed: 0,
        failed: 0,
    };

    for (contact, result) in results {
        outcome.processed += 1;
        if let Err(e) = result {
            outcome.failed += 1;
            warn!("Search for {contact} failed: {e:#}");
        }
    }

    outcome
}

pub fn default_alert(search: &TrackedSearch, quote: &FlightQuote) -> String {
    format!(
        "Flight Alert for {}!\nRoute: {} -> {}\nPrice: {}",
        search.username, search.origin, search.destination, quote.price
    )
}

pub fn api_response(status_code: u16, body: Value) -> Value {
    json!({
        "statusCode": status_code,
        "headers": {
            "Content-Type": "application/json",
            "Access-Control-Allow-Origin": "*",
            "Access-Control-Allow-Methods": "POST,OPTIONS",
            "Access-Control-Allow-Headers": "Content-Type, Authorization",
        },
        "body": body.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_search(username: &str) -> TrackedSearch {
        TrackedSearch {
            contact: "+15551234567".to_owned(),
            username: username.to_owned(),
            origin: "IAD".to_owned(),
            destination: "BLR".to_owned(),
            departure_date: "2026-02-07".to_owned(),
            return_date: None,
            adults: 1,
            children: 0,
            infants: 0,
            cabin_class: "economy".to_owned(),
            stops: "direct".to_owned(),
            notes: String::new(),
            created_at: 1_700_000_000,
            expires_at: 1_700_604_800,
        }
    }

    #[test]
    fn test_api_response_shape() {
        let response = api_response(200, json!({"message": "OTP sent"}));
        assert_eq!(response["statusCode"], 200);
        assert_eq!(response["headers"]["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            response["headers"]["Access-Control-Allow-Methods"],
            "POST,OPTIONS"
        );
        assert_eq!(response["body"], r#"{"message":"OTP sent"}"#);
    }

    #[test]
    fn test_api_response_body_is_string() {
        let response = api_response(403, json!({"message": "Invalid or expired OTP."}));
        assert!(response["body"].is_string());
    }

    #[test]
    fn test_sweep_outcome_processes_every_search_despite_failures() {
        use anyhow::anyhow;

        let results = vec![
            ("+15550000001", Ok(())),
            ("+15550000002", Err(anyhow!("flight API 500: upstream down"))),
            ("+15550000003", Ok(())),
            ("+15550000004", Err(anyhow!("flight API 429: rate limited"))),
            ("+15550000005", Ok(())),
        ];

        assert_eq!(
            sweep_outcome(results),
            SweepOutcome {
                processed: 5,
                failed: 2,
            }
        );
    }

    #[test]
    fn test_sweep_outcome_empty_batch() {
        assert_eq!(
            sweep_outcome(Vec::<(&str, Result<()>)>::new()),
            SweepOutcome {
                processed: 0,
                failed: 0,
            }
        );
    }

    #[test]
    fn test_default_alert() {
        let quote = FlightQuote {
            price: "$612".to_owned(),
            airline: "Qatar Airways".to_owned(),
        };
        assert_eq!(
            default_alert(&make_search("TestUser"), &quote),
            "Flight Alert for TestUser!\nRoute: IAD -> BLR\nPrice: $612"
        );
    }

    #[test]
    fn test_default_alert_fits_one_sms_segment() {
        let quote = FlightQuote {
            price: "$1,234".to_owned(),
            airline: "Qatar Airways".to_owned(),
        };
        assert!(default_alert(&make_search("Guest"), &quote).len() <= 160);
    }
}
