use anyhow::{Result, anyhow};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::SecretString;
use crate::types::{FlightQuote, TrackedSearch};

const API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Alerts go out over SMS, so the model's draft must fit one segment.
pub const MAX_SMS_CHARS: usize = 160;

/// The model's answer to "is this deal worth alerting on".
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub matched: bool,
    pub sms: String,
}

impl Verdict {
    fn no_match() -> Self {
        Self {
            matched: false,
            sms: String::new(),
        }
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    /// Asks the model whether the quote satisfies the user's notes and for a
    /// draft alert. Anything that violates the reply contract counts as a
    /// non-match rather than a spurious alert.
    pub async fn evaluate_deal(
        &self,
        search: &TrackedSearch,
        quote: &FlightQuote,
    ) -> Result<Verdict> {
        let raw = self.generate(&evaluation_prompt(search, quote)).await?;
        debug!("Model evaluation for {}: {raw}", search.contact);

        Ok(parse_verdict(&raw))
    }

    /// Turns a flight-API error into a one-sentence admin alert. Falls back to
    /// the raw error text when the model itself is unavailable.
    pub async fn explain_error(&self, search: &TrackedSearch, error: &str) -> String {
        match self.generate(&diagnosis_prompt(search, error)).await {
            Ok(explanation) => format!("SYSTEM ERROR: {}", explanation.trim()),
            Err(e) => {
                warn!("Error diagnosis failed: {e:#}");
                format!("SYSTEM ERROR: {error}")
            }
        }
    }

    /// Extracts structured search fields from a free-text request.
    pub async fn extract_search(&self, text: &str) -> Result<Value> {
        let raw = self.generate(&extraction_prompt(text)).await?;
        let fields: Value = serde_json::from_str(strip_code_fences(&raw))?;

        if fields.is_object() {
            Ok(fields)
        } else {
            Err(anyhow!("model returned non-object search fields"))
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "response_mime_type": "application/json" }
        });

        let response: GenerateResponse = self
            .client
            .post(API_URL)
            .query(&[("key", self.api_key.expose())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| anyhow!("model returned no candidates"))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

fn evaluation_prompt(search: &TrackedSearch, quote: &FlightQuote) -> String {
    format!(
        "You are a travel agent assistant.\n\
         User Preferences:\n\
         - Route: {} to {}\n\
         - User Notes/Constraints: \"{}\"\n\
         \n\
         Flight Found:\n\
         - Airline: {}\n\
         - Price: {}\n\
         \n\
         Tasks:\n\
         1. Does this flight strictly meet the user's notes? (e.g. if notes say \
         'no morning flights' and flight is morning, answer NO).\n\
         2. Write a short, exciting SMS alert (max {MAX_SMS_CHARS} chars) if it matches.\n\
         \n\
         Output JSON only: {{\"match\": true/false, \"sms\": \"...\"}}",
        search.origin, search.destination, search.notes, quote.airline, quote.price
    )
}

fn diagnosis_prompt(search: &TrackedSearch, error: &str) -> String {
    format!(
        "You are a Backend Reliability Engineer. Use your knowledge to explain this API error.\n\
         Error: \"{error}\"\n\
         Request Context: {} -> {} on {}\n\
         \n\
         Write a short 1-sentence log suitable for an admin SMS explaining what is likely \
         wrong (e.g., 'API Key Invalid', 'No flights on this date', 'Rate Limit').",
        search.origin, search.destination, search.departure_date
    )
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "You are a travel agent assistant. Extract flight search parameters from this \
         request:\n\
         \"{text}\"\n\
         \n\
         Output JSON only, with any of these keys you can determine: originSkyId, \
         destinationSkyId (3-letter airport codes), departureDate, returnDate \
         (YYYY-MM-DD), adults, children, infants, cabinClass (economy, premium_economy, \
         business, first), stops, notes (constraints that do not fit other fields)."
    )
}

/// Models wrap JSON in markdown fences despite the JSON response mime type.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    inner
        .strip_prefix("json")
        .unwrap_or(inner)
        .trim_end_matches("```")
        .trim()
}

/// Validates the evaluation reply contract: a JSON object with a boolean
/// `match` and, for matches, an `sms` of at most [`MAX_SMS_CHARS`] characters.
/// Any violation is a non-match.
pub fn parse_verdict(raw: &str) -> Verdict {
    let Ok(reply) = serde_json::from_str::<Value>(strip_code_fences(raw)) else {
        warn!("Model reply is not JSON, treating as non-match");
        return Verdict::no_match();
    };

    let Some(matched) = reply.get("match").and_then(Value::as_bool) else {
        warn!("Model reply has no boolean 'match', treating as non-match");
        return Verdict::no_match();
    };

    if !matched {
        return Verdict::no_match();
    }

    match reply.get("sms").and_then(Value::as_str) {
        Some(sms) if !sms.is_empty() && sms.chars().count() <= MAX_SMS_CHARS => Verdict {
            matched: true,
            sms: sms.to_owned(),
        },
        _ => {
            warn!("Model reply has no usable 'sms', treating as non-match");
            Verdict::no_match()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_search(notes: &str) -> TrackedSearch {
        TrackedSearch {
            contact: "+15551234567".to_owned(),
            username: "TestUser".to_owned(),
            origin: "IAD".to_owned(),
            destination: "BLR".to_owned(),
            departure_date: "2026-02-07".to_owned(),
            return_date: Some("2026-02-18".to_owned()),
            adults: 1,
            children: 0,
            infants: 0,
            cabin_class: "economy".to_owned(),
            stops: "direct".to_owned(),
            notes: notes.to_owned(),
            created_at: 1_700_000_000,
            expires_at: 1_700_604_800,
        }
    }

    // --- strip_code_fences ---

    #[test]
    fn test_strip_code_fences_plain() {
        assert_eq!(strip_code_fences(r#"{"match": true}"#), r#"{"match": true}"#);
    }

    #[test]
    fn test_strip_code_fences_json_fence() {
        assert_eq!(
            strip_code_fences("```json\n{\"match\": true}\n```"),
            r#"{"match": true}"#
        );
    }

    #[test]
    fn test_strip_code_fences_bare_fence() {
        assert_eq!(
            strip_code_fences("```\n{\"match\": true}\n```"),
            r#"{"match": true}"#
        );
    }

    #[test]
    fn test_strip_code_fences_surrounding_whitespace() {
        assert_eq!(
            strip_code_fences("  \n```json\n{}\n```\n  "),
            "{}"
        );
    }

    // --- parse_verdict ---

    #[test]
    fn test_parse_verdict_match() {
        let verdict = parse_verdict(r#"{"match": true, "sms": "BLR for $612 on Qatar!"}"#);
        assert_eq!(
            verdict,
            Verdict {
                matched: true,
                sms: "BLR for $612 on Qatar!".to_owned()
            }
        );
    }

    #[test]
    fn test_parse_verdict_fenced_match() {
        let verdict = parse_verdict("```json\n{\"match\": true, \"sms\": \"Deal!\"}\n```");
        assert!(verdict.matched);
        assert_eq!(verdict.sms, "Deal!");
    }

    #[test]
    fn test_parse_verdict_no_match() {
        let verdict = parse_verdict(r#"{"match": false, "sms": ""}"#);
        assert!(!verdict.matched);
    }

    #[test]
    fn test_parse_verdict_not_json() {
        assert_eq!(parse_verdict("the flight looks great"), Verdict::no_match());
    }

    #[test]
    fn test_parse_verdict_missing_match_field() {
        assert_eq!(parse_verdict(r#"{"sms": "Deal!"}"#), Verdict::no_match());
    }

    #[test]
    fn test_parse_verdict_match_not_boolean() {
        assert_eq!(
            parse_verdict(r#"{"match": "yes", "sms": "Deal!"}"#),
            Verdict::no_match()
        );
    }

    #[test]
    fn test_parse_verdict_missing_sms() {
        assert_eq!(parse_verdict(r#"{"match": true}"#), Verdict::no_match());
    }

    #[test]
    fn test_parse_verdict_empty_sms() {
        assert_eq!(
            parse_verdict(r#"{"match": true, "sms": ""}"#),
            Verdict::no_match()
        );
    }

    #[test]
    fn test_parse_verdict_sms_over_limit() {
        let sms = "x".repeat(MAX_SMS_CHARS + 1);
        assert_eq!(
            parse_verdict(&format!(r#"{{"match": true, "sms": "{sms}"}}"#)),
            Verdict::no_match()
        );
    }

    #[test]
    fn test_parse_verdict_sms_at_limit() {
        let sms = "x".repeat(MAX_SMS_CHARS);
        let verdict = parse_verdict(&format!(r#"{{"match": true, "sms": "{sms}"}}"#));
        assert!(verdict.matched);
        assert_eq!(verdict.sms.len(), MAX_SMS_CHARS);
    }

    // --- prompts ---

    #[test]
    fn test_evaluation_prompt_includes_notes_and_quote() {
        let prompt = evaluation_prompt(
            &make_search("No long layovers"),
            &FlightQuote {
                price: "$612".to_owned(),
                airline: "Qatar Airways".to_owned(),
            },
        );
        assert!(prompt.contains("IAD to BLR"));
        assert!(prompt.contains("\"No long layovers\""));
        assert!(prompt.contains("Qatar Airways"));
        assert!(prompt.contains("$612"));
        assert!(prompt.contains("Output JSON only"));
    }

    #[test]
    fn test_diagnosis_prompt_includes_error_and_route() {
        let prompt = diagnosis_prompt(&make_search(""), "API 429: rate limited");
        assert!(prompt.contains("API 429: rate limited"));
        assert!(prompt.contains("IAD -> BLR on 2026-02-07"));
    }

    #[test]
    fn test_extraction_prompt_includes_text() {
        let prompt = extraction_prompt("two of us to Tokyo in March, business class");
        assert!(prompt.contains("two of us to Tokyo in March, business class"));
        assert!(prompt.contains("originSkyId"));
    }
}
