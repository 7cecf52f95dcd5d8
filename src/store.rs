use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use log::debug;

use crate::types::{TrackedSearch, VerificationCode};

/// One DynamoDB table keyed by contact address. A contact holds either a
/// pending verification code or a saved search, never both: saving either kind
/// overwrites the item. Rows carry a `ttl` attribute the table expires on.
pub struct SearchStore {
    client: Client,
    table_name: String,
}

impl SearchStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    pub async fn put_verification_code(&self, code: &VerificationCode) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("contact", AttributeValue::S(code.contact.clone()))
            .item("otp", AttributeValue::S(code.code.clone()))
            .item("ttl", AttributeValue::N(code.expires_at.to_string()))
            .send()
            .await
            .context("failed to store verification code")?;

        Ok(())
    }

    pub async fn verification_code(&self, contact: &str) -> Result<Option<VerificationCode>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("contact", AttributeValue::S(contact.to_owned()))
            .send()
            .await
            .context("failed to fetch verification code")?;

        Ok(output.item.as_ref().and_then(parse_verification_code))
    }

    pub async fn put_search(&self, search: &TrackedSearch) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(search_item(search)))
            .send()
            .await
            .context("failed to store search")?;

        Ok(())
    }

    /// All live saved searches, across scan pages. Pending verification rows
    /// share the table and are skipped, not errors; so are searches past
    /// their retention window that the table has not expired yet.
    pub async fn active_searches(&self, now: i64) -> Result<Vec<TrackedSearch>> {
        let mut searches = Vec::new();

        let mut pages = self
            .client
            .scan()
            .table_name(&self.table_name)
            .into_paginator()
            .items()
            .send();

        while let Some(item) = pages.next().await {
            let item = item.context("failed to scan searches")?;
            if let Some(search) = live_search(&item, now) {
                searches.push(search);
            }
        }

        Ok(searches)
    }
}

/// A scanned row, as a search the sweep should act on. TTL deletion is lazy,
/// so a row past its `ttl` can still come back from a scan; it is treated as
/// absent, same as an expired verification code on the verify path.
fn live_search(item: &HashMap<String, AttributeValue>, now: i64) -> Option<TrackedSearch> {
    let Some(search) = parse_search(item) else {
        debug!(
            "Skipping non-search item for {:?}",
            string_attr(item, "contact")
        );
        return None;
    };

    if search.is_expired(now) {
        debug!("Skipping expired search for {}", search.contact);
        return None;
    }

    Some(search)
}

fn search_item(search: &TrackedSearch) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        ("contact".to_owned(), AttributeValue::S(search.contact.clone())),
        ("username".to_owned(), AttributeValue::S(search.username.clone())),
        ("src".to_owned(), AttributeValue::S(search.origin.clone())),
        ("dst".to_owned(), AttributeValue::S(search.destination.clone())),
        ("date".to_owned(), AttributeValue::S(search.departure_date.clone())),
        ("adults".to_owned(), AttributeValue::N(search.adults.to_string())),
        ("children".to_owned(), AttributeValue::N(search.children.to_string())),
        ("infants".to_owned(), AttributeValue::N(search.infants.to_string())),
        ("cabinClass".to_owned(), AttributeValue::S(search.cabin_class.clone())),
        ("stops".to_owned(), AttributeValue::S(search.stops.clone())),
        ("notes".to_owned(), AttributeValue::S(search.notes.clone())),
        ("timestamp".to_owned(), AttributeValue::N(search.created_at.to_string())),
        ("ttl".to_owned(), AttributeValue::N(search.expires_at.to_string())),
    ]);

    if let Some(return_date) = &search.return_date {
        item.insert("return".to_owned(), AttributeValue::S(return_date.clone()));
    }

    item
}

/// A row is a search only if the route fields are present; verification rows
/// have just `contact`, `otp`, and `ttl`.
fn parse_search(item: &HashMap<String, AttributeValue>) -> Option<TrackedSearch> {
    let contact = string_attr(item, "contact")?;
    let origin = string_attr(item, "src")?;
    let destination = string_attr(item, "dst")?;
    let departure_date = string_attr(item, "date")?;

    Some(TrackedSearch {
        contact,
        origin,
        destination,
        departure_date,
        username: string_attr(item, "username").unwrap_or_else(|| "Guest".to_owned()),
        return_date: string_attr(item, "return"),
        adults: count_attr(item, "adults").unwrap_or(1),
        children: count_attr(item, "children").unwrap_or(0),
        infants: count_attr(item, "infants").unwrap_or(0),
        cabin_class: string_attr(item, "cabinClass").unwrap_or_else(|| "economy".to_owned()),
        stops: string_attr(item, "stops").unwrap_or_default(),
        notes: string_attr(item, "notes").unwrap_or_default(),
        created_at: number_attr(item, "timestamp").unwrap_or(0),
        expires_at: number_attr(item, "ttl").unwrap_or(0),
    })
}

fn parse_verification_code(item: &HashMap<String, AttributeValue>) -> Option<VerificationCode> {
    Some(VerificationCode {
        contact: string_attr(item, "contact")?,
        code: string_attr(item, "otp")?,
        expires_at: number_attr(item, "ttl")?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

fn number_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

/// Passenger counts are small and non-negative; anything else in the row is
/// treated as absent rather than wrapped.
fn count_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<u32> {
    number_attr(item, key).and_then(|n| u32::try_from(n).ok())
}
