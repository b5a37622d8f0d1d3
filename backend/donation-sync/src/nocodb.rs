//! NocoDB adapter for [`DonationGateway`].
//!
//! ## Schema variants
//!
//! Two table layouts are in the field:
//!
//! * **v2** – `/api/v2/tables/{table}/records`, `xc-token` header, donation
//!   rows carry `project_name` and `payment_method` (`bar` / `paypal`).
//! * **v1** – `/api/v1/db/data/noco/{project}/{table}`, `xc-auth` header,
//!   donation rows only carry a free-text `note`.
//!
//! List responses are accepted either wrapped in `{"list": [...]}` or as a
//! bare array. Wrapped lists are paged with `offset`/`limit` until
//! `pageInfo.isLastPage`; a bare array is taken as the whole table. Writes are attempted exactly once; the request timeout lives
//! on the shared [`Client`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{GatewayError, SyncError};
use crate::gateway::DonationGateway;
use crate::models::{DonationEntry, GoalSettings, NewDonation, PaymentMethod, DEFAULT_CHANNEL};

/// Rows requested per list call. NocoDB caps `limit` at 1000 by default.
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    V1,
    V2,
}

impl SchemaVariant {
    fn auth_header(self) -> &'static str {
        match self {
            Self::V1 => "xc-auth",
            Self::V2 => "xc-token",
        }
    }
}

impl FromStr for SchemaVariant {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(SyncError::Config(format!(
                "Invalid GATEWAY_SCHEMA '{other}' (expected v1 or v2)"
            ))),
        }
    }
}

pub struct NocoDbGateway {
    client: Client,
    base_url: String,
    token: String,
    variant: SchemaVariant,
    settings_table: String,
    donations_table: String,
    project: String,
}

impl NocoDbGateway {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        variant: SchemaVariant,
        settings_table: impl Into<String>,
        donations_table: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            variant,
            settings_table: settings_table.into(),
            donations_table: donations_table.into(),
            project: project.into(),
        }
    }

    pub fn from_config(client: Client, config: &crate::config::Config) -> Self {
        Self::new(
            client,
            &config.gateway_url,
            &config.gateway_token,
            config.schema,
            &config.settings_table,
            &config.donations_table,
            &config.nocodb_project,
        )
    }

    fn records_url(&self, table: &str) -> String {
        match self.variant {
            SchemaVariant::V1 => format!(
                "{}/api/v1/db/data/noco/{}/{}",
                self.base_url, self.project, table
            ),
            SchemaVariant::V2 => format!("{}/api/v2/tables/{}/records", self.base_url, table),
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(self.variant.auth_header(), &self.token)
    }

    async fn list_rows(&self, table: &str) -> Result<Vec<Value>, GatewayError> {
        let url = self.records_url(table);
        let mut rows = Vec::new();
        loop {
            let req = self
                .authed(self.client.get(&url))
                .query(&[("offset", rows.len()), ("limit", PAGE_SIZE)]);
            let page = unwrap_page(send_json(req).await?)?;
            let fetched = page.rows.len();
            rows.extend(page.rows);
            if page.last || fetched == 0 {
                break;
            }
            debug!("Fetched {} rows from {table}, requesting next page", rows.len());
        }
        Ok(rows)
    }

    fn write_body<'a>(&self, donation: &'a NewDonation) -> WriteBody<'a> {
        let timestamp = donation.timestamp.to_rfc3339();
        match self.variant {
            SchemaVariant::V2 => WriteBody {
                timestamp,
                amount_eur: donation.amount_eur,
                channel: &donation.channel,
                project_name: donation.project_name.as_deref(),
                payment_method: donation.payment_method.map(payment_method_to_wire),
                note: None,
            },
            SchemaVariant::V1 => WriteBody {
                timestamp,
                amount_eur: donation.amount_eur,
                channel: &donation.channel,
                project_name: None,
                payment_method: None,
                note: donation
                    .note
                    .as_deref()
                    .or(donation.project_name.as_deref()),
            },
        }
    }
}

#[async_trait]
impl DonationGateway for NocoDbGateway {
    async fn fetch_settings(&self) -> Result<GoalSettings, GatewayError> {
        let rows = self.list_rows(&self.settings_table).await?;
        let first = rows.into_iter().next().ok_or(GatewayError::NotFound)?;
        let raw: RawSettingsRow = serde_json::from_value(first)?;
        Ok(GoalSettings {
            id: raw.id.as_ref().and_then(id_to_string),
            project_name: raw.project_name,
            goal_eur: raw.goal_eur,
        })
    }

    async fn fetch_donations(&self) -> Result<Vec<DonationEntry>, GatewayError> {
        let rows = self.list_rows(&self.donations_table).await?;
        let total = rows.len();
        let donations: Vec<DonationEntry> = rows.into_iter().filter_map(decode_donation).collect();
        if donations.len() != total {
            warn!(
                "Skipped {} malformed donation rows out of {total}",
                total - donations.len()
            );
        }
        debug!("Fetched {} donations", donations.len());
        Ok(donations)
    }

    async fn write_donation(&self, donation: &NewDonation) -> Result<DonationEntry, GatewayError> {
        let body = self.write_body(donation);
        let req = self
            .authed(self.client.post(self.records_url(&self.donations_table)))
            .json(&body);
        let ack = send_json(req).await?;

        let id = ack
            .get("Id")
            .or_else(|| ack.get("id"))
            .and_then(id_to_string)
            .ok_or_else(|| GatewayError::Malformed("write response carries no id".to_string()))?;

        debug!("Donation {} stored remotely as {id}", donation.amount_eur);
        Ok(donation.clone().into_entry(Some(id)))
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/health", self.base_url);
        let resp = self.client.get(url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::Request {
                status: Some(resp.status().as_u16()),
                message: "health check failed".to_string(),
            })
        }
    }
}

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    timestamp: String,
    #[serde(with = "rust_decimal::serde::float")]
    amount_eur: Decimal,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RawSettingsRow {
    #[serde(default, alias = "Id")]
    id: Option<Value>,
    #[serde(default, alias = "projectName")]
    project_name: Option<String>,
    #[serde(default, alias = "goalEur")]
    goal_eur: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawDonationRow {
    #[serde(default, alias = "Id")]
    id: Option<Value>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, alias = "amountEur")]
    amount_eur: Option<Decimal>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default, alias = "projectName")]
    project_name: Option<String>,
    #[serde(default, alias = "paymentMethod")]
    payment_method: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

async fn send_json(req: RequestBuilder) -> Result<Value, GatewayError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        warn!("Gateway responded with {status}: {message}");
        return Err(GatewayError::Request {
            status: Some(status.as_u16()),
            message,
        });
    }
    Ok(resp.json().await?)
}

struct Page {
    rows: Vec<Value>,
    last: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PageInfo {
    #[serde(default, rename = "isLastPage")]
    is_last_page: Option<bool>,
}

/// Split a list response into rows and whether more pages follow. A
/// missing `pageInfo.isLastPage` counts as the last page.
fn unwrap_page(body: Value) -> Result<Page, GatewayError> {
    match body {
        Value::Array(rows) => Ok(Page { rows, last: true }),
        Value::Object(mut map) => {
            let rows = match map.remove("list") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(GatewayError::Malformed(
                        "expected a list envelope or an array".to_string(),
                    ))
                }
            };
            let info: PageInfo = map
                .remove("pageInfo")
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            Ok(Page {
                rows,
                last: info.is_last_page.unwrap_or(true),
            })
        }
        _ => Err(GatewayError::Malformed(
            "expected a list envelope or an array".to_string(),
        )),
    }
}

fn decode_donation(row: Value) -> Option<DonationEntry> {
    let raw: RawDonationRow = match serde_json::from_value(row) {
        Ok(r) => r,
        Err(e) => {
            debug!("Undecodable donation row: {e}");
            return None;
        }
    };
    let timestamp = raw.timestamp.as_deref().and_then(parse_timestamp)?;
    let amount_eur = raw.amount_eur.filter(|a| !a.is_sign_negative())?;

    Some(DonationEntry {
        id: raw.id.as_ref().and_then(id_to_string),
        timestamp,
        amount_eur,
        channel: raw.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        project_name: raw.project_name,
        payment_method: raw.payment_method.as_deref().and_then(PaymentMethod::parse),
        note: raw.note,
    })
}

fn payment_method_to_wire(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "bar",
        PaymentMethod::Online => "paypal",
    }
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the timestamp formats NocoDB emits into UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
