//! Domain types shared by the gateway, the offline queue and the controller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL: &str = "kiosk";

/// How a donation was paid at the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash dropped into the box (`bar` in the remote schema).
    Cash,
    /// Paid online, e.g. via a QR code (`paypal` in the remote schema).
    Online,
}

impl PaymentMethod {
    /// Parse either the domain name or the remote schema name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cash" | "bar" => Some(Self::Cash),
            "online" | "paypal" => Some(Self::Online),
            _ => None,
        }
    }
}

/// A donation accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationEntry {
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub amount_eur: Decimal,
    pub channel: String,
    pub project_name: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub note: Option<String>,
}

/// A donation write that has not been confirmed by the gateway yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDonation {
    pub amount_eur: Decimal,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub note: Option<String>,
    /// When the donation was made at the kiosk. Replays keep this value.
    pub timestamp: DateTime<Utc>,
}

impl NewDonation {
    pub fn new(amount_eur: Decimal, channel: impl Into<String>) -> Self {
        Self {
            amount_eur,
            channel: channel.into(),
            project_name: None,
            payment_method: None,
            note: None,
            timestamp: Utc::now(),
        }
    }

    /// The entry the gateway would store for this write, given its assigned id.
    pub fn into_entry(self, id: Option<String>) -> DonationEntry {
        DonationEntry {
            id,
            timestamp: self.timestamp,
            amount_eur: self.amount_eur,
            channel: self.channel,
            project_name: self.project_name,
            payment_method: self.payment_method,
            note: self.note,
        }
    }
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

/// Campaign settings exactly as the gateway returned them.
///
/// Required-field validation happens in [`crate::stats::compute_stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalSettings {
    pub id: Option<String>,
    pub project_name: Option<String>,
    pub goal_eur: Option<Decimal>,
}

/// Derived campaign progress. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub id: String,
    pub project_name: String,
    pub goal_eur: Decimal,
    pub total_eur: Decimal,
    /// Fraction of the goal reached, in `[0, 1]`.
    pub progress: Decimal,
    pub last_donation: Option<DonationEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_accepts_remote_names() {
        assert_eq!(PaymentMethod::parse("bar"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::parse("PayPal"), Some(PaymentMethod::Online));
        assert_eq!(PaymentMethod::parse("online"), Some(PaymentMethod::Online));
        assert_eq!(PaymentMethod::parse("card"), None);
    }

    #[test]
    fn new_donation_defaults_channel_when_missing() {
        let raw = r#"{"amount_eur":"4.50","timestamp":"2024-05-01T10:00:00Z"}"#;
        let donation: NewDonation = serde_json::from_str(raw).unwrap();
        assert_eq!(donation.channel, "kiosk");
        assert_eq!(donation.amount_eur, Decimal::new(450, 2));
        assert!(donation.project_name.is_none());
    }
}
