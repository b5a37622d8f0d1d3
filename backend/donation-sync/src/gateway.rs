//! The remote service of record for donations.

use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::models::{DonationEntry, GoalSettings, NewDonation};

#[async_trait]
pub trait DonationGateway: Send + Sync {
    /// The active campaign. [`GatewayError::NotFound`] if there is none.
    async fn fetch_settings(&self) -> Result<GoalSettings, GatewayError>;

    /// Every recorded donation, in no particular order.
    async fn fetch_donations(&self) -> Result<Vec<DonationEntry>, GatewayError>;

    /// Persist one donation. Implementations must not retry on their own.
    async fn write_donation(&self, donation: &NewDonation) -> Result<DonationEntry, GatewayError>;

    /// Cheap reachability check used by the connectivity prober.
    async fn ping(&self) -> Result<(), GatewayError>;
}
