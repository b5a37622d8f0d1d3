//! Derives campaign statistics from the full donation history.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::{Result, SyncError};
use crate::models::{DonationEntry, GoalSettings, Stats};

/// Compute total raised, goal progress and the most recent donation.
///
/// Pure: only fails when `settings` lacks a required field. An empty
/// donation list is valid and yields a zero total.
pub fn compute_stats(settings: &GoalSettings, donations: &[DonationEntry]) -> Result<Stats> {
    let id = required(settings.id.as_deref(), "id")?;
    let project_name = required(settings.project_name.as_deref(), "project_name")?;
    let goal_eur = settings
        .goal_eur
        .ok_or_else(|| SyncError::MalformedSettings("missing goal_eur".to_string()))?;

    let total: Decimal = donations.iter().map(|d| d.amount_eur).sum();

    let progress = if goal_eur > Decimal::ZERO {
        (total / goal_eur)
            .min(Decimal::ONE)
            .max(Decimal::ZERO)
            .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
    } else {
        Decimal::ZERO
    };

    // Last-seen wins on equal timestamps.
    let last_donation = donations
        .iter()
        .fold(None::<&DonationEntry>, |latest, d| match latest {
            Some(l) if l.timestamp > d.timestamp => Some(l),
            _ => Some(d),
        })
        .cloned();

    Ok(Stats {
        id: id.to_string(),
        project_name: project_name.to_string(),
        goal_eur,
        total_eur: total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        progress,
        last_donation,
    })
}

/// `round(progress * 100)` for display.
pub fn percent_complete(stats: &Stats) -> u32 {
    use rust_decimal::prelude::ToPrimitive;

    (stats.progress * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0)
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SyncError::MalformedSettings(format!("missing {field}"))),
    }
}
