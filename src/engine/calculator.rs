//! Commission amount calculation. Pure; no I/O.

use crate::domain::{Amount, CommissionOverride, CommissionQuote, CommissionRules};
use crate::error::LedgerError;

/// Compute commission amount and rate for a spend.
///
/// Resolution order: explicit override values, then product rules (tiers
/// ascending by `min_amount`, first covering tier wins; percentage; flat).
/// No rounding is applied.
pub fn calculate(
    spend: Amount,
    rules: &CommissionRules,
    overrides: &CommissionOverride,
) -> Result<CommissionQuote, LedgerError> {
    if spend.is_negative() {
        return Err(LedgerError::validation(format!(
            "spend amount {} must not be negative",
            spend
        )));
    }

    if let Some(quote) = override_quote(spend, overrides)? {
        return Ok(quote);
    }

    match rules {
        CommissionRules::Tiered { tiers } => {
            let mut ordered: Vec<_> = tiers.iter().collect();
            ordered.sort_by(|a, b| a.min_amount.cmp(&b.min_amount));
            let tier = ordered
                .into_iter()
                .find(|t| t.covers(spend))
                .ok_or_else(|| {
                    LedgerError::Configuration(format!(
                        "no commission tier covers spend amount {}",
                        spend
                    ))
                })?;
            Ok(CommissionQuote {
                commission_amount: apply_rate(spend, tier.rate)?,
                commission_rate: tier.rate,
            })
        }
        CommissionRules::Percentage { rate } => Ok(CommissionQuote {
            commission_amount: apply_rate(spend, *rate)?,
            commission_rate: *rate,
        }),
        CommissionRules::Flat { amount } => Ok(CommissionQuote {
            commission_amount: *amount,
            commission_rate: display_rate(*amount, spend),
        }),
    }
}

/// Quote from explicit override values, or `None` when the override flag is
/// unset or carries neither a custom amount nor a custom rate.
pub fn override_quote(
    spend: Amount,
    overrides: &CommissionOverride,
) -> Result<Option<CommissionQuote>, LedgerError> {
    if !overrides.override_rules {
        return Ok(None);
    }
    if let Some(amount) = overrides.custom_amount {
        if amount.is_negative() {
            return Err(LedgerError::validation("custom amount must not be negative"));
        }
        return Ok(Some(CommissionQuote {
            commission_amount: amount,
            commission_rate: display_rate(amount, spend),
        }));
    }
    if let Some(rate) = overrides.custom_rate {
        if rate.is_negative() {
            return Err(LedgerError::validation("custom rate must not be negative"));
        }
        return Ok(Some(CommissionQuote {
            commission_amount: apply_rate(spend, rate)?,
            commission_rate: rate,
        }));
    }
    Ok(None)
}

fn apply_rate(spend: Amount, rate: Amount) -> Result<Amount, LedgerError> {
    spend.checked_mul(rate).ok_or_else(|| {
        LedgerError::validation(format!(
            "commission for spend {} at rate {} is out of range",
            spend, rate
        ))
    })
}

/// Effective rate shown for audit purposes; zero when spend is zero.
fn display_rate(amount: Amount, spend: Amount) -> Amount {
    amount.checked_div(spend).unwrap_or(Amount::ZERO)
}
