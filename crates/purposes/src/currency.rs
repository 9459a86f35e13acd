//! Currencies and the fixed-rate conversion used in reports.
//!
//! Two USD "colours" exist (support vs available budget); they convert to
//! each other 1:1 and to ILS at the configured rate.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use calculaud_core::{DomainError, DomainResult};

pub const DEFAULT_USD_TO_ILS: f64 = 3.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    SupportUsd,
    AvailableUsd,
    Ils,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::SupportUsd, Currency::AvailableUsd, Currency::Ils];

    pub fn as_str(self) -> &'static str {
        match self {
            Currency::SupportUsd => "SUPPORT_USD",
            Currency::AvailableUsd => "AVAILABLE_USD",
            Currency::Ils => "ILS",
        }
    }

    pub fn is_usd(self) -> bool {
        matches!(self, Currency::SupportUsd | Currency::AvailableUsd)
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "invalid currency '{s}' (expected SUPPORT_USD, AVAILABLE_USD or ILS)"
                ))
            })
    }
}

/// Fixed USD→ILS rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRate {
    usd_to_ils: f64,
}

impl ExchangeRate {
    pub fn new(usd_to_ils: f64) -> DomainResult<Self> {
        if !usd_to_ils.is_finite() || usd_to_ils <= 0.0 {
            return Err(DomainError::validation("usd_to_ils_rate must be a positive number"));
        }
        Ok(Self { usd_to_ils })
    }

    pub fn usd_to_ils(&self) -> f64 {
        self.usd_to_ils
    }

    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> f64 {
        match (from.is_usd(), to.is_usd()) {
            (true, false) => amount * self.usd_to_ils,
            (false, true) => amount / self.usd_to_ils,
            _ => amount,
        }
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self {
            usd_to_ils: DEFAULT_USD_TO_ILS,
        }
    }
}

/// Running per-currency sums.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurrencyAmounts {
    pub ils: f64,
    pub support_usd: f64,
    pub available_usd: f64,
}

impl CurrencyAmounts {
    pub fn add(&mut self, currency: Currency, amount: f64) {
        match currency {
            Currency::Ils => self.ils += amount,
            Currency::SupportUsd => self.support_usd += amount,
            Currency::AvailableUsd => self.available_usd += amount,
        }
    }

    pub fn merge(&mut self, other: &CurrencyAmounts) {
        self.ils += other.ils;
        self.support_usd += other.support_usd;
        self.available_usd += other.available_usd;
    }

    pub fn totals(&self, rate: ExchangeRate) -> MultiCurrencyAmount {
        let total_usd = self.support_usd
            + self.available_usd
            + rate.convert(self.ils, Currency::Ils, Currency::SupportUsd);
        let total_ils = self.ils
            + rate.convert(self.support_usd, Currency::SupportUsd, Currency::Ils)
            + rate.convert(self.available_usd, Currency::AvailableUsd, Currency::Ils);
        MultiCurrencyAmount {
            ils: self.ils,
            support_usd: self.support_usd,
            available_usd: self.available_usd,
            total_usd,
            total_ils,
        }
    }
}

/// Per-currency amounts plus both grand totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MultiCurrencyAmount {
    pub ils: f64,
    pub support_usd: f64,
    pub available_usd: f64,
    pub total_usd: f64,
    pub total_ils: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn converts_between_usd_and_ils() {
        let rate = ExchangeRate::new(4.0).unwrap();
        assert_eq!(rate.convert(10.0, Currency::SupportUsd, Currency::Ils), 40.0);
        assert_eq!(rate.convert(40.0, Currency::Ils, Currency::AvailableUsd), 10.0);
        assert_eq!(rate.convert(7.0, Currency::SupportUsd, Currency::AvailableUsd), 7.0);
    }

    #[test]
    fn totals_combine_all_three() {
        let mut amounts = CurrencyAmounts::default();
        amounts.add(Currency::Ils, 370.0);
        amounts.add(Currency::SupportUsd, 100.0);
        amounts.add(Currency::AvailableUsd, 50.0);
        let totals = amounts.totals(ExchangeRate::default());
        assert!((totals.total_usd - 250.0).abs() < 1e-9);
        assert!((totals.total_ils - 925.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(ExchangeRate::new(0.0).is_err());
        assert!(ExchangeRate::new(f64::NAN).is_err());
    }

    proptest! {
        #[test]
        fn totals_agree_across_currencies(
            ils in 0.0f64..1e6,
            support in 0.0f64..1e6,
            available in 0.0f64..1e6,
            rate in 0.5f64..10.0,
        ) {
            let rate = ExchangeRate::new(rate).unwrap();
            let totals = CurrencyAmounts { ils, support_usd: support, available_usd: available }.totals(rate);
            let back = rate.convert(totals.total_usd, Currency::SupportUsd, Currency::Ils);
            prop_assert!((back - totals.total_ils).abs() <= 1e-6 * totals.total_ils.max(1.0));
        }
    }
}
