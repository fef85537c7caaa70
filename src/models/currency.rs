use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Fallback used when the chaos rate is missing from a fetched table
const CHAOS_FALLBACK_RATE: f64 = 0.00556;

const DEFAULT_RATES: &[(&str, f64)] = &[
    ("exalted", 1.0),
    ("divine", 320.0),
    ("chaos", 7.8),
    ("alch", 3.9),
    ("gcp", 15.6),
    ("regal", 7.8),
    ("vaal", 11.7),
    ("fusing", 7.8),
    ("chrom", 3.9),
    ("jewellers", 3.9),
    ("fossil_primitive", 78.0),
    ("fossil_pristine", 117.0),
    ("scouring", 3.9),
    ("regret", 7.8),
    ("blessed", 39.0),
    ("mirror", 1_500_000.0),
];

/// Currency values expressed in Exalted Orbs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyRates {
    rates: BTreeMap<String, f64>,
}

impl Default for CurrencyRates {
    fn default() -> Self {
        Self {
            rates: DEFAULT_RATES
                .iter()
                .map(|(name, rate)| (name.to_string(), *rate))
                .collect(),
        }
    }
}

impl CurrencyRates {
    pub fn from_map(rates: BTreeMap<String, f64>) -> Self {
        Self { rates }
    }

    pub fn get(&self, currency: &str) -> Option<f64> {
        self.rates.get(&currency.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.rates.iter()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    fn rate_or_fallback(&self, currency: &str) -> f64 {
        self.get(currency)
            .filter(|r| *r != 0.0)
            .or_else(|| self.get("exalted").filter(|r| *r != 0.0))
            .unwrap_or(1.0)
    }

    pub fn to_exalted(&self, amount: f64, currency: &str) -> f64 {
        amount * self.rate_or_fallback(currency)
    }

    pub fn format_amount(&self, amount: f64, currency: &str) -> String {
        let exalts = self.to_exalted(amount, currency);
        if exalts >= 1.0 {
            format!("{:.2} Ex", exalts)
        } else if exalts >= 0.01 {
            format!("{:.1}c", exalts * 100.0)
        } else {
            format!("{:.0} fragments", exalts * 10000.0)
        }
    }

    fn chaos_rate(&self) -> f64 {
        self.get("chaos")
            .filter(|r| *r != 0.0)
            .unwrap_or(CHAOS_FALLBACK_RATE)
    }

    pub fn chaos_to_exalted(&self, chaos: f64) -> f64 {
        chaos * self.chaos_rate()
    }

    pub fn exalted_to_chaos(&self, exalted: f64) -> f64 {
        exalted / self.chaos_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let rates = CurrencyRates::default();
        assert_eq!(rates.len(), 16);
        assert_eq!(rates.get("Divine"), Some(320.0));
        assert_eq!(rates.get("mirror"), Some(1_500_000.0));
    }

    #[test]
    fn test_format_amount_ranges() {
        let rates = CurrencyRates::default();
        assert_eq!(rates.format_amount(2.0, "divine"), "640.00 Ex");
        assert_eq!(rates.format_amount(0.5, "exalted"), "50.0c");
        assert_eq!(rates.format_amount(0.0005, "exalted"), "5 fragments");
        // Unknown currencies count as exalted
        assert_eq!(rates.format_amount(3.0, "shiny_pebble"), "3.00 Ex");
    }

    #[test]
    fn test_chaos_conversions() {
        let rates = CurrencyRates::default();
        assert!((rates.chaos_to_exalted(10.0) - 78.0).abs() < 1e-9);
        assert!((rates.exalted_to_chaos(78.0) - 10.0).abs() < 1e-9);

        let empty = CurrencyRates::from_map(BTreeMap::new());
        assert!((empty.chaos_to_exalted(1000.0) - 5.56).abs() < 1e-9);
    }
}
