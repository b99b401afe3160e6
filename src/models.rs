//! Core data models for the finance assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AssistantError;
use crate::Result;

//
// ================= Intent =================
//

/// Classified purpose of a query. Declaration order is the tie-break
/// priority used by the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Education,
    Portfolio,
    Market,
    GoalPlanning,
    News,
    Tax,
}

impl IntentKind {
    /// Every intent, highest priority first.
    pub const ALL: [IntentKind; 6] = [
        IntentKind::Education,
        IntentKind::Portfolio,
        IntentKind::Market,
        IntentKind::GoalPlanning,
        IntentKind::News,
        IntentKind::Tax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Education => "education",
            IntentKind::Portfolio => "portfolio",
            IntentKind::Market => "market",
            IntentKind::GoalPlanning => "goal_planning",
            IntentKind::News => "news",
            IntentKind::Tax => "tax",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    /// Share of the total matched rule weight won by `kind`, in `[0, 1]`.
    pub confidence: f32,
    pub parameters: IntentParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentParameters {
    /// `SYMBOL quantity` pairs in the order they appeared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holdings: Vec<Holding>,
    /// Every ticker mentioned, with or without a quantity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskTolerance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_type: Option<GoalType>,
}

impl IntentParameters {
    pub fn is_empty(&self) -> bool {
        *self == IntentParameters::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
}

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Retirement,
    Home,
    Education,
    EmergencyFund,
    General,
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTolerance::Low => "Low",
            RiskTolerance::Medium => "Medium",
            RiskTolerance::High => "High",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalType::Retirement => "Retirement",
            GoalType::Home => "Home Purchase",
            GoalType::Education => "Education",
            GoalType::EmergencyFund => "Emergency Fund",
            GoalType::General => "General Savings",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Portfolio =================
//

/// Holdings keyed by symbol. Quantities are always positive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Portfolio {
    holdings: BTreeMap<String, f64>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a portfolio from explicit holdings, rejecting bad quantities
    /// and duplicate symbols.
    pub fn from_holdings(holdings: &[Holding]) -> Result<Self> {
        let mut portfolio = Portfolio::new();
        for holding in holdings {
            if portfolio.holdings.contains_key(&holding.symbol) {
                return Err(AssistantError::Validation(format!(
                    "Symbol {} listed more than once",
                    holding.symbol
                )));
            }
            portfolio.add(&holding.symbol, holding.quantity)?;
        }
        Ok(portfolio)
    }

    /// Add shares, merging with an existing position.
    pub fn add(&mut self, symbol: &str, quantity: f64) -> Result<()> {
        validate_symbol(symbol)?;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(AssistantError::Validation(format!(
                "Quantity for {} must be positive, got {}",
                symbol, quantity
            )));
        }
        *self.holdings.entry(symbol.to_string()).or_insert(0.0) += quantity;
        Ok(())
    }

    /// Remove a position entirely.
    pub fn remove(&mut self, symbol: &str) -> Result<f64> {
        self.holdings.remove(symbol).ok_or_else(|| {
            AssistantError::Validation(format!("{} is not in the portfolio", symbol))
        })
    }

    pub fn quantity(&self, symbol: &str) -> Option<f64> {
        self.holdings.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.holdings.iter().map(|(s, q)| (s.as_str(), *q))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.holdings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

/// Ticker shape check: 1-5 upper-case letters with an optional `.X` class suffix.
pub fn validate_symbol(symbol: &str) -> Result<()> {
    let (base, class) = match symbol.split_once('.') {
        Some((base, class)) => (base, Some(class)),
        None => (symbol, None),
    };

    let base_ok = (1..=5).contains(&base.len()) && base.chars().all(|c| c.is_ascii_uppercase());
    let class_ok = class
        .map(|c| c.len() == 1 && c.chars().all(|ch| ch.is_ascii_uppercase()))
        .unwrap_or(true);

    if base_ok && class_ok {
        Ok(())
    } else {
        Err(AssistantError::Validation(format!(
            "'{}' is not a valid stock symbol",
            symbol
        )))
    }
}

//
// ================= Goal =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub goal_type: GoalType,
    pub target_amount: f64,
    pub timeframe_months: Option<u32>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn from_parameters(params: &IntentParameters) -> Option<Result<Self>> {
        let amount = params.goal_amount?;
        if !amount.is_finite() || amount <= 0.0 {
            return Some(Err(AssistantError::Validation(format!(
                "Goal amount must be positive, got {}",
                amount
            ))));
        }
        Some(Ok(Self {
            goal_type: params.goal_type.unwrap_or(GoalType::General),
            target_amount: amount,
            timeframe_months: params.timeframe_months,
            risk_tolerance: params.risk_tolerance,
            created_at: Utc::now(),
        }))
    }
}

//
// ================= Retrieval / Response =================
//

/// Attribution for a knowledge passage that made it into a context block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub article_id: String,
    pub title: String,
    pub source: String,
    pub score: f32,
    pub rank: usize,
}

/// Result of `handle_message`, as returned to CLI/web front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub response_text: String,
    pub intent: IntentKind,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_portfolio: Option<Portfolio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_goals: Option<Vec<Goal>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_rejects_non_positive_quantity() {
        let mut portfolio = Portfolio::new();
        assert!(portfolio.add("AAPL", 0.0).is_err());
        assert!(portfolio.add("AAPL", -3.0).is_err());
        assert!(portfolio.is_empty());
    }

    #[test]
    fn test_portfolio_merges_positions() {
        let mut portfolio = Portfolio::new();
        portfolio.add("AAPL", 10.0).unwrap();
        portfolio.add("AAPL", 5.0).unwrap();
        assert_eq!(portfolio.quantity("AAPL"), Some(15.0));
        assert_eq!(portfolio.remove("AAPL").unwrap(), 15.0);
        assert!(portfolio.remove("AAPL").is_err());
    }

    #[test]
    fn test_from_holdings_rejects_duplicates() {
        let holdings = vec![
            Holding { symbol: "AAPL".into(), quantity: 1.0 },
            Holding { symbol: "AAPL".into(), quantity: 2.0 },
        ];
        assert!(matches!(
            Portfolio::from_holdings(&holdings),
            Err(AssistantError::Validation(_))
        ));
    }

    #[test]
    fn test_symbol_validation() {
        assert!(validate_symbol("AAPL").is_ok());
        assert!(validate_symbol("BRK.B").is_ok());
        assert!(validate_symbol("aapl").is_err());
        assert!(validate_symbol("TOOLONG").is_err());
        assert!(validate_symbol("").is_err());
    }

    #[test]
    fn test_intent_priority_order() {
        assert_eq!(IntentKind::ALL[0], IntentKind::Education);
        assert_eq!(IntentKind::ALL[5], IntentKind::Tax);
        assert_eq!(IntentKind::GoalPlanning.to_string(), "goal_planning");
    }
}
