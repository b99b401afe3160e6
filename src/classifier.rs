//! Intent Classifier
//!
//! Scores a query against one rule group per intent. Each rule is a
//! whole-word phrase with a weight; an intent's score is the sum of the
//! weights of its matched rules. The strictly highest score wins and ties go
//! to the intent declared first in `IntentKind::ALL`. A query that matches
//! nothing is an education query with confidence 0.
//!
//! Parameter extraction (holdings, symbols, amounts, timeframe, risk, goal
//! type) runs independently of scoring.

use crate::models::{GoalType, Holding, Intent, IntentKind, IntentParameters, RiskTolerance};
use lazy_static::lazy_static;
use regex::Regex;

/// Static rule tables, zero allocation
const EDUCATION_RULES: &[(&str, f32)] = &[
    ("explain", 1.0),
    ("teach me", 1.0),
    ("learn", 0.8),
    ("definition", 1.0),
    ("define", 1.0),
    ("meaning", 0.8),
    ("concept", 0.8),
    ("how does", 0.6),
    ("how do", 0.6),
    ("understand", 0.6),
    ("difference between", 1.0),
    ("beginner", 0.6),
];

const PORTFOLIO_RULES: &[(&str, f32)] = &[
    ("portfolio", 1.5),
    ("holdings", 1.2),
    ("my stocks", 1.0),
    ("diversification", 1.0),
    ("diversify", 1.0),
    ("allocation", 1.0),
    ("rebalance", 1.2),
    ("i own", 1.0),
    ("position", 0.6),
    ("positions", 0.6),
    ("analyze", 0.5),
];

const MARKET_RULES: &[(&str, f32)] = &[
    ("market", 1.0),
    ("stock price", 1.2),
    ("share price", 1.2),
    ("quote", 1.0),
    ("trend", 0.8),
    ("trends", 0.8),
    ("outlook", 0.8),
    ("s p 500", 1.0),
    ("nasdaq", 1.0),
    ("dow", 1.0),
    ("sector", 0.6),
    ("volatility", 0.6),
    ("bullish", 0.8),
    ("bearish", 0.8),
];

const GOAL_RULES: &[(&str, f32)] = &[
    ("goal", 1.5),
    ("save for", 1.2),
    ("saving", 0.8),
    ("retire", 1.2),
    ("retirement", 1.0),
    ("emergency fund", 1.2),
    ("target", 0.6),
    ("how much", 0.6),
    ("plan", 0.8),
    ("college", 0.6),
];

const NEWS_RULES: &[(&str, f32)] = &[
    ("news", 1.5),
    ("headline", 1.2),
    ("headlines", 1.2),
    ("latest", 0.6),
    ("recent", 0.6),
    ("announcement", 0.8),
    ("earnings", 0.8),
    ("fed", 0.6),
    ("this week", 0.5),
    ("event", 0.5),
];

const TAX_RULES: &[(&str, f32)] = &[
    ("tax", 1.5),
    ("taxes", 1.5),
    ("401k", 1.2),
    ("401 k", 1.2),
    ("ira", 1.2),
    ("roth", 1.2),
    ("hsa", 1.0),
    ("deduction", 1.0),
    ("capital gains", 1.2),
    ("tax loss harvesting", 1.0),
    ("contribution limit", 1.0),
    ("filing", 0.6),
];

/// Rule groups in tie-break priority order.
const RULE_GROUPS: [(IntentKind, &[(&str, f32)]); 6] = [
    (IntentKind::Education, EDUCATION_RULES),
    (IntentKind::Portfolio, PORTFOLIO_RULES),
    (IntentKind::Market, MARKET_RULES),
    (IntentKind::GoalPlanning, GOAL_RULES),
    (IntentKind::News, NEWS_RULES),
    (IntentKind::Tax, TAX_RULES),
];

/// Upper-case words that look like tickers but are not.
const NOT_SYMBOLS: &[&str] = &[
    "A", "I", "AI", "AM", "AN", "AND", "APR", "APY", "ARE", "AS", "AT", "ATM", "BE", "CD", "CDS",
    "CEO", "CFO", "CPI", "DO", "EPS", "ESG", "ETF", "ETFS", "EU", "FAQ", "FDIC", "FED", "FOR",
    "FX", "GDP", "HOW", "HSA", "IN", "IPO", "IRA", "IRS", "IS", "IT", "LLC", "ME", "MY", "NAV",
    "NO", "NYSE", "OF", "OK", "ON", "OR", "OTC", "PE", "REIT", "ROI", "ROTH", "SEC", "SO", "SP",
    "THE", "TO", "UK", "US", "USA", "USD", "WE", "WHAT", "YOY", "YTD",
];

lazy_static! {
    static ref HOLDING_RE: Regex =
        Regex::new(r"\b([A-Z]{1,5}(?:\.[A-Z])?)(?:\s*[:x]\s*|\s+)(-?\d+(?:\.\d+)?)\b")
            .expect("holding pattern");
    static ref SHARES_OF_RE: Regex =
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s+shares?\s+(?:of\s+)?\$?([A-Za-z]{1,5})\b")
            .expect("shares-of pattern");
    static ref TICKER_RE: Regex =
        Regex::new(r"\b([A-Z]{2,5}(?:\.[A-Z])?)\b").expect("ticker pattern");
    static ref DOLLAR_TICKER_RE: Regex =
        Regex::new(r"\$([A-Za-z]{1,5})\b").expect("dollar ticker pattern");
    static ref DOLLAR_AMOUNT_RE: Regex =
        Regex::new(r"(?i)\$\s?(\d[\d,]*(?:\.\d+)?)\s*(k|m|thousand|million)?\b")
            .expect("dollar amount pattern");
    static ref WORD_AMOUNT_RE: Regex =
        Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?)\s*(k|m|thousand|million)?\s*(?:dollars|usd)\b")
            .expect("word amount pattern");
    static ref TIMEFRAME_RE: Regex =
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(years?|yrs?|months?)\b").expect("timeframe pattern");
}

/// Deterministic scored rule engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> Intent {
        let scores = self.scores(query);
        let total: f32 = scores.iter().map(|(_, s)| s).sum();

        let mut best = (IntentKind::Education, 0.0f32);
        for (kind, score) in scores {
            if score > best.1 {
                best = (kind, score);
            }
        }

        let confidence = if total > 0.0 { best.1 / total } else { 0.0 };

        Intent {
            kind: best.0,
            confidence,
            parameters: extract_parameters(query),
        }
    }

    /// Aggregate score per intent, in priority order.
    pub fn scores(&self, query: &str) -> [(IntentKind, f32); 6] {
        let text = normalize(query);
        RULE_GROUPS.map(|(kind, rules)| {
            let score = rules
                .iter()
                .filter(|(phrase, _)| contains_phrase(&text, phrase))
                .map(|(_, weight)| weight)
                .sum::<f32>();
            (kind, score)
        })
    }
}

/// Lower-case, non-alphanumerics to single spaces, padded with one space on
/// each side so phrases can be matched on word boundaries.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    format!(" {} ", words.join(" "))
}

/// Whole-word phrase match against `normalize`d text.
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}

// =============================
// Parameter extraction
// =============================

pub fn extract_parameters(query: &str) -> IntentParameters {
    let normalized = normalize(query);
    let holdings = extract_holdings(query);

    let mut symbols: Vec<String> = Vec::new();
    let mut push_symbol = |symbol: String| {
        if !NOT_SYMBOLS.contains(&symbol.as_str()) && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    };
    for holding in &holdings {
        push_symbol(holding.symbol.clone());
    }
    for caps in DOLLAR_TICKER_RE.captures_iter(query) {
        push_symbol(caps[1].to_uppercase());
    }
    for caps in TICKER_RE.captures_iter(query) {
        if let Some(m) = caps.get(1) {
            if !preceded_by(query, m.start(), '&') {
                push_symbol(m.as_str().to_string());
            }
        }
    }

    IntentParameters {
        holdings,
        symbols,
        goal_amount: extract_amount(query),
        timeframe_months: extract_timeframe(query),
        risk_tolerance: extract_risk(&normalized),
        goal_type: extract_goal_type(&normalized),
    }
}

fn preceded_by(text: &str, index: usize, c: char) -> bool {
    text[..index].ends_with(c)
}

fn extract_holdings(query: &str) -> Vec<Holding> {
    let mut holdings = Vec::new();

    for caps in HOLDING_RE.captures_iter(query) {
        let (Some(symbol), Some(qty)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if NOT_SYMBOLS.contains(&symbol.as_str()) || preceded_by(query, symbol.start(), '&') {
            continue;
        }
        if let Ok(quantity) = qty.as_str().parse::<f64>() {
            holdings.push(Holding {
                symbol: symbol.as_str().to_string(),
                quantity,
            });
        }
    }

    for caps in SHARES_OF_RE.captures_iter(query) {
        let symbol = caps[2].to_uppercase();
        if NOT_SYMBOLS.contains(&symbol.as_str()) || holdings.iter().any(|h| h.symbol == symbol) {
            continue;
        }
        if let Ok(quantity) = caps[1].parse::<f64>() {
            holdings.push(Holding { symbol, quantity });
        }
    }

    holdings
}

fn scale(number: &str, suffix: Option<&str>) -> Option<f64> {
    let value: f64 = number.replace(',', "").parse().ok()?;
    let factor = match suffix.map(|s| s.to_lowercase()).as_deref() {
        Some("k") | Some("thousand") => 1_000.0,
        Some("m") | Some("million") => 1_000_000.0,
        _ => 1.0,
    };
    Some(value * factor)
}

fn extract_amount(query: &str) -> Option<f64> {
    let caps = DOLLAR_AMOUNT_RE
        .captures(query)
        .or_else(|| WORD_AMOUNT_RE.captures(query))?;
    scale(&caps[1], caps.get(2).map(|m| m.as_str()))
}

fn extract_timeframe(query: &str) -> Option<u32> {
    let caps = TIMEFRAME_RE.captures(query)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    let months = if unit.starts_with('y') {
        value * 12.0
    } else {
        value
    };
    if months.is_finite() && months >= 0.0 && months <= u32::MAX as f64 {
        Some(months.round() as u32)
    } else {
        None
    }
}

fn extract_risk(normalized: &str) -> Option<RiskTolerance> {
    const LOW: &[&str] = &["conservative", "low risk", "risk averse", "safe"];
    const MEDIUM: &[&str] = &["moderate", "balanced", "medium risk"];
    const HIGH: &[&str] = &["aggressive", "high risk", "risk tolerant"];

    let any = |phrases: &[&str]| phrases.iter().any(|p| contains_phrase(normalized, p));
    if any(HIGH) {
        Some(RiskTolerance::High)
    } else if any(LOW) {
        Some(RiskTolerance::Low)
    } else if any(MEDIUM) {
        Some(RiskTolerance::Medium)
    } else {
        None
    }
}

fn extract_goal_type(normalized: &str) -> Option<GoalType> {
    const TYPES: &[(GoalType, &[&str])] = &[
        (GoalType::EmergencyFund, &["emergency fund", "emergency"]),
        (GoalType::Retirement, &["retire", "retirement", "retiring"]),
        (GoalType::Home, &["house", "home", "down payment", "mortgage"]),
        (GoalType::Education, &["college", "tuition", "school", "university"]),
    ];

    TYPES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(normalized, p)))
        .map(|(goal_type, _)| *goal_type)
}
