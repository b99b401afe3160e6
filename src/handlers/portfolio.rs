//! Portfolio analysis
//!
//! Holdings named in the query replace the session portfolio unless the
//! query says to add/buy (merge) or remove/sell (drop the named symbols).
//! Advice questions ("Should I sell AAPL?") leave the portfolio alone.

use crate::classifier::{contains_phrase, normalize};
use crate::error::AssistantError;
use crate::handlers::{
    describe_holdings, format_money, format_quantity, generate_answer, Handler, HandlerOutcome,
    HandlerRequest,
};
use crate::llm::TextGenerator;
use crate::market::MarketData;
use crate::models::{IntentKind, Portfolio};
use crate::rag::{ContextBlock, StructuredData};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

const GUIDANCE: &str = "Role: portfolio analyst.
- Assess diversification and concentration risk
- Comment on sector and asset-class balance in general terms
- Suggest improvements as principles, never as specific trades
- Close with a short risk reminder";

pub const HOLDINGS_PROMPT: &str = "I don't have any holdings for you yet. \
Tell me what you own as SYMBOL quantity pairs, for example: \"AAPL 10, MSFT 5\".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortfolioAction {
    Replace,
    Add,
    Remove,
    Keep,
}

const REMOVE_COMMANDS: &[&str] = &["remove", "sell", "drop", "delete"];
const ADD_COMMANDS: &[&str] = &["add", "buy"];
const REMOVE_REPORTS: &[&str] = &["sold", "removed", "dropped", "deleted"];
const ADD_REPORTS: &[&str] = &["bought", "added", "purchased"];

/// Phrasings that ask for advice rather than record a trade.
const ADVISORY_PHRASES: &[&str] = &[
    "should i",
    "should we",
    "would it",
    "would you",
    "could i",
    "can i",
    "what if",
    "do you think",
    "thinking about",
    "considering",
    "is it worth",
    "is it a good",
];

/// Phrasings that state the full set of holdings.
const HOLDINGS_PHRASES: &[&str] = &[
    "i own",
    "i hold",
    "i have",
    "my holdings are",
    "my portfolio is",
];

/// Verb at the start of the query, after an optional "please".
fn leading_verb<'a>(words: &[&'a str]) -> Option<&'a str> {
    match words {
        ["please", verb, ..] | [verb, ..] if *verb != "please" => Some(*verb),
        _ => None,
    }
}

/// True when "i" or "we" is followed, within three words, by one of `verbs`
/// ("I sold", "I just bought", "we have added").
fn reports(words: &[&str], verbs: &[&str]) -> bool {
    words.iter().enumerate().any(|(i, word)| {
        matches!(*word, "i" | "we")
            && words[i + 1..]
                .iter()
                .take(3)
                .any(|next| verbs.contains(next))
    })
}

/// Portfolio edits happen only on explicit commands ("Sell AAPL") or
/// first-person reports ("I sold AAPL"). Questions never edit.
fn detect_action(query: &str, has_holdings: bool, has_symbols: bool) -> PortfolioAction {
    let text = normalize(query);
    let words: Vec<&str> = text.split_whitespace().collect();
    let advisory = ADVISORY_PHRASES.iter().any(|p| contains_phrase(&text, p));
    let question = advisory || query.contains('?');
    let command = leading_verb(&words).filter(|_| !question);
    let lists_holdings = {
        let lower = query.to_lowercase();
        lower.contains("portfolio:")
            || lower.contains("holdings:")
            || HOLDINGS_PHRASES.iter().any(|p| contains_phrase(&text, p))
    };

    let removes = reports(&words, REMOVE_REPORTS)
        || command.is_some_and(|verb| REMOVE_COMMANDS.contains(&verb));
    let adds =
        reports(&words, ADD_REPORTS) || command.is_some_and(|verb| ADD_COMMANDS.contains(&verb));

    if has_symbols && removes && !advisory {
        PortfolioAction::Remove
    } else if has_holdings && adds && !advisory {
        PortfolioAction::Add
    } else if has_holdings && (!advisory || lists_holdings) {
        PortfolioAction::Replace
    } else {
        PortfolioAction::Keep
    }
}

/// The portfolio this turn works with, and whether it differs from the
/// session's.
fn resolve_portfolio(request: &HandlerRequest<'_>) -> Result<(Portfolio, bool)> {
    let params = &request.intent.parameters;
    let current = request.session.portfolio();
    let action = detect_action(
        request.query,
        !params.holdings.is_empty(),
        !params.symbols.is_empty(),
    );

    let next = match action {
        PortfolioAction::Keep => return Ok((current.clone(), false)),
        PortfolioAction::Replace => Portfolio::from_holdings(&params.holdings)?,
        PortfolioAction::Add => {
            let mut next = current.clone();
            for holding in &params.holdings {
                next.add(&holding.symbol, holding.quantity)?;
            }
            next
        }
        PortfolioAction::Remove => {
            let held: Vec<&String> = params
                .symbols
                .iter()
                .filter(|symbol| current.quantity(symbol).is_some())
                .collect();
            if held.is_empty() {
                return Err(AssistantError::Validation(format!(
                    "{} is not in the portfolio",
                    params.symbols.join(", ")
                )));
            }
            let mut next = current.clone();
            for symbol in held {
                next.remove(symbol)?;
            }
            next
        }
    };

    debug!(?action, holdings = next.len(), "Resolved portfolio");
    let changed = &next != current;
    Ok((next, changed))
}

pub struct PortfolioHandler {
    generator: TextGenerator,
    market: Option<Arc<MarketData>>,
}

impl PortfolioHandler {
    pub fn new(generator: TextGenerator, market: Option<Arc<MarketData>>) -> Self {
        Self { generator, market }
    }

    async fn valuation(
        &self,
        market: &MarketData,
        portfolio: &Portfolio,
        newly_named: &[String],
    ) -> Result<Option<StructuredData>> {
        let symbols: Vec<String> = portfolio.symbols().map(str::to_string).collect();
        let mut lines = Vec::new();
        let mut total = 0.0;

        for (symbol, quote) in market.quotes(&symbols).await {
            match quote {
                Ok(quote) => {
                    let quantity = portfolio.quantity(&symbol).unwrap_or(0.0);
                    let value = quote.price * quantity;
                    total += value;
                    lines.push((symbol, quantity, quote.price, value));
                }
                Err(AssistantError::NotFound(_)) if newly_named.contains(&symbol) => {
                    return Err(AssistantError::Validation(format!(
                        "Unknown stock symbol: {}",
                        symbol
                    )));
                }
                Err(_) => {}
            }
        }

        if lines.is_empty() {
            return Ok(None);
        }

        let mut body = format!("Total value: ${}\n", format_money(total));
        for (symbol, quantity, price, value) in lines {
            let weight = if total > 0.0 { value / total * 100.0 } else { 0.0 };
            body.push_str(&format!(
                "- {}: {} shares @ ${} = ${} ({:.1}% of portfolio)\n",
                symbol,
                format_quantity(quantity),
                format_money(price),
                format_money(value),
                weight
            ));
        }
        Ok(Some(StructuredData::new("Portfolio valuation", body)))
    }
}

#[async_trait]
impl Handler for PortfolioHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::Portfolio
    }

    fn retrieval_focus(&self) -> Option<&str> {
        Some("portfolio diversification risk management")
    }

    async fn gather(&self, request: &HandlerRequest<'_>) -> Result<Vec<StructuredData>> {
        let (portfolio, _) = resolve_portfolio(request)?;
        if portfolio.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = vec![StructuredData::new(
            "Portfolio holdings",
            describe_holdings(&portfolio),
        )];

        if let Some(market) = &self.market {
            let named: Vec<String> = request
                .intent
                .parameters
                .holdings
                .iter()
                .map(|h| h.symbol.clone())
                .collect();
            if let Some(valuation) = self.valuation(market, &portfolio, &named).await? {
                data.push(valuation);
            }
        }

        Ok(data)
    }

    async fn handle(
        &self,
        request: &HandlerRequest<'_>,
        context: &ContextBlock,
    ) -> Result<HandlerOutcome> {
        let (portfolio, changed) = resolve_portfolio(request)?;

        if portfolio.is_empty() {
            info!("No holdings known; asking the user for them");
            let mut outcome = HandlerOutcome::text(HOLDINGS_PROMPT);
            if changed {
                outcome.update.portfolio = Some(portfolio);
            }
            return Ok(outcome);
        }

        let answer = generate_answer(&self.generator, GUIDANCE, request.query, context).await?;
        let mut outcome = HandlerOutcome::text(answer);
        if changed {
            outcome.update.portfolio = Some(portfolio);
        }
        Ok(outcome)
    }
}
