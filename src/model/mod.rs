//! Records mirroring the ledger's wire schema.
//!
//! Everything here is created fresh from a response and never mutated afterwards. Maps are
//! `BTreeMap` so that two decodes of the same body compare, and iterate, identically.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub type Symbol = String;
pub type Username = String;

pub type StockMap = BTreeMap<Symbol, StockInfo>;
pub type UserMap = BTreeMap<Username, UserInfo>;
pub type HoldingMap = BTreeMap<Symbol, u64>;

/// A listed stock. `quantity` is the total outstanding, not anybody's holding.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StockInfo {
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: u64,
}

/// Snapshot of one account.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserInfo {
    pub name: Username,
    pub balance: f64,
    #[serde(default)]
    pub stocks: HoldingMap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: u64,
}

/// One user's portfolio as last read from the ledger.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Holdings {
    pub username: Username,
    pub stocks: HoldingMap,
}

impl Holdings {
    pub fn new(username: impl Into<Username>, stocks: HoldingMap) -> Self {
        Self {
            username: username.into(),
            stocks,
        }
    }

    pub fn quantity(&self, symbol: &str) -> u64 {
        self.stocks.get(symbol).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Holding> + '_ {
        self.stocks.iter().map(|(symbol, quantity)| Holding {
            symbol: symbol.clone(),
            quantity: *quantity,
        })
    }
}

/// Validated buy order. The ledger expects the stock under `stock_id`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BuyRequest {
    pub username: Username,
    #[serde(rename = "stock_id")]
    pub symbol: Symbol,
    pub amount: u32,
    pub payment: f64,
}

impl BuyRequest {
    pub fn new(username: &str, symbol: &str, amount: i64, payment: f64) -> Result<Self, LedgerError> {
        let (username, symbol) = check_selection(username, symbol)?;
        let amount = check_amount(amount)?;
        if !payment.is_finite() || payment <= 0.0 {
            return Err(LedgerError::validation("Enter a valid payment"));
        }
        Ok(Self {
            username,
            symbol,
            amount,
            payment,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SellRequest {
    pub username: Username,
    #[serde(rename = "stock_id")]
    pub symbol: Symbol,
    pub amount: u32,
}

impl SellRequest {
    pub fn new(username: &str, symbol: &str, amount: i64) -> Result<Self, LedgerError> {
        let (username, symbol) = check_selection(username, symbol)?;
        let amount = check_amount(amount)?;
        Ok(Self {
            username,
            symbol,
            amount,
        })
    }
}

/// Parses free-text quantity input. Empty, non-numeric and non-positive input are all rejected.
pub fn parse_amount(input: &str) -> Result<i64, LedgerError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation("Enter an amount"));
    }
    match trimmed.parse::<i64>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(LedgerError::validation("Enter a valid amount")),
    }
}

fn check_amount(amount: i64) -> Result<u32, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::validation("Enter a valid amount"));
    }
    u32::try_from(amount).map_err(|_| LedgerError::validation("Amount is too large"))
}

/// Rejects an empty selection with `prompt` as the user-facing message.
pub fn selected(value: &str, prompt: &str) -> Result<String, LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(prompt));
    }
    Ok(value.to_string())
}

fn check_selection(username: &str, symbol: &str) -> Result<(Username, Symbol), LedgerError> {
    Ok((selected(username, "Select a user")?, selected(symbol, "Select a stock")?))
}

/// Result of a mutating call, ready for display.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Turns an answer that reports failure into [`LedgerError::Rejected`].
    pub fn accepted(self) -> Result<Self, LedgerError> {
        if self.success {
            Ok(self)
        } else {
            Err(LedgerError::Rejected {
                reason: self.message,
            })
        }
    }
}

/// Whatever a mutating endpoint chose to answer with. The ledger is inconsistent here: buy and
/// close answer `{message}`, sell answers `{revenue}`, some deployments answer
/// `{success, message}`.
#[derive(Debug, Default, Deserialize)]
pub struct OutcomeBody {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub revenue: Option<f64>,
}

impl OutcomeBody {
    pub fn into_outcome(self, fallback: &str) -> OperationOutcome {
        let message = match (self.message, self.revenue) {
            (Some(message), _) => message,
            (None, Some(revenue)) => format!("{fallback} (revenue ${revenue:.2})"),
            (None, None) => fallback.to_string(),
        };
        OperationOutcome {
            success: self.success.unwrap_or(true),
            message,
        }
    }
}

/// Body of `GET /user/{username}/stock/{symbol}`. Older servers answer `count`; an absent
/// holding is zero.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HoldingQuantityResponse {
    #[serde(default, alias = "count")]
    pub quantity: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TotalValueResponse {
    #[serde(rename = "totalValue")]
    pub total_value: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StockPriceResponse {
    pub price: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of `GET /user/{username}/stocks`, which comes either bare or wrapped in `stocks`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserHoldingsResponse {
    Wrapped { stocks: HoldingMap },
    Bare(HoldingMap),
}

impl UserHoldingsResponse {
    pub fn into_map(self) -> HoldingMap {
        match self {
            UserHoldingsResponse::Wrapped { stocks } => stocks,
            UserHoldingsResponse::Bare(stocks) => stocks,
        }
    }
}
