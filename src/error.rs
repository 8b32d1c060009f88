use derive_more::{Display, Error};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every way a call against the ledger can fail.
///
/// Non-2xx responses are the only application-level signal the ledger gives us, so `Status`
/// carries nothing but the code. Everything that goes wrong below HTTP, including a body that
/// does not decode, is a `Transport` failure.
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum LedgerError {
    #[display("{cause}")]
    Transport { cause: String },
    #[display("{code}")]
    Status { code: u16 },
    #[display("{reason}")]
    Validation { reason: String },
    /// A 2xx answer whose body says the operation did not go through.
    #[display("{reason}")]
    Rejected { reason: String },
    #[display("invalid configuration: {reason}")]
    Config { reason: String },
}

impl LedgerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            LedgerError::Status { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport {
            cause: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Transport {
            cause: format!("malformed response: {err}"),
        }
    }
}

/// The user-visible operations the synchronization layer runs. Used to label failures and
/// notifications.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Operation {
    #[display("load stocks")]
    LoadStocks,
    #[display("load users")]
    LoadUsers,
    #[display("load user stocks")]
    LoadHoldings,
    #[display("buy stock")]
    Buy,
    #[display("sell stock")]
    Sell,
    #[display("get stock count")]
    HoldingQuantity,
    #[display("get total value")]
    TotalValue,
    #[display("get stock price")]
    StockPrice,
    #[display("close account")]
    CloseAccount,
    #[display("initialize ledger")]
    InitLedger,
}

impl Operation {
    fn progressive(&self) -> &'static str {
        match self {
            Operation::LoadStocks => "loading stocks",
            Operation::LoadUsers => "loading users",
            Operation::LoadHoldings => "loading user stocks",
            Operation::Buy => "buying stock",
            Operation::Sell => "selling stock",
            Operation::HoldingQuantity => "getting stock count",
            Operation::TotalValue => "getting total value",
            Operation::StockPrice => "getting stock price",
            Operation::CloseAccount => "closing account",
            Operation::InitLedger => "initializing ledger",
        }
    }
}

/// A failed operation as published on the errors channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    pub operation: Operation,
    pub error: LedgerError,
}

impl Failure {
    pub fn new(operation: Operation, error: LedgerError) -> Self {
        Self { operation, error }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            LedgerError::Status { code } => write!(f, "Failed to {}: {code}", self.operation),
            LedgerError::Transport { cause } => {
                write!(f, "Network error {}: {cause}", self.operation.progressive())
            }
            LedgerError::Validation { reason } => write!(f, "{reason}"),
            LedgerError::Rejected { reason } => {
                write!(f, "Failed to {}: {reason}", self.operation)
            }
            LedgerError::Config { reason } => {
                write!(f, "Cannot {}: invalid configuration: {reason}", self.operation)
            }
        }
    }
}
