//! Bridges ledger calls to observable state.
//!
//! Every public operation spawns one task on the runtime handed to [`LedgerSync::new`] and
//! returns immediately. Results are never returned to the caller: they land in the slots and
//! channels of [`SyncState`]. A task catches its own failures and publishes them on
//! `errors`, so one failing call never takes down another or the host.
//!
//! Reads replace a slot wholesale. Mutations that succeed are followed, on the same task, by a
//! full re-read of stocks and users (and the acting user's holdings for buy/sell), so what is
//! observed is always the last successful server read and never patched locally. The
//! confirmation is published once that re-read is done. A 2xx answer that reports
//! `success: false` is a failure: it goes to `errors` and nothing is re-read.
//!
//! A task cancelled by [`LedgerSync::shutdown`] mid-fetch puts the slot back the way a failed
//! fetch would.
//!
//! Overlapping refreshes are not coalesced: each slot keeps whichever response was applied
//! last.
pub mod store;

use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Failure, LedgerError, LedgerResult, Operation};
use crate::http::ledger::ledger_client::Client;
use crate::model::{
    selected, BuyRequest, Holdings, OperationOutcome, SellRequest, StockMap, UserMap,
};

pub use store::{Load, Slot, SlotState, Store, SubscriptionId};

/// Informational message, kept apart from failures.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub operation: Operation,
    pub message: String,
}

#[derive(Default)]
pub struct SyncState {
    pub stocks: Slot<StockMap>,
    pub users: Slot<UserMap>,
    pub holdings: Slot<Holdings>,
    pub notifications: Store<Option<Notice>>,
    pub errors: Store<Option<Failure>>,
}

pub struct LedgerSync<C: Client> {
    client: Arc<C>,
    state: Arc<SyncState>,
    runtime: Handle,
    cancel: CancellationToken,
}

impl<C: Client> Clone for LedgerSync<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            state: Arc::clone(&self.state),
            runtime: self.runtime.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<C: Client> LedgerSync<C> {
    pub fn new(client: C, runtime: Handle) -> Self {
        Self {
            client: Arc::new(client),
            state: Arc::new(SyncState::default()),
            runtime,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Cancels every in-flight task started through this instance or its clones. Operations
    /// issued afterwards are dropped.
    pub fn shutdown(&self) {
        info!("SYNC: shutting down");
        self.cancel.cancel();
    }

    pub fn refresh_all(&self) -> JoinHandle<()> {
        let this = self.clone();
        self.spawn(async move { this.run_refresh_all().await })
    }

    pub fn refresh_holdings(&self, username: &str) -> JoinHandle<()> {
        let this = self.clone();
        let username = username.to_string();
        self.spawn(async move {
            match selected(&username, "Select a user") {
                Ok(username) => this.run_refresh_holdings(&username).await,
                Err(err) => this.fail(Operation::LoadHoldings, err),
            }
        })
    }

    /// Validated locally first: a rejected request never reaches the network.
    pub fn buy(&self, username: &str, symbol: &str, amount: i64, payment: f64) -> JoinHandle<()> {
        let this = self.clone();
        let request = BuyRequest::new(username, symbol, amount, payment);
        self.spawn(async move {
            match request {
                Ok(request) => this.run_buy(request).await,
                Err(err) => this.fail(Operation::Buy, err),
            }
        })
    }

    /// Buys at the price from the last stocks read, for callers that don't quote a payment.
    pub fn buy_at_market(&self, username: &str, symbol: &str, amount: i64) -> JoinHandle<()> {
        let this = self.clone();
        let (username, symbol) = (username.to_string(), symbol.to_string());
        self.spawn(async move {
            let request = selected(&username, "Select a user")
                .and_then(|_| selected(&symbol, "Select a stock"))
                .and_then(|_| this.market_payment(&symbol, amount))
                .and_then(|payment| BuyRequest::new(&username, &symbol, amount, payment));
            match request {
                Ok(request) => this.run_buy(request).await,
                Err(err) => this.fail(Operation::Buy, err),
            }
        })
    }

    pub fn sell(&self, username: &str, symbol: &str, amount: i64) -> JoinHandle<()> {
        let this = self.clone();
        let request = SellRequest::new(username, symbol, amount);
        self.spawn(async move {
            match request {
                Ok(request) => this.run_sell(request).await,
                Err(err) => this.fail(Operation::Sell, err),
            }
        })
    }

    pub fn query_holding_quantity(&self, username: &str, symbol: &str) -> JoinHandle<()> {
        let this = self.clone();
        let (username, symbol) = (username.to_string(), symbol.to_string());
        self.spawn(async move {
            let op = Operation::HoldingQuantity;
            let checked = selected(&username, "Select a user")
                .and_then(|_| selected(&symbol, "Select a stock"));
            if let Err(err) = checked {
                return this.fail(op, err);
            }
            match this.client.holding_quantity(&username, &symbol).await {
                Ok(quantity) => {
                    this.notify(op, format!("User {username} holds {quantity} shares of {symbol}"))
                }
                Err(err) => this.fail(op, err),
            }
        })
    }

    pub fn query_total_value(&self, username: &str) -> JoinHandle<()> {
        let this = self.clone();
        let username = username.to_string();
        self.spawn(async move {
            let op = Operation::TotalValue;
            if let Err(err) = selected(&username, "Select a user") {
                return this.fail(op, err);
            }
            match this.client.total_value(&username).await {
                Ok(value) => this.notify(op, format!("User {username} total value: ${value:.2}")),
                Err(err) => this.fail(op, err),
            }
        })
    }

    pub fn query_stock_price(&self, symbol: &str) -> JoinHandle<()> {
        let this = self.clone();
        let symbol = symbol.to_string();
        self.spawn(async move {
            let op = Operation::StockPrice;
            if let Err(err) = selected(&symbol, "Select a stock") {
                return this.fail(op, err);
            }
            match this.client.stock_price(&symbol).await {
                Ok(price) => this.notify(op, format!("Stock {symbol} price: ${price:.2}")),
                Err(err) => this.fail(op, err),
            }
        })
    }

    pub fn close_account(&self, username: &str) -> JoinHandle<()> {
        let this = self.clone();
        let username = username.to_string();
        self.spawn(async move {
            let op = Operation::CloseAccount;
            if let Err(err) = selected(&username, "Select a user") {
                return this.fail(op, err);
            }
            let closed = this.client.close_account(&username).await;
            match closed.and_then(OperationOutcome::accepted) {
                Ok(_) => {
                    this.run_refresh_all().await;
                    this.notify(op, format!("Account {username} closed successfully"));
                }
                Err(err) => this.fail(op, err),
            }
        })
    }

    pub fn init_ledger(&self) -> JoinHandle<()> {
        let this = self.clone();
        self.spawn(async move {
            match this.client.init_ledger().await.and_then(OperationOutcome::accepted) {
                Ok(outcome) => {
                    this.run_refresh_all().await;
                    this.notify(Operation::InitLedger, outcome.message);
                }
                Err(err) => this.fail(Operation::InitLedger, err),
            }
        })
    }

    fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => debug!("SYNC: task cancelled"),
                _ = task => {}
            }
        })
    }

    async fn run_refresh_all(&self) {
        //The two reads fail independently
        tokio::join!(self.run_refresh_stocks(), self.run_refresh_users());
    }

    async fn run_refresh_stocks(&self) {
        let load = self.state.stocks.begin_load();
        match self.client.list_stocks().await {
            Ok(stocks) => {
                info!("SYNC: loaded {} stocks", stocks.len());
                load.finish(stocks);
            }
            Err(err) => {
                load.abandon();
                self.fail(Operation::LoadStocks, err);
            }
        }
    }

    async fn run_refresh_users(&self) {
        let load = self.state.users.begin_load();
        match self.client.list_users().await {
            Ok(users) => {
                info!("SYNC: loaded {} users", users.len());
                load.finish(users);
            }
            Err(err) => {
                load.abandon();
                self.fail(Operation::LoadUsers, err);
            }
        }
    }

    async fn run_refresh_holdings(&self, username: &str) {
        let load = self.state.holdings.begin_load();
        match self.client.user_holdings(username).await {
            Ok(stocks) => {
                info!("SYNC: loaded {} holdings for {username}", stocks.len());
                load.finish(Holdings::new(username, stocks));
            }
            Err(err) => {
                load.abandon();
                self.fail(Operation::LoadHoldings, err);
            }
        }
    }

    async fn run_buy(&self, request: BuyRequest) {
        let username = request.username.clone();
        match self.client.buy(request).await.and_then(OperationOutcome::accepted) {
            Ok(outcome) => {
                self.run_refresh_all().await;
                self.run_refresh_holdings(&username).await;
                self.notify(Operation::Buy, outcome.message);
            }
            Err(err) => self.fail(Operation::Buy, err),
        }
    }

    async fn run_sell(&self, request: SellRequest) {
        let username = request.username.clone();
        match self.client.sell(request).await.and_then(OperationOutcome::accepted) {
            Ok(outcome) => {
                self.run_refresh_all().await;
                self.run_refresh_holdings(&username).await;
                self.notify(Operation::Sell, outcome.message);
            }
            Err(err) => self.fail(Operation::Sell, err),
        }
    }

    fn market_payment(&self, symbol: &str, amount: i64) -> LedgerResult<f64> {
        let price = self
            .state
            .stocks
            .current()
            .and_then(|stocks| stocks.get(symbol).map(|stock| stock.price))
            .ok_or_else(|| LedgerError::validation(format!("No price known for {symbol}")))?;
        Ok(price * amount as f64)
    }

    fn notify(&self, operation: Operation, message: String) {
        info!("SYNC: {message}");
        self.state.notifications.set(Some(Notice { operation, message }));
    }

    fn fail(&self, operation: Operation, error: LedgerError) {
        let failure = Failure::new(operation, error);
        warn!("SYNC: {failure}");
        self.state.errors.set(Some(failure));
    }
}
