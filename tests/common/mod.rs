#![allow(dead_code)]

use std::future;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use actix_web::{web, App, HttpServer};
use stockledger::config::LedgerConfig;
use stockledger::error::{LedgerError, LedgerResult};
use stockledger::http::ledger::ledger_client::{Client, HttpClient};
use stockledger::http::ledger::ledger_stub::{configure, AppState, LedgerState};
use stockledger::model::{
    BuyRequest, HoldingMap, OperationOutcome, SellRequest, StockInfo, StockMap, UserInfo,
    UserMap,
};

/// Serves `state` on an ephemeral port and returns a client pointed at it.
pub fn spawn_stub(state: AppState) -> (HttpClient, web::Data<LedgerState>) {
    let data = web::Data::new(Mutex::new(state));
    let server_data = data.clone();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_data.clone())
            .configure(configure)
    })
    .workers(1)
    .listen(listener)
    .unwrap()
    .run();
    tokio::spawn(server);

    let config = LedgerConfig::from_address("127.0.0.1", port).unwrap();
    (HttpClient::new(config), data)
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn stock(symbol: &str, price: f64, quantity: u64) -> StockInfo {
    StockInfo {
        symbol: symbol.to_string(),
        price,
        quantity,
    }
}

pub fn user(name: &str, balance: f64, holdings: &[(&str, u64)]) -> UserInfo {
    UserInfo {
        name: name.to_string(),
        balance,
        stocks: holdings
            .iter()
            .map(|(symbol, qty)| (symbol.to_string(), *qty))
            .collect(),
    }
}

pub fn stocks(entries: Vec<StockInfo>) -> StockMap {
    entries
        .into_iter()
        .map(|stock| (stock.symbol.clone(), stock))
        .collect()
}

pub fn users(entries: Vec<UserInfo>) -> UserMap {
    entries
        .into_iter()
        .map(|user| (user.name.clone(), user))
        .collect()
}

pub fn status(code: u16) -> LedgerError {
    LedgerError::Status { code }
}

/// Answers every call from canned results and records the calls it received, in order.
pub struct ScriptedClient {
    calls: Mutex<Vec<String>>,
    /// While set, `list_stocks` never answers.
    pub stall_stocks: AtomicBool,
    pub stocks: Mutex<LedgerResult<StockMap>>,
    pub users: Mutex<LedgerResult<UserMap>>,
    pub holdings: Mutex<LedgerResult<HoldingMap>>,
    pub mutation: Mutex<LedgerResult<OperationOutcome>>,
    pub quantity: Mutex<LedgerResult<u64>>,
    pub value: Mutex<LedgerResult<f64>>,
    pub price: Mutex<LedgerResult<f64>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            stall_stocks: AtomicBool::new(false),
            stocks: Mutex::new(Ok(stocks(vec![stock("AAPL", 150.0, 1000)]))),
            users: Mutex::new(Ok(users(vec![
                user("alice", 10000.0, &[("AAPL", 10)]),
                user("bob", 5000.0, &[]),
            ]))),
            holdings: Mutex::new(Ok(HoldingMap::from([("AAPL".to_string(), 10)]))),
            mutation: Mutex::new(Ok(OperationOutcome::succeeded("ok"))),
            quantity: Mutex::new(Ok(7)),
            value: Mutex::new(Ok(11500.0)),
            price: Mutex::new(Ok(150.0)),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn answer<T: Clone>(&self, call: String, slot: &Mutex<LedgerResult<T>>) -> LedgerResult<T> {
        self.calls.lock().unwrap().push(call);
        let result = slot.lock().unwrap().clone();
        result
    }
}

pub fn script<T>(slot: &Mutex<LedgerResult<T>>, result: LedgerResult<T>) {
    *slot.lock().unwrap() = result;
}

impl Client for ScriptedClient {
    async fn list_stocks(&self) -> LedgerResult<StockMap> {
        if self.stall_stocks.load(Ordering::SeqCst) {
            self.calls.lock().unwrap().push("list_stocks".to_string());
            future::pending::<()>().await;
        }
        self.answer("list_stocks".to_string(), &self.stocks)
    }

    async fn list_users(&self) -> LedgerResult<UserMap> {
        self.answer("list_users".to_string(), &self.users)
    }

    async fn buy(&self, request: BuyRequest) -> LedgerResult<OperationOutcome> {
        let call = format!(
            "buy:{}:{}:{}:{}",
            request.username, request.symbol, request.amount, request.payment
        );
        self.answer(call, &self.mutation)
    }

    async fn sell(&self, request: SellRequest) -> LedgerResult<OperationOutcome> {
        let call = format!(
            "sell:{}:{}:{}",
            request.username, request.symbol, request.amount
        );
        self.answer(call, &self.mutation)
    }

    async fn holding_quantity(&self, username: &str, symbol: &str) -> LedgerResult<u64> {
        self.answer(format!("holding_quantity:{username}:{symbol}"), &self.quantity)
    }

    async fn total_value(&self, username: &str) -> LedgerResult<f64> {
        self.answer(format!("total_value:{username}"), &self.value)
    }

    async fn user_holdings(&self, username: &str) -> LedgerResult<HoldingMap> {
        self.answer(format!("user_holdings:{username}"), &self.holdings)
    }

    async fn close_account(&self, username: &str) -> LedgerResult<OperationOutcome> {
        self.answer(format!("close_account:{username}"), &self.mutation)
    }

    async fn stock_price(&self, symbol: &str) -> LedgerResult<f64> {
        self.answer(format!("stock_price:{symbol}"), &self.price)
    }

    async fn init_ledger(&self) -> LedgerResult<OperationOutcome> {
        self.answer("init_ledger".to_string(), &self.mutation)
    }
}
