pub mod ledger_client {
    use std::future::Future;

    use log::debug;
    use reqwest::{RequestBuilder, Response, Url};
    use serde::de::DeserializeOwned;

    use crate::config::LedgerConfig;
    use crate::error::{LedgerError, LedgerResult};
    use crate::model::{
        BuyRequest, HoldingMap, HoldingQuantityResponse, OperationOutcome, OutcomeBody,
        SellRequest, StockMap, StockPriceResponse, TotalValueResponse, UserHoldingsResponse,
        UserMap,
    };

    /// The remote ledger's operations. Every call is a single round trip: no retries, no
    /// caching. Implementations report non-2xx responses as [`LedgerError::Status`].
    pub trait Client: Send + Sync + 'static {
        fn list_stocks(&self) -> impl Future<Output = LedgerResult<StockMap>> + Send;
        fn list_users(&self) -> impl Future<Output = LedgerResult<UserMap>> + Send;
        fn buy(
            &self,
            request: BuyRequest,
        ) -> impl Future<Output = LedgerResult<OperationOutcome>> + Send;
        fn sell(
            &self,
            request: SellRequest,
        ) -> impl Future<Output = LedgerResult<OperationOutcome>> + Send;
        fn holding_quantity(
            &self,
            username: &str,
            symbol: &str,
        ) -> impl Future<Output = LedgerResult<u64>> + Send;
        fn total_value(&self, username: &str) -> impl Future<Output = LedgerResult<f64>> + Send;
        fn user_holdings(
            &self,
            username: &str,
        ) -> impl Future<Output = LedgerResult<HoldingMap>> + Send;
        fn close_account(
            &self,
            username: &str,
        ) -> impl Future<Output = LedgerResult<OperationOutcome>> + Send;
        fn stock_price(&self, symbol: &str) -> impl Future<Output = LedgerResult<f64>> + Send;
        fn init_ledger(&self) -> impl Future<Output = LedgerResult<OperationOutcome>> + Send;
    }

    #[derive(Clone, Debug)]
    pub struct HttpClient {
        pub config: LedgerConfig,
        pub client: reqwest::Client,
    }

    impl HttpClient {
        pub fn new(config: LedgerConfig) -> Self {
            Self {
                config,
                client: reqwest::Client::new(),
            }
        }

        async fn read<T: DeserializeOwned>(&self, url: Url) -> LedgerResult<T> {
            let response = self.client.get(url.clone()).send().await?;
            let bytes = checked("GET", &url, response)?.bytes().await?;
            //An empty 2xx body reads as null, which only Option targets accept
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(serde_json::from_slice::<T>(b"null")?);
            }
            Ok(serde_json::from_slice::<T>(&bytes)?)
        }

        //Mutations answer with a variety of bodies, anything 2xx is a success even if we
        //can't make sense of what came back.
        async fn mutate(
            &self,
            method: &str,
            url: Url,
            request: RequestBuilder,
            fallback: String,
        ) -> LedgerResult<OperationOutcome> {
            let response = request.send().await?;
            let bytes = checked(method, &url, response)?.bytes().await?;
            let body = serde_json::from_slice::<OutcomeBody>(&bytes).unwrap_or_default();
            Ok(body.into_outcome(&fallback))
        }
    }

    fn checked(method: &str, url: &Url, response: Response) -> LedgerResult<Response> {
        let status = response.status();
        debug!("LEDGER: {method} {url} -> {status}");
        if status.is_success() {
            Ok(response)
        } else {
            Err(LedgerError::Status {
                code: status.as_u16(),
            })
        }
    }

    impl Client for HttpClient {
        async fn list_stocks(&self) -> LedgerResult<StockMap> {
            let url = self.config.endpoint(&["stocks"]);
            Ok(self.read::<Option<StockMap>>(url).await?.unwrap_or_default())
        }

        async fn list_users(&self) -> LedgerResult<UserMap> {
            let url = self.config.endpoint(&["users"]);
            Ok(self.read::<Option<UserMap>>(url).await?.unwrap_or_default())
        }

        async fn buy(&self, request: BuyRequest) -> LedgerResult<OperationOutcome> {
            let url = self.config.endpoint(&["buy"]);
            let fallback = format!(
                "{} bought {} shares of {}",
                request.username, request.amount, request.symbol
            );
            let builder = self.client.post(url.clone()).json(&request);
            self.mutate("POST", url, builder, fallback).await
        }

        async fn sell(&self, request: SellRequest) -> LedgerResult<OperationOutcome> {
            let url = self.config.endpoint(&["sell"]);
            let fallback = format!(
                "{} sold {} shares of {}",
                request.username, request.amount, request.symbol
            );
            let builder = self.client.post(url.clone()).json(&request);
            self.mutate("POST", url, builder, fallback).await
        }

        async fn holding_quantity(&self, username: &str, symbol: &str) -> LedgerResult<u64> {
            let url = self.config.endpoint(&["user", username, "stock", symbol]);
            let resp = self.read::<HoldingQuantityResponse>(url).await?;
            Ok(resp.quantity)
        }

        async fn total_value(&self, username: &str) -> LedgerResult<f64> {
            let url = self.config.endpoint(&["user", username, "value"]);
            let resp = self.read::<TotalValueResponse>(url).await?;
            Ok(resp.total_value)
        }

        async fn user_holdings(&self, username: &str) -> LedgerResult<HoldingMap> {
            let url = self.config.endpoint(&["user", username, "stocks"]);
            let resp = self.read::<Option<UserHoldingsResponse>>(url).await?;
            Ok(resp.map(UserHoldingsResponse::into_map).unwrap_or_default())
        }

        async fn close_account(&self, username: &str) -> LedgerResult<OperationOutcome> {
            let url = self.config.endpoint(&["user", username]);
            let builder = self.client.delete(url.clone());
            let fallback = format!("Account {username} closed successfully");
            self.mutate("DELETE", url, builder, fallback).await
        }

        async fn stock_price(&self, symbol: &str) -> LedgerResult<f64> {
            let url = self.config.endpoint(&["price", symbol]);
            let resp = self.read::<StockPriceResponse>(url).await?;
            Ok(resp.price)
        }

        async fn init_ledger(&self) -> LedgerResult<OperationOutcome> {
            let url = self.config.endpoint(&["init"]);
            let builder = self.client.post(url.clone());
            self.mutate("POST", url, builder, "Ledger initialized".to_string())
                .await
        }
    }
}

/// In-memory stand-in for the ledger backend, serving the same routes over actix-web. It holds
/// a snapshot and acknowledges mutations without doing any ledger accounting, which is all the
/// client needs to be exercised end to end.
pub mod ledger_stub {
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    use actix_web::http::StatusCode;
    use actix_web::{delete, get, post, web, HttpResponse, ResponseError};
    use derive_more::{Display, Error};
    use log::info;

    use crate::model::{
        BuyRequest, HoldingQuantityResponse, MessageResponse, SellRequest, StockInfo, StockMap,
        StockPriceResponse, TotalValueResponse, UserHoldingsResponse, UserInfo, UserMap,
    };

    pub type LedgerState = Mutex<AppState>;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum Route {
        Stocks,
        Users,
        Buy,
        Sell,
        HoldingQuantity,
        TotalValue,
        UserHoldings,
        CloseAccount,
        StockPrice,
        Init,
    }

    /// A request the stub accepted, in arrival order.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Recorded {
        Buy(BuyRequest),
        Sell(SellRequest),
        Close(String),
        Init,
    }

    pub struct AppState {
        pub stocks: StockMap,
        pub users: UserMap,
        pub recorded: Vec<Recorded>,
        seed: (StockMap, UserMap),
        failures: HashMap<Route, Fault>,
    }

    #[derive(Clone, Debug)]
    enum Fault {
        Status(u16),
        Body(String),
    }

    impl AppState {
        pub fn create(stocks: StockMap, users: UserMap) -> Self {
            Self {
                seed: (stocks.clone(), users.clone()),
                stocks,
                users,
                recorded: Vec::new(),
                failures: HashMap::new(),
            }
        }

        pub fn seeded() -> Self {
            let mut stocks = StockMap::new();
            for (symbol, price, quantity) in
                [("AAPL", 150.0, 1000), ("GOOG", 135.25, 800), ("MSFT", 320.5, 500)]
            {
                stocks.insert(
                    symbol.to_string(),
                    StockInfo {
                        symbol: symbol.to_string(),
                        price,
                        quantity,
                    },
                );
            }

            let mut users = UserMap::new();
            for (name, balance, holdings) in [
                ("alice", 10000.0, vec![("AAPL", 10)]),
                ("bob", 5000.0, vec![("MSFT", 5), ("GOOG", 2)]),
            ] {
                users.insert(
                    name.to_string(),
                    UserInfo {
                        name: name.to_string(),
                        balance,
                        stocks: holdings
                            .into_iter()
                            .map(|(symbol, qty)| (symbol.to_string(), qty))
                            .collect(),
                    },
                );
            }
            Self::create(stocks, users)
        }

        /// Every following request to `route` is answered with `status`.
        pub fn fail_route(&mut self, route: Route, status: u16) {
            self.failures.insert(route, Fault::Status(status));
        }

        /// Every following request to `route` is answered 200 with `body` verbatim.
        pub fn garble_route(&mut self, route: Route, body: &str) {
            self.failures.insert(route, Fault::Body(body.to_string()));
        }

        pub fn heal_route(&mut self, route: Route) {
            self.failures.remove(&route);
        }

        fn check(&self, route: Route) -> Result<(), StubError> {
            match self.failures.get(&route) {
                Some(Fault::Status(code)) => Err(StubError::Injected { code: *code }),
                Some(Fault::Body(body)) => Err(StubError::Garbled { body: body.clone() }),
                None => Ok(()),
            }
        }

        fn user(&self, username: &str) -> Result<&UserInfo, StubError> {
            self.users.get(username).ok_or(StubError::UnknownUser)
        }

        fn stock(&self, symbol: &str) -> Result<&StockInfo, StubError> {
            self.stocks.get(symbol).ok_or(StubError::UnknownStock)
        }

        fn reset(&mut self) {
            self.stocks = self.seed.0.clone();
            self.users = self.seed.1.clone();
        }
    }

    #[derive(Debug, Display, Error)]
    pub enum StubError {
        #[display("unknown user")]
        UnknownUser,
        #[display("unknown stock")]
        UnknownStock,
        #[display("amount must be positive")]
        InvalidAmount,
        #[display("injected failure {code}")]
        Injected { code: u16 },
        #[display("garbled body")]
        Garbled { body: String },
        #[display("ledger state unavailable")]
        Poisoned,
    }

    impl ResponseError for StubError {
        fn status_code(&self) -> StatusCode {
            match self {
                StubError::UnknownUser => StatusCode::NOT_FOUND,
                StubError::UnknownStock => StatusCode::NOT_FOUND,
                StubError::InvalidAmount => StatusCode::BAD_REQUEST,
                StubError::Injected { code } => {
                    StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }
                StubError::Garbled { .. } => StatusCode::OK,
                StubError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        fn error_response(&self) -> HttpResponse {
            match self {
                StubError::Garbled { body } => HttpResponse::Ok().body(body.clone()),
                _ => HttpResponse::build(self.status_code()).body(self.to_string()),
            }
        }
    }

    fn lock(app: &web::Data<LedgerState>) -> Result<MutexGuard<'_, AppState>, StubError> {
        app.lock().map_err(|_| StubError::Poisoned)
    }

    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.service(list_stocks)
            .service(list_users)
            .service(buy_stock)
            .service(sell_stock)
            .service(get_holding_quantity)
            .service(get_total_value)
            .service(get_user_holdings)
            .service(delete_user)
            .service(get_stock_price)
            .service(init_ledger);
    }

    #[get("/stocks")]
    pub async fn list_stocks(
        app: web::Data<LedgerState>,
    ) -> Result<web::Json<StockMap>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::Stocks)?;
        Ok(web::Json(ledger.stocks.clone()))
    }

    #[get("/users")]
    pub async fn list_users(
        app: web::Data<LedgerState>,
    ) -> Result<web::Json<UserMap>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::Users)?;
        Ok(web::Json(ledger.users.clone()))
    }

    #[post("/buy")]
    pub async fn buy_stock(
        app: web::Data<LedgerState>,
        req: web::Json<BuyRequest>,
    ) -> Result<web::Json<MessageResponse>, StubError> {
        let mut ledger = lock(&app)?;
        ledger.check(Route::Buy)?;
        ledger.user(&req.username)?;
        ledger.stock(&req.symbol)?;
        if req.amount == 0 {
            return Err(StubError::InvalidAmount);
        }
        info!("STUB: buy {} {} for {}", req.amount, req.symbol, req.username);
        ledger.recorded.push(Recorded::Buy(req.into_inner()));
        Ok(web::Json(MessageResponse {
            message: "Buy transaction submitted successfully".to_string(),
        }))
    }

    #[post("/sell")]
    pub async fn sell_stock(
        app: web::Data<LedgerState>,
        req: web::Json<SellRequest>,
    ) -> Result<web::Json<MessageResponse>, StubError> {
        let mut ledger = lock(&app)?;
        ledger.check(Route::Sell)?;
        ledger.user(&req.username)?;
        ledger.stock(&req.symbol)?;
        if req.amount == 0 {
            return Err(StubError::InvalidAmount);
        }
        info!("STUB: sell {} {} for {}", req.amount, req.symbol, req.username);
        ledger.recorded.push(Recorded::Sell(req.into_inner()));
        Ok(web::Json(MessageResponse {
            message: "Sell transaction submitted successfully".to_string(),
        }))
    }

    #[get("/user/{username}/stock/{stock_id}")]
    pub async fn get_holding_quantity(
        app: web::Data<LedgerState>,
        path: web::Path<(String, String)>,
    ) -> Result<web::Json<HoldingQuantityResponse>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::HoldingQuantity)?;
        let (username, stock_id) = path.into_inner();
        let user = ledger.user(&username)?;
        Ok(web::Json(HoldingQuantityResponse {
            quantity: user.stocks.get(&stock_id).copied().unwrap_or(0),
        }))
    }

    #[get("/user/{username}/value")]
    pub async fn get_total_value(
        app: web::Data<LedgerState>,
        path: web::Path<(String,)>,
    ) -> Result<web::Json<TotalValueResponse>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::TotalValue)?;
        let (username,) = path.into_inner();
        let user = ledger.user(&username)?;
        //Snapshot valuation only, the stub never moves balances
        let mut total = user.balance;
        for (symbol, quantity) in &user.stocks {
            if let Some(stock) = ledger.stocks.get(symbol) {
                total += stock.price * *quantity as f64;
            }
        }
        Ok(web::Json(TotalValueResponse { total_value: total }))
    }

    #[get("/user/{username}/stocks")]
    pub async fn get_user_holdings(
        app: web::Data<LedgerState>,
        path: web::Path<(String,)>,
    ) -> Result<web::Json<UserHoldingsResponse>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::UserHoldings)?;
        let (username,) = path.into_inner();
        let user = ledger.user(&username)?;
        Ok(web::Json(UserHoldingsResponse::Wrapped {
            stocks: user.stocks.clone(),
        }))
    }

    #[delete("/user/{username}")]
    pub async fn delete_user(
        app: web::Data<LedgerState>,
        path: web::Path<(String,)>,
    ) -> Result<web::Json<MessageResponse>, StubError> {
        let mut ledger = lock(&app)?;
        ledger.check(Route::CloseAccount)?;
        let (username,) = path.into_inner();
        if ledger.users.remove(&username).is_none() {
            return Err(StubError::UnknownUser);
        }
        info!("STUB: closed {username}");
        ledger.recorded.push(Recorded::Close(username.clone()));
        Ok(web::Json(MessageResponse {
            message: format!("Account {username} closed successfully"),
        }))
    }

    #[get("/price/{stock_id}")]
    pub async fn get_stock_price(
        app: web::Data<LedgerState>,
        path: web::Path<(String,)>,
    ) -> Result<web::Json<StockPriceResponse>, StubError> {
        let ledger = lock(&app)?;
        ledger.check(Route::StockPrice)?;
        let (stock_id,) = path.into_inner();
        let stock = ledger.stock(&stock_id)?;
        Ok(web::Json(StockPriceResponse { price: stock.price }))
    }

    #[post("/init")]
    pub async fn init_ledger(
        app: web::Data<LedgerState>,
    ) -> Result<web::Json<MessageResponse>, StubError> {
        let mut ledger = lock(&app)?;
        ledger.check(Route::Init)?;
        ledger.reset();
        ledger.recorded.push(Recorded::Init);
        Ok(web::Json(MessageResponse {
            message: "Ledger initialized".to_string(),
        }))
    }
}
