use std::env;
use std::sync::Mutex;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use stockledger::http::ledger::ledger_stub::{configure, AppState};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = env::args().collect();
    let address = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = match args.get(2) {
        Some(port) => port.parse().context("port must be a number")?,
        None => 8080,
    };

    let app_state = web::Data::new(Mutex::new(AppState::seeded()));

    log::info!("STUB: serving seeded ledger on {address}:{port}");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((address, port))?
    .run()
    .await?;
    Ok(())
}
