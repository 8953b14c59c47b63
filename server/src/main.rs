use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};

use server::auth::{Authenticator, TokenTable};
use server::connection::ws_index;
use server::server::{spawn_server, ServerOptions};
use server::store::InMemorySessionStore;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(system::serde_json::json!({ "status": "OK" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let store = Arc::new(InMemorySessionStore::new());
    let srv_tx = spawn_server(store, ServerOptions::default());

    let authenticator: Arc<dyn Authenticator> = match env::var("AUTH_TOKENS_PATH") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let table = TokenTable::from_json(&raw)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            log::info!("loaded connection tokens from {}", path);
            Arc::new(table)
        }
        Err(_) => {
            log::warn!("AUTH_TOKENS_PATH not set; no connection token will be accepted");
            Arc::new(TokenTable::new())
        }
    };

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
    log::info!("listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .data(srv_tx.clone())
            .data(authenticator.clone())
            .route("/ws/", web::get().to(ws_index))
            .route("/health", web::get().to(health))
    })
    .bind(bind_addr)?
    .run()
    .await
}
