// dev-backend/src/main.rs
use common::{setup_tracing, Config};
use std::net::TcpListener;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    setup_tracing();

    let config = Config::from_env();
    let server_addr = config.dev_backend.addr.clone();

    tracing::info!("Starting dev backend on {}", server_addr);

    let listener = TcpListener::bind(&server_addr)?;
    dev_backend::serve(listener, &config)?.await
}
