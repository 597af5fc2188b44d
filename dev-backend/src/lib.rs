// dev-backend/src/lib.rs
//! Local stand-in for the auth endpoints of the Avio backend.
//!
//! Signatures are checked with [`common::digest_signature`], so only the
//! development wallet can log in here.

pub mod api;
pub mod nonce_registry;
pub mod utils;

use actix::Actor;
use actix_web::{dev::Server, web, App, HttpServer};
use common::Config;
use nonce_registry::NonceRegistryActor;
use std::net::{SocketAddr, TcpListener};

fn start(listener: TcpListener, config: &Config, handle_signals: bool) -> std::io::Result<Server> {
    let registry = NonceRegistryActor::new()
        .with_ttl(config.dev_backend.nonce_ttl_secs)
        .start();

    let registry_data = web::Data::new(registry);
    let settings_data = web::Data::new(api::AuthSettings::from(config));

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(registry_data.clone())
            .app_data(settings_data.clone())
            .configure(api::configure)
    })
    .workers(1);

    if !handle_signals {
        server = server.disable_signals();
    }

    Ok(server.listen(listener)?.run())
}

/// Serve on `listener` until the process is stopped. Must run inside an
/// actix system.
pub fn serve(listener: TcpListener, config: &Config) -> std::io::Result<Server> {
    start(listener, config, true)
}

/// Start the backend on its own thread and return the address it bound.
///
/// Binds `config.dev_backend.addr`; use port 0 for an ephemeral port.
pub fn spawn(config: Config) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(&config.dev_backend.addr)?;
    let addr = listener.local_addr()?;

    std::thread::Builder::new()
        .name("dev-backend".into())
        .spawn(move || {
            let system = actix::System::new();
            let result = system.block_on(async move {
                start(listener, &config, false)?.await
            });
            if let Err(e) = result {
                tracing::error!("Dev backend stopped: {}", e);
            }
        })?;

    tracing::info!("Dev backend listening on {}", addr);
    Ok(addr)
}
