mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::{creem::CheckoutProvider, env_config::Config};
use db::{MemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup(&config.log_file).expect("Failed to set up logger");
    }

    // init subscription store
    let store: Arc<dyn SubscriptionStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::setup(database_url, config.is_production())
                .await
                .expect("Failed to set up database");
            Arc::new(PgSubscriptionStore::new(pool))
        }
        None => {
            log::warn!("DATABASE_URL not set, subscriptions are kept in memory");
            Arc::new(MemorySubscriptionStore::new())
        }
    };

    // init Creem client
    let provider: Arc<dyn CheckoutProvider> =
        Arc::new(common::creem::create_client(&config.creem));
    if config.creem.api_key.is_none() {
        log::warn!("CREEM_API_KEY not set, checkout creation will fail");
    }
    if config.creem.webhook_secret.is_none() {
        log::warn!("CREEM_WEBHOOK_SECRET not set, webhooks will be rejected");
    }

    log::info!(
        "Starting server on {}:{}",
        config.server_host,
        config.server_port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(provider.clone()))
            .app_data(common::http::json_config())
            .wrap(logger::middleware(config_data.console_logging_enabled)) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_subs::mount_webhook())
                    .service(
                        api_subs::mount_pay().wrap(api_auth::auth_middleware(config_data.clone())),
                    )
                    .service(
                        api_subs::mount_subscription()
                            .wrap(api_auth::auth_middleware(config_data.clone())),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
