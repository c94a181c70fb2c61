//! Audit intake service: relays client CSV uploads and Stripe payment
//! events to the operator by email.
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};

use crate::mail::SmtpMailer;
use crate::models::config::ServerConfig;
use crate::services::notifications::NotificationDispatcher;
use crate::services::uploads::UploadService;
use crate::services::webhooks::WebhookService;
use crate::stripe::StripeVerifier;

pub mod domain;
pub mod dto;
pub mod forms;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod multipart;
pub mod routes;
pub mod services;
pub mod stripe;

/// Build the shared services and serve both endpoints until shutdown.
pub async fn run(server_config: ServerConfig) -> std::io::Result<()> {
    let mailer = SmtpMailer::new(&server_config.mail).map_err(std::io::Error::other)?;
    let dispatcher = Arc::new(NotificationDispatcher::new(
        &server_config,
        Arc::new(mailer),
    ));

    let uploads = web::Data::new(UploadService::new(
        dispatcher.clone(),
        server_config.upload.clone(),
    ));
    let webhooks = web::Data::new(WebhookService::new(
        Arc::new(StripeVerifier::new(&server_config.stripe)),
        dispatcher,
    ));

    let bind_address = (server_config.address.clone(), server_config.port);
    let server_config = web::Data::new(server_config);

    log::info!(
        "Listening on {}:{}, accepting uploads from {}",
        bind_address.0,
        bind_address.1,
        server_config.allowed_origin
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(server_config.clone())
            .app_data(uploads.clone())
            .app_data(webhooks.clone())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
