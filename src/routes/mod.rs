use actix_web::http::Method;
use actix_web::{HttpResponse, web};

use crate::dto::ErrorResponseDto;
use crate::middleware::CorsHeaders;
use crate::services::ServiceError;

pub mod upload;
pub mod webhook;

/// Stripe events are small JSON documents.
const WEBHOOK_BODY_LIMIT: usize = 1024 * 1024;

/// Register both endpoints.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/upload-csv")
            .wrap(CorsHeaders)
            .route(web::post().to(upload::upload_csv))
            .route(web::method(Method::OPTIONS).to(upload::preflight))
            .default_service(web::to(upload::method_not_allowed)),
    )
    .service(
        web::resource("/stripe-webhook")
            .app_data(web::PayloadConfig::new(WEBHOOK_BODY_LIMIT))
            .route(web::post().to(webhook::stripe_webhook))
            .default_service(web::to(webhook::method_not_allowed)),
    );
}

/// 500 with the uniform `{error, details}` body.
fn processing_error(error: &'static str, err: &ServiceError) -> HttpResponse {
    let mut body = ErrorResponseDto::with_details(error, err.to_string());
    if let ServiceError::Delivery(dispatch) = err {
        body.delivery = Some(dispatch.report.clone());
    }
    HttpResponse::InternalServerError().json(body)
}
