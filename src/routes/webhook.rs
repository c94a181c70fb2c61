use actix_web::{HttpRequest, HttpResponse, Responder, web};

use crate::dto::WebhookResponseDto;
use crate::routes::processing_error;
use crate::services::webhooks::WebhookService;
use crate::stripe::SIGNATURE_HEADER;

fn rejected(message: impl std::fmt::Display) -> HttpResponse {
    log::error!("Webhook signature verification failed: {message}");
    HttpResponse::BadRequest()
        .content_type("text/plain; charset=utf-8")
        .body(format!("Webhook Error: {message}"))
}

pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    webhooks: web::Data<WebhookService>,
) -> impl Responder {
    let Some(signature) = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return rejected("missing stripe-signature header");
    };

    let event = match webhooks.verify(&body, signature) {
        Ok(event) => event,
        Err(err) => return rejected(err),
    };

    match webhooks.handle(&event).await {
        Ok(_) => HttpResponse::Ok().json(WebhookResponseDto {
            received: true,
            event_type: event.event_type,
        }),
        Err(err) => {
            log::error!("Webhook processing error: {err}");
            processing_error("Erreur interne", &err)
        }
    }
}

pub async fn method_not_allowed() -> impl Responder {
    HttpResponse::MethodNotAllowed()
        .content_type("text/plain; charset=utf-8")
        .body("Method Not Allowed")
}
