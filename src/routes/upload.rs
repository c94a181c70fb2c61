use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Responder, web};

use crate::dto::{ErrorResponseDto, UploadResponseDto};
use crate::models::config::ServerConfig;
use crate::multipart::Body;
use crate::routes::processing_error;
use crate::services::uploads::UploadService;

const PROCESSING_ERROR: &str = "Erreur lors du traitement des fichiers";
const TRANSFER_ENCODING: &str = "content-transfer-encoding";

fn is_base64_transported(req: &HttpRequest) -> bool {
    req.headers()
        .get(TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("base64"))
}

pub async fn upload_csv(
    req: HttpRequest,
    payload: web::Payload,
    uploads: web::Data<UploadService>,
    server_config: web::Data<ServerConfig>,
) -> impl Responder {
    let limit = server_config.upload.max_request_size;
    let bytes = match payload.to_bytes_limited(limit).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => {
            log::error!("Failed to read upload body: {err}");
            return HttpResponse::InternalServerError().json(ErrorResponseDto::with_details(
                PROCESSING_ERROR,
                err.to_string(),
            ));
        }
        Err(_) => {
            log::error!("Upload body exceeds {limit} bytes");
            return HttpResponse::InternalServerError().json(ErrorResponseDto::with_details(
                PROCESSING_ERROR,
                format!("request body exceeds {limit} bytes"),
            ));
        }
    };

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let body = if is_base64_transported(&req) {
        Body::base64(&bytes)
    } else {
        Body::raw(&bytes)
    };

    match uploads.process(content_type, body).await {
        Ok(outcome) => HttpResponse::Ok().json(UploadResponseDto {
            success: true,
            message: "Fichiers uploadés avec succès",
            client_id: outcome.submission_id.to_string(),
            files_processed: outcome.files_processed,
        }),
        Err(err) => {
            log::error!("Upload error: {err}");
            processing_error(PROCESSING_ERROR, &err)
        }
    }
}

pub async fn preflight() -> impl Responder {
    HttpResponse::Ok().finish()
}

pub async fn method_not_allowed() -> impl Responder {
    HttpResponse::MethodNotAllowed().json(ErrorResponseDto::new("Method not allowed"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use crate::mail::testing::MemoryMailer;
    use crate::routes::configure;
    use crate::routes::test_support::state;

    const BODY: &str = concat!(
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"clientName\"\r\n\r\n",
        "Alice\r\n",
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"clientEmail\"\r\n\r\n",
        "alice@shop.fr\r\n",
        "--XYZ\r\n",
        "Content-Disposition: form-data; name=\"csvFiles\"; filename=\"data.csv\"\r\n",
        "Content-Type: text/csv\r\n\r\n",
        "a,b\n1,2\r\n",
        "--XYZ--\r\n"
    );

    fn assert_cors(headers: &actix_web::http::header::HeaderMap) {
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "https://yukibuy.com"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type"
        );
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "POST, OPTIONS"
        );
    }

    #[actix_web::test]
    async fn upload_succeeds_and_reports_client_id() {
        let mailer = Arc::new(MemoryMailer::default());
        let state = state(mailer.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.config)
                .app_data(state.uploads)
                .app_data(state.webhooks)
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/upload-csv")
            .insert_header(("Content-Type", "multipart/form-data; boundary=XYZ"))
            .set_payload(BODY)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_cors(resp.headers());
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["filesProcessed"], 1);
        let client_id = json["clientId"].as_str().unwrap().to_string();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].attachments[0].filename,
            format!("{client_id}_data.csv")
        );
    }

    #[actix_web::test]
    async fn base64_transported_upload_is_decoded() {
        let mailer = Arc::new(MemoryMailer::default());
        let state = state(mailer.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.config)
                .app_data(state.uploads)
                .app_data(state.webhooks)
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/upload-csv")
            .insert_header(("Content-Type", "multipart/form-data; boundary=XYZ"))
            .insert_header(("Content-Transfer-Encoding", "base64"))
            .set_payload(STANDARD.encode(BODY))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(mailer.sent()[0].attachments[0].bytes, b"a,b\n1,2");
    }

    #[actix_web::test]
    async fn missing_boundary_returns_error_body_with_cors() {
        let mailer = Arc::new(MemoryMailer::default());
        let state = state(mailer.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.config)
                .app_data(state.uploads)
                .app_data(state.webhooks)
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/upload-csv")
            .insert_header(("Content-Type", "multipart/form-data"))
            .set_payload(BODY)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(resp.headers());
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "Erreur lors du traitement des fichiers");
        assert!(json["details"].as_str().unwrap().contains("boundary"));
        assert!(mailer.sent().is_empty());
    }

    #[actix_web::test]
    async fn submitter_failure_exposes_delivery_report() {
        let mailer = Arc::new(MemoryMailer::failing_for("alice@shop.fr"));
        let state = state(mailer.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.config)
                .app_data(state.uploads)
                .app_data(state.webhooks)
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/upload-csv")
            .insert_header(("Content-Type", "multipart/form-data; boundary=XYZ"))
            .set_payload(BODY)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["delivery"]["operator"], "sent");
        assert_eq!(json["delivery"]["submitter"], "failed");
    }

    #[actix_web::test]
    async fn preflight_and_wrong_method() {
        let state = state(Arc::new(MemoryMailer::default()));
        let app = test::init_service(
            App::new()
                .app_data(state.config)
                .app_data(state.uploads)
                .app_data(state.webhooks)
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/upload-csv")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_cors(resp.headers());
        let body = test::read_body(resp).await;
        assert!(body.is_empty());

        let req = test::TestRequest::get().uri("/upload-csv").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(resp.headers());
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "Method not allowed");
    }
}
