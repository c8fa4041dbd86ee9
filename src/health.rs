use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn service_info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "running",
        "service": "Whisper Transcription Server",
        "model_loaded": state.model_loaded()
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "model_loaded": state.model_loaded()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let config = state.get_config();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "Whisper Transcription Server",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "model": {
            "size": config.model.size,
            "loaded": state.model_loaded(),
            "language": config.transcription.language,
            "fp16": config.transcription.fp16
        },
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_transcriptions": metrics.active_transcriptions,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::AppResult;
    use crate::transcription::{TranscribeOptions, TranscriptionOutput, Transcriber};
    use actix_web::{test, App};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct NullTranscriber;

    #[async_trait]
    impl Transcriber for NullTranscriber {
        async fn transcribe(
            &self,
            _path: &Path,
            _options: &TranscribeOptions,
        ) -> AppResult<TranscriptionOutput> {
            Ok(TranscriptionOutput {
                text: String::new(),
                language: None,
            })
        }
    }

    fn state(model_loaded: bool) -> AppState {
        let transcriber: Option<Arc<dyn Transcriber>> = if model_loaded {
            Some(Arc::new(NullTranscriber))
        } else {
            None
        };
        AppState::new(AppConfig::default(), transcriber)
    }

    #[actix_web::test]
    async fn test_service_info_payload() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(true)))
                .configure(crate::routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["status"], "running");
        assert_eq!(json["service"], "Whisper Transcription Server");
        assert_eq!(json["model_loaded"], true);
    }

    #[actix_web::test]
    async fn test_health_reports_missing_model() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(false)))
                .configure(crate::routes),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["model_loaded"], false);
    }

    #[actix_web::test]
    async fn test_metrics_counts_requests() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(false)))
                .wrap(crate::middleware::RequestTelemetry)
                .configure(crate::routes),
        )
        .await;

        for _ in 0..3 {
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        }

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        let json: serde_json::Value = test::read_body_json(resp).await;

        assert_eq!(json["model"]["loaded"], false);
        assert!(json["overall"]["total_requests"].as_u64().unwrap() >= 3);
        let endpoints = json["endpoints"].as_array().unwrap();
        assert!(endpoints
            .iter()
            .any(|e| e["endpoint"] == "GET /health" && e["request_count"].as_u64().unwrap() >= 3));
    }
}
