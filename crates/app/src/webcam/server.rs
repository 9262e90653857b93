//! Actix Web endpoints for camera control, status, recognition results, and
//! the multipart preview stream.
//!
//! Handlers never touch the device directly. Start and stop run on the
//! blocking pool because opening a camera and joining the pipeline thread
//! both block; every other handler only reads shared state.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer, Resource,
    http::{Method, header},
    middleware::DefaultHeaders,
    web,
};
use anyhow::{Context, Result};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info};

use crate::webcam::{
    data::{CommandResponse, HealthResponse, RootResponse, StatusResponse, activity_label},
    health::{HealthComponent, current_millis},
    session::{CaptureSession, StartOutcome, StopOutcome},
    stream::{BOUNDARY, frame_stream},
};

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) session: Arc<CaptureSession>,
    /// Pacing of each stream client.
    pub(crate) stream_interval: Duration,
    pub(crate) metrics: Option<&'static PrometheusHandle>,
}

/// Serve until the server exits (it handles SIGINT/SIGTERM itself).
pub(crate) fn run_server(state: ServerState, bind: SocketAddr) -> Result<()> {
    let state = web::Data::new(state);
    actix_web::rt::System::new().block_on(async move {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(cors_headers())
                .configure(routes)
        })
        .bind(bind)
        .with_context(|| format!("Failed to bind HTTP server to {bind}"))?
        .run();
        info!("HTTP server listening on {bind}");
        server.await.context("HTTP server error")
    })
}

/// Any origin may call the API, matching the browser front-ends it serves.
pub(crate) fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .add((header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Type"))
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(resource("/").route(web::get().to(root_handler)))
        .service(resource("/health").route(web::get().to(health_handler)))
        .service(resource("/metrics").route(web::get().to(metrics_handler)))
        .service(resource("/webcam/start").route(web::post().to(start_handler)))
        .service(resource("/webcam/stop").route(web::post().to(stop_handler)))
        .service(resource("/webcam/status").route(web::get().to(status_handler)))
        .service(resource("/webcam/stream").route(web::get().to(stream_handler)))
        .service(resource("/webcam/recognition").route(web::get().to(recognition_handler)));
}

fn resource(path: &str) -> Resource {
    web::resource(path).route(web::method(Method::OPTIONS).to(preflight_handler))
}

async fn preflight_handler() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn root_handler() -> HttpResponse {
    HttpResponse::Ok().json(RootResponse {
        status: "online",
        message: "Face recognition webcam service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn start_handler(state: web::Data<ServerState>) -> HttpResponse {
    let session = state.session.clone();
    match web::block(move || session.start()).await {
        Ok(Ok(StartOutcome::Started)) => HttpResponse::Ok().json(CommandResponse {
            status: "success",
            message: "Webcam started".to_string(),
        }),
        Ok(Ok(StartOutcome::AlreadyRunning)) => HttpResponse::Ok().json(CommandResponse {
            status: "already_running",
            message: "Webcam is already running".to_string(),
        }),
        Ok(Err(err)) => {
            error!("failed to start webcam: {err}");
            error_response(HttpResponse::InternalServerError(), err.to_string())
        }
        Err(err) => {
            error!("start task failed: {err}");
            error_response(HttpResponse::InternalServerError(), err.to_string())
        }
    }
}

async fn stop_handler(state: web::Data<ServerState>) -> HttpResponse {
    let session = state.session.clone();
    match web::block(move || session.stop()).await {
        Ok(outcome) => HttpResponse::Ok().json(CommandResponse {
            status: "success",
            message: match outcome {
                StopOutcome::Stopped => "Webcam stopped",
                StopOutcome::NotRunning => "Webcam was not running",
            }
            .to_string(),
        }),
        Err(err) => {
            error!("stop task failed: {err}");
            error_response(HttpResponse::InternalServerError(), err.to_string())
        }
    }
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    let running = state.session.is_running();
    HttpResponse::Ok().json(StatusResponse {
        is_running: running,
        status: activity_label(running),
    })
}

async fn recognition_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.session.recognition())
}

/// Stream annotated frames as `multipart/x-mixed-replace`.
async fn stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let Some(frames) = state.session.subscribe() else {
        return error_response(
            HttpResponse::BadRequest(),
            "Webcam is not running".to_string(),
        );
    };

    HttpResponse::Ok()
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        ))
        .streaming(frame_stream(frames, state.stream_interval))
}

async fn health_handler(state: web::Data<ServerState>) -> HttpResponse {
    let now = current_millis();
    let running = state.session.is_running();
    let health = state.session.health();
    let stale = if running {
        health.stale_component(now)
    } else {
        None
    };
    HttpResponse::Ok().json(HealthResponse {
        status: if stale.is_some() { "degraded" } else { "healthy" },
        session: activity_label(running),
        stale_stage: stale.map(HealthComponent::label),
        capture_age_ms: health.age_ms(HealthComponent::Capture, now),
        recognition_age_ms: state.session.recognition_age_ms(Utc::now()),
    })
}

async fn metrics_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().finish(),
    }
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: String) -> HttpResponse {
    builder.json(CommandResponse {
        status: "error",
        message,
    })
}
