use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

static WEBHOOK_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "broadcast_service_webhook_deliveries_total",
            "Webhook deliveries handled by broadcast-service, by event and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create broadcast_service_webhook_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register broadcast_service_webhook_deliveries_total");
    counter
});

/// Outcomes: "handled", "ignored", "auth_failed", "malformed", "error"
pub fn observe_webhook(event: &str, outcome: &str) {
    WEBHOOK_DELIVERIES_TOTAL
        .with_label_values(&[event, outcome])
        .inc();
}

pub async fn serve() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
