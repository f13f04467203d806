// castellum-api/src/observability.rs
//
// Tracing + OpenTelemetry + Prometheus wiring, grounded on the teacher's
// `api/src/observability.rs::Observability::init`, generalised to register
// both this crate's HTTP metrics and `castellum_workers::metrics`' gauges
// into one registry (spec §1 ambient-stack "Logging & tracing").

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use prometheus::Registry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub struct Observability {
    pub registry: Registry,
}

impl Observability {
    pub fn init() -> Result<Self> {
        let registry = Registry::new_custom(Some("castellum".into()), None)?;
        crate::metrics::register_all(&registry)?;
        castellum_workers::metrics::register_all(&registry)?;

        let otel_endpoint =
            std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4317".into());

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "castellum=info,tower_http=info".into());

        match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&otel_endpoint)
            .build()
        {
            Ok(exporter) => {
                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_batch_exporter(exporter, Tokio)
                    .with_resource(opentelemetry_sdk::Resource::new(vec![KeyValue::new(
                        "service.name",
                        "castellum",
                    )]))
                    .build();
                let tracer = tracer_provider.tracer("castellum");
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer())
                    .with(otel_layer)
                    .init();
            }
            Err(err) => {
                // OTLP export is best-effort: a misconfigured/unreachable
                // collector must never stop the process from starting.
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer())
                    .init();
                tracing::warn!(error = %err, "OTLP exporter unavailable, tracing only to stdout");
            }
        }

        tracing::info!(otel_endpoint, "observability stack initialized");
        Ok(Self { registry })
    }

    pub fn shutdown() {
        opentelemetry::global::shutdown_tracer_provider();
    }
}
