use crate::trace_log::{AlarmRecord, TraceLog};
use anyhow::{anyhow, Result};
use chrono::Utc;
use common::domain::{alert_subject, parse_alert_subject, stage, AlertMessage};
use common::nats::{
    ConsumeRequest, ConsumeResponse, MessageSubscriber, NatsConsumeLoggingLayer,
    NatsConsumeTracingLayer, SubjectConsumer,
};
use futures::future::BoxFuture;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AlarmListenerConfig {
    pub areas: Vec<String>,
    pub trace_log: PathBuf,
    pub max_in_flight: usize,
}

/// Handles one alert: stamps `alarm_received`, surfaces it, and appends it to
/// the trace log. Malformed alerts are skipped; a failing trace log is fatal.
#[derive(Clone)]
pub struct AlertConsumerService {
    trace_log: Arc<TraceLog>,
}

impl AlertConsumerService {
    pub fn new(trace_log: Arc<TraceLog>) -> Self {
        Self { trace_log }
    }
}

impl Service<ConsumeRequest> for AlertConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let trace_log = Arc::clone(&self.trace_log);

        Box::pin(async move {
            let area = match parse_alert_subject(&req.subject) {
                Ok(area) => area,
                Err(e) => return Ok(ConsumeResponse::rejected(e.to_string())),
            };

            let alert: AlertMessage = match serde_json::from_slice(&req.payload) {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(area = %area, error = %e, "skipping malformed alert");
                    return Ok(ConsumeResponse::rejected(format!("Decode error: {e}")));
                }
            };

            let trace = match alert.trace.stamp(stage::ALARM_RECEIVED) {
                Ok(trace) => trace,
                Err(e) => {
                    warn!(area = %area, error = %e, "skipping replayed alert");
                    return Ok(ConsumeResponse::rejected(e.to_string()));
                }
            };

            let end_to_end_ms = trace
                .latency_ns(stage::CAPTURE, stage::ALARM_RECEIVED)
                .map(|ns| ns as f64 / 1_000_000.0);
            info!(
                area = %area,
                text = %alert.text,
                trace_id = %trace.trace_id(),
                end_to_end_ms,
                "ALERT received"
            );

            trace_log
                .append(&AlarmRecord {
                    area,
                    text: alert.text,
                    trace,
                    logged_at: Utc::now(),
                })
                .await?;

            Ok(ConsumeResponse::handled())
        })
    }
}

/// Alarm device module: one `alerts.<area>` subscription per configured area.
pub struct AlarmListener {
    consumer: SubjectConsumer<BoxCloneService<ConsumeRequest, ConsumeResponse, anyhow::Error>>,
}

impl AlarmListener {
    pub async fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        config: AlarmListenerConfig,
    ) -> Result<Self> {
        if config.areas.is_empty() {
            return Err(anyhow!("alarm listener needs at least one area"));
        }
        let subjects = config
            .areas
            .iter()
            .map(|area| alert_subject(area))
            .collect::<Result<Vec<_>, _>>()?;

        let trace_log = Arc::new(TraceLog::open(&config.trace_log).await?);
        info!(
            subjects = ?subjects,
            trace_log = %trace_log.path().display(),
            "Alarm listener ready"
        );

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new())
            .layer(NatsConsumeLoggingLayer::new())
            .service(AlertConsumerService::new(trace_log));

        Ok(Self {
            consumer: SubjectConsumer::new(
                subscriber,
                subjects,
                config.max_in_flight,
                BoxCloneService::new(service),
            ),
        })
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send,
    > {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}
