use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::nats::propagation::link_span_to_headers;
use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument};

/// Tower layer that opens one consumer span per inbound message,
/// parented on the publisher's span when headers carry one
#[derive(Clone, Default)]
pub struct NatsConsumeTracingLayer;

impl NatsConsumeTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_consume",
            otel.name = %format!("{} process", req.subject),
            otel.kind = "consumer",
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %req.subject,
            messaging.message.body.size = req.payload.len(),
            outcome = field::Empty,
            otel.status_code = field::Empty,
        );
        link_span_to_headers(&span, req.headers.as_ref());

        let mut inner = self.inner.clone();
        let recorder = span.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                match &result {
                    Ok(response) => {
                        recorder.record("outcome", response.outcome());
                        recorder.record("otel.status_code", "OK");
                    }
                    Err(e) => {
                        recorder.record("otel.status_code", "ERROR");
                        tracing::error!(error = %e, "message handling failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
