use crate::nats::{ConsumeRequest, ConsumeResponse, MessageSubscriber};
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

/// Core NATS consumer that runs every message through a Tower service stack.
///
/// Each subject gets its own subscription so the concrete subject (and with it
/// the area) is known for every message. Messages are handled concurrently,
/// one task each, with at most `max_in_flight` tasks alive at a time.
///
/// The loop ends with an error when a subscription closes or when the service
/// returns `Err`; recoverable failures must come back as
/// `ConsumeResponse::Rejected` instead.
pub struct SubjectConsumer<S> {
    subscriber: Arc<dyn MessageSubscriber>,
    subjects: Vec<String>,
    max_in_flight: usize,
    service: S,
}

impl<S> SubjectConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        subjects: Vec<String>,
        max_in_flight: usize,
        service: S,
    ) -> Self {
        Self {
            subscriber,
            subjects,
            max_in_flight: max_in_flight.max(1),
            service,
        }
    }

    /// Run the consumer loop until cancellation
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(anyhow!("no subjects to consume"));
        }

        let mut streams = Vec::with_capacity(self.subjects.len());
        for subject in &self.subjects {
            let stream = self
                .subscriber
                .subscribe(subject.clone())
                .await
                .with_context(|| format!("failed to subscribe to {subject}"))?;
            streams.push(stream);
        }
        let mut inbound = futures::stream::select_all(streams);

        info!(
            subjects = ?self.subjects,
            max_in_flight = self.max_in_flight,
            "subject consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight: JoinSet<Result<()>> = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping consumer");
                    break Ok(());
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = flatten_join(joined) {
                        break Err(e);
                    }
                }
                next = inbound.next() => {
                    let Some(request) = next else {
                        break Err(anyhow!("subscription closed"));
                    };

                    let permit = tokio::select! {
                        _ = ctx.cancelled() => {
                            info!("received shutdown signal, stopping consumer");
                            break Ok(());
                        }
                        permit = Arc::clone(&permits).acquire_owned() => {
                            permit.context("in-flight limiter closed")?
                        }
                    };

                    debug!(subject = %request.subject, "dispatching message");
                    let service = self.service.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        service.oneshot(request).await.map(|_| ())
                    });
                }
            }
        };

        // Let in-flight frames reach a terminal state before reporting.
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = flatten_join(joined) {
                warn!(error = %e, "in-flight message failed during shutdown");
            }
        }

        match &outcome {
            Ok(()) => debug!("consumer stopped gracefully"),
            Err(e) => error!(error = %e, "consumer stopped"),
        }
        outcome
    }
}

fn flatten_join(joined: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.context("message task panicked")?
}
