use anyhow::{anyhow, Context, Result};
use common::domain::{area_frame_subject, stage, FrameMessage, TraceContext};
use common::nats::{
    LayeredPublisher, MessagePublisher, NatsPublisherBuilder, NatsTracingConfig, PublishRequest,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, info, warn};

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
pub struct CameraFeedConfig {
    pub area: String,
    pub frames_dir: PathBuf,
    pub fps: u32,
}

/// Simulated camera: replays a directory of frames on `area.<area>.frame`,
/// one every `1 / fps` seconds, looping until cancelled.
pub struct CameraFeed {
    publisher: LayeredPublisher,
    area: String,
    subject: String,
    frames: Vec<PathBuf>,
    interval: Duration,
}

impl CameraFeed {
    pub fn new(publisher: Arc<dyn MessagePublisher>, config: CameraFeedConfig) -> Result<Self> {
        let subject = area_frame_subject(&config.area)?;
        if config.fps == 0 {
            return Err(anyhow!("camera fps must be at least 1"));
        }

        let frames = list_frames(&config.frames_dir)?;
        if frames.is_empty() {
            return Err(anyhow!(
                "no .jpg, .jpeg or .png frames in {}",
                config.frames_dir.display()
            ));
        }

        info!(
            area = %config.area,
            subject = %subject,
            frames = frames.len(),
            fps = config.fps,
            "Camera feed ready"
        );

        let publisher = NatsPublisherBuilder::new(publisher)
            .with_tracing(NatsTracingConfig::new("camera_feed"))
            .with_logging()
            .build();

        Ok(Self {
            publisher,
            area: config.area,
            subject,
            frames,
            interval: Duration::from_secs(1) / config.fps,
        })
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for path in self.frames.iter().cycle() {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    info!(area = %self.area, "camera feed stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                    continue;
                }
            };

            let message = FrameMessage::new(
                self.area.as_str(),
                TraceContext::begin_at(stage::CAPTURE),
                &bytes,
            );
            let payload = serde_json::to_vec(&message)?;

            self.publisher
                .clone()
                .call(PublishRequest::new(self.subject.clone(), payload))
                .await
                .with_context(|| format!("failed to publish frame to {}", self.subject))?;

            debug!(
                path = %path.display(),
                trace_id = %message.trace.trace_id(),
                "frame captured"
            );
        }

        Ok(())
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send,
    > {
        Box::new(move |ctx| Box::pin(async move { self.run(ctx).await }))
    }
}

/// Frame files in `dir`, sorted by path. Extensions match case-insensitively.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frames directory {}", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_frame = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    FRAME_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();

    Ok(frames)
}
