use crate::delivery::{ensure_within_limit, DeliveryError, DeliveryReport, DeliverySink, FailureKind};
use crate::media::Artifact;
use crate::queue::DeliveryTarget;
use async_trait::async_trait;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use twilight_http::Client as HttpClient;
use twilight_model::{
    http::attachment::Attachment,
    id::{marker::ChannelMarker, Id},
};

/// Discord allows at most this many attachments per message.
const MAX_ATTACHMENTS: usize = 10;

/// Sends artifacts and failure notices to a Discord channel.
pub struct DiscordSink {
    http: Arc<HttpClient>,
    max_upload_bytes: u64,
}

impl DiscordSink {
    pub fn new(http: Arc<HttpClient>, max_upload_bytes: u64) -> Self {
        Self {
            http,
            max_upload_bytes,
        }
    }

    async fn attachment(&self, path: &Path, id: u64) -> Result<Attachment, DeliveryError> {
        ensure_within_limit(path, self.max_upload_bytes).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("media_{id}"));
        let data = tokio::fs::read(path).await?;
        Ok(Attachment::from_bytes(file_name, data, id))
    }

    async fn send_files(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
        paths: &[PathBuf],
    ) -> Result<(), DeliveryError> {
        let mut attachments = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            attachments.push(self.attachment(path, i as u64 + 1).await?);
        }
        self.send(channel_id, content, &attachments).await
    }

    async fn send(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
        attachments: &[Attachment],
    ) -> Result<(), DeliveryError> {
        self.http
            .create_message(channel_id)
            .content(content)
            .attachments(attachments)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Sends whatever part of the set can be sent. Fails only when nothing went out.
    async fn deliver_photo_set(
        &self,
        channel_id: Id<ChannelMarker>,
        images: &[PathBuf],
        audio: Option<&Path>,
        missing: usize,
    ) -> Result<DeliveryReport, DeliveryError> {
        let mut report = DeliveryReport::default();
        let (sendable, mut last_error) = within_limit(images, self.max_upload_bytes).await;
        let total_images = images.len() + missing;

        for (range, caption) in image_batches(sendable.len()) {
            let batch = &sendable[range];
            match self.send_files(channel_id, &caption, batch).await {
                Ok(()) => report.images_sent += batch.len(),
                Err(e) => {
                    warn!(images = batch.len(), "Failed to send image batch: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(audio_path) = audio {
            match self
                .send_files(channel_id, "🎵", &[audio_path.to_path_buf()])
                .await
            {
                Ok(()) => report.audio_sent = 1,
                Err(e) => {
                    warn!("Skipping audio track: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if report.images_sent == 0 && report.audio_sent == 0 {
            return Err(
                last_error.unwrap_or(DeliveryError::Empty("photo set had nothing to send"))
            );
        }

        let audio_lost = audio.is_some() && report.audio_sent == 0;
        if let Some(note) = partial_note(report.images_sent, total_images, audio_lost) {
            if let Err(e) = self.send(channel_id, &note, &[]).await {
                warn!("Failed to send partial delivery note: {}", e);
            }
        }

        Ok(report)
    }
}

fn channel(target: DeliveryTarget) -> Result<Id<ChannelMarker>, DeliveryError> {
    Id::new_checked(target.0)
        .ok_or_else(|| DeliveryError::Transport(format!("invalid channel id {}", target.0)))
}

/// Keeps the files within the upload limit; the last rejection is returned for reporting.
async fn within_limit(paths: &[PathBuf], limit: u64) -> (Vec<PathBuf>, Option<DeliveryError>) {
    let mut sendable = Vec::with_capacity(paths.len());
    let mut last_error = None;
    for path in paths {
        match ensure_within_limit(path, limit).await {
            Ok(_) => sendable.push(path.clone()),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                last_error = Some(e);
            }
        }
    }
    (sendable, last_error)
}

/// Splits `count` images into messages of at most [`MAX_ATTACHMENTS`], with captions.
fn image_batches(count: usize) -> Vec<(Range<usize>, String)> {
    let batches = count.div_ceil(MAX_ATTACHMENTS);
    (0..batches)
        .map(|index| {
            let start = index * MAX_ATTACHMENTS;
            let end = (start + MAX_ATTACHMENTS).min(count);
            let caption = if batches > 1 {
                format!("🖼️ {}/{}", index + 1, batches)
            } else {
                "🖼️".to_string()
            };
            (start..end, caption)
        })
        .collect()
}

fn partial_note(images_sent: usize, images_total: usize, audio_lost: bool) -> Option<String> {
    let mut parts = Vec::new();
    if images_sent < images_total {
        parts.push(format!("Sent {images_sent} of {images_total} images"));
    }
    if audio_lost {
        parts.push("the audio track could not be sent".to_string());
    }
    (!parts.is_empty()).then(|| format!("⚠️ {}", parts.join("; ")))
}

#[async_trait]
impl DeliverySink for DiscordSink {
    async fn deliver_artifact(
        &self,
        target: DeliveryTarget,
        artifact: &Artifact,
    ) -> Result<DeliveryReport, DeliveryError> {
        let channel_id = channel(target)?;

        match artifact {
            Artifact::Video { path, size_bytes } => {
                let content = format!("✅ Done! {:.1} MB", *size_bytes as f64 / 1_000_000.0);
                self.send_files(channel_id, &content, std::slice::from_ref(path))
                    .await?;
                Ok(DeliveryReport {
                    videos_sent: 1,
                    ..DeliveryReport::default()
                })
            }
            Artifact::PhotoSet {
                images,
                audio,
                missing,
            } => {
                self.deliver_photo_set(channel_id, images, audio.as_deref(), *missing)
                    .await
            }
            Artifact::Unsupported { .. } => Err(DeliveryError::Empty("unsupported artifact")),
        }
    }

    async fn deliver_failure(&self, target: DeliveryTarget, kind: FailureKind, detail: &str) {
        let Ok(channel_id) = channel(target) else {
            error!(%target, "Cannot notify failure: invalid channel id");
            return;
        };

        let content = match kind {
            FailureKind::UnsupportedPlatform if !detail.is_empty() => format!("❌ {detail}"),
            FailureKind::FetchFailed | FailureKind::DeliveryFailed if !detail.is_empty() => {
                format!("{} ({})", kind.user_message(), truncate(detail, 300))
            }
            _ => kind.user_message().to_string(),
        };

        if let Err(e) = self.send(channel_id, &content, &[]).await {
            error!(%target, %kind, "Failed to send failure notice: {}", e);
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}
