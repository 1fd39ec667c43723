// THEORY:
// The `actor_pipeline` module wraps a `VisionPipeline` in a tokio task so hosts with
// an async capture loop can share one engine between several tasks.
//
// Key architectural principles:
// 1.  **Single owner**: the pipeline lives inside exactly one task. Every call that
//     mutates it, frames included, travels through one `mpsc` mailbox, so frames and
//     zone edits are applied in the order they were sent.
// 2.  **Owned results**: replies come back over `oneshot` channels and carry owned
//     copies (`FrameSummary`), since borrowed reports cannot leave the task.
// 3.  **Handlers stay on the task**: zone handlers are moved into the task with the
//     zone and run there, synchronously inside frame processing.
// 4.  **Closed is an error, not a panic**: once the task is gone every call returns
//     `VisionError::PipelineClosed`.

use crate::core_modules::frame_buffer::FrameBuffer;
use crate::core_modules::label_map::LabelMap;
use crate::pipeline::{
    ActiveZone, Blob, NormRect, PipelineConfig, Timestamp, VisionError, VisionPipeline, ZoneHandler, ZoneId,
};
use log::debug;
use tokio::sync::{mpsc, oneshot};

const MAILBOX_SIZE: usize = 8;

/// Message type for the pipeline actor.
enum PipelineMessage {
    Frame {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<FrameSummary, VisionError>>,
    },
    SetBackground {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<(), VisionError>>,
    },
    AddZone {
        id: ZoneId,
        rect: NormRect,
        on_change: Option<ZoneHandler>,
        reply: oneshot::Sender<()>,
    },
    RemoveZone(ZoneId, oneshot::Sender<usize>),
    Configure(PipelineConfig, oneshot::Sender<()>),
    Snapshot(oneshot::Sender<PipelineSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Owned outcome of one frame processed by the actor.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub timestamp: Timestamp,
    pub blobs: Vec<Blob>,
    /// State of every zone after this frame.
    pub zones: Vec<ActiveZone>,
    /// Number of "on" pixels in the motion mask.
    pub moving_pixels: usize,
    pub raw_blob_count: usize,
    pub zone_transitions: usize,
}

/// Copies of the engine's latest images, for debugging output.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub threshold_mask: FrameBuffer,
    pub labels: LabelMap,
    pub frame_count: u64,
}

/// Cloneable handle to a pipeline running on its own tokio task.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    sender: mpsc::Sender<PipelineMessage>,
}

impl std::fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineMessage::Frame { width, height, .. } => write!(f, "Frame({}x{})", width, height),
            PipelineMessage::SetBackground { width, height, .. } => write!(f, "SetBackground({}x{})", width, height),
            PipelineMessage::AddZone { id, .. } => write!(f, "AddZone({})", id),
            PipelineMessage::RemoveZone(id, _) => write!(f, "RemoveZone({})", id),
            PipelineMessage::Configure(..) => write!(f, "Configure"),
            PipelineMessage::Snapshot(_) => write!(f, "Snapshot"),
            PipelineMessage::Shutdown(_) => write!(f, "Shutdown"),
        }
    }
}

impl PipelineHandle {
    /// Spawns the actor task. Must be called from within a tokio runtime.
    pub fn spawn(config: PipelineConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<PipelineMessage>(MAILBOX_SIZE);
        tokio::spawn(run(VisionPipeline::new(config), receiver));
        Self { sender }
    }

    pub async fn submit_frame(&self, pixels: Vec<u8>, width: u32, height: u32) -> Result<FrameSummary, VisionError> {
        self.request(|reply| PipelineMessage::Frame {
            pixels,
            width,
            height,
            reply,
        })
        .await?
    }

    pub async fn set_background(&self, pixels: Vec<u8>, width: u32, height: u32) -> Result<(), VisionError> {
        self.request(|reply| PipelineMessage::SetBackground {
            pixels,
            width,
            height,
            reply,
        })
        .await?
    }

    pub async fn add_zone<F>(&self, id: ZoneId, rect: NormRect, on_change: F) -> Result<(), VisionError>
    where
        F: FnMut(&ActiveZone) + Send + 'static,
    {
        let on_change: ZoneHandler = Box::new(on_change);
        self.request(|reply| PipelineMessage::AddZone {
            id,
            rect,
            on_change: Some(on_change),
            reply,
        })
        .await
    }

    pub async fn add_silent_zone(&self, id: ZoneId, rect: NormRect) -> Result<(), VisionError> {
        self.request(|reply| PipelineMessage::AddZone {
            id,
            rect,
            on_change: None,
            reply,
        })
        .await
    }

    /// Removes every zone carrying `id`. Returns how many were removed.
    pub async fn remove_zone(&self, id: ZoneId) -> Result<usize, VisionError> {
        self.request(|reply| PipelineMessage::RemoveZone(id, reply)).await
    }

    pub async fn configure(&self, config: PipelineConfig) -> Result<(), VisionError> {
        self.request(|reply| PipelineMessage::Configure(config, reply)).await
    }

    pub async fn snapshot(&self) -> Result<PipelineSnapshot, VisionError> {
        self.request(PipelineMessage::Snapshot).await
    }

    /// Stops the actor after every message queued before this one is handled.
    pub async fn shutdown(&self) -> Result<(), VisionError> {
        self.request(PipelineMessage::Shutdown).await
    }

    async fn request<T, M>(&self, message: M) -> Result<T, VisionError>
    where
        M: FnOnce(oneshot::Sender<T>) -> PipelineMessage,
    {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .await
            .map_err(|_| VisionError::PipelineClosed)?;
        response.await.map_err(|_| VisionError::PipelineClosed)
    }
}

async fn run(mut pipeline: VisionPipeline, mut receiver: mpsc::Receiver<PipelineMessage>) {
    debug!("pipeline actor started");
    while let Some(message) = receiver.recv().await {
        match message {
            PipelineMessage::Frame {
                pixels,
                width,
                height,
                reply,
            } => {
                let _ = reply.send(summarize(&mut pipeline, &pixels, width, height));
            }
            PipelineMessage::SetBackground {
                pixels,
                width,
                height,
                reply,
            } => {
                let _ = reply.send(pipeline.set_background(&pixels, width, height));
            }
            PipelineMessage::AddZone {
                id,
                rect,
                on_change,
                reply,
            } => {
                pipeline.add_boxed_zone(id, rect, on_change);
                let _ = reply.send(());
            }
            PipelineMessage::RemoveZone(id, reply) => {
                let _ = reply.send(pipeline.remove_zone(id));
            }
            PipelineMessage::Configure(config, reply) => {
                pipeline.configure(config);
                let _ = reply.send(());
            }
            PipelineMessage::Snapshot(reply) => {
                let _ = reply.send(PipelineSnapshot {
                    threshold_mask: pipeline.threshold_mask().clone(),
                    labels: pipeline.label_map().clone(),
                    frame_count: pipeline.frame_count(),
                });
            }
            PipelineMessage::Shutdown(reply) => {
                let _ = reply.send(());
                break;
            }
        }
    }
    debug!("pipeline actor stopped after {} frames", pipeline.frame_count());
}

fn summarize(pipeline: &mut VisionPipeline, pixels: &[u8], width: u32, height: u32) -> Result<FrameSummary, VisionError> {
    let report = pipeline.submit_frame(pixels, width, height)?;
    let mut summary = FrameSummary {
        timestamp: report.timestamp,
        blobs: report.blobs.to_vec(),
        zones: Vec::new(),
        moving_pixels: report.threshold_mask.count_on(),
        raw_blob_count: report.raw_blob_count,
        zone_transitions: report.zone_transitions,
    };
    summary.zones = pipeline.zones().cloned().collect();
    Ok(summary)
}
