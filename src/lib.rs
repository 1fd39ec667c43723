// THEORY:
// This file is the main entry point for the `motion_zones` library crate.
// It exposes the `VisionPipeline` (synchronous, one engine per capture source) and
// the `PipelineHandle` (the same engine running on its own tokio task) as the
// high-level interface of the motion engine.
//
// A host feeds raw RGBA frames in and gets back a motion mask, a list of tracked
// blobs, and edge-triggered events from the rectangular zones it registered. The
// building blocks (`core_modules`) stay public for hosts that want to drive a single
// stage, such as the labeler, on their own buffers.

pub mod actor_pipeline;
pub mod core_modules;
pub mod error;
pub mod pipeline;
