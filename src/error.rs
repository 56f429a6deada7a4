//! Error types for every fallible seam of the host.
//!
//! Only [`AppError`] ever reaches a caller of the crate's entry points. The
//! rest are absorbed at the [`RenderHost`](crate::RenderHost) boundary and
//! logged: a missing or broken scene module degrades to an empty viewport and
//! a failed transition degrades to a plain swap.

use thiserror::Error;

use crate::module::SceneId;
use crate::scene_graph::NodeId;

/// Scene graph operations that referenced a node they could not touch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    NoSuchNode(NodeId),
    #[error("node {0:?} is protected and cannot be despawned")]
    Protected(NodeId),
}

/// Misuse of the render override slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("render override slot already holds compositor #{installed}")]
    Occupied { installed: u64 },
    #[error("override handle #{handle} does not match the installed compositor ({installed:?})")]
    Mismatch { handle: u64, installed: Option<u64> },
}

/// A scene id that does not resolve to a registered module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no scene module registered for id `{0}`")]
    NotFound(SceneId),
}

/// A scene module's own mount step failed.
#[derive(Debug, Error)]
pub enum MountError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("mount failed: {0}")]
    Failed(String),
}

/// Reading the rendered frame back failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("renderer has not produced a frame to capture")]
    Unavailable,
    #[error("frame readback failed: {0}")]
    Readback(String),
    #[error("captured frame has zero area")]
    EmptyFrame,
}

/// A transition strategy failed partway through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("snapshot was not delivered within {waited:.2}s")]
    SnapshotTimeout { waited: f32 },
    #[error("frame analysis failed: {0}")]
    Decode(String),
}

/// A strategy name that does not match any [`StrategyKind`](crate::transition::StrategyKind).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transition `{0}` (expected one of: fade, fov-punch, channel-drift, luma-dissolve, wipe, depth-ripple)")]
pub struct UnknownStrategy(pub String);

/// GPU bring-up failures.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Errors surfaced by [`run`](crate::run).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("could not build the scene: {0}")]
    Scene(#[from] GraphError),
}
