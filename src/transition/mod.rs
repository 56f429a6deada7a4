//! Animated handoffs between scene modules.
//!
//! A transition is a small state machine the host advances once per frame.
//! Each strategy builds overlay layers, animates them with [`Tween`]s, and
//! at the right moment returns [`Step::Swap`] to ask the host to unmount the
//! old module and mount the new one. The host owns the swap, the overlay
//! cleanup and the supersession check; strategies only decide *when*.
//!
//! ```text
//! Idle → Snapshotting → OverlayBuilding → AnimatingIn
//!      → UnloadingOld → LoadingNew → AnimatingOut → Idle
//! ```
//!
//! Not every strategy visits every phase: a plain fade never snapshots.

mod channel_drift;
mod depth_ripple;
mod fade;
mod fov_punch;
mod luma_dissolve;
mod timeline;
mod wipe;

pub use channel_drift::ChannelDrift;
pub use depth_ripple::DepthRipple;
pub use fade::Fade;
pub use fov_punch::FovPunch;
pub use luma_dissolve::LumaDissolve;
pub use timeline::{Easing, Tween};
pub use wipe::DirectionalWipe;

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::config::HostConfig;
use crate::error::{TransitionError, UnknownStrategy};
use crate::overlay::{LayerId, LayerKind, OverlayStage};
use crate::resize::ViewportSize;
use crate::snapshot::{FrameSnapshot, SnapshotQueue, SnapshotTicket};

/// Generation counter minted by every `load_scene` call that does real work.
///
/// Tokens only grow. A transition whose token is older than the host's
/// newest one has been superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionToken(pub u64);

/// The six transition strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Fade to black and back.
    Fade,
    /// Field-of-view punch-out and punch-in.
    FovPunch,
    /// Captured frame with drifting RGB channels.
    ChannelDrift,
    /// Captured frame dissolved dark pixels first.
    LumaDissolve,
    /// Captured frame wiped away along the before/after difference.
    DirectionalWipe,
    /// Captured frame rippled from a random point.
    DepthRipple,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Fade,
        StrategyKind::FovPunch,
        StrategyKind::ChannelDrift,
        StrategyKind::LumaDissolve,
        StrategyKind::DirectionalWipe,
        StrategyKind::DepthRipple,
    ];

    /// Whether the strategy avoids per-pixel frame analysis on the CPU.
    pub fn is_lightweight(self) -> bool {
        !matches!(
            self,
            StrategyKind::LumaDissolve | StrategyKind::DirectionalWipe
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Fade => "fade",
            StrategyKind::FovPunch => "fov-punch",
            StrategyKind::ChannelDrift => "channel-drift",
            StrategyKind::LumaDissolve => "luma-dissolve",
            StrategyKind::DirectionalWipe => "wipe",
            StrategyKind::DepthRipple => "depth-ripple",
        }
    }

    /// Construct a fresh strategy instance, drawing its random parameters.
    pub fn build(self, rng: &mut StdRng) -> Box<dyn TransitionStrategy> {
        match self {
            StrategyKind::Fade => Box::new(Fade::new()),
            StrategyKind::FovPunch => Box::new(FovPunch::new()),
            StrategyKind::ChannelDrift => Box::new(ChannelDrift::new(rng)),
            StrategyKind::LumaDissolve => Box::new(LumaDissolve::new()),
            StrategyKind::DirectionalWipe => Box::new(DirectionalWipe::new(rng)),
            StrategyKind::DepthRipple => Box::new(DepthRipple::new(rng)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Pick the strategy for the next transition.
///
/// A configured strategy always wins. Otherwise the pick is uniform over
/// every strategy, or over the lightweight ones in lightweight mode.
pub fn select(rng: &mut impl Rng, config: &HostConfig) -> StrategyKind {
    if let Some(kind) = config.strategy {
        return kind;
    }
    let pool: Vec<StrategyKind> = StrategyKind::ALL
        .into_iter()
        .filter(|kind| !config.lightweight || kind.is_lightweight())
        .collect();
    pool.choose(rng).copied().unwrap_or(StrategyKind::Fade)
}

/// Where a running transition is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    Idle,
    Snapshotting,
    OverlayBuilding,
    AnimatingIn,
    UnloadingOld,
    LoadingNew,
    AnimatingOut,
}

/// What a strategy wants after one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Call again next frame.
    Continue,
    /// Swap modules now, then call again next frame.
    Swap,
    /// Finished.
    Done,
}

/// Everything a strategy may touch during one step.
pub struct StepContext<'a> {
    pub token: TransitionToken,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub overlay: &'a mut OverlayStage,
    pub snapshots: &'a mut SnapshotQueue,
    pub viewport: ViewportSize,
    pub rng: &'a mut StdRng,
    pub duration_scale: f32,
    pub snapshot_timeout: f32,
}

impl StepContext<'_> {
    /// A nominal duration scaled by the configured transition speed.
    pub fn scaled(&self, seconds: f32) -> f32 {
        seconds * self.duration_scale
    }

    /// Push an overlay layer owned by this transition.
    pub fn push_layer(&mut self, kind: LayerKind, opacity: f32) -> LayerId {
        self.overlay.push(self.token, kind, opacity)
    }

    pub fn request_snapshot(&mut self) -> PendingSnapshot {
        PendingSnapshot {
            ticket: self.snapshots.request(self.token),
            waited: 0.0,
        }
    }
}

/// A frame capture a strategy is waiting on, with its timeout clock.
#[derive(Debug)]
pub struct PendingSnapshot {
    ticket: SnapshotTicket,
    waited: f32,
}

impl PendingSnapshot {
    /// `Ok(Some(_))` once delivered, `Ok(None)` while in flight.
    ///
    /// Fails with [`TransitionError::SnapshotTimeout`] once the wait exceeds
    /// the configured timeout.
    pub fn poll(
        &mut self,
        cx: &mut StepContext<'_>,
    ) -> Result<Option<Rc<FrameSnapshot>>, TransitionError> {
        if let Some(result) = cx.snapshots.take(self.ticket) {
            return Ok(Some(result?));
        }
        self.waited += cx.dt;
        if self.waited >= cx.snapshot_timeout {
            return Err(TransitionError::SnapshotTimeout {
                waited: self.waited,
            });
        }
        Ok(None)
    }
}

/// One transition algorithm.
pub trait TransitionStrategy {
    fn kind(&self) -> StrategyKind;

    fn phase(&self) -> TransitionPhase;

    /// Advance by one frame.
    ///
    /// Returning [`Step::Swap`] more than once has no further effect. If the
    /// strategy finishes or fails before swapping, the host swaps for it.
    fn step(&mut self, cx: &mut StepContext<'_>) -> Result<Step, TransitionError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use rand::SeedableRng;

    use super::*;
    use crate::render::HeadlessRenderer;

    /// Drives one strategy the way the host does, minus the modules.
    pub struct Harness {
        pub overlay: OverlayStage,
        pub snapshots: SnapshotQueue,
        pub renderer: HeadlessRenderer,
        pub rng: StdRng,
        pub token: TransitionToken,
        pub timeout: f32,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                overlay: OverlayStage::new(),
                snapshots: SnapshotQueue::new(),
                renderer: HeadlessRenderer::new(64, 48),
                rng: StdRng::seed_from_u64(7),
                token: TransitionToken(1),
                timeout: 1.0,
            }
        }

        pub fn step(&mut self, strategy: &mut dyn TransitionStrategy) -> Result<Step, TransitionError> {
            let mut cx = StepContext {
                token: self.token,
                dt: 1.0 / 60.0,
                overlay: &mut self.overlay,
                snapshots: &mut self.snapshots,
                viewport: ViewportSize::new(64.0, 48.0, 1.0),
                rng: &mut self.rng,
                duration_scale: 1.0,
                snapshot_timeout: self.timeout,
            };
            let step = strategy.step(&mut cx);
            self.snapshots.pump(&mut self.renderer);
            step
        }

        /// Step until done. Returns the frame index of every swap request.
        pub fn run(&mut self, strategy: &mut dyn TransitionStrategy) -> Result<Vec<usize>, TransitionError> {
            let mut swaps = Vec::new();
            for frame in 0..600 {
                match self.step(strategy)? {
                    Step::Continue => {}
                    Step::Swap => swaps.push(frame),
                    Step::Done => return Ok(swaps),
                }
            }
            panic!("{:?} did not finish in 600 frames", strategy.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::testing::Harness;
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!("FOV_PUNCH".parse::<StrategyKind>().unwrap(), StrategyKind::FovPunch);
        assert!("spin".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn lightweight_pool_excludes_pixel_analysis() {
        let config = HostConfig::new().lightweight(true);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let kind = select(&mut rng, &config);
            assert!(kind.is_lightweight(), "{kind} picked in lightweight mode");
        }
    }

    #[test]
    fn full_pool_reaches_every_strategy() {
        let config = HostConfig::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(select(&mut rng, &config));
        }
        assert_eq!(seen.len(), StrategyKind::ALL.len());
    }

    #[test]
    fn configured_strategy_overrides_selection() {
        let config = HostConfig::new().lightweight(true).strategy(StrategyKind::DirectionalWipe);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(select(&mut rng, &config), StrategyKind::DirectionalWipe);
    }

    #[test]
    fn every_strategy_swaps_once_and_leaves_layers_for_the_host() {
        for kind in StrategyKind::ALL {
            let mut harness = Harness::new();
            let mut strategy = kind.build(&mut harness.rng);
            let swaps = harness.run(strategy.as_mut()).unwrap();
            assert_eq!(swaps.len(), 1, "{kind} swapped {swaps:?}");
            assert!(swaps[0] > 0, "{kind} swapped before animating");
            assert_eq!(strategy.phase(), TransitionPhase::Idle);
        }
    }

    #[test]
    fn snapshot_wait_times_out() {
        let mut harness = Harness::new();
        harness.renderer.stall_captures(true);
        harness.timeout = 0.25;
        let mut strategy = StrategyKind::ChannelDrift.build(&mut harness.rng);
        let err = harness.run(strategy.as_mut()).unwrap_err();
        assert!(matches!(err, TransitionError::SnapshotTimeout { .. }));
    }

    #[test]
    fn capture_failure_propagates() {
        let mut harness = Harness::new();
        harness.renderer.fail_captures(true);
        let mut strategy = StrategyKind::LumaDissolve.build(&mut harness.rng);
        let err = harness.run(strategy.as_mut()).unwrap_err();
        assert!(matches!(err, TransitionError::Snapshot(_)));
    }
}
