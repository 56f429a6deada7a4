use crate::transition::StrategyKind;

/// Tuning for a [`RenderHost`](crate::RenderHost).
///
/// # Example
/// ```ignore
/// let config = HostConfig::new()
///     .lightweight(true)
///     .seed(7)
///     .snapshot_timeout(0.5);
/// ```
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Restrict transitions to those without per-pixel frame analysis.
    pub lightweight: bool,
    /// Always use this strategy instead of a random pick.
    pub strategy: Option<StrategyKind>,
    /// Seed for strategy selection and ambient randomness. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Fraction of the remaining resize distance covered per frame.
    pub resize_damping: f32,
    /// Logical-pixel distance under which a resize snaps to its target.
    pub resize_epsilon: f32,
    /// Upper bound on the device pixel ratio used for the drawing buffer.
    pub max_pixel_ratio: f32,
    /// Seconds a transition waits for a frame capture before giving up.
    pub snapshot_timeout: f32,
    /// Multiplier on every transition duration.
    pub duration_scale: f32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            lightweight: false,
            strategy: None,
            seed: None,
            resize_damping: 0.25,
            resize_epsilon: 0.5,
            max_pixel_ratio: 2.0,
            snapshot_timeout: 1.0,
            duration_scale: 1.0,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lightweight(mut self, lightweight: bool) -> Self {
        self.lightweight = lightweight;
        self
    }

    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn resize_damping(mut self, damping: f32) -> Self {
        self.resize_damping = damping.clamp(0.01, 1.0);
        self
    }

    pub fn resize_epsilon(mut self, epsilon: f32) -> Self {
        self.resize_epsilon = epsilon.max(0.0);
        self
    }

    pub fn max_pixel_ratio(mut self, ratio: f32) -> Self {
        self.max_pixel_ratio = ratio.max(0.1);
        self
    }

    pub fn snapshot_timeout(mut self, seconds: f32) -> Self {
        self.snapshot_timeout = seconds.max(0.0);
        self
    }

    /// Scale transition durations; `0.5` plays them in half the time.
    pub fn duration_scale(mut self, scale: f32) -> Self {
        self.duration_scale = scale.max(0.0);
        self
    }
}
