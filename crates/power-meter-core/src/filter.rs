//! Two-state Kalman filter tracking crank angle and angular velocity.
//!
//! The state transition is purely kinematic (`angle += velocity * dt`) and the
//! measurement observes both states directly, so every matrix is 2x2 and the
//! arithmetic is written out by hand.

use core::cell::Cell;
use core::f32::consts::PI;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::icd::{FilterConfig, Mat2, OrientationState};
use crate::CoreError;

const TWO_PI: f32 = 2.0 * PI;
const SECONDS_PER_MICRO: f32 = 1e-6;
/// Relative slack on the covariance determinant before it counts as
/// indefinite. Rounding in f32 leaves small negative values behind.
const DETERMINANT_TOLERANCE: f32 = 1e-3;

/// Wraps an angle into (-pi, pi].
///
/// Inputs many revolutions away collapse onto a single representative, so the
/// filter only ever tracks position within one revolution. Non-finite input
/// yields NaN.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut angle = angle;
    if angle.abs() > 2.0 * TWO_PI {
        // f32 cannot walk down from very large values in 2pi steps.
        angle = libm::fmodf(angle, TWO_PI);
    }
    while angle > PI {
        angle -= TWO_PI;
    }
    while angle <= -PI {
        angle += TWO_PI;
    }
    angle
}

/// Shortest signed distance from `b` to `a` on the circle, in (-pi, pi].
pub fn circular_subtract(a: f32, b: f32) -> f32 {
    let shifted = a - b + PI;
    let wrapped = shifted - TWO_PI * libm::floorf(shifted / TWO_PI);
    normalize_angle(wrapped - PI)
}

fn mul(a: &Mat2, b: &Mat2) -> Mat2 {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}

fn add(a: &Mat2, b: &Mat2) -> Mat2 {
    [
        [a[0][0] + b[0][0], a[0][1] + b[0][1]],
        [a[1][0] + b[1][0], a[1][1] + b[1][1]],
    ]
}

fn transpose(a: &Mat2) -> Mat2 {
    [[a[0][0], a[1][0]], [a[0][1], a[1][1]]]
}

fn determinant(a: &Mat2) -> f32 {
    a[0][0] * a[1][1] - a[0][1] * a[1][0]
}

fn inverse(a: &Mat2) -> Option<Mat2> {
    let det = determinant(a);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some([
        [a[1][1] / det, -a[0][1] / det],
        [-a[1][0] / det, a[0][0] / det],
    ])
}

fn symmetrize(a: Mat2) -> Mat2 {
    let off = 0.5 * (a[0][1] + a[1][0]);
    [[a[0][0], off], [off, a[1][1]]]
}

fn is_positive_semi_definite(p: &Mat2) -> bool {
    if p.iter().flatten().any(|v| !v.is_finite()) {
        return false;
    }
    if p[0][0] < 0.0 || p[1][1] < 0.0 {
        return false;
    }
    let scale = (p[0][0] * p[1][1]).max(1e-12);
    determinant(p) >= -DETERMINANT_TOLERANCE * scale
}

/// Signed time from `from` to `to`. Negative when projecting backwards.
fn elapsed_seconds(from: u64, to: u64) -> f32 {
    to.wrapping_sub(from) as i64 as f32 * SECONDS_PER_MICRO
}

/// Projection interval from the last update. Zero until there has been one,
/// since the estimate is not tied to any point in time before that.
fn projection_seconds(last_update: Option<u64>, to: u64) -> f32 {
    last_update.map_or(0.0, |from| elapsed_seconds(from, to))
}

/// Everything that changes between updates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Estimate {
    state: OrientationState,
    covariance: Mat2,
    last_update: Option<u64>,
}

impl Estimate {
    fn initial(config: &FilterConfig) -> Self {
        Self {
            state: OrientationState::new(
                normalize_angle(config.x0.angle),
                config.x0.angular_velocity,
            ),
            covariance: config.p0,
            last_update: None,
        }
    }

    fn with(state: OrientationState, covariance: Mat2) -> Self {
        Self {
            state: OrientationState::new(
                normalize_angle(state.angle),
                state.angular_velocity,
            ),
            covariance,
            last_update: None,
        }
    }

    fn predict(
        &self,
        config: &FilterConfig,
        at: u64,
    ) -> (OrientationState, Mat2) {
        let (state, covariance, _) = self.project(config, at);
        (state, covariance)
    }

    /// Projection with the guard applied. The flag is set when the guard
    /// replaced part of the result.
    fn project(
        &self,
        config: &FilterConfig,
        at: u64,
    ) -> (OrientationState, Mat2, bool) {
        let dt = projection_seconds(self.last_update, at);
        let f = [[1.0, dt], [0.0, 1.0]];
        let mut covariance =
            add(&mul(&mul(&f, &self.covariance), &transpose(&f)), &config.q);
        let mut state = OrientationState::new(
            normalize_angle(
                self.state.angle + self.state.angular_velocity * dt,
            ),
            self.state.angular_velocity,
        );

        let mut guarded = false;
        if !(state.angle.is_finite() && state.angular_velocity.is_finite()) {
            error!("Orientation projection not finite, using initial state");
            state = Estimate::initial(config).state;
            covariance = config.p0;
            guarded = true;
        } else if !is_positive_semi_definite(&covariance) {
            error!("Projected covariance degenerate, using low confidence");
            covariance = config.p0;
            guarded = true;
        }
        (state, covariance, guarded)
    }

    fn correct(
        &mut self,
        config: &FilterConfig,
        measurement: OrientationState,
        at: u64,
    ) -> Result<(), CoreError> {
        let (predicted, p, guarded) = self.project(config, at);
        self.last_update = Some(at);
        if guarded {
            self.state = predicted;
            self.covariance = p;
            return Err(CoreError::FilterReset);
        }

        let Some(s_inv) = inverse(&add(&p, &config.r)) else {
            self.state = predicted;
            self.covariance = p;
            return self.guard(config, true);
        };
        let k = mul(&p, &s_inv);

        let innovation = [
            circular_subtract(measurement.angle, predicted.angle),
            measurement.angular_velocity - predicted.angular_velocity,
        ];
        let angle = predicted.angle
            + k[0][0] * innovation[0]
            + k[0][1] * innovation[1];
        let velocity = predicted.angular_velocity
            + k[1][0] * innovation[0]
            + k[1][1] * innovation[1];

        self.state = OrientationState::new(normalize_angle(angle), velocity);
        // P' - K P' == R (P' + R)^-1 P'
        self.covariance = symmetrize(mul(&mul(&config.r, &s_inv), &p));
        self.guard(config, false)
    }

    fn guard(
        &mut self,
        config: &FilterConfig,
        force: bool,
    ) -> Result<(), CoreError> {
        let state_finite = self.state.angle.is_finite()
            && self.state.angular_velocity.is_finite();
        if !force && state_finite && is_positive_semi_definite(&self.covariance)
        {
            return Ok(());
        }

        error!(
            "Orientation covariance degenerate, resetting to low confidence"
        );
        self.covariance = config.p0;
        if !state_finite {
            self.state = Estimate::initial(config).state;
        }
        Err(CoreError::FilterReset)
    }
}

/// Unsynchronized orientation filter.
///
/// Used directly where a single context owns the filter, and as the numeric
/// engine behind [`SharedOrientation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationFilter {
    config: FilterConfig,
    estimate: Estimate,
}

impl OrientationFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self { config: *config, estimate: Estimate::initial(config) }
    }

    /// Projects the current estimate to `at` (microseconds) without changing
    /// it.
    pub fn predict(&self, at: u64) -> (OrientationState, Mat2) {
        self.estimate.predict(&self.config, at)
    }

    /// Folds in a measurement of angle and angular velocity taken at `at`.
    ///
    /// Returns [`CoreError::FilterReset`] if the covariance had to be reset;
    /// the filter remains usable either way.
    pub fn update(
        &mut self,
        measurement: OrientationState,
        at: u64,
    ) -> Result<(), CoreError> {
        self.estimate.correct(&self.config, measurement, at)
    }

    pub fn state(&self) -> OrientationState {
        self.estimate.state
    }

    pub fn covariance(&self) -> Mat2 {
        self.estimate.covariance
    }

    /// Time of the last measurement, `None` after construction or a reset.
    pub fn last_update(&self) -> Option<u64> {
        self.estimate.last_update
    }

    /// Replaces the estimate. The next update is taken as the first one and
    /// does not project across the time since the previous measurement.
    pub fn reset(&mut self, state: OrientationState, covariance: Mat2) {
        self.estimate = Estimate::with(state, covariance);
    }
}

/// Orientation filter shared between the IMU task and its readers.
///
/// The lock only ever guards a copy of the estimate in or out; all matrix
/// arithmetic runs on a local copy. There must be a single caller of
/// [`update`](Self::update).
pub struct SharedOrientation<M: RawMutex> {
    config: FilterConfig,
    estimate: Mutex<M, Cell<Estimate>>,
}

impl<M: RawMutex> SharedOrientation<M> {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            config: *config,
            estimate: Mutex::new(Cell::new(Estimate::initial(config))),
        }
    }

    fn load(&self) -> Estimate {
        self.estimate.lock(|e| e.get())
    }

    pub fn predict(&self, at: u64) -> (OrientationState, Mat2) {
        self.load().predict(&self.config, at)
    }

    /// Updates the shared estimate and returns the new state.
    pub fn update(
        &self,
        measurement: OrientationState,
        at: u64,
    ) -> Result<OrientationState, CoreError> {
        let mut estimate = self.load();
        let result = estimate.correct(&self.config, measurement, at);
        self.estimate.lock(|e| e.set(estimate));
        result.map(|_| estimate.state)
    }

    pub fn state(&self) -> OrientationState {
        self.load().state
    }

    pub fn covariance(&self) -> Mat2 {
        self.load().covariance
    }

    pub fn reset(&self, state: OrientationState, covariance: Mat2) {
        let estimate = Estimate::with(state, covariance);
        self.estimate.lock(|e| e.set(estimate));
    }

    /// Returns to the configured initial estimate, as after construction.
    pub fn restart(&self) {
        let estimate = Estimate::initial(&self.config);
        self.estimate.lock(|e| e.set(estimate));
    }
}
