use crate::config::SessionConfig;

pub const LOW_FPS_THRESHOLD: f64 = 60.0;
pub const HIGH_FPS_THRESHOLD: f64 = 75.0;
/// Consecutive slow observations before scaling down.
pub const LOW_STREAK: u32 = 3;
/// Consecutive fast observations before scaling up.
pub const HIGH_STREAK: u32 = 5;

/// Hysteresis controller trading grid resolution for frame rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionController {
    scale: f64,
    min_scale: f64,
    max_scale: f64,
    step: f64,
    low_count: u32,
    high_count: u32,
}

fn round_hundredths(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl ResolutionController {
    pub fn new(min_scale: f64, max_scale: f64, step: f64) -> Self {
        Self {
            scale: max_scale,
            min_scale,
            max_scale,
            step,
            low_count: 0,
            high_count: 0,
        }
    }

    pub fn from_session(config: &SessionConfig) -> Self {
        Self::new(
            config.min_resolution_scale,
            config.max_resolution_scale,
            config.resolution_scale_step,
        )
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn counters(&self) -> (u32, u32) {
        (self.low_count, self.high_count)
    }

    /// Force a scale, clamped to the bounds. Streaks restart.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale.clamp(self.min_scale, self.max_scale);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.low_count = 0;
        self.high_count = 0;
    }

    /// Feed one fps measurement. Returns the new scale when it changed.
    ///
    /// `active` is false while the session is paused or the accelerated path is
    /// unavailable; such observations only reset the streaks.
    pub fn observe(&mut self, fps: f64, active: bool) -> Option<f64> {
        if !active {
            self.reset();
            return None;
        }
        if fps < LOW_FPS_THRESHOLD && self.scale > self.min_scale {
            self.low_count += 1;
            self.high_count = 0;
            if self.low_count >= LOW_STREAK {
                self.low_count = 0;
                self.scale = round_hundredths(self.scale - self.step).max(self.min_scale);
                return Some(self.scale);
            }
        } else if fps > HIGH_FPS_THRESHOLD && self.scale < self.max_scale {
            self.high_count += 1;
            self.low_count = 0;
            if self.high_count >= HIGH_STREAK {
                self.high_count = 0;
                self.scale = round_hundredths(self.scale + self.step).min(self.max_scale);
                return Some(self.scale);
            }
        } else {
            self.reset();
        }
        None
    }
}

impl Default for ResolutionController {
    fn default() -> Self {
        Self::from_session(&SessionConfig::default())
    }
}
