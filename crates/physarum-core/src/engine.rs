/// Upper bound on catch-up ticks executed in one callback.
pub const MAX_TICKS_PER_FRAME: usize = 4;

const FPS_WINDOW_MS: f64 = 1000.0;

/// Convert the user-facing speed into a tick interval in milliseconds.
pub fn speed_to_interval(speed: f64) -> f64 {
    (100.0 - speed).max(1.0)
}

/// Fixed-timestep accumulator scheduler driven by display-refresh callbacks. Time is
/// supplied by the caller in milliseconds; the engine never reads a clock and never runs
/// ticks outside [`StepEngine::frame`].
#[derive(Clone, Debug)]
pub struct StepEngine {
    running: bool,
    interval_ms: f64,
    accumulator: f64,
    last_time: f64,
    frames: u32,
    last_fps_update: f64,
    fps: f64,
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl StepEngine {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            running: false,
            interval_ms: interval_ms.max(1.0),
            accumulator: 0.0,
            last_time: 0.0,
            frames: 0,
            last_fps_update: 0.0,
            fps: 0.0,
        }
    }

    /// Begin accepting frames. Calling it while already running changes nothing.
    pub fn start(&mut self, now_ms: f64) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_time = now_ms;
        self.accumulator = 0.0;
        // The fps window restarts so a pause is never counted as slow frames.
        self.frames = 0;
        self.last_fps_update = now_ms;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_interval(&mut self, interval_ms: f64) {
        self.interval_ms = interval_ms.max(1.0);
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator
    }

    /// Display frames counted over the last full one-second window.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// One display-refresh callback. Runs `tick` up to [`MAX_TICKS_PER_FRAME`] times and
    /// returns how many ticks ran. A stopped engine runs nothing.
    pub fn frame<F: FnMut()>(&mut self, now_ms: f64, mut tick: F) -> usize {
        if !self.running {
            return 0;
        }
        let delta = now_ms - self.last_time;
        self.last_time = now_ms;
        self.accumulator += delta.max(0.0);

        self.frames += 1;
        if now_ms - self.last_fps_update >= FPS_WINDOW_MS {
            self.fps = self.frames as f64;
            self.frames = 0;
            self.last_fps_update = now_ms;
        }

        let mut ticks = 0;
        while self.accumulator >= self.interval_ms && ticks < MAX_TICKS_PER_FRAME {
            tick();
            self.accumulator -= self.interval_ms;
            ticks += 1;
        }
        // Drop backlog beyond the catch-up bound instead of carrying it forward.
        if self.accumulator > self.interval_ms * MAX_TICKS_PER_FRAME as f64 {
            self.accumulator = 0.0;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_maps_to_inverted_interval() {
        assert_eq!(speed_to_interval(80.0), 20.0);
        assert_eq!(speed_to_interval(0.0), 100.0);
        assert_eq!(speed_to_interval(100.0), 1.0);
        assert_eq!(speed_to_interval(250.0), 1.0);
    }

    #[test]
    fn fixed_step_fires_three_ticks_for_350ms() {
        let mut engine = StepEngine::new(100.0);
        engine.start(0.0);
        let mut count = 0;
        assert_eq!(engine.frame(350.0, || count += 1), 3);
        assert_eq!(count, 3);
        assert_eq!(engine.accumulator_ms(), 50.0);
    }

    #[test]
    fn start_is_idempotent() {
        let mut engine = StepEngine::new(100.0);
        engine.start(0.0);
        engine.frame(60.0, || {});
        engine.start(1000.0);
        assert!(engine.is_running());
        // A second start must not reset the clock or the accumulator.
        assert_eq!(engine.accumulator_ms(), 60.0);
        assert_eq!(engine.frame(100.0, || {}), 1);
    }

    #[test]
    fn stop_prevents_pending_ticks() {
        let mut engine = StepEngine::new(10.0);
        engine.start(0.0);
        engine.stop();
        engine.stop();
        let mut count = 0;
        assert_eq!(engine.frame(500.0, || count += 1), 0);
        assert_eq!(count, 0);
        assert!(!engine.is_running());
    }

    #[test]
    fn long_stall_is_capped_and_backlog_dropped() {
        let mut engine = StepEngine::new(10.0);
        engine.start(0.0);
        let mut count = 0;
        assert_eq!(engine.frame(5000.0, || count += 1), MAX_TICKS_PER_FRAME);
        assert_eq!(engine.accumulator_ms(), 0.0);
        assert_eq!(engine.frame(5005.0, || count += 1), 0);
        assert_eq!(count, MAX_TICKS_PER_FRAME);
    }

    #[test]
    fn fps_counts_frames_per_second() {
        let mut engine = StepEngine::new(100.0);
        engine.start(0.0);
        for i in 1..=60 {
            engine.frame(i as f64 * (1000.0 / 60.0), || {});
        }
        engine.frame(1001.0, || {});
        assert!((60.0..=61.0).contains(&engine.fps()), "fps={}", engine.fps());
    }

    #[test]
    fn resume_starts_a_fresh_fps_window() {
        let mut engine = StepEngine::new(100.0);
        engine.start(0.0);
        for i in 1..=30 {
            engine.frame(i as f64 * (1000.0 / 60.0), || {});
        }
        engine.stop();
        engine.start(10_000.0);
        for i in 1..=60 {
            engine.frame(10_000.0 + i as f64 * (1000.0 / 60.0), || {});
        }
        engine.frame(11_001.0, || {});
        assert!((60.0..=61.0).contains(&engine.fps()), "fps={}", engine.fps());
    }
}
