//! Playback time for the built-in uniforms.

use std::time::{Duration, Instant};

use glam::Vec4;

use crate::render_graph::FrameInputs;

/// Seconds a single step moves when paused.
pub const DEFAULT_STEP: f32 = 1.0 / 60.0;

/// How many steps a fast seek covers.
pub const SEEK_STEPS: f32 = 5.0;

/// Counts rendered frames and reports the rate once per second.
#[derive(Debug, Clone)]
struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    rate: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            rate: 0.0,
        }
    }

    fn record(&mut self, now: Instant) {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.duration_since(start);
        if elapsed >= Duration::from_secs(1) {
            self.rate = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = Some(now);
        }
    }
}

/// Play/pause clock driving `iTime`, `iTimeDelta`, `iFrame` and `iFrameRate`.
///
/// The first frame after creation or [`reset`](Clock::reset) is frame 0 at
/// time 0.
#[derive(Debug, Clone)]
pub struct Clock {
    time: f32,
    delta: f32,
    frame: u64,
    playing: bool,
    step: f32,
    last_tick: Option<Instant>,
    started: bool,
    fps: FpsCounter,
    fixed_rate: Option<f32>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            delta: 0.0,
            frame: 0,
            playing: true,
            step: DEFAULT_STEP,
            last_tick: None,
            started: false,
            fps: FpsCounter::new(),
            fixed_rate: None,
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Measured frames per second, or the fixed rate while recording.
    pub fn frame_rate(&self) -> f32 {
        self.fixed_rate.unwrap_or(self.fps.rate)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self) {
        self.playing = !self.playing;
        tracing::debug!(playing = self.playing, time = self.time, "playback toggled");
    }

    /// Back to frame 0 at time 0. Play state is kept.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.delta = 0.0;
        self.frame = 0;
        self.started = false;
    }

    /// Set how far [`step_forward`](Self::step_forward) moves.
    pub fn set_step(&mut self, seconds: f32) {
        self.step = seconds.max(0.0);
    }

    pub fn step_forward(&mut self) {
        self.advance(self.step);
    }

    pub fn step_backward(&mut self) {
        self.rewind(self.step);
    }

    pub fn seek_forward(&mut self) {
        self.advance(self.step * SEEK_STEPS);
    }

    pub fn seek_backward(&mut self) {
        self.rewind(self.step * SEEK_STEPS);
    }

    fn advance(&mut self, dt: f32) {
        if self.started {
            self.time += dt;
            self.frame += 1;
            self.delta = dt;
        } else {
            self.started = true;
            self.delta = 0.0;
        }
    }

    fn rewind(&mut self, dt: f32) {
        self.time = (self.time - dt).max(0.0);
        self.frame = self.frame.saturating_sub(1);
        self.delta = 0.0;
    }

    /// Advance by wall-clock time since the previous tick.
    ///
    /// While paused only the fps counter moves.
    pub fn tick(&mut self, now: Instant) {
        let wall = self
            .last_tick
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_tick = Some(now);
        self.fps.record(now);
        self.fixed_rate = None;

        if self.playing {
            self.advance(wall);
        } else {
            self.delta = 0.0;
        }
    }

    /// Advance by exactly `dt` seconds, reporting `rate` as the frame rate.
    /// Used for offline rendering where wall time is meaningless.
    pub fn advance_fixed(&mut self, dt: f32, rate: f32) {
        self.fixed_rate = Some(rate);
        self.advance(dt);
    }

    /// Forget the previous wall-clock tick, so the next one has no delta.
    pub fn resync(&mut self) {
        self.last_tick = None;
    }

    /// Inputs for the frame about to be rendered.
    pub fn inputs(&self, mouse: Vec4) -> FrameInputs {
        FrameInputs {
            time: self.time,
            time_delta: self.delta,
            frame: self.frame,
            frame_rate: self.frame_rate(),
            mouse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_frame_zero_at_time_zero() {
        let mut clock = Clock::new();
        let start = Instant::now();
        clock.tick(start);
        assert_eq!((clock.frame(), clock.time()), (0, 0.0));

        clock.tick(start + Duration::from_millis(500));
        assert_eq!(clock.frame(), 1);
        assert!((clock.time() - 0.5).abs() < 1e-4);
        assert!((clock.delta() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn paused_clock_holds_time() {
        let mut clock = Clock::new();
        let start = Instant::now();
        clock.tick(start);
        clock.pause();
        clock.tick(start + Duration::from_secs(2));
        assert_eq!((clock.frame(), clock.time(), clock.delta()), (0, 0.0, 0.0));
    }

    #[test]
    fn steps_and_seeks_move_by_the_step_size() {
        let mut clock = Clock::new();
        clock.pause();
        clock.set_step(0.1);
        clock.step_forward();
        clock.step_forward();
        assert!((clock.time() - 0.1).abs() < 1e-6);

        clock.seek_forward();
        assert!((clock.time() - 0.6).abs() < 1e-5);

        clock.seek_backward();
        clock.seek_backward();
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn reset_keeps_play_state() {
        let mut clock = Clock::new();
        clock.advance_fixed(1.0, 30.0);
        clock.advance_fixed(1.0, 30.0);
        clock.pause();
        clock.reset();
        assert!(!clock.is_playing());
        assert_eq!((clock.frame(), clock.time()), (0, 0.0));
    }

    #[test]
    fn fixed_steps_report_the_fixed_rate() {
        let mut clock = Clock::new();
        for _ in 0..4 {
            clock.advance_fixed(1.0 / 30.0, 30.0);
        }
        let inputs = clock.inputs(Vec4::ZERO);
        assert_eq!(inputs.frame, 3);
        assert_eq!(inputs.frame_rate, 30.0);
        assert!((inputs.time - 0.1).abs() < 1e-5);
    }

    #[test]
    fn fps_counter_reports_after_a_second() {
        let mut fps = FpsCounter::new();
        let start = Instant::now();
        for i in 0..=30 {
            fps.record(start + Duration::from_millis(i * 1000 / 30));
        }
        assert!((fps.rate - 31.0).abs() < 0.5);
    }
}
