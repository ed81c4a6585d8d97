//! Frame driver
//!
//! The engine owns a [`Scene`] and turns wall-clock frames into scene time:
//! a variable loop advances by the measured delta (clamped and scaled by the
//! configured speed), a fixed loop by a constant tick.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::config::{Config, ConfigError, EngineConfig, GameLoopType};
use crate::ecs::Scene;
use crate::error::SceneError;
use crate::foundation::time::Timer;

/// Main engine struct
pub struct Engine {
    scene: Scene,
    config: EngineConfig,
    timer: Timer,
    last_frame_time: f64,
    game_time: f64,
    frames: u64,
    running: bool,
}

impl Engine {
    /// Create an engine with a fresh scene called `name`
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        log::info!("Initializing engine ({:?} loop, speed {})", config.game_loop, config.speed);
        Self {
            scene: Scene::new(name, config.scene.clone()),
            config,
            timer: Timer::new(),
            last_frame_time: 0.0,
            game_time: 0.0,
            frames: 0,
            running: true,
        }
    }

    /// Create an engine from a TOML or RON configuration file
    pub fn from_config_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let config = EngineConfig::load_from_file(path)?;
        Ok(Self::new(name, config))
    }

    /// Advance one frame given the wall-clock time in milliseconds
    ///
    /// Returns the scene delta that was applied.
    pub fn frame(&mut self, now_ms: f64) -> Result<f64, EngineError> {
        if !self.running {
            return Ok(0.0);
        }
        let measured = (now_ms - self.last_frame_time).clamp(0.0, self.config.game_loop_threshold);
        self.last_frame_time = now_ms;

        let delta = match self.config.game_loop {
            GameLoopType::Fixed => self.config.game_loop_fixed_tick,
            GameLoopType::Variable => measured,
        } * self.config.speed;
        self.step(delta)?;
        Ok(delta)
    }

    /// Advance scene time by exactly `delta` milliseconds
    pub fn step(&mut self, delta: f64) -> Result<(), EngineError> {
        self.game_time += delta;
        self.frames += 1;
        log::trace!("Frame {} at {:.2} ms", self.frames, self.game_time);
        self.scene.update(delta, self.game_time)?;
        Ok(())
    }

    /// Run in real time until stopped or `max_frames` frames were played
    ///
    /// Sleeps one fixed tick between frames.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<(), EngineError> {
        log::info!("Starting main loop...");
        let tick = Duration::from_secs_f64(self.config.game_loop_fixed_tick.max(1.0) / 1000.0);
        self.last_frame_time = self.timer.now_ms();
        while self.running && max_frames.map_or(true, |max| self.frames < max) {
            self.timer.update();
            self.frame(self.timer.now_ms())?;
            std::thread::sleep(tick);
        }
        log::info!("Main loop finished after {} frames, {:.1} fps", self.frames, self.timer.average_fps());
        Ok(())
    }

    /// Request shutdown; further frames are ignored
    pub fn stop(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Whether the engine still plays frames
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Get mutable access to the scene
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Accumulated scene time in milliseconds
    pub fn game_time(&self) -> f64 {
        self.game_time
    }

    /// Number of frames played
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Scene failure during a frame
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::components::FuncComponent;

    fn recorder(engine: &mut Engine) -> Rc<RefCell<Vec<(f64, f64)>>> {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        let root = engine.scene().root();
        engine
            .scene_mut()
            .spawn_component(
                root,
                FuncComponent::new("recorder").do_on_update(move |_, delta, absolute| {
                    sink.borrow_mut().push((delta, absolute));
                    Ok(())
                }),
            )
            .unwrap();
        frames
    }

    #[test]
    fn test_variable_loop_clamps_and_scales() {
        let config = EngineConfig { speed: 2.0, ..EngineConfig::default() };
        let mut engine = Engine::new("variable", config);
        let frames = recorder(&mut engine);

        engine.frame(10.0).unwrap();
        engine.frame(1010.0).unwrap();
        let frames = frames.borrow();
        assert_relative_eq!(frames[0].0, 20.0);
        // 1000 ms gap clamped to the 300 ms threshold, then doubled
        assert_relative_eq!(frames[1].0, 600.0);
        assert_relative_eq!(frames[1].1, 620.0);
        assert_relative_eq!(engine.game_time(), 620.0);
    }

    #[test]
    fn test_fixed_loop_ignores_wall_clock() {
        let config = EngineConfig { game_loop: GameLoopType::Fixed, ..EngineConfig::default() };
        let mut engine = Engine::new("fixed", config);
        let frames = recorder(&mut engine);

        for now in [5.0, 500.0, 501.0] {
            engine.frame(now).unwrap();
        }
        assert!(frames.borrow().iter().all(|(delta, _)| (*delta - 16.0).abs() < f64::EPSILON));
        assert_relative_eq!(engine.game_time(), 48.0);
        assert_eq!(engine.frame_count(), 3);
    }

    #[test]
    fn test_stop_ignores_frames() {
        let mut engine = Engine::new("stopped", EngineConfig::default());
        engine.step(16.0).unwrap();
        engine.stop();
        assert_relative_eq!(engine.frame(100.0).unwrap(), 0.0);
        assert_eq!(engine.frame_count(), 1);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_scene_errors_reach_the_driver() {
        let mut engine = Engine::new("failing", EngineConfig::default());
        let root = engine.scene().root();
        engine
            .scene_mut()
            .spawn_component(
                root,
                FuncComponent::new("broken").do_on_update(|_, _, _| Err(SceneError::Callback("boom".into()))),
            )
            .unwrap();
        assert!(matches!(engine.step(16.0), Err(EngineError::Scene(SceneError::Callback(_)))));
    }

    #[test]
    fn test_missing_config_file() {
        let result = Engine::from_config_file("missing", "does/not/exist.toml");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
