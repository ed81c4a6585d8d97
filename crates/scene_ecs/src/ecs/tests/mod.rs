//! Scenario tests driving a scene frame by frame

mod messaging;

use crate::core::config::SceneConfig;
use crate::ecs::{NodeId, Scene};
use crate::foundation::logging;

/// Frame length used by the harness, in milliseconds
pub(crate) const FRAME_MS: f64 = 16.67;

/// Simulated time after which [`Harness::run_until`] gives up
pub(crate) const TIMEOUT_MS: f64 = 10_000.0;

/// Drives a scene with a fixed frame length
pub(crate) struct Harness {
    pub(crate) scene: Scene,
    absolute: f64,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub(crate) fn with_config(config: SceneConfig) -> Self {
        logging::init_for_tests();
        Self { scene: Scene::new("test", config), absolute: 0.0 }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.scene.root()
    }

    /// Simulated time of the last frame
    pub(crate) fn absolute(&self) -> f64 {
        self.absolute
    }

    /// Run one frame
    pub(crate) fn tick(&mut self) {
        self.absolute += FRAME_MS;
        if let Err(err) = self.scene.update(FRAME_MS, self.absolute) {
            panic!("update at {:.2} ms failed: {err}", self.absolute);
        }
    }

    /// Run `frames` frames
    pub(crate) fn ticks(&mut self, frames: usize) {
        for _ in 0..frames {
            self.tick();
        }
    }

    /// Run frames until at least `ms` of simulated time passed
    pub(crate) fn advance(&mut self, ms: f64) {
        let until = self.absolute + ms;
        while self.absolute < until {
            self.tick();
        }
    }

    /// Run frames until `done` holds; false on timeout
    pub(crate) fn run_until(&mut self, mut done: impl FnMut(&Scene) -> bool) -> bool {
        let deadline = self.absolute + TIMEOUT_MS;
        while !done(&self.scene) {
            if self.absolute >= deadline {
                log::error!("Scenario timed out after {} ms", TIMEOUT_MS);
                return false;
            }
            self.tick();
        }
        true
    }
}
