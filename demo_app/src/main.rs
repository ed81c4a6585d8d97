//! Swarm demo
//!
//! Headless showcase of the scene framework: a chain spawns waves of drones,
//! each drone wanders for a random lifetime and then destroys itself, and a
//! scorekeeper listens to the traffic on the message bus.
//!
//! Run with `--realtime` to play frames against the wall clock, or pass
//! `--config <file.toml|file.ron>` to load engine settings.

use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;
use scene_ecs::prelude::*;

// Swarm configuration
const WAVES: u32 = 3;
const DRONES_PER_WAVE: usize = 6;
const DRONE_LIFETIME_MS: std::ops::Range<f64> = 800.0..2500.0;
const DRONE_STEP: f64 = 4.0;
const WANDER_FREQUENCY: f64 = 4.0;
const PAUSE_BETWEEN_WAVES_MS: f64 = 500.0;
const MAX_FRAMES: u64 = 5_000;

const DRONE_TAG: &str = "drone";
const WAVE_CLEARED: &str = "WAVE_CLEARED";
const DONE_ATTRIBUTE: &str = "swarm_done";

/// Demo failures
#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Position of a drone, stored as a node attribute
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    x: f64,
    y: f64,
}

fn drone_component() -> FuncComponent {
    let lifetime = rand::thread_rng().gen_range(DRONE_LIFETIME_MS);
    FuncComponent::new("drone")
        .with_duration(lifetime)
        .with_fixed_frequency(WANDER_FREQUENCY)
        .do_on_init(|ctx| {
            if let Some(owner) = ctx.owner() {
                ctx.scene().assign_attribute(owner, "position", Position::default())?;
            }
            Ok(())
        })
        .do_on_fixed_update(|ctx, _delta, _absolute| {
            let Some(owner) = ctx.owner() else {
                return Ok(());
            };
            let mut rng = rand::thread_rng();
            if let Some(position) = ctx.scene().attribute_mut::<Position>(owner, "position") {
                position.x += rng.gen_range(-DRONE_STEP..DRONE_STEP);
                position.y += rng.gen_range(-DRONE_STEP..DRONE_STEP);
            }
            Ok(())
        })
        .do_on_finish(|ctx| {
            if let Some(owner) = ctx.owner() {
                // can't tear down the owner from inside its own component
                ctx.scene().call_with_delay(0.0, move |scene| {
                    if scene.node(owner).is_some() {
                        scene.destroy(owner)?;
                    }
                    Ok(())
                });
            }
            Ok(())
        })
}

fn spawn_wave(scene: &mut Scene, wave: u32) -> scene_ecs::Result<()> {
    let root = scene.root();
    for index in 0..DRONES_PER_WAVE {
        let drone = scene.create_node(format!("drone-{wave}-{index}"));
        scene.add_tag(drone, DRONE_TAG)?;
        scene.add_child(root, drone)?;
        scene.spawn_component(drone, drone_component())?;
    }
    log::info!("Wave {} launched with {} drones", wave, DRONES_PER_WAVE);
    Ok(())
}

fn swarm_chain() -> ChainComponent {
    let wave = Rc::new(Cell::new(0_u32));
    let (launch, report) = (Rc::clone(&wave), wave);

    ChainComponent::new("swarm")
        .begin_repeat(WAVES)
        .call(move |ctx| {
            launch.set(launch.get() + 1);
            spawn_wave(ctx.scene(), launch.get())
        })
        .wait_until(|scene| scene.find_objects_by_tag(DRONE_TAG).map_or(true, |drones| drones.is_empty()))
        .call(move |ctx| {
            ctx.send_message(WAVE_CLEARED, Some(Rc::new(report.get())))?;
            Ok(())
        })
        .wait_time(PAUSE_BETWEEN_WAVES_MS)
        .end_repeat()
        .call(|ctx| {
            log::info!("All waves cleared");
            ctx.scene().assign_global_attribute(DONE_ATTRIBUTE, true)
        })
}

fn scorekeeper() -> FuncComponent {
    let destroyed = Rc::new(Cell::new(0_usize));
    let counted = Rc::clone(&destroyed);
    FuncComponent::new("scorekeeper")
        .do_on_message(actions::OBJECT_REMOVED, move |_, _| {
            counted.set(counted.get() + 1);
            Ok(())
        })
        .do_on_message(WAVE_CLEARED, move |_, msg| {
            let wave = msg.data::<u32>().copied().unwrap_or_default();
            log::info!("Wave {} cleared, {} drones gone so far", wave, destroyed.get());
            Ok(())
        })
}

fn load_config(args: &[String]) -> Result<EngineConfig, DemoError> {
    let path = args.iter().position(|arg| arg == "--config").and_then(|index| args.get(index + 1));
    let config = match path {
        Some(path) => EngineConfig::load_from_file(path).map_err(EngineError::from)?,
        None => EngineConfig {
            game_loop: GameLoopType::Fixed,
            ..EngineConfig::default()
        },
    };
    Ok(config)
}

fn run(args: &[String]) -> Result<(), DemoError> {
    let config = load_config(args)?;
    let mut engine = Engine::new("swarm", config);
    let root = engine.scene().root();
    engine.scene_mut().spawn_component(root, scorekeeper())?;
    swarm_chain().execute_upon(engine.scene_mut(), root)?;

    if args.iter().any(|arg| arg == "--realtime") {
        engine.run(Some(MAX_FRAMES))?;
        return Ok(());
    }

    // simulated clock, one fixed tick per frame
    let tick = engine.config().game_loop_fixed_tick;
    let mut now = 0.0;
    while engine.frame_count() < MAX_FRAMES {
        now += tick;
        engine.frame(now)?;
        if engine.scene().global_attribute::<bool>(DONE_ATTRIBUTE).copied().unwrap_or(false) {
            engine.stop();
            break;
        }
    }
    log::info!(
        "Simulated {:.1} s in {} frames, components alive: {:?}",
        engine.game_time() / 1000.0,
        engine.frame_count(),
        engine.scene().component_census()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting swarm demo");
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => {
            log::info!("Swarm demo completed successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Swarm demo failed: {}", e);
            Err(e.into())
        }
    }
}
