use std::ops::Range;

use glam::Vec3;
use rand::seq::IndexedRandom;

use crate::ui::{
    event::SpriteEvent,
    sprite::{
        Circle,
        MultiTouchConstraints,
        SpriteId,
        SpriteKind,
        SpriteStore,
        Text,
        TreeError,
        UpdateParams
    }
};

use super::{
    auto_update::AutoUpdate,
    engine::Engine,
    EngineRole
};

const STEP: f32 = 24.0;
const STEP_DURATION: f32 = 0.4;
const IDLE_FRAMES_RANGE: Range<u32> = 10..90;

const COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 0.0),
];

#[derive(Debug, Clone)]
struct Wanderer {
    sprite: SpriteId,
    spawnpoint: Vec3,
    roaming_range: f32,
    idle_frames: u32,
}

/// Dots that step to a random neighbour cell now and then, never leaving their range.
#[derive(Debug, Default)]
pub struct WanderingDots {
    dots: Vec<Wanderer>,
}

impl WanderingDots {
    pub fn spawn(store: &mut SpriteStore, parent: SpriteId, positions: &[Vec3]) -> Result<Self, TreeError> {
        let mut dots = Vec::with_capacity(positions.len());
        for position in positions {
            let sprite = store.create(parent, SpriteKind::Circle(Circle::new(true, 6.0)))?;
            if let Some(dot) = store.get_mut(sprite) {
                let channel = rand::random_range(0.2..0.6);
                dot.set_center(Vec3::new(0.5, 0.5, 0.0));
                dot.set_position(*position);
                dot.set_color(Vec3::splat(channel));
            }
            dots.push(Wanderer {
                sprite,
                spawnpoint: *position,
                roaming_range: STEP * 2.5,
                idle_frames: rand::random_range(IDLE_FRAMES_RANGE),
            });
        }
        Ok(Self { dots })
    }

    pub fn sprites(&self) -> impl Iterator<Item = SpriteId> + '_ {
        self.dots.iter().map(|dot| dot.sprite)
    }
}

impl AutoUpdate for WanderingDots {
    fn update(&mut self, store: &mut SpriteStore, _params: &UpdateParams) {
        let directions = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y];
        self.dots.retain(|dot| store.contains(dot.sprite));

        for dot in self.dots.iter_mut() {
            let Some(sprite) = store.get_mut(dot.sprite) else {
                continue;
            };
            if sprite.is_tweening() {
                continue;
            }
            if dot.idle_frames > 0 {
                dot.idle_frames -= 1;
                continue;
            }

            let Some(direction) = directions.choose(&mut rand::rng()) else {
                continue;
            };
            let destination = sprite.position() + *direction * STEP;
            if destination.distance(dot.spawnpoint) > dot.roaming_range {
                log::trace!("Dot {} would leave its range", dot.sprite);
                continue;
            }
            sprite.tween_position(destination, STEP_DURATION);
            dot.idle_frames = rand::random_range(IDLE_FRAMES_RANGE);
        }
    }
}

/// Sprites of the demo scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoScene {
    pub button: SpriteId,
    pub label: SpriteId,
    pub card: SpriteId,
}

/// Wandering dots, a tappable circle and a label on the ortho root, a card that can be
/// dragged, pinched and rotated on the perspective root.
pub fn build_demo_scene(engine: &mut Engine, dot_count: usize) -> Result<DemoScene, TreeError> {
    let ortho = engine.root_sprite(0).ok_or(TreeError::EmptyId)?;
    let world = engine.settings().world_dimensions;

    let positions: Vec<Vec3> = (0..dot_count)
        .map(|index| {
            let column = (index % 8) as f32;
            let row = (index / 8) as f32;
            Vec3::new(STEP * 2.0 + column * STEP * 3.0, STEP * 2.0 + row * STEP * 3.0, 0.0)
        })
        .collect();
    let dots = WanderingDots::spawn(engine.store_mut(), ortho, &positions)?;
    engine.add_auto_update(EngineRole::Server, dots);

    let button = engine.create_sprite(ortho, SpriteKind::Circle(Circle::new(true, 40.0)))?;
    if let Some(sprite) = engine.find_sprite_mut(button) {
        sprite.set_position_xy(world.x - 120.0, world.y - 120.0);
        sprite.set_color(COLORS[0]);
        sprite.enable(true);
    }
    let mut color_index = 0;
    engine.add_listener(button, move |store: &mut SpriteStore, sprite: SpriteId, event: &SpriteEvent| {
        let Some(sprite) = store.get_mut(sprite) else {
            return;
        };
        match event {
            SpriteEvent::Tap { .. } => {
                color_index = (color_index + 1) % COLORS.len();
                sprite.set_color(COLORS[color_index]);
            },
            SpriteEvent::DoubleTap { .. } => {
                sprite.tween_scale(sprite.scale() * 1.2, 0.2);
            },
            _ => {},
        }
    });

    let label = engine.create_sprite(ortho, SpriteKind::Text(Text::new("sprite_sync", 24.0)))?;
    if let Some(sprite) = engine.find_sprite_mut(label) {
        sprite.set_position_xy(16.0, 16.0);
        sprite.set_size(240.0, 32.0);
    }

    let card_parent = engine.root_sprite(1).unwrap_or(ortho);
    let card = engine.create_sprite(card_parent, SpriteKind::Plain)?;
    if let Some(sprite) = engine.find_sprite_mut(card) {
        sprite.set_size(200.0, 120.0);
        sprite.set_center(Vec3::new(0.5, 0.5, 0.0));
        sprite.set_position_xy(world.x / 2.0, world.y / 2.0);
        sprite.set_transparent(false);
        sprite.set_color(Vec3::new(0.9, 0.9, 0.9));
        sprite.enable(true);
        sprite.set_multi_touch_constraints(MultiTouchConstraints::ALL);
    }

    log::info!("Demo scene with {dot_count} dots, button={button}, label={label}, card={card}");
    Ok(DemoScene { button, label, card })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::roots::RootList,
        settings::EngineSettings,
        ui::math::Vector2F
    };

    fn demo_engine() -> (Engine, DemoScene) {
        let mut engine = Engine::new(EngineRole::Server, EngineSettings::default(), &RootList::new().ortho().persp()).unwrap();
        let scene = build_demo_scene(&mut engine, 5).unwrap();
        (engine, scene)
    }

    #[test]
    fn test_scene_layout() {
        let (engine, scene) = demo_engine();
        // Two roots, five dots, button, label, card.
        assert_eq!(engine.store().len(), 10);
        assert_eq!(engine.find_sprite(scene.card).unwrap().parent(), engine.root_sprite(1));
        assert!(engine.find_sprite(scene.card).unwrap().is_perspective());
    }

    #[test]
    fn test_tap_changes_button_color() {
        let (mut engine, scene) = demo_engine();
        let before = engine.find_sprite(scene.button).unwrap().color();
        let world = engine.settings().world_dimensions;
        let point = Vector2F::new(world.x - 80.0, world.y - 80.0);
        engine.mouse_touch_begin(0, point);
        engine.mouse_touch_ended(0, point);
        assert_ne!(engine.find_sprite(scene.button).unwrap().color(), before);
    }

    #[test]
    fn test_dots_stay_in_range() {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let spawn = Vec3::new(100.0, 100.0, 0.0);
        let mut dots = WanderingDots::spawn(&mut store, root, &[spawn]).unwrap();
        let params = UpdateParams { delta_time: 0.1, elapsed_time: 0.0 };
        for _ in 0..2000 {
            dots.update(&mut store, &params);
            store.update_server(root, &params);
        }
        let dot = dots.sprites().next().unwrap();
        assert!(store.get(dot).unwrap().position().distance(spawn) <= STEP * 2.5 + 1e-3);
    }
}
