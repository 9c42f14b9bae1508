use super::{
    math::Vector2F,
    sprite::{
        SpriteId,
        SpriteStore
    }
};

pub type TouchId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Added,
    Moved,
    Removed,
}

/// Raw touch delivered to the sprite that captured it. Points are in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchInfo {
    pub id: TouchId,
    pub phase: TouchPhase,
    pub start_point: Vector2F,
    pub current_point: Vector2F,
    pub delta_point: Vector2F,
    /// Index of this touch among the touches captured by the same sprite.
    pub finger_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpriteEvent {
    Touch(TouchInfo),
    Tap {
        point: Vector2F,
    },
    DoubleTap {
        point: Vector2F,
    },
    Drag {
        delta: Vector2F,
        position: Vector2F,
    },
    DragEnded {
        position: Vector2F,
    },
    /// Pixels per second, measured over the recent points of the touch.
    Swipe {
        velocity: Vector2F,
    },
    /// Applied by the built in multi-touch behaviour.
    Transform {
        translation: Vector2F,
        scale: f32,
        rotation: f32,
    },
}

/// Receives events for one sprite. The store is handed in so the listener can change
/// the sprite tree without holding on to it.
pub trait SpriteListener {
    fn on_event(&mut self, store: &mut SpriteStore, sprite: SpriteId, event: &SpriteEvent);
}

impl<F> SpriteListener for F
where
    F: FnMut(&mut SpriteStore, SpriteId, &SpriteEvent)
{
    fn on_event(&mut self, store: &mut SpriteStore, sprite: SpriteId, event: &SpriteEvent) {
        self(store, sprite, event)
    }
}
