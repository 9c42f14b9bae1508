use glam::{
    Mat4,
    Vec2,
    Vec3
};

use super::sprite::SpriteId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub parent_opacity: f32,
}

impl Default for DrawParams {
    fn default() -> Self {
        Self { parent_opacity: 1.0 }
    }
}

/// What a sprite asks the backend to rasterise.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawShape {
    Rect,
    Circle {
        radius: f32,
        filled: bool,
    },
    Text {
        text: String,
        font_size: f32,
    },
    Image {
        path: String,
        loaded: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub sprite_id: SpriteId,
    pub shape: DrawShape,
    /// World transform of the sprite's local origin.
    pub transform: Mat4,
    pub size: Vec2,
    pub color: Vec3,
    pub opacity: f32,
}

/// Rendering backend seam. Rasterisation lives behind it.
pub trait DrawTarget {
    /// Called once per root before its tree is drawn.
    fn set_camera(&mut self, root: SpriteId, view_projection: Mat4);

    fn draw(&mut self, command: DrawCommand);
}

#[derive(Debug, Default, Clone)]
pub struct DrawList {
    cameras: Vec<(SpriteId, Mat4)>,
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn cameras(&self) -> &[(SpriteId, Mat4)] {
        &self.cameras
    }

    pub fn clear(&mut self) {
        self.cameras.clear();
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl DrawTarget for DrawList {
    fn set_camera(&mut self, root: SpriteId, view_projection: Mat4) {
        self.cameras.push((root, view_projection));
    }

    fn draw(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}
