use glam::Vec2;

use crate::{
    net::{
        attribute::{
            write_attribute,
            AttrValue
        },
        data_buffer::DataBuffer
    },
    ui::draw::DrawShape
};

use super::{
    AttributeApply,
    AttributeMask
};

pub mod circle_attribute {
    pub const RADIUS: u8 = super::super::attribute::KIND_ATTRIBUTE_START;
    pub const FILLED: u8 = RADIUS + 1;
}

pub mod text_attribute {
    pub const TEXT: u8 = super::super::attribute::KIND_ATTRIBUTE_START;
    pub const FONT_SIZE: u8 = TEXT + 1;
}

pub mod image_attribute {
    pub const PATH: u8 = super::super::attribute::KIND_ATTRIBUTE_START;
}

/// Discriminant of [`SpriteKind`], used as the key of the blob registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpriteKindTag {
    Plain,
    Circle,
    Text,
    Image,
}

impl SpriteKindTag {
    /// Installation order. Server and client must agree on it.
    pub const ALL: [SpriteKindTag; 4] = [
        SpriteKindTag::Plain,
        SpriteKindTag::Circle,
        SpriteKindTag::Text,
        SpriteKindTag::Image,
    ];

    /// Default instance used when a replica of this kind is first seen.
    pub fn make(self) -> SpriteKind {
        match self {
            SpriteKindTag::Plain => SpriteKind::Plain,
            SpriteKindTag::Circle => SpriteKind::Circle(Circle::default()),
            SpriteKindTag::Text => SpriteKind::Text(Text::default()),
            SpriteKindTag::Image => SpriteKind::Image(Image::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpriteKind {
    Plain,
    Circle(Circle),
    Text(Text),
    Image(Image),
}

/// Circle drawn around `(radius, radius)`; the sprite size follows the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub(super) filled: bool,
    pub(super) radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub(super) text: String,
    pub(super) font_size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Empty,
    Pending,
    Loading,
    Loaded {
        width: u32,
        height: u32,
    },
    Failed,
}

/// Image content is loaded on each process by the image service; only the path travels.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub(super) path: String,
    pub(super) status: ImageStatus,
}

impl Circle {
    pub fn new(filled: bool, radius: f32) -> Self {
        Self { filled, radius }
    }

    pub fn filled(&self) -> bool {
        self.filled
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Default for Circle {
    fn default() -> Self {
        Self::new(true, 0.0)
    }
}

impl Text {
    pub fn new<S: AsRef<str>>(text: S, font_size: f32) -> Self {
        Self { text: text.as_ref().to_string(), font_size }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new("", 12.0)
    }
}

impl Image {
    pub fn new<S: AsRef<str>>(path: S) -> Self {
        let mut image = Self { path: String::new(), status: ImageStatus::Empty };
        image.set_path(path.as_ref());
        image
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    /// Returns true when the path changed. A new path queues a load.
    pub(super) fn set_path(&mut self, path: &str) -> bool {
        if self.path == path {
            return false;
        }
        self.path = path.to_string();
        self.status = if path.is_empty() {
            ImageStatus::Empty
        } else {
            ImageStatus::Pending
        };
        true
    }

    pub(crate) fn set_status(&mut self, status: ImageStatus) {
        self.status = status;
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::new("")
    }
}

impl SpriteKind {
    pub fn tag(&self) -> SpriteKindTag {
        match self {
            SpriteKind::Plain => SpriteKindTag::Plain,
            SpriteKind::Circle(_) => SpriteKindTag::Circle,
            SpriteKind::Text(_) => SpriteKindTag::Text,
            SpriteKind::Image(_) => SpriteKindTag::Image,
        }
    }

    pub(super) fn initial_size(&self) -> Vec2 {
        match self {
            SpriteKind::Circle(circle) => Vec2::splat(circle.radius * 2.0),
            _ => Vec2::ZERO,
        }
    }

    pub fn all_attributes(&self) -> AttributeMask {
        match self {
            SpriteKind::Plain => AttributeMask::EMPTY,
            SpriteKind::Circle(_) => AttributeMask::from_ids(&[circle_attribute::RADIUS, circle_attribute::FILLED]),
            SpriteKind::Text(_) => AttributeMask::from_ids(&[text_attribute::TEXT, text_attribute::FONT_SIZE]),
            SpriteKind::Image(_) => AttributeMask::single(image_attribute::PATH),
        }
    }

    pub(super) fn write_attributes(&self, mask: AttributeMask, buffer: &mut DataBuffer) {
        match self {
            SpriteKind::Plain => {},
            SpriteKind::Circle(circle) => {
                if mask.contains(circle_attribute::RADIUS) {
                    write_attribute(buffer, circle_attribute::RADIUS, &AttrValue::F32(circle.radius));
                }
                if mask.contains(circle_attribute::FILLED) {
                    write_attribute(buffer, circle_attribute::FILLED, &AttrValue::Bool(circle.filled));
                }
            },
            SpriteKind::Text(text) => {
                if mask.contains(text_attribute::TEXT) {
                    write_attribute(buffer, text_attribute::TEXT, &AttrValue::Str(text.text.clone()));
                }
                if mask.contains(text_attribute::FONT_SIZE) {
                    write_attribute(buffer, text_attribute::FONT_SIZE, &AttrValue::F32(text.font_size));
                }
            },
            SpriteKind::Image(image) => {
                if mask.contains(image_attribute::PATH) {
                    write_attribute(buffer, image_attribute::PATH, &AttrValue::Str(image.path.clone()));
                }
            },
        }
    }

    /// `Ok(true)` when the value changed, `Ok(false)` when it was already set.
    pub(super) fn apply_attribute(&mut self, id: u8, value: &AttrValue) -> Result<bool, AttributeApply> {
        let changed = match (self, id) {
            (SpriteKind::Circle(circle), circle_attribute::RADIUS) => {
                value.as_f32().map(|radius| replace_if_changed(&mut circle.radius, radius))
            },
            (SpriteKind::Circle(circle), circle_attribute::FILLED) => {
                value.as_bool().map(|filled| replace_if_changed(&mut circle.filled, filled))
            },
            (SpriteKind::Text(text), text_attribute::TEXT) => {
                value.as_str().map(|s| {
                    if text.text == s {
                        return false;
                    }
                    text.text = s.to_string();
                    true
                })
            },
            (SpriteKind::Text(text), text_attribute::FONT_SIZE) => {
                value.as_f32().map(|size| replace_if_changed(&mut text.font_size, size))
            },
            (SpriteKind::Image(image), image_attribute::PATH) => {
                value.as_str().map(|path| image.set_path(path))
            },
            _ => return Err(AttributeApply::Unknown),
        };
        changed.ok_or(AttributeApply::TypeMismatch)
    }

    pub(super) fn draw_shape(&self) -> Option<DrawShape> {
        match self {
            SpriteKind::Plain => Some(DrawShape::Rect),
            SpriteKind::Circle(circle) => Some(DrawShape::Circle {
                radius: circle.radius,
                filled: circle.filled,
            }),
            SpriteKind::Text(text) => Some(DrawShape::Text {
                text: text.text.clone(),
                font_size: text.font_size,
            }),
            SpriteKind::Image(image) => Some(DrawShape::Image {
                path: image.path.clone(),
                loaded: matches!(image.status, ImageStatus::Loaded { .. }),
            }),
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[test]
fn test_kind_attribute_ids_are_kind_local() {
    assert_eq!(circle_attribute::RADIUS, text_attribute::TEXT);
    assert_eq!(text_attribute::TEXT, image_attribute::PATH);

    let mut circle = SpriteKindTag::Circle.make();
    let mut text = SpriteKindTag::Text.make();
    assert_eq!(circle.apply_attribute(circle_attribute::RADIUS, &AttrValue::F32(13.0)), Ok(true));
    assert_eq!(circle.apply_attribute(circle_attribute::RADIUS, &AttrValue::F32(13.0)), Ok(false));
    assert_eq!(text.apply_attribute(text_attribute::TEXT, &AttrValue::F32(4.0)), Err(AttributeApply::TypeMismatch));
    assert_eq!(text.apply_attribute(text_attribute::TEXT, &AttrValue::Str("hi".to_string())), Ok(true));
    assert_eq!(SpriteKind::Plain.apply_attribute(circle_attribute::RADIUS, &AttrValue::F32(4.0)), Err(AttributeApply::Unknown));
}

#[test]
fn test_image_path_queues_load() {
    let mut image = Image::default();
    assert_eq!(image.status(), ImageStatus::Empty);
    assert!(image.set_path("media/a.png"));
    assert_eq!(image.status(), ImageStatus::Pending);
    assert!(!image.set_path("media/a.png"));
    assert!(image.set_path(""));
    assert_eq!(image.status(), ImageStatus::Empty);
}

