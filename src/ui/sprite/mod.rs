pub mod kind;
pub mod store;

use glam::{
    Mat4,
    Vec2,
    Vec3
};

use crate::{
    net::{
        attribute::{
            write_attribute,
            AttrValue
        },
        data_buffer::DataBuffer
    },
    ui::{
        camera::Ray,
        draw::DrawShape
    }
};

pub use kind::{
    Circle,
    Image,
    ImageStatus,
    SpriteKind,
    SpriteKindTag,
    Text
};
pub use store::{
    SpriteStore,
    TreeError
};

pub type SpriteId = u32;

/// Never assigned to a live sprite.
pub const EMPTY_SPRITE_ID: SpriteId = 0;

/// Attribute ids shared by every sprite kind.
///
/// Kind specific attributes start at [`attribute::KIND_ATTRIBUTE_START`] and are only
/// meaningful together with the blob type that carries them.
pub mod attribute {
    pub const FLAGS: u8 = 1;
    pub const PARENT: u8 = 2;
    pub const SIZE: u8 = 3;
    pub const POSITION: u8 = 4;
    pub const CENTER: u8 = 5;
    pub const SCALE: u8 = 6;
    pub const ROTATION: u8 = 7;
    pub const COLOR: u8 = 8;
    pub const OPACITY: u8 = 9;
    pub const CHILD_ORDER: u8 = 10;
    pub const SORT_ORDER: u8 = 11;
    pub const MULTI_TOUCH: u8 = 12;

    pub const KIND_ATTRIBUTE_START: u8 = 32;

    pub const BASE: [u8; 12] = [
        FLAGS, PARENT, SIZE, POSITION, CENTER, SCALE,
        ROTATION, COLOR, OPACITY, CHILD_ORDER, SORT_ORDER, MULTI_TOUCH,
    ];
}

/// Set of attribute ids, one bit per id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMask(u64);

impl AttributeMask {
    pub const EMPTY: Self = Self(0);

    pub fn single(id: u8) -> Self {
        let mut mask = Self::EMPTY;
        mask.insert(id);
        mask
    }

    pub fn from_ids(ids: &[u8]) -> Self {
        let mut mask = Self::EMPTY;
        for id in ids {
            mask.insert(*id);
        }
        mask
    }

    pub fn insert(&mut self, id: u8) {
        debug_assert!(id < 64, "attribute id {id} out of mask range");
        self.0 |= 1u64 << (id & 63);
    }

    pub fn contains(&self, id: u8) -> bool {
        id < 64 && self.0 & (1u64 << id) != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..64u8).filter(move |id| self.contains(*id))
    }
}

/// Which direction a pending change travels.
///
/// `Client` holds changes the client replicas have not seen yet. The server clears it
/// when it serializes a frame, a client clears it once the change has been drawn.
/// `Server` holds changes a client reports back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyChannel {
    Client,
    Server,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags {
    client: AttributeMask,
    server: AttributeMask,
}

impl DirtyFlags {
    pub fn get(&self, channel: DirtyChannel) -> AttributeMask {
        match channel {
            DirtyChannel::Client => self.client,
            DirtyChannel::Server => self.server,
        }
    }

    pub fn take(&mut self, channel: DirtyChannel) -> AttributeMask {
        match channel {
            DirtyChannel::Client => std::mem::take(&mut self.client),
            DirtyChannel::Server => std::mem::take(&mut self.server),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteFlags(u32);

impl SpriteFlags {
    pub const VISIBLE: u32 = 1;
    pub const ENABLED: u32 = 1 << 1;
    pub const TRANSPARENT: u32 = 1 << 2;
    pub const PERSPECTIVE: u32 = 1 << 3;
    pub const DRAW_SORTED: u32 = 1 << 4;

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    fn set(&mut self, flag: u32, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

impl Default for SpriteFlags {
    fn default() -> Self {
        Self(Self::VISIBLE | Self::TRANSPARENT)
    }
}

/// Gestures the sprite applies to itself while touches are captured on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MultiTouchConstraints(u8);

impl MultiTouchConstraints {
    pub const NONE: Self = Self(0);
    pub const TRANSLATE: Self = Self(1);
    pub const SCALE: Self = Self(1 << 1);
    pub const ROTATE: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for MultiTouchConstraints {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub delta_time: f32,
    pub elapsed_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TweenKind {
    Position { from: Vec3, to: Vec3 },
    Scale { from: Vec3, to: Vec3 },
    Opacity { from: f32, to: f32 },
}

impl TweenKind {
    fn same_target(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    kind: TweenKind,
    elapsed: f32,
    duration: f32,
}

/// Outcome of applying one received attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeApply {
    Applied,
    Unknown,
    TypeMismatch,
}

#[derive(Debug, Clone)]
pub struct Sprite {
    id: SpriteId,
    parent: Option<SpriteId>,
    children: Vec<SpriteId>,
    kind: SpriteKind,
    position: Vec3,
    center: Vec3,
    scale: Vec3,
    rotation: Vec3,
    size: Vec2,
    color: Vec3,
    opacity: f32,
    flags: SpriteFlags,
    multi_touch: MultiTouchConstraints,
    sort_order: Vec<SpriteId>,
    tweens: Vec<Tween>,
    dirty: DirtyFlags,
}

impl Sprite {
    /// Only the [`SpriteStore`] creates sprites so every sprite is registered.
    pub(crate) fn new(id: SpriteId, parent: Option<SpriteId>, kind: SpriteKind) -> Self {
        let size = kind.initial_size();
        let mut sprite = Self {
            id,
            parent,
            children: vec![],
            kind,
            position: Vec3::ZERO,
            center: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            size,
            color: Vec3::ONE,
            opacity: 1.0,
            flags: SpriteFlags::default(),
            multi_touch: MultiTouchConstraints::NONE,
            sort_order: vec![],
            tweens: vec![],
            dirty: DirtyFlags::default(),
        };
        sprite.dirty.client = sprite.all_attributes();
        sprite
    }

    pub fn id(&self) -> SpriteId {
        self.id
    }

    pub fn parent(&self) -> Option<SpriteId> {
        self.parent
    }

    pub fn children(&self) -> &[SpriteId] {
        &self.children
    }

    pub fn kind(&self) -> &SpriteKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut SpriteKind {
        &mut self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn flags(&self) -> SpriteFlags {
        self.flags
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(SpriteFlags::VISIBLE)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(SpriteFlags::ENABLED)
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(SpriteFlags::TRANSPARENT)
    }

    pub fn is_perspective(&self) -> bool {
        self.flags.contains(SpriteFlags::PERSPECTIVE)
    }

    pub fn is_draw_sorted(&self) -> bool {
        self.flags.contains(SpriteFlags::DRAW_SORTED)
    }

    pub fn multi_touch_constraints(&self) -> MultiTouchConstraints {
        self.multi_touch
    }

    pub fn sort_order(&self) -> &[SpriteId] {
        &self.sort_order
    }

    pub fn dirty(&self, channel: DirtyChannel) -> AttributeMask {
        self.dirty.get(channel)
    }

    pub fn is_dirty(&self, channel: DirtyChannel) -> bool {
        !self.dirty.get(channel).is_empty()
    }

    pub(crate) fn take_dirty(&mut self, channel: DirtyChannel) -> AttributeMask {
        self.dirty.take(channel)
    }

    pub fn mark_dirty(&mut self, attribute_id: u8) {
        self.dirty.client.insert(attribute_id);
    }

    /// Flags a change made on a client that the server should hear about.
    pub fn mark_server_dirty(&mut self, attribute_id: u8) {
        self.dirty.server.insert(attribute_id);
    }

    /// Every attribute this sprite would send in a full snapshot.
    pub fn all_attributes(&self) -> AttributeMask {
        AttributeMask::from_ids(&attribute::BASE).union(self.kind.all_attributes())
    }

    pub fn set_position(&mut self, position: Vec3) {
        if self.position != position {
            self.position = position;
            self.mark_dirty(attribute::POSITION);
        }
    }

    pub fn set_position_xy(&mut self, x: f32, y: f32) {
        self.set_position(Vec3::new(x, y, self.position.z));
    }

    pub fn move_by(&mut self, delta: Vec3) {
        self.set_position(self.position + delta);
    }

    pub fn set_center(&mut self, center: Vec3) {
        if self.center != center {
            self.center = center;
            self.mark_dirty(attribute::CENTER);
        }
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        if self.scale != scale {
            self.scale = scale;
            self.mark_dirty(attribute::SCALE);
        }
    }

    /// Degrees around each axis, applied x then y then z.
    pub fn set_rotation(&mut self, rotation: Vec3) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.mark_dirty(attribute::ROTATION);
        }
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        let size = Vec2::new(width, height);
        if self.size != size {
            self.size = size;
            self.mark_dirty(attribute::SIZE);
        }
    }

    pub fn set_color(&mut self, color: Vec3) {
        if self.color != color {
            self.color = color;
            self.mark_dirty(attribute::COLOR);
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if self.opacity != opacity {
            self.opacity = opacity;
            self.mark_dirty(attribute::OPACITY);
        }
    }

    fn set_flag(&mut self, flag: u32, on: bool) {
        if self.flags.contains(flag) != on {
            self.flags.set(flag, on);
            self.mark_dirty(attribute::FLAGS);
        }
    }

    pub fn show(&mut self) {
        self.set_flag(SpriteFlags::VISIBLE, true);
    }

    pub fn hide(&mut self) {
        self.set_flag(SpriteFlags::VISIBLE, false);
    }

    /// Enabled sprites take part in hit testing and receive touches.
    pub fn enable(&mut self, enabled: bool) {
        self.set_flag(SpriteFlags::ENABLED, enabled);
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.set_flag(SpriteFlags::TRANSPARENT, transparent);
    }

    pub fn set_draw_sorted(&mut self, sorted: bool) {
        self.set_flag(SpriteFlags::DRAW_SORTED, sorted);
    }

    pub(crate) fn set_perspective(&mut self, perspective: bool) {
        self.set_flag(SpriteFlags::PERSPECTIVE, perspective);
    }

    pub fn set_multi_touch_constraints(&mut self, constraints: MultiTouchConstraints) {
        if self.multi_touch != constraints {
            self.multi_touch = constraints;
            self.mark_dirty(attribute::MULTI_TOUCH);
        }
    }

    /// Explicit child draw order. Children missing from the list draw after it.
    pub fn set_sort_order(&mut self, order: Vec<SpriteId>) {
        if self.sort_order != order {
            self.sort_order = order;
            self.mark_dirty(attribute::SORT_ORDER);
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        if let SpriteKind::Circle(circle) = &mut self.kind {
            if circle.radius != radius {
                circle.radius = radius;
                self.mark_dirty(kind::circle_attribute::RADIUS);
            }
            self.set_size(radius * 2.0, radius * 2.0);
        } else {
            log::warn!("set_radius on sprite {} which is not a circle", self.id);
        }
    }

    pub fn set_filled(&mut self, filled: bool) {
        if let SpriteKind::Circle(circle) = &mut self.kind {
            if circle.filled != filled {
                circle.filled = filled;
                self.mark_dirty(kind::circle_attribute::FILLED);
            }
        } else {
            log::warn!("set_filled on sprite {} which is not a circle", self.id);
        }
    }

    pub fn set_text<S: AsRef<str>>(&mut self, text: S) {
        if let SpriteKind::Text(text_kind) = &mut self.kind {
            if text_kind.text != text.as_ref() {
                text_kind.text = text.as_ref().to_string();
                self.mark_dirty(kind::text_attribute::TEXT);
            }
        } else {
            log::warn!("set_text on sprite {} which is not a text", self.id);
        }
    }

    pub fn set_font_size(&mut self, font_size: f32) {
        if let SpriteKind::Text(text_kind) = &mut self.kind {
            if text_kind.font_size != font_size {
                text_kind.font_size = font_size;
                self.mark_dirty(kind::text_attribute::FONT_SIZE);
            }
        } else {
            log::warn!("set_font_size on sprite {} which is not a text", self.id);
        }
    }

    pub fn set_image_path<S: AsRef<str>>(&mut self, path: S) {
        if let SpriteKind::Image(image) = &mut self.kind {
            if image.set_path(path.as_ref()) {
                self.mark_dirty(kind::image_attribute::PATH);
            }
        } else {
            log::warn!("set_image_path on sprite {} which is not an image", self.id);
        }
    }

    pub fn tween_position(&mut self, to: Vec3, duration: f32) {
        self.start_tween(TweenKind::Position { from: self.position, to }, duration);
    }

    pub fn tween_scale(&mut self, to: Vec3, duration: f32) {
        self.start_tween(TweenKind::Scale { from: self.scale, to }, duration);
    }

    pub fn tween_opacity(&mut self, to: f32, duration: f32) {
        self.start_tween(TweenKind::Opacity { from: self.opacity, to }, duration);
    }

    pub fn is_tweening(&self) -> bool {
        !self.tweens.is_empty()
    }

    fn start_tween(&mut self, kind: TweenKind, duration: f32) {
        self.tweens.retain(|tween| !tween.kind.same_target(&kind));
        if duration <= 0.0 {
            self.apply_tween(kind, 1.0);
        } else {
            self.tweens.push(Tween { kind, elapsed: 0.0, duration });
        }
    }

    fn apply_tween(&mut self, kind: TweenKind, t: f32) {
        match kind {
            TweenKind::Position { from, to } => self.set_position(from.lerp(to, t)),
            TweenKind::Scale { from, to } => self.set_scale(from.lerp(to, t)),
            TweenKind::Opacity { from, to } => self.set_opacity(from + (to - from) * t),
        }
    }

    /// Server side per frame hook. Advances running tweens.
    pub fn update_server(&mut self, params: &UpdateParams) {
        if self.tweens.is_empty() {
            return;
        }
        let mut tweens = std::mem::take(&mut self.tweens);
        tweens.retain_mut(|tween| {
            tween.elapsed += params.delta_time;
            let t = (tween.elapsed / tween.duration).clamp(0.0, 1.0);
            self.apply_tween(tween.kind, t);
            t < 1.0
        });
        self.tweens = tweens;
    }

    /// Client side per frame hook. Replicas follow the server, nothing is simulated here.
    pub fn update_client(&mut self, _params: &UpdateParams) {
    }

    /// T(position) * R(rotation) * S(scale) * T(-center * size)
    pub fn local_transform(&self) -> Mat4 {
        let anchor = Vec3::new(self.center.x * self.size.x, self.center.y * self.size.y, 0.0);
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(self.rotation.x.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_scale(self.scale)
            * Mat4::from_translation(-anchor)
    }

    pub fn contains_local(&self, local: Vec3) -> bool {
        local.x >= 0.0 && local.y >= 0.0 && local.x < self.size.x && local.y < self.size.y
    }

    /// `global` is this sprite's world transform.
    pub fn contains_global(&self, global: &Mat4, point: Vec3) -> bool {
        if global.determinant().abs() <= f32::EPSILON {
            return false;
        }
        let local = global.inverse().transform_point3(point);
        self.contains_local(local)
    }

    /// Distance along `ray` where it crosses this sprite's plane inside its bounds.
    pub fn ray_hit(&self, global: &Mat4, ray: &Ray) -> Option<f32> {
        if global.determinant().abs() <= f32::EPSILON {
            return None;
        }
        let inverse = global.inverse();
        let origin = inverse.transform_point3(ray.origin);
        let direction = inverse.transform_vector3(ray.direction);
        if direction.z.abs() <= f32::EPSILON {
            return None;
        }
        let t = -origin.z / direction.z;
        if t < 0.0 {
            return None;
        }
        let local = origin + direction * t;
        self.contains_local(local).then_some(t)
    }

    pub fn draw_shape(&self) -> Option<DrawShape> {
        match &self.kind {
            SpriteKind::Plain => (!self.is_transparent()).then_some(DrawShape::Rect),
            kind => kind.draw_shape(),
        }
    }

    /// Writes the attributes in `mask`, kind attributes last. The caller writes the
    /// blob header and the terminator.
    pub fn write_attributes(&self, mask: AttributeMask, buffer: &mut DataBuffer) {
        for id in mask.iter() {
            let value = match id {
                attribute::FLAGS => AttrValue::U32(self.flags.bits()),
                attribute::PARENT => match self.parent {
                    Some(parent) => AttrValue::U32(parent),
                    None => continue,
                },
                attribute::SIZE => AttrValue::Vec2(self.size),
                attribute::POSITION => AttrValue::Vec3(self.position),
                attribute::CENTER => AttrValue::Vec3(self.center),
                attribute::SCALE => AttrValue::Vec3(self.scale),
                attribute::ROTATION => AttrValue::Vec3(self.rotation),
                attribute::COLOR => AttrValue::Vec3(self.color),
                attribute::OPACITY => AttrValue::F32(self.opacity),
                attribute::CHILD_ORDER => AttrValue::IdList(self.children.clone()),
                attribute::SORT_ORDER => AttrValue::IdList(self.sort_order.clone()),
                attribute::MULTI_TOUCH => AttrValue::U32(u32::from(self.multi_touch.bits())),
                _ => continue,
            };
            write_attribute(buffer, id, &value);
        }
        self.kind.write_attributes(mask, buffer);
    }

    /// Applies a non structural attribute. `PARENT` and `CHILD_ORDER` go through the store.
    pub(crate) fn apply_attribute(&mut self, id: u8, value: &AttrValue) -> AttributeApply {
        let applied = match id {
            attribute::FLAGS => value.as_u32().map(|bits| {
                if self.flags.bits() != bits {
                    self.flags = SpriteFlags(bits);
                    self.mark_dirty(attribute::FLAGS);
                }
            }),
            attribute::SIZE => value.as_vec2().map(|size| self.set_size(size.x, size.y)),
            attribute::POSITION => value.as_vec3().map(|v| self.set_position(v)),
            attribute::CENTER => value.as_vec3().map(|v| self.set_center(v)),
            attribute::SCALE => value.as_vec3().map(|v| self.set_scale(v)),
            attribute::ROTATION => value.as_vec3().map(|v| self.set_rotation(v)),
            attribute::COLOR => value.as_vec3().map(|v| self.set_color(v)),
            attribute::OPACITY => value.as_f32().map(|v| self.set_opacity(v)),
            attribute::SORT_ORDER => value.as_id_list().map(|ids| self.set_sort_order(ids.to_vec())),
            attribute::MULTI_TOUCH => value.as_u32().map(|bits| {
                let bits = u8::try_from(bits).unwrap_or(0);
                self.set_multi_touch_constraints(MultiTouchConstraints::from_bits(bits));
            }),
            id if id >= attribute::KIND_ATTRIBUTE_START => {
                return match self.kind.apply_attribute(id, value) {
                    Ok(changed) => {
                        if changed {
                            self.mark_dirty(id);
                        }
                        AttributeApply::Applied
                    },
                    Err(result) => result,
                };
            },
            _ => return AttributeApply::Unknown,
        };

        match applied {
            Some(()) => AttributeApply::Applied,
            None => AttributeApply::TypeMismatch,
        }
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<SpriteId>) {
        if self.parent != parent {
            self.parent = parent;
            self.mark_dirty(attribute::PARENT);
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<SpriteId> {
        &mut self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(id: SpriteId) -> Sprite {
        let mut sprite = Sprite::new(id, None, SpriteKind::Plain);
        sprite.take_dirty(DirtyChannel::Client);
        sprite
    }

    #[test]
    fn test_new_sprite_is_fully_dirty_for_clients() {
        let sprite = Sprite::new(5, Some(1), SpriteKind::Plain);
        assert_eq!(sprite.dirty(DirtyChannel::Client), sprite.all_attributes());
        assert!(!sprite.is_dirty(DirtyChannel::Server));
    }

    #[test]
    fn test_setter_marks_only_changed_attribute() {
        let mut sprite = plain(2);
        sprite.set_position_xy(10.0, 20.0);
        let dirty = sprite.dirty(DirtyChannel::Client);
        assert!(dirty.contains(attribute::POSITION));
        assert!(!dirty.contains(attribute::SIZE));

        sprite.take_dirty(DirtyChannel::Client);
        sprite.set_position_xy(10.0, 20.0);
        assert!(!sprite.is_dirty(DirtyChannel::Client), "same value should not dirty");
    }

    #[test]
    fn test_attribute_mask_iteration() {
        let mask = AttributeMask::from_ids(&[attribute::SIZE, attribute::OPACITY, 40]);
        let ids: Vec<u8> = mask.iter().collect();
        assert_eq!(ids, vec![attribute::SIZE, attribute::OPACITY, 40]);
    }

    #[test]
    fn test_local_transform_respects_center() {
        let mut sprite = plain(2);
        sprite.set_size(100.0, 50.0);
        sprite.set_center(Vec3::new(0.5, 0.5, 0.0));
        sprite.set_position_xy(200.0, 200.0);

        let global = sprite.local_transform();
        assert!(sprite.contains_global(&global, Vec3::new(160.0, 180.0, 0.0)));
        assert!(!sprite.contains_global(&global, Vec3::new(260.0, 200.0, 0.0)));
    }

    #[test]
    fn test_zero_scale_never_hits() {
        let mut sprite = plain(2);
        sprite.set_size(100.0, 100.0);
        sprite.set_scale(Vec3::ZERO);
        assert!(!sprite.contains_global(&sprite.local_transform(), Vec3::ZERO));
    }

    #[test]
    fn test_ray_hit_on_sprite_plane() {
        let mut sprite = plain(2);
        sprite.set_size(10.0, 10.0);
        let ray = Ray {
            origin: Vec3::new(5.0, 5.0, 100.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert_eq!(sprite.ray_hit(&Mat4::IDENTITY, &ray), Some(100.0));

        let miss = Ray {
            origin: Vec3::new(50.0, 5.0, 100.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert_eq!(sprite.ray_hit(&Mat4::IDENTITY, &miss), None);
    }

    #[test]
    fn test_tween_reaches_target_and_stops() {
        let mut sprite = plain(2);
        sprite.tween_position(Vec3::new(100.0, 0.0, 0.0), 1.0);
        let params = UpdateParams { delta_time: 0.5, elapsed_time: 0.5 };

        sprite.update_server(&params);
        assert_eq!(sprite.position(), Vec3::new(50.0, 0.0, 0.0));
        assert!(sprite.is_tweening());

        sprite.update_server(&params);
        assert_eq!(sprite.position(), Vec3::new(100.0, 0.0, 0.0));
        assert!(!sprite.is_tweening());
    }

    #[test]
    fn test_circle_radius_sets_size() {
        let mut sprite = Sprite::new(3, None, SpriteKind::Circle(Circle::new(true, 5.0)));
        sprite.take_dirty(DirtyChannel::Client);
        sprite.set_radius(20.0);
        assert_eq!(sprite.size(), Vec2::new(40.0, 40.0));
        let dirty = sprite.dirty(DirtyChannel::Client);
        assert!(dirty.contains(kind::circle_attribute::RADIUS));
        assert!(dirty.contains(attribute::SIZE));
    }

    #[test]
    fn test_apply_attribute_type_mismatch() {
        let mut sprite = plain(2);
        let result = sprite.apply_attribute(attribute::POSITION, &AttrValue::F32(1.0));
        assert_eq!(result, AttributeApply::TypeMismatch);
        assert_eq!(sprite.position(), Vec3::ZERO);
        assert_eq!(sprite.apply_attribute(30, &AttrValue::F32(1.0)), AttributeApply::Unknown);
    }

    #[test]
    fn test_unchanged_kind_attribute_stays_clean() {
        let mut sprite = Sprite::new(4, None, SpriteKind::Text(Text::new("same", 12.0)));
        sprite.take_dirty(DirtyChannel::Client);

        let same = AttrValue::Str("same".to_string());
        assert_eq!(sprite.apply_attribute(kind::text_attribute::TEXT, &same), AttributeApply::Applied);
        assert!(!sprite.is_dirty(DirtyChannel::Client));

        let other = AttrValue::Str("other".to_string());
        assert_eq!(sprite.apply_attribute(kind::text_attribute::TEXT, &other), AttributeApply::Applied);
        assert!(sprite.dirty(DirtyChannel::Client).contains(kind::text_attribute::TEXT));
    }
}
