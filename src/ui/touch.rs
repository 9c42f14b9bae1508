use std::collections::{
    HashMap,
    VecDeque
};

use glam::Vec3;

use super::{
    event::{
        SpriteEvent,
        TouchId,
        TouchInfo,
        TouchPhase
    },
    math::Vector2F,
    sprite::{
        MultiTouchConstraints,
        SpriteId,
        SpriteStore
    }
};

/// Mouse buttons map to touch ids above any id a touch screen reports.
pub const MOUSE_TOUCH_ID_BASE: TouchId = 0xFFFF_FF00;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchSettings {
    /// Movement past this turns a touch into a drag.
    pub min_touch_distance: f32,
    /// A touch ending within this distance of its start is a tap.
    pub min_tap_distance: f32,
    pub swipe_queue_size: usize,
    /// Seconds between taps on the same sprite for a double tap.
    pub double_tap_time: f64,
    /// Pixels per second.
    pub swipe_min_velocity: f32,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            min_touch_distance: 10.0,
            min_tap_distance: 10.0,
            swipe_queue_size: 4,
            double_tap_time: 0.1,
            swipe_min_velocity: 800.0,
        }
    }
}

/// One touch sample in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: TouchId,
    pub point: Vector2F,
}

impl TouchPoint {
    pub fn new(id: TouchId, x: f32, y: f32) -> Self {
        Self { id, point: Vector2F::new(x, y) }
    }

    pub fn mouse(button: u8, point: Vector2F) -> Self {
        Self { id: MOUSE_TOUCH_ID_BASE + TouchId::from(button), point }
    }
}

#[derive(Debug, Clone)]
struct TouchState {
    start: Vector2F,
    previous: Vector2F,
    current: Vector2F,
    /// Last point the built in transform consumed.
    anchor: Vector2F,
    sprite: Option<SpriteId>,
    is_drag: bool,
    swipe_queue: VecDeque<(Vector2F, f64)>,
}

pub type Dispatch = Vec<(SpriteId, SpriteEvent)>;

/// Hit test in world space, returns the topmost enabled sprite.
pub type HitTest<'a> = &'a dyn Fn(&SpriteStore, Vector2F) -> Option<SpriteId>;

/// Routes touches to the sprite hit when they began and turns them into gestures.
#[derive(Debug, Default)]
pub struct TouchManager {
    settings: TouchSettings,
    touches: HashMap<TouchId, TouchState>,
    captures: HashMap<SpriteId, Vec<TouchId>>,
    last_taps: HashMap<SpriteId, f64>,
}

impl TouchManager {
    pub fn new(settings: TouchSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &TouchSettings {
        &self.settings
    }

    pub fn active_touches(&self) -> usize {
        self.touches.len()
    }

    pub fn captured_by(&self, id: TouchId) -> Option<SpriteId> {
        self.touches.get(&id).and_then(|state| state.sprite)
    }

    pub fn touches_begin(&mut self, touches: &[TouchPoint], store: &mut SpriteStore, hit: HitTest, now: f64) -> Dispatch {
        let mut dispatch = vec![];
        for touch in touches {
            if self.touches.contains_key(&touch.id) {
                log::warn!("Touch {} began twice, restarting it", touch.id);
                self.release(touch.id);
            }

            let sprite = hit(store, touch.point);
            let mut swipe_queue = VecDeque::with_capacity(self.settings.swipe_queue_size);
            swipe_queue.push_back((touch.point, now));
            self.touches.insert(touch.id, TouchState {
                start: touch.point,
                previous: touch.point,
                current: touch.point,
                anchor: touch.point,
                sprite,
                is_drag: false,
                swipe_queue,
            });

            if let Some(sprite) = sprite {
                let fingers = self.captures.entry(sprite).or_default();
                fingers.push(touch.id);
                let finger_index = fingers.len() - 1;
                log::trace!("Touch {} captured by sprite {sprite}", touch.id);
                dispatch.push((sprite, SpriteEvent::Touch(TouchInfo {
                    id: touch.id,
                    phase: TouchPhase::Added,
                    start_point: touch.point,
                    current_point: touch.point,
                    delta_point: Vector2F::zero(),
                    finger_index,
                })));
            }
        }
        dispatch
    }

    pub fn touches_moved(&mut self, touches: &[TouchPoint], store: &mut SpriteStore, now: f64) -> Dispatch {
        let mut dispatch = vec![];
        let mut moved_sprites: Vec<SpriteId> = vec![];
        for touch in touches {
            let Some(state) = self.touches.get_mut(&touch.id) else {
                log::trace!("Move for unknown touch {}", touch.id);
                continue;
            };
            state.previous = state.current;
            state.current = touch.point;
            state.swipe_queue.push_back((touch.point, now));
            while state.swipe_queue.len() > self.settings.swipe_queue_size.max(2) {
                state.swipe_queue.pop_front();
            }

            let Some(sprite) = state.sprite else {
                continue;
            };
            if !state.is_drag && state.start.distance(state.current) > self.settings.min_touch_distance {
                state.is_drag = true;
            }
            let delta = state.current - state.previous;
            let start_point = state.start;
            let is_drag = state.is_drag;
            let position = touch.point;

            dispatch.push((sprite, SpriteEvent::Touch(TouchInfo {
                id: touch.id,
                phase: TouchPhase::Moved,
                start_point,
                current_point: position,
                delta_point: delta,
                finger_index: self.finger_index(sprite, touch.id),
            })));
            if is_drag {
                dispatch.push((sprite, SpriteEvent::Drag { delta, position }));
            }
            if !moved_sprites.contains(&sprite) {
                moved_sprites.push(sprite);
            }
        }

        for sprite in moved_sprites {
            if let Some(event) = self.apply_transform(sprite, store) {
                dispatch.push((sprite, event));
            }
        }
        dispatch
    }

    pub fn touches_ended(&mut self, touches: &[TouchPoint], store: &mut SpriteStore, now: f64) -> Dispatch {
        let mut dispatch = vec![];
        for touch in touches {
            let finger_index = self.touches
                .get(&touch.id)
                .and_then(|state| state.sprite)
                .map(|sprite| self.finger_index(sprite, touch.id))
                .unwrap_or(0);
            let Some(mut state) = self.release(touch.id) else {
                log::trace!("End for unknown touch {}", touch.id);
                continue;
            };
            let Some(sprite) = state.sprite else {
                continue;
            };
            if !store.contains(sprite) {
                continue;
            }

            state.previous = state.current;
            state.current = touch.point;
            state.swipe_queue.push_back((touch.point, now));
            while state.swipe_queue.len() > self.settings.swipe_queue_size.max(2) {
                state.swipe_queue.pop_front();
            }
            let distance = state.start.distance(touch.point);
            if !state.is_drag && distance > self.settings.min_touch_distance {
                state.is_drag = true;
            }

            dispatch.push((sprite, SpriteEvent::Touch(TouchInfo {
                id: touch.id,
                phase: TouchPhase::Removed,
                start_point: state.start,
                current_point: touch.point,
                delta_point: state.current - state.previous,
                finger_index,
            })));

            if state.is_drag {
                dispatch.push((sprite, SpriteEvent::DragEnded { position: touch.point }));
                if let Some(velocity) = self.swipe_velocity(&state.swipe_queue) {
                    dispatch.push((sprite, SpriteEvent::Swipe { velocity }));
                }
            } else if distance <= self.settings.min_tap_distance {
                let double = self.last_taps
                    .get(&sprite)
                    .is_some_and(|last| now - *last <= self.settings.double_tap_time);
                if double {
                    self.last_taps.remove(&sprite);
                    dispatch.push((sprite, SpriteEvent::DoubleTap { point: touch.point }));
                } else {
                    self.last_taps.insert(sprite, now);
                    dispatch.push((sprite, SpriteEvent::Tap { point: touch.point }));
                }
            }
        }
        dispatch
    }

    pub fn mouse_touch_begin(&mut self, button: u8, point: Vector2F, store: &mut SpriteStore, hit: HitTest, now: f64) -> Dispatch {
        self.touches_begin(&[TouchPoint::mouse(button, point)], store, hit, now)
    }

    pub fn mouse_touch_moved(&mut self, button: u8, point: Vector2F, store: &mut SpriteStore, now: f64) -> Dispatch {
        self.touches_moved(&[TouchPoint::mouse(button, point)], store, now)
    }

    pub fn mouse_touch_ended(&mut self, button: u8, point: Vector2F, store: &mut SpriteStore, now: f64) -> Dispatch {
        self.touches_ended(&[TouchPoint::mouse(button, point)], store, now)
    }

    /// Drops captures held by sprites that no longer exist. Their touches stay tracked
    /// but dispatch nothing.
    pub fn forget_removed(&mut self, store: &SpriteStore) {
        self.captures.retain(|sprite, _| store.contains(*sprite));
        self.last_taps.retain(|sprite, _| store.contains(*sprite));
        for state in self.touches.values_mut() {
            if state.sprite.is_some_and(|sprite| !store.contains(sprite)) {
                state.sprite = None;
            }
        }
    }

    fn release(&mut self, id: TouchId) -> Option<TouchState> {
        let state = self.touches.remove(&id)?;
        if let Some(sprite) = state.sprite {
            if let Some(fingers) = self.captures.get_mut(&sprite) {
                fingers.retain(|finger| *finger != id);
                if fingers.is_empty() {
                    self.captures.remove(&sprite);
                }
            }
            for finger in self.captures.get(&sprite).into_iter().flatten() {
                if let Some(other) = self.touches.get_mut(finger) {
                    other.anchor = other.current;
                }
            }
        }
        Some(state)
    }

    fn finger_index(&self, sprite: SpriteId, id: TouchId) -> usize {
        self.captures
            .get(&sprite)
            .and_then(|fingers| fingers.iter().position(|finger| *finger == id))
            .unwrap_or(0)
    }

    fn swipe_velocity(&self, queue: &VecDeque<(Vector2F, f64)>) -> Option<Vector2F> {
        let (first_point, first_time) = *queue.front()?;
        let (last_point, last_time) = *queue.back()?;
        let elapsed = (last_time - first_time) as f32;
        if elapsed <= 0.0 {
            return None;
        }
        let velocity = (last_point - first_point) * (1.0 / elapsed);
        (velocity.length() >= self.settings.swipe_min_velocity).then_some(velocity)
    }

    /// One finger translates, two fingers scale and rotate around their midpoint.
    fn apply_transform(&mut self, sprite_id: SpriteId, store: &mut SpriteStore) -> Option<SpriteEvent> {
        let constraints = store.get(sprite_id)?.multi_touch_constraints();
        if constraints.is_empty() {
            return None;
        }
        let fingers: Vec<TouchId> = self.captures.get(&sprite_id)?.iter().take(2).copied().collect();
        let points: Vec<(Vector2F, Vector2F)> = fingers
            .iter()
            .filter_map(|finger| self.touches.get(finger))
            .map(|state| (state.anchor, state.current))
            .collect();

        let (translation, scale, rotation) = match points[..] {
            [(anchor, current)] => (current - anchor, 1.0, 0.0),
            [(anchor0, current0), (anchor1, current1)] => {
                let before = anchor1 - anchor0;
                let after = current1 - current0;
                let scale = if before.length() > f32::EPSILON {
                    after.length() / before.length()
                } else {
                    1.0
                };
                let rotation = before.angle_to(after).to_degrees();
                let midpoint_before = (anchor0 + anchor1) * 0.5;
                let midpoint_after = (current0 + current1) * 0.5;
                (midpoint_after - midpoint_before, scale, rotation)
            },
            _ => return None,
        };

        for finger in fingers.iter() {
            if let Some(state) = self.touches.get_mut(finger) {
                state.anchor = state.current;
            }
        }

        let translation = if constraints.contains(MultiTouchConstraints::TRANSLATE) {
            translation
        } else {
            Vector2F::zero()
        };
        let scale = if constraints.contains(MultiTouchConstraints::SCALE) { scale } else { 1.0 };
        let rotation = if constraints.contains(MultiTouchConstraints::ROTATE) { rotation } else { 0.0 };
        if translation.length_squared() == 0.0 && scale == 1.0 && rotation == 0.0 {
            return None;
        }

        let local_translation = store.get(sprite_id)?
            .parent()
            .and_then(|parent| store.global_transform(parent))
            .filter(|transform| transform.determinant().abs() > f32::EPSILON)
            .map(|transform| transform.inverse().transform_vector3(Vec3::new(translation.x, translation.y, 0.0)))
            .unwrap_or(Vec3::new(translation.x, translation.y, 0.0));

        let sprite = store.get_mut(sprite_id)?;
        sprite.move_by(local_translation);
        if scale != 1.0 {
            sprite.set_scale(sprite.scale() * scale);
        }
        if rotation != 0.0 {
            let mut sprite_rotation = sprite.rotation();
            sprite_rotation.z += rotation;
            sprite.set_rotation(sprite_rotation);
        }
        Some(SpriteEvent::Transform { translation, scale, rotation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::sprite::SpriteKind;

    struct Scene {
        store: SpriteStore,
        root: SpriteId,
        button: SpriteId,
        manager: TouchManager,
    }

    fn scene() -> Scene {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let button = store.create(root, SpriteKind::Plain).unwrap();
        let sprite = store.get_mut(button).unwrap();
        sprite.set_position_xy(50.0, 50.0);
        sprite.set_size(100.0, 100.0);
        sprite.enable(true);
        Scene { store, root, button, manager: TouchManager::new(TouchSettings::default()) }
    }

    fn hit_root(root: SpriteId) -> impl Fn(&SpriteStore, Vector2F) -> Option<SpriteId> {
        move |store: &SpriteStore, point: Vector2F| store.get_hit(root, Vec3::new(point.x, point.y, 0.0))
    }

    fn gestures(dispatch: &Dispatch) -> Vec<SpriteEvent> {
        dispatch
            .iter()
            .filter(|(_, event)| !matches!(event, SpriteEvent::Touch(_)))
            .map(|(_, event)| *event)
            .collect()
    }

    #[test]
    fn test_touch_ending_in_place_is_tap() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, &hit, 0.0);
        let ended = s.manager.touches_ended(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, 0.2);

        assert_eq!(gestures(&ended), vec![SpriteEvent::Tap { point: Vector2F::new(100.0, 100.0) }]);
        assert!(ended.iter().all(|(sprite, _)| *sprite == s.button));
    }

    #[test]
    fn test_touch_ending_far_away_is_drag_not_tap() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, &hit, 0.0);
        let ended = s.manager.touches_ended(&[TouchPoint::new(1, 200.0, 100.0)], &mut s.store, 1.0);

        let events = gestures(&ended);
        assert!(events.contains(&SpriteEvent::DragEnded { position: Vector2F::new(200.0, 100.0) }));
        assert!(!events.iter().any(|event| matches!(event, SpriteEvent::Tap { .. } | SpriteEvent::DoubleTap { .. })));
    }

    #[test]
    fn test_captured_touch_follows_outside_bounds() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(3, 60.0, 60.0)], &mut s.store, &hit, 0.0);

        let moved = s.manager.touches_moved(&[TouchPoint::new(3, 400.0, 400.0)], &mut s.store, 0.1);
        assert!(!moved.is_empty());
        assert!(moved.iter().all(|(sprite, _)| *sprite == s.button));
        assert!(moved.iter().any(|(_, event)| matches!(event, SpriteEvent::Drag { .. })));
        assert_eq!(s.manager.captured_by(3), Some(s.button));

        let ended = s.manager.touches_ended(&[TouchPoint::new(3, 500.0, 500.0)], &mut s.store, 0.2);
        assert!(ended.iter().all(|(sprite, _)| *sprite == s.button));
        assert_eq!(s.manager.active_touches(), 0);
    }

    #[test]
    fn test_touch_on_empty_space_dispatches_nothing() {
        let mut s = scene();
        let hit = hit_root(s.root);
        let began = s.manager.touches_begin(&[TouchPoint::new(1, 500.0, 500.0)], &mut s.store, &hit, 0.0);
        assert!(began.is_empty());

        // Moving onto the sprite does not re-hit.
        let moved = s.manager.touches_moved(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, 0.1);
        assert!(moved.is_empty());
    }

    #[test]
    fn test_second_quick_tap_is_double_tap() {
        let mut s = scene();
        let hit = hit_root(s.root);
        let point = TouchPoint::new(1, 100.0, 100.0);
        s.manager.touches_begin(&[point], &mut s.store, &hit, 0.0);
        s.manager.touches_ended(&[point], &mut s.store, 0.01);
        s.manager.touches_begin(&[point], &mut s.store, &hit, 0.05);
        let second = s.manager.touches_ended(&[point], &mut s.store, 0.06);

        assert_eq!(gestures(&second), vec![SpriteEvent::DoubleTap { point: point.point }]);
    }

    #[test]
    fn test_fast_flick_is_swipe() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 60.0, 100.0)], &mut s.store, &hit, 0.0);
        s.manager.touches_moved(&[TouchPoint::new(1, 80.0, 100.0)], &mut s.store, 0.01);
        s.manager.touches_moved(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, 0.02);
        let ended = s.manager.touches_ended(&[TouchPoint::new(1, 120.0, 100.0)], &mut s.store, 0.03);

        let swipe = gestures(&ended).into_iter().find_map(|event| match event {
            SpriteEvent::Swipe { velocity } => Some(velocity),
            _ => None,
        });
        let velocity = swipe.expect("swipe expected");
        assert!((velocity.x - 2000.0).abs() < 1.0);
    }

    #[test]
    fn test_mouse_uses_reserved_touch_ids() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.mouse_touch_begin(0, Vector2F::new(100.0, 100.0), &mut s.store, &hit, 0.0);
        assert_eq!(s.manager.captured_by(MOUSE_TOUCH_ID_BASE), Some(s.button));
        let ended = s.manager.mouse_touch_ended(0, Vector2F::new(100.0, 100.0), &mut s.store, 0.5);
        assert!(gestures(&ended).contains(&SpriteEvent::Tap { point: Vector2F::new(100.0, 100.0) }));
    }

    #[test]
    fn test_one_finger_translates_multi_touch_sprite() {
        let mut s = scene();
        s.store.get_mut(s.button).unwrap().set_multi_touch_constraints(MultiTouchConstraints::ALL);
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 60.0, 60.0)], &mut s.store, &hit, 0.0);
        s.manager.touches_moved(&[TouchPoint::new(1, 90.0, 70.0)], &mut s.store, 0.1);

        assert_eq!(s.store.get(s.button).unwrap().position(), Vec3::new(80.0, 60.0, 0.0));
    }

    #[test]
    fn test_two_fingers_scale_and_rotate() {
        let mut s = scene();
        s.store.get_mut(s.button).unwrap().set_multi_touch_constraints(MultiTouchConstraints::SCALE | MultiTouchConstraints::ROTATE);
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 90.0, 100.0), TouchPoint::new(2, 110.0, 100.0)], &mut s.store, &hit, 0.0);
        let moved = s.manager.touches_moved(&[TouchPoint::new(1, 100.0, 80.0), TouchPoint::new(2, 100.0, 120.0)], &mut s.store, 0.1);

        let sprite = s.store.get(s.button).unwrap();
        assert!((sprite.scale().x - 2.0).abs() < 1e-4);
        assert!((sprite.rotation().z - 90.0).abs() < 1e-3);
        assert_eq!(sprite.position(), Vec3::new(50.0, 50.0, 0.0), "translation not allowed");
        assert!(moved.iter().any(|(_, event)| matches!(event, SpriteEvent::Transform { .. })));
    }

    #[test]
    fn test_removed_sprite_loses_capture() {
        let mut s = scene();
        let hit = hit_root(s.root);
        s.manager.touches_begin(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, &hit, 0.0);
        s.store.remove(s.button).unwrap();
        s.manager.forget_removed(&s.store);

        assert_eq!(s.manager.captured_by(1), None);
        let ended = s.manager.touches_ended(&[TouchPoint::new(1, 100.0, 100.0)], &mut s.store, 0.1);
        assert!(ended.is_empty());
    }
}
