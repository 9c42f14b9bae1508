use std::collections::HashMap;

use glam::{
    Mat4,
    Vec3
};

use crate::ui::{
    camera::CameraPick,
    draw::{
        DrawCommand,
        DrawParams,
        DrawTarget
    }
};

use super::{
    attribute,
    DirtyChannel,
    Sprite,
    SpriteId,
    SpriteKind,
    UpdateParams,
    EMPTY_SPRITE_ID
};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("Operation on the empty sprite id")]
    EmptyId,

    #[error("Sprite not exist, id='{0}'")]
    SpriteNotExist(SpriteId),

    #[error("Sprite already exist, id='{0}'")]
    SpriteAlreadyExist(SpriteId),

    #[error("Root sprite cannot be removed or reparented, id='{0}'")]
    RootSprite(SpriteId),

    #[error("Reparenting would create a cycle, id='{0}'")]
    WouldCycle(SpriteId),
}

/// Owns every live sprite and doubles as the id registry.
///
/// Ownership follows `children` lists from the root sprites downwards; `parent` is only a
/// back reference. A sprite is in the map exactly when it is reachable from a root.
#[derive(Debug)]
pub struct SpriteStore {
    next_sprite_id: SpriteId,
    sprites: HashMap<SpriteId, Sprite>,
    roots: Vec<SpriteId>,
    removed: Vec<SpriteId>,
}

impl SpriteStore {
    pub fn new() -> Self {
        Self {
            next_sprite_id: EMPTY_SPRITE_ID,
            sprites: HashMap::new(),
            roots: vec![],
            removed: vec![],
        }
    }

    /// Monotonic, skips the empty id on wraparound and ids that are still live.
    fn next_sprite_id(&mut self) -> SpriteId {
        loop {
            self.next_sprite_id = self.next_sprite_id.wrapping_add(1);
            if self.next_sprite_id == EMPTY_SPRITE_ID {
                continue;
            }
            if !self.sprites.contains_key(&self.next_sprite_id) {
                return self.next_sprite_id;
            }
        }
    }

    pub fn create_root(&mut self, perspective: bool) -> SpriteId {
        let id = self.next_sprite_id();
        let mut sprite = Sprite::new(id, None, SpriteKind::Plain);
        sprite.set_perspective(perspective);
        self.sprites.insert(id, sprite);
        self.roots.push(id);
        log::debug!("Root sprite {id} created, perspective={perspective}");
        id
    }

    pub fn create(&mut self, parent: SpriteId, kind: SpriteKind) -> Result<SpriteId, TreeError> {
        let perspective = self.get(parent)
            .ok_or(TreeError::SpriteNotExist(parent))?
            .is_perspective();
        let id = self.next_sprite_id();
        self.attach_new(id, parent, kind, perspective);
        Ok(id)
    }

    /// Creates a sprite under an id chosen by the other side of the connection.
    pub fn insert_replica(&mut self, id: SpriteId, parent: SpriteId, kind: SpriteKind) -> Result<(), TreeError> {
        if id == EMPTY_SPRITE_ID {
            return Err(TreeError::EmptyId);
        }
        if self.sprites.contains_key(&id) {
            return Err(TreeError::SpriteAlreadyExist(id));
        }
        let perspective = self.get(parent)
            .ok_or(TreeError::SpriteNotExist(parent))?
            .is_perspective();
        self.attach_new(id, parent, kind, perspective);
        Ok(())
    }

    fn attach_new(&mut self, id: SpriteId, parent: SpriteId, kind: SpriteKind, perspective: bool) {
        let mut sprite = Sprite::new(id, Some(parent), kind);
        sprite.set_perspective(perspective);
        self.sprites.insert(id, sprite);
        if let Some(parent_sprite) = self.sprites.get_mut(&parent) {
            parent_sprite.children_mut().push(id);
        }
        log::trace!("Sprite {id} created under {parent}");
    }

    /// Removes `id` and its whole subtree. Returns how many sprites were released.
    pub fn remove(&mut self, id: SpriteId) -> Result<usize, TreeError> {
        if id == EMPTY_SPRITE_ID {
            log::warn!("remove() on empty sprite id");
            return Err(TreeError::EmptyId);
        }
        if self.roots.contains(&id) {
            return Err(TreeError::RootSprite(id));
        }
        let parent = self.get(id).ok_or(TreeError::SpriteNotExist(id))?.parent();

        if let Some(parent_sprite) = parent.and_then(|p| self.sprites.get_mut(&p)) {
            parent_sprite.children_mut().retain(|child| *child != id);
        }

        let released = self.subtree_ids(id);
        for released_id in released.iter() {
            self.sprites.remove(released_id);
        }
        self.removed.push(id);
        log::trace!("Sprite {id} removed with {} sprites", released.len());
        Ok(released.len())
    }

    pub fn clear_children(&mut self, id: SpriteId) -> Result<usize, TreeError> {
        let children = self.get(id).ok_or(TreeError::SpriteNotExist(id))?.children().to_vec();
        let mut released = 0;
        for child in children {
            released += self.remove(child)?;
        }
        Ok(released)
    }

    /// Moves `id` with its subtree under `new_parent`, appended last.
    pub fn reparent(&mut self, id: SpriteId, new_parent: SpriteId) -> Result<(), TreeError> {
        if id == EMPTY_SPRITE_ID || new_parent == EMPTY_SPRITE_ID {
            return Err(TreeError::EmptyId);
        }
        if self.roots.contains(&id) {
            return Err(TreeError::RootSprite(id));
        }
        let old_parent = self.get(id).ok_or(TreeError::SpriteNotExist(id))?.parent();
        if !self.contains(new_parent) {
            return Err(TreeError::SpriteNotExist(new_parent));
        }
        if old_parent == Some(new_parent) {
            return Ok(());
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(TreeError::WouldCycle(id));
        }

        if let Some(parent_sprite) = old_parent.and_then(|p| self.sprites.get_mut(&p)) {
            parent_sprite.children_mut().retain(|child| *child != id);
        }
        if let Some(parent_sprite) = self.sprites.get_mut(&new_parent) {
            parent_sprite.children_mut().push(id);
        }
        let perspective = self.get(new_parent).map(|p| p.is_perspective()).unwrap_or(false);
        if let Some(sprite) = self.sprites.get_mut(&id) {
            sprite.set_parent_link(Some(new_parent));
            sprite.set_perspective(perspective);
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: SpriteId, mut id: SpriteId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.get(id).and_then(|s| s.parent()) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Draw `id` after its siblings.
    pub fn send_to_front(&mut self, id: SpriteId) -> Result<(), TreeError> {
        self.move_within_parent(id, true)
    }

    /// Draw `id` before its siblings.
    pub fn send_to_back(&mut self, id: SpriteId) -> Result<(), TreeError> {
        self.move_within_parent(id, false)
    }

    fn move_within_parent(&mut self, id: SpriteId, to_front: bool) -> Result<(), TreeError> {
        let parent = self.get(id)
            .ok_or(TreeError::SpriteNotExist(id))?
            .parent()
            .ok_or(TreeError::RootSprite(id))?;
        let parent_sprite = self.sprites.get_mut(&parent).ok_or(TreeError::SpriteNotExist(parent))?;
        let children = parent_sprite.children_mut();
        children.retain(|child| *child != id);
        if to_front {
            children.push(id);
        } else {
            children.insert(0, id);
        }
        parent_sprite.mark_dirty(attribute::CHILD_ORDER);
        Ok(())
    }

    /// Reorders children of `id` to follow `order`; unlisted children keep their relative
    /// order after the listed ones.
    pub(crate) fn apply_child_order(&mut self, id: SpriteId, order: &[SpriteId]) -> Result<(), TreeError> {
        let sprite = self.sprites.get_mut(&id).ok_or(TreeError::SpriteNotExist(id))?;
        let current = sprite.children().to_vec();
        let mut reordered: Vec<SpriteId> = order.iter()
            .copied()
            .filter(|child| current.contains(child))
            .collect();
        reordered.dedup();
        for child in current.iter() {
            if !reordered.contains(child) {
                reordered.push(*child);
            }
        }
        if reordered != current {
            *sprite.children_mut() = reordered;
            sprite.mark_dirty(attribute::CHILD_ORDER);
        }
        Ok(())
    }

    pub fn get(&self, id: SpriteId) -> Option<&Sprite> {
        self.sprites.get(&id)
    }

    pub fn get_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        self.sprites.get_mut(&id)
    }

    pub fn contains(&self, id: SpriteId) -> bool {
        self.sprites.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SpriteId> + '_ {
        self.sprites.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sprite> {
        self.sprites.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sprite> {
        self.sprites.values_mut()
    }

    pub fn roots(&self) -> &[SpriteId] {
        &self.roots
    }

    pub fn is_root(&self, id: SpriteId) -> bool {
        self.roots.contains(&id)
    }

    /// True when walking parents from `id` ends at a root sprite.
    pub fn is_reachable(&self, id: SpriteId) -> bool {
        let mut current = id;
        let mut steps = 0;
        while let Some(sprite) = self.get(current) {
            match sprite.parent() {
                Some(parent) => current = parent,
                None => return self.is_root(current),
            }
            steps += 1;
            if steps > self.sprites.len() {
                return false;
            }
        }
        false
    }

    /// Pre-order ids of the subtree rooted at `id`, children in stored order.
    pub fn subtree_ids(&self, id: SpriteId) -> Vec<SpriteId> {
        let mut ids = vec![];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(sprite) = self.get(current) {
                ids.push(current);
                stack.extend(sprite.children().iter().rev());
            }
        }
        ids
    }

    /// Sprites removed since the last call, top of each removed subtree only.
    pub fn take_removed(&mut self) -> Vec<SpriteId> {
        std::mem::take(&mut self.removed)
    }

    pub fn clear_dirty(&mut self, channel: DirtyChannel) {
        for sprite in self.sprites.values_mut() {
            sprite.take_dirty(channel);
        }
    }

    pub fn has_dirty(&self, channel: DirtyChannel) -> bool {
        self.sprites.values().any(|sprite| sprite.is_dirty(channel))
    }

    pub fn global_transform(&self, id: SpriteId) -> Option<Mat4> {
        let mut transform = self.get(id)?.local_transform();
        let mut current = self.get(id)?.parent();
        while let Some(parent_id) = current {
            let parent = self.get(parent_id)?;
            transform = parent.local_transform() * transform;
            current = parent.parent();
        }
        Some(transform)
    }

    /// Children of `sprite` in the order they draw.
    pub fn draw_order(&self, sprite: &Sprite) -> Vec<SpriteId> {
        let children = sprite.children();
        let mut order: Vec<SpriteId> = if sprite.sort_order().is_empty() {
            children.to_vec()
        } else {
            let mut listed: Vec<SpriteId> = sprite.sort_order()
                .iter()
                .copied()
                .filter(|child| children.contains(child))
                .collect();
            listed.dedup();
            for child in children {
                if !listed.contains(child) {
                    listed.push(*child);
                }
            }
            listed
        };

        if sprite.is_draw_sorted() && sprite.sort_order().is_empty() {
            order.sort_by(|a, b| {
                let za = self.get(*a).map(|s| s.position().z).unwrap_or(0.0);
                let zb = self.get(*b).map(|s| s.position().z).unwrap_or(0.0);
                za.total_cmp(&zb)
            });
        }
        order
    }

    pub fn update_server(&mut self, root: SpriteId, params: &UpdateParams) {
        for id in self.subtree_ids(root) {
            if let Some(sprite) = self.sprites.get_mut(&id) {
                sprite.update_server(params);
            }
        }
    }

    pub fn update_client(&mut self, root: SpriteId, params: &UpdateParams) {
        for id in self.subtree_ids(root) {
            if let Some(sprite) = self.sprites.get_mut(&id) {
                sprite.update_client(params);
            }
        }
    }

    pub fn draw(&self, id: SpriteId, parent_transform: &Mat4, params: &DrawParams, target: &mut dyn DrawTarget) {
        let Some(sprite) = self.get(id) else {
            return;
        };
        if !sprite.is_visible() {
            return;
        }

        let transform = *parent_transform * sprite.local_transform();
        let opacity = params.parent_opacity * sprite.opacity();

        if let Some(shape) = sprite.draw_shape() {
            target.draw(DrawCommand {
                sprite_id: id,
                shape,
                transform,
                size: sprite.size(),
                color: sprite.color(),
                opacity,
            });
        }

        let child_params = DrawParams { parent_opacity: opacity };
        for child in self.draw_order(sprite) {
            self.draw(child, &transform, &child_params, target);
        }
    }

    /// Topmost enabled sprite under `point`, walking in reverse draw order.
    pub fn get_hit(&self, root: SpriteId, point: Vec3) -> Option<SpriteId> {
        self.hit_recursive(root, &Mat4::IDENTITY, &|sprite, global| {
            sprite.contains_global(global, point)
        })
    }

    pub fn get_perspective_hit(&self, root: SpriteId, pick: &CameraPick) -> Option<SpriteId> {
        self.hit_recursive(root, &Mat4::IDENTITY, &|sprite, global| {
            sprite.ray_hit(global, &pick.ray).is_some()
        })
    }

    fn hit_recursive(
        &self,
        id: SpriteId,
        parent_transform: &Mat4,
        test: &dyn Fn(&Sprite, &Mat4) -> bool
    ) -> Option<SpriteId> {
        let sprite = self.get(id)?;
        if !sprite.is_visible() {
            return None;
        }
        let global = *parent_transform * sprite.local_transform();

        for child in self.draw_order(sprite).into_iter().rev() {
            if let Some(hit) = self.hit_recursive(child, &global, test) {
                return Some(hit);
            }
        }

        if sprite.is_enabled() && test(sprite, &global) {
            Some(id)
        } else {
            None
        }
    }
}

impl Default for SpriteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{
        draw::DrawList,
        sprite::Circle
    };

    fn store_with_root() -> (SpriteStore, SpriteId) {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        (store, root)
    }

    fn assert_consistent(store: &SpriteStore) {
        for root in store.roots() {
            for id in store.subtree_ids(*root) {
                assert_eq!(store.get(id).map(|s| s.id()), Some(id), "tree sprite {id} not in registry");
            }
        }
        for id in store.ids() {
            assert!(store.is_reachable(id), "registered sprite {id} not reachable from a root");
        }
    }

    #[test]
    fn test_ids_are_unique_and_skip_empty() {
        let (mut store, root) = store_with_root();
        assert_ne!(root, EMPTY_SPRITE_ID);
        let a = store.create(root, SpriteKind::Plain).unwrap();
        let b = store.create(root, SpriteKind::Plain).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, EMPTY_SPRITE_ID);
    }

    #[test]
    fn test_id_counter_wraps_past_empty_and_live_ids() {
        let (mut store, root) = store_with_root();
        store.next_sprite_id = SpriteId::MAX - 1;
        let last = store.create(root, SpriteKind::Plain).unwrap();
        assert_eq!(last, SpriteId::MAX);
        let wrapped = store.create(root, SpriteKind::Plain).unwrap();
        assert_ne!(wrapped, EMPTY_SPRITE_ID);
        assert_ne!(wrapped, root, "live root id must not be reused");
        assert_eq!(wrapped, root + 1);
    }

    #[test]
    fn test_remove_releases_subtree() {
        let (mut store, root) = store_with_root();
        let parent = store.create(root, SpriteKind::Plain).unwrap();
        let child = store.create(parent, SpriteKind::Plain).unwrap();
        let grandchild = store.create(child, SpriteKind::Plain).unwrap();
        let sibling = store.create(root, SpriteKind::Plain).unwrap();

        assert_eq!(store.remove(parent), Ok(3));
        assert!(!store.contains(parent));
        assert!(!store.contains(child));
        assert!(!store.contains(grandchild));
        assert!(store.contains(sibling));
        assert_eq!(store.get(root).unwrap().children(), &[sibling]);
        assert_eq!(store.take_removed(), vec![parent]);
        assert_consistent(&store);
    }

    #[test]
    fn test_reparented_children_survive_removal() {
        let (mut store, root) = store_with_root();
        let parent = store.create(root, SpriteKind::Plain).unwrap();
        let child = store.create(parent, SpriteKind::Plain).unwrap();

        store.reparent(child, root).unwrap();
        store.remove(parent).unwrap();

        assert!(store.contains(child));
        assert_eq!(store.get(child).unwrap().parent(), Some(root));
        assert_consistent(&store);
    }

    #[test]
    fn test_reparent_rejects_cycles_and_roots() {
        let (mut store, root) = store_with_root();
        let a = store.create(root, SpriteKind::Plain).unwrap();
        let b = store.create(a, SpriteKind::Plain).unwrap();

        assert_eq!(store.reparent(a, b), Err(TreeError::WouldCycle(a)));
        assert_eq!(store.reparent(a, a), Err(TreeError::WouldCycle(a)));
        assert_eq!(store.reparent(root, a), Err(TreeError::RootSprite(root)));
        assert_eq!(store.remove(root), Err(TreeError::RootSprite(root)));
        assert_eq!(store.remove(EMPTY_SPRITE_ID), Err(TreeError::EmptyId));
        assert_consistent(&store);
    }

    #[test]
    fn test_child_inherits_perspective_from_root() {
        let mut store = SpriteStore::new();
        let root = store.create_root(true);
        let child = store.create(root, SpriteKind::Plain).unwrap();
        assert!(store.get(child).unwrap().is_perspective());
    }

    #[test]
    fn test_topmost_sprite_wins_hit() {
        let (mut store, root) = store_with_root();
        let bottom = store.create(root, SpriteKind::Plain).unwrap();
        let top = store.create(root, SpriteKind::Plain).unwrap();
        for id in [bottom, top] {
            let sprite = store.get_mut(id).unwrap();
            sprite.set_size(100.0, 100.0);
            sprite.enable(true);
        }

        assert_eq!(store.get_hit(root, Vec3::new(50.0, 50.0, 0.0)), Some(top));

        store.send_to_back(top).unwrap();
        assert_eq!(store.get_hit(root, Vec3::new(50.0, 50.0, 0.0)), Some(bottom));

        store.get_mut(bottom).unwrap().hide();
        assert_eq!(store.get_hit(root, Vec3::new(50.0, 50.0, 0.0)), Some(top));
        assert_eq!(store.get_hit(root, Vec3::new(150.0, 50.0, 0.0)), None);
    }

    #[test]
    fn test_disabled_sprite_is_not_hit_but_children_are() {
        let (mut store, root) = store_with_root();
        let parent = store.create(root, SpriteKind::Plain).unwrap();
        let child = store.create(parent, SpriteKind::Plain).unwrap();
        store.get_mut(parent).unwrap().set_size(200.0, 200.0);
        store.get_mut(parent).unwrap().set_position_xy(100.0, 100.0);
        let child_sprite = store.get_mut(child).unwrap();
        child_sprite.set_size(10.0, 10.0);
        child_sprite.enable(true);

        assert_eq!(store.get_hit(root, Vec3::new(105.0, 105.0, 0.0)), Some(child));
        assert_eq!(store.get_hit(root, Vec3::new(150.0, 150.0, 0.0)), None);
    }

    #[test]
    fn test_draw_sorted_by_z_and_explicit_order() {
        let (mut store, root) = store_with_root();
        let a = store.create(root, SpriteKind::Circle(Circle::new(true, 5.0))).unwrap();
        let b = store.create(root, SpriteKind::Circle(Circle::new(true, 5.0))).unwrap();
        store.get_mut(a).unwrap().set_position(Vec3::new(0.0, 0.0, 10.0));
        store.get_mut(root).unwrap().set_draw_sorted(true);

        let order = store.draw_order(store.get(root).unwrap());
        assert_eq!(order, vec![b, a]);

        store.get_mut(root).unwrap().set_sort_order(vec![a]);
        let order = store.draw_order(store.get(root).unwrap());
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_draw_skips_hidden_and_multiplies_opacity() {
        let (mut store, root) = store_with_root();
        let parent = store.create(root, SpriteKind::Circle(Circle::new(true, 5.0))).unwrap();
        let child = store.create(parent, SpriteKind::Circle(Circle::new(false, 2.0))).unwrap();
        let hidden = store.create(parent, SpriteKind::Circle(Circle::new(false, 2.0))).unwrap();
        store.get_mut(parent).unwrap().set_opacity(0.5);
        store.get_mut(child).unwrap().set_opacity(0.5);
        store.get_mut(hidden).unwrap().hide();

        let mut list = DrawList::default();
        store.draw(root, &Mat4::IDENTITY, &DrawParams::default(), &mut list);

        let ids: Vec<SpriteId> = list.commands().iter().map(|c| c.sprite_id).collect();
        assert_eq!(ids, vec![parent, child], "transparent root and hidden sprite draw nothing");
        assert_eq!(list.commands()[1].opacity, 0.25);
    }

    #[test]
    fn test_child_order_apply_keeps_unlisted_children() {
        let (mut store, root) = store_with_root();
        let a = store.create(root, SpriteKind::Plain).unwrap();
        let b = store.create(root, SpriteKind::Plain).unwrap();
        let c = store.create(root, SpriteKind::Plain).unwrap();

        store.apply_child_order(root, &[c, 999, a]).unwrap();
        assert_eq!(store.get(root).unwrap().children(), &[c, a, b]);
    }
}
