use std::{
    collections::HashMap,
    time::Instant
};

use glam::Vec2;

use crate::{
    settings::EngineSettings,
    ui::{
        camera::PerspCameraParams,
        draw::DrawTarget,
        event::SpriteListener,
        math::{
            Rect2F,
            Vector2F
        },
        sprite::{
            DirtyChannel,
            Sprite,
            SpriteId,
            SpriteKind,
            SpriteStore,
            TreeError,
            UpdateParams,
            EMPTY_SPRITE_ID
        },
        touch::{
            Dispatch,
            TouchManager,
            TouchPoint
        }
    }
};

use super::{
    auto_update::{
        AutoUpdate,
        AutoUpdateList
    },
    image_service::LoadImageService,
    roots::{
        EngineRoots,
        RootError,
        RootList,
        ViewRects
    },
    work_manager::WorkManager,
    EngineError,
    EngineRole
};

type ListenerList = Vec<Box<dyn SpriteListener + Send>>;

/// Owns the sprite tree of one process and drives its frame.
///
/// The engine knows nothing about the network. [`super::server::EngineServer`] and
/// [`super::client::EngineClient`] wrap it and move blobs in and out between frames.
pub struct Engine {
    role: EngineRole,
    settings: EngineSettings,
    store: SpriteStore,
    roots: EngineRoots,
    auto_update: AutoUpdateList,
    touch: TouchManager,
    listeners: HashMap<SpriteId, ListenerList>,
    work: WorkManager,
    images: LoadImageService,
    clock: Instant,
    elapsed_time: f64,
    last_touch_time: f64,
    idling: bool,
}

impl Engine {
    pub fn new(role: EngineRole, settings: EngineSettings, roots: &RootList) -> Result<Self, EngineError> {
        let mut store = SpriteStore::new();
        let roots = EngineRoots::build(roots, &mut store, Self::view_rects(&settings))?;
        let touch = TouchManager::new(settings.touch_settings());
        log::info!("Engine {role:?} created with {} roots, src={}, dst={}", roots.len(), settings.src_rect, settings.dst_rect);

        Ok(Self {
            role,
            settings,
            store,
            roots,
            auto_update: AutoUpdateList::new(),
            touch,
            listeners: HashMap::new(),
            work: WorkManager::new(),
            images: LoadImageService::new(),
            clock: Instant::now(),
            elapsed_time: 0.0,
            last_touch_time: 0.0,
            idling: false,
        })
    }

    fn view_rects(settings: &EngineSettings) -> ViewRects {
        ViewRects {
            world_size: settings.world_dimensions.into(),
            src_rect: settings.src_rect,
            dst_rect: settings.dst_rect,
        }
    }

    pub fn role(&self) -> EngineRole {
        self.role
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &SpriteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SpriteStore {
        &mut self.store
    }

    pub fn roots(&self) -> &EngineRoots {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut EngineRoots {
        &mut self.roots
    }

    pub fn root_sprite(&self, index: usize) -> Option<SpriteId> {
        self.roots.sprite(index)
    }

    pub fn work_manager(&mut self) -> &mut WorkManager {
        &mut self.work
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn create_sprite(&mut self, parent: SpriteId, kind: SpriteKind) -> Result<SpriteId, TreeError> {
        if parent == EMPTY_SPRITE_ID {
            log::warn!("Create under the empty sprite id");
            return Err(TreeError::EmptyId);
        }
        self.store.create(parent, kind)
    }

    /// Removes the sprite and its subtree together with their listeners.
    pub fn remove_sprite(&mut self, id: SpriteId) -> bool {
        if id == EMPTY_SPRITE_ID {
            log::warn!("Remove of the empty sprite id");
            return false;
        }
        match self.store.remove(id) {
            Ok(count) => {
                log::trace!("Removed sprite {id} and {} descendants", count.saturating_sub(1));
                self.forget_removed();
                true
            },
            Err(e) => {
                log::warn!("Could not remove sprite {id}, reason='{e}'");
                false
            },
        }
    }

    pub fn find_sprite(&self, id: SpriteId) -> Option<&Sprite> {
        if id == EMPTY_SPRITE_ID {
            log::warn!("Lookup of the empty sprite id");
            return None;
        }
        self.store.get(id)
    }

    pub fn find_sprite_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        if id == EMPTY_SPRITE_ID {
            log::warn!("Lookup of the empty sprite id");
            return None;
        }
        self.store.get_mut(id)
    }

    /// Leaves only the root sprites.
    pub fn clear_all_sprites(&mut self) {
        self.roots.clear_children(&mut self.store);
        self.forget_removed();
    }

    pub fn add_listener<L>(&mut self, sprite: SpriteId, listener: L) -> bool
    where
        L: SpriteListener + Send + 'static
    {
        if !self.store.contains(sprite) {
            log::warn!("Listener for unknown sprite {sprite}");
            return false;
        }
        self.listeners.entry(sprite).or_default().push(Box::new(listener));
        true
    }

    pub fn listener_count(&self, sprite: SpriteId) -> usize {
        self.listeners.get(&sprite).map_or(0, Vec::len)
    }

    pub fn add_auto_update<A>(&mut self, role: EngineRole, service: A)
    where
        A: AutoUpdate + Send + 'static
    {
        self.auto_update.add(role, Box::new(service));
    }

    pub fn camera(&self, root_index: usize) -> Result<PerspCameraParams, RootError> {
        self.roots.camera_params(root_index)
    }

    pub fn set_camera(&mut self, root_index: usize, params: PerspCameraParams) -> Result<(), RootError> {
        self.roots.set_camera(root_index, params)
    }

    pub fn set_src_rect(&mut self, src_rect: Rect2F) {
        self.settings.src_rect = src_rect;
        self.roots.set_view(Self::view_rects(&self.settings));
    }

    pub fn set_dst_rect(&mut self, dst_rect: Rect2F) {
        self.settings.dst_rect = dst_rect;
        self.roots.set_view(Self::view_rects(&self.settings));
    }

    /// Frame step on the wall clock.
    pub fn update(&mut self) -> UpdateParams {
        let elapsed_time = self.clock.elapsed().as_secs_f64();
        let params = UpdateParams {
            delta_time: (elapsed_time - self.elapsed_time).max(0.0) as f32,
            elapsed_time,
        };
        self.update_with(&params);
        params
    }

    /// Completions, image loads, auto updates, then the sprite traversal of this role.
    pub fn update_with(&mut self, params: &UpdateParams) {
        self.elapsed_time = params.elapsed_time;

        self.work.apply_completions(&mut self.store);
        self.images.scan(&mut self.store, &mut self.work);
        self.auto_update.update(self.role, &mut self.store, params);
        match self.role {
            EngineRole::Server => self.roots.update_server(&mut self.store, params),
            EngineRole::Client => self.roots.update_client(&mut self.store, params),
        }
        self.forget_removed();

        if !self.idling && self.elapsed_time - self.last_touch_time >= self.settings.idle_time {
            self.start_idling();
        }
    }

    /// A client's draw consumes its client dirty channel.
    pub fn draw(&mut self, target: &mut dyn DrawTarget) {
        self.roots.draw(&self.store, target);
        if self.role == EngineRole::Client {
            self.store.clear_dirty(DirtyChannel::Client);
        }
    }

    /// Topmost sprite under a point of the dst rect.
    pub fn get_hit(&mut self, screen_point: Vector2F) -> Option<SpriteId> {
        self.roots.refresh_cameras();
        let world = EngineRoots::screen_to_world(self.roots.view(), screen_point.into());
        self.roots.get_hit(&self.store, world)
    }

    pub fn is_idling(&self) -> bool {
        self.idling
    }

    pub fn start_idling(&mut self) {
        if !self.idling {
            log::info!("Engine idling after {:.1}s without touch", self.elapsed_time - self.last_touch_time);
            self.idling = true;
        }
    }

    pub fn reset_idle_timeout(&mut self) {
        if self.idling {
            log::info!("Engine leaves idle");
        }
        self.idling = false;
        self.last_touch_time = self.elapsed_time;
    }

    /// Touch points are in dst rect pixels.
    pub fn touches_begin(&mut self, touches: &[TouchPoint]) {
        self.reset_idle_timeout();
        let touches = self.to_world(touches);
        self.roots.refresh_cameras();

        let roots = &self.roots;
        let hit = |store: &SpriteStore, point: Vector2F| roots.get_hit(store, point.into());
        let now = self.clock.elapsed().as_secs_f64();
        let dispatch = self.touch.touches_begin(&touches, &mut self.store, &hit, now);
        self.dispatch(dispatch);
    }

    pub fn touches_moved(&mut self, touches: &[TouchPoint]) {
        self.reset_idle_timeout();
        let touches = self.to_world(touches);
        let now = self.clock.elapsed().as_secs_f64();
        let dispatch = self.touch.touches_moved(&touches, &mut self.store, now);
        self.dispatch(dispatch);
    }

    pub fn touches_ended(&mut self, touches: &[TouchPoint]) {
        self.reset_idle_timeout();
        let touches = self.to_world(touches);
        let now = self.clock.elapsed().as_secs_f64();
        let dispatch = self.touch.touches_ended(&touches, &mut self.store, now);
        self.dispatch(dispatch);
    }

    pub fn mouse_touch_begin(&mut self, button: u8, screen_point: Vector2F) {
        self.touches_begin(&[TouchPoint::mouse(button, screen_point)]);
    }

    pub fn mouse_touch_moved(&mut self, button: u8, screen_point: Vector2F) {
        self.touches_moved(&[TouchPoint::mouse(button, screen_point)]);
    }

    pub fn mouse_touch_ended(&mut self, button: u8, screen_point: Vector2F) {
        self.touches_ended(&[TouchPoint::mouse(button, screen_point)]);
    }

    pub fn touch_manager(&self) -> &TouchManager {
        &self.touch
    }

    fn to_world(&self, touches: &[TouchPoint]) -> Vec<TouchPoint> {
        touches
            .iter()
            .map(|touch| {
                let world: Vec2 = EngineRoots::screen_to_world(self.roots.view(), touch.point.into());
                TouchPoint { id: touch.id, point: world.into() }
            })
            .collect()
    }

    fn dispatch(&mut self, dispatch: Dispatch) {
        for (sprite, event) in dispatch {
            let Some(listeners) = self.listeners.get_mut(&sprite) else {
                continue;
            };
            for listener in listeners.iter_mut() {
                listener.on_event(&mut self.store, sprite, &event);
            }
        }
        self.forget_removed();
    }

    fn forget_removed(&mut self) {
        let store = &self.store;
        self.listeners.retain(|sprite, _| store.contains(*sprite));
        self.touch.forget_removed(store);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("role", &self.role)
            .field("sprites", &self.store.len())
            .field("roots", &self.roots.len())
            .field("listeners", &self.listeners.len())
            .field("idling", &self.idling)
            .finish()
    }
}
