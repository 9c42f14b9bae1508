use glam::{
    Mat4,
    Vec2,
    Vec3
};

use crate::ui::{
    camera::{
        OrthCameraParams,
        PerspCamera,
        PerspCameraParams
    },
    draw::{
        DrawParams,
        DrawTarget
    },
    math::Rect2F,
    sprite::{
        SpriteId,
        SpriteStore,
        UpdateParams
    }
};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RootError {
    #[error("Camera of slave root '{0}' can only be changed through its master")]
    SlaveCameraEdit(usize),

    #[error("Root '{0}' is not a perspective root")]
    NotPerspective(usize),

    #[error("Root index '{0}' out of range")]
    BadIndex(usize),

    #[error("Root '{root}' cannot be slaved to '{master}'")]
    InvalidMaster {
        root: usize,
        master: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RootKind {
    Orth {
        /// Camera covers the src rect in world units instead of the dst rect in pixels.
        draw_scaled: bool,
    },
    Persp(PerspCameraParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootSpec {
    pub kind: RootKind,
    pub master: Option<usize>,
}

/// Describes the roots an engine creates, in draw order.
///
/// ```
/// use sprite_sync::app::roots::RootList;
/// let roots = RootList::new().ortho().persp().persp_fov(45.0).slave_to(1);
/// assert_eq!(roots.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootList {
    roots: Vec<RootSpec>,
}

impl RootList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ortho(mut self) -> Self {
        self.roots.push(RootSpec {
            kind: RootKind::Orth { draw_scaled: true },
            master: None,
        });
        self
    }

    pub fn persp(self) -> Self {
        self.persp_params(PerspCameraParams::default())
    }

    pub fn persp_params(mut self, params: PerspCameraParams) -> Self {
        self.roots.push(RootSpec {
            kind: RootKind::Persp(params),
            master: None,
        });
        self
    }

    pub fn persp_fov(self, fov: f32) -> Self {
        self.persp_params(PerspCameraParams { fov, ..Default::default() })
    }

    /// Applies to the last added root.
    pub fn draw_scaled(mut self, draw_scaled: bool) -> Self {
        if let Some(RootSpec { kind: RootKind::Orth { draw_scaled: current }, .. }) = self.roots.last_mut() {
            *current = draw_scaled;
        }
        self
    }

    /// Slaves the last added root to the perspective root at `master`.
    pub fn slave_to(mut self, master: usize) -> Self {
        if let Some(last) = self.roots.last_mut() {
            last.master = Some(master);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn specs(&self) -> &[RootSpec] {
        &self.roots
    }
}

/// Rectangles shared by every root camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRects {
    pub world_size: Vec2,
    pub src_rect: Rect2F,
    pub dst_rect: Rect2F,
}

#[derive(Debug, Clone)]
pub struct OrthRoot {
    sprite: SpriteId,
    params: OrthCameraParams,
    draw_scaled: bool,
    camera_dirty: bool,
    projection: Mat4,
}

#[derive(Debug, Clone)]
pub struct PerspRoot {
    sprite: SpriteId,
    params: PerspCameraParams,
    master: Option<usize>,
    camera_dirty: bool,
    camera: PerspCamera,
}

#[derive(Debug, Clone)]
pub enum EngineRoot {
    Orth(OrthRoot),
    Persp(PerspRoot),
}

impl EngineRoot {
    pub fn sprite(&self) -> SpriteId {
        match self {
            EngineRoot::Orth(root) => root.sprite,
            EngineRoot::Persp(root) => root.sprite,
        }
    }

    pub fn is_perspective(&self) -> bool {
        matches!(self, EngineRoot::Persp(_))
    }

    pub fn is_camera_dirty(&self) -> bool {
        match self {
            EngineRoot::Orth(root) => root.camera_dirty,
            EngineRoot::Persp(root) => root.camera_dirty,
        }
    }

    fn mark_camera_dirty(&mut self) {
        match self {
            EngineRoot::Orth(root) => root.camera_dirty = true,
            EngineRoot::Persp(root) => root.camera_dirty = true,
        }
    }
}

/// The engine's roots. Each owns one top level sprite and a camera.
#[derive(Debug, Clone)]
pub struct EngineRoots {
    roots: Vec<EngineRoot>,
    view: ViewRects,
}

impl EngineRoots {
    /// Creates the root sprites first so their ids are `1..=N` on every process.
    pub fn build(list: &RootList, store: &mut SpriteStore, view: ViewRects) -> Result<Self, RootError> {
        for (index, spec) in list.specs().iter().enumerate() {
            if let Some(master) = spec.master {
                let master_spec = list.specs().get(master).ok_or(RootError::BadIndex(master))?;
                let valid = master != index
                    && matches!(spec.kind, RootKind::Persp(_))
                    && matches!(master_spec.kind, RootKind::Persp(_))
                    && master_spec.master.is_none();
                if !valid {
                    return Err(RootError::InvalidMaster { root: index, master });
                }
            }
        }

        let mut roots = Vec::with_capacity(list.len());
        for spec in list.specs() {
            let root = match &spec.kind {
                RootKind::Orth { draw_scaled } => {
                    let sprite = store.create_root(false);
                    if view.src_rect.is_valid() && view.dst_rect.is_valid() {
                        if let Some(root_sprite) = store.get_mut(sprite) {
                            root_sprite.set_size(view.src_rect.width(), view.src_rect.height());
                        }
                    }
                    EngineRoot::Orth(OrthRoot {
                        sprite,
                        params: OrthCameraParams::default(),
                        draw_scaled: *draw_scaled,
                        camera_dirty: true,
                        projection: Mat4::IDENTITY,
                    })
                },
                RootKind::Persp(params) => {
                    let sprite = store.create_root(true);
                    if let Some(root_sprite) = store.get_mut(sprite) {
                        root_sprite.set_size(view.world_size.x, view.world_size.y);
                        root_sprite.set_draw_sorted(true);
                    }
                    EngineRoot::Persp(PerspRoot {
                        sprite,
                        params: *params,
                        master: spec.master,
                        camera_dirty: true,
                        camera: PerspCamera::new(*params, view.src_rect.aspect_ratio()),
                    })
                },
            };
            log::debug!("Root {} created, perspective={}", root.sprite(), root.is_perspective());
            roots.push(root);
        }

        Ok(Self { roots, view })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineRoot> {
        self.roots.iter()
    }

    pub fn get(&self, index: usize) -> Option<&EngineRoot> {
        self.roots.get(index)
    }

    pub fn sprite(&self, index: usize) -> Option<SpriteId> {
        self.roots.get(index).map(EngineRoot::sprite)
    }

    pub fn view(&self) -> &ViewRects {
        &self.view
    }

    /// New rects invalidate every camera; they rebuild on the next draw.
    pub fn set_view(&mut self, view: ViewRects) {
        if self.view != view {
            self.view = view;
            self.mark_cameras_dirty();
        }
    }

    pub fn mark_cameras_dirty(&mut self) {
        for root in self.roots.iter_mut() {
            root.mark_camera_dirty();
        }
    }

    fn persp(&self, index: usize) -> Result<&PerspRoot, RootError> {
        match self.roots.get(index) {
            Some(EngineRoot::Persp(root)) => Ok(root),
            Some(EngineRoot::Orth(_)) => Err(RootError::NotPerspective(index)),
            None => Err(RootError::BadIndex(index)),
        }
    }

    /// Effective camera parameters. A slave reports its master's.
    pub fn camera_params(&self, index: usize) -> Result<PerspCameraParams, RootError> {
        let root = self.persp(index)?;
        match root.master {
            Some(master) => self.camera_params(master),
            None => Ok(root.params),
        }
    }

    pub fn set_camera(&mut self, index: usize, params: PerspCameraParams) -> Result<(), RootError> {
        let root = self.persp(index)?;
        if root.master.is_some() {
            log::warn!("Ignored camera change on slave root {index}");
            return Err(RootError::SlaveCameraEdit(index));
        }
        if root.params == params {
            return Ok(());
        }
        if let Some(EngineRoot::Persp(root)) = self.roots.get_mut(index) {
            root.params = params;
            root.camera_dirty = true;
        }
        // Slaves draw with the master's camera and must follow it.
        for root in self.roots.iter_mut() {
            if let EngineRoot::Persp(slave) = root {
                if slave.master == Some(index) {
                    slave.camera_dirty = true;
                }
            }
        }
        Ok(())
    }

    /// Rebuilds a dirty camera. Slaves rebuild their master instead.
    fn refresh_camera(&mut self, index: usize) {
        let view = self.view;
        let master = match self.roots.get(index) {
            Some(EngineRoot::Persp(root)) => root.master,
            _ => None,
        };
        if let Some(master) = master {
            self.refresh_camera(master);
        }

        match self.roots.get_mut(index) {
            Some(EngineRoot::Orth(root)) if root.camera_dirty => {
                let rect = if root.draw_scaled {
                    view.src_rect
                } else {
                    Rect2F::new(0.0, 0.0, view.dst_rect.width(), view.dst_rect.height())
                };
                root.projection = root.params.projection(&rect);
                root.camera_dirty = false;
                log::trace!("Ortho camera of root {} rebuilt", root.sprite);
            },
            Some(EngineRoot::Persp(root)) if root.camera_dirty => {
                if root.master.is_none() {
                    let adjusted = root.params.adjusted_for(view.world_size, &view.src_rect);
                    root.camera = PerspCamera::new(adjusted, view.src_rect.aspect_ratio());
                    log::trace!("Perspective camera of root {} rebuilt", root.sprite);
                }
                root.camera_dirty = false;
            },
            _ => {},
        }
    }

    pub fn refresh_cameras(&mut self) {
        for index in 0..self.roots.len() {
            self.refresh_camera(index);
        }
    }

    /// Camera a perspective root draws with, as of the last rebuild.
    pub fn camera(&self, index: usize) -> Result<PerspCamera, RootError> {
        let root = self.persp(index)?;
        match root.master {
            Some(master) => Ok(self.persp(master)?.camera),
            None => Ok(root.camera),
        }
    }

    pub fn view_projection(&mut self, index: usize) -> Result<Mat4, RootError> {
        self.refresh_camera(index);
        match self.roots.get(index) {
            Some(EngineRoot::Orth(root)) => Ok(root.projection),
            Some(EngineRoot::Persp(_)) => Ok(self.camera(index)?.view_projection()),
            None => Err(RootError::BadIndex(index)),
        }
    }

    pub fn clear_children(&self, store: &mut SpriteStore) {
        for root in self.roots.iter() {
            if let Err(e) = store.clear_children(root.sprite()) {
                log::error!("Could not clear root {}, reason='{e}'", root.sprite());
            }
        }
    }

    pub fn update_server(&self, store: &mut SpriteStore, params: &UpdateParams) {
        for root in self.roots.iter() {
            store.update_server(root.sprite(), params);
        }
    }

    pub fn update_client(&self, store: &mut SpriteStore, params: &UpdateParams) {
        for root in self.roots.iter() {
            store.update_client(root.sprite(), params);
        }
    }

    pub fn draw(&mut self, store: &SpriteStore, target: &mut dyn DrawTarget) {
        for index in 0..self.roots.len() {
            let sprite = self.roots[index].sprite();
            match self.view_projection(index) {
                Ok(view_projection) => target.set_camera(sprite, view_projection),
                Err(e) => {
                    log::error!("No camera for root {index}, reason='{e}'");
                    continue;
                },
            }
            store.draw(sprite, &Mat4::IDENTITY, &DrawParams::default(), target);
        }
    }

    /// Topmost hit over all roots, last root first. Perspective roots pick with the
    /// camera of the last rebuild, see [`Self::refresh_cameras`].
    pub fn get_hit(&self, store: &SpriteStore, world_point: Vec2) -> Option<SpriteId> {
        let screen_point = Self::world_to_screen(&self.view, world_point);
        let viewport = Vec2::new(self.view.dst_rect.width(), self.view.dst_rect.height());
        self.roots.iter().enumerate().rev().find_map(|(index, root)| match root {
            EngineRoot::Persp(_) => {
                let camera = self.camera(index).ok()?;
                store.get_perspective_hit(root.sprite(), &camera.pick(screen_point, viewport))
            },
            EngineRoot::Orth(_) => store.get_hit(root.sprite(), Vec3::new(world_point.x, world_point.y, 0.0)),
        })
    }

    /// Dst rect pixels to world units.
    pub fn screen_to_world(view: &ViewRects, screen_point: Vec2) -> Vec2 {
        let src_origin: Vec2 = view.src_rect.upper_left().into();
        src_origin + screen_point * Self::world_per_pixel(view)
    }

    pub fn world_to_screen(view: &ViewRects, world_point: Vec2) -> Vec2 {
        let src_origin: Vec2 = view.src_rect.upper_left().into();
        (world_point - src_origin) / Self::world_per_pixel(view)
    }

    fn world_per_pixel(view: &ViewRects) -> Vec2 {
        if view.dst_rect.is_valid() && view.src_rect.is_valid() {
            Vec2::new(
                view.src_rect.width() / view.dst_rect.width(),
                view.src_rect.height() / view.dst_rect.height()
            )
        } else {
            Vec2::ONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{
        draw::DrawList,
        sprite::SpriteKind
    };

    fn view() -> ViewRects {
        ViewRects {
            world_size: Vec2::new(1280.0, 400.0),
            src_rect: Rect2F::new(0.0, 0.0, 640.0, 400.0),
            dst_rect: Rect2F::new(0.0, 0.0, 640.0, 400.0),
        }
    }

    fn build(list: RootList) -> (EngineRoots, SpriteStore) {
        let mut store = SpriteStore::new();
        let roots = EngineRoots::build(&list, &mut store, view()).unwrap();
        (roots, store)
    }

    #[test]
    fn test_root_sprites_get_first_ids() {
        let (roots, store) = build(RootList::new().ortho().persp());
        assert_eq!(roots.sprite(0), Some(1));
        assert_eq!(roots.sprite(1), Some(2));
        assert!(store.get(2).unwrap().is_perspective());
        assert!(store.get(2).unwrap().is_draw_sorted());
        assert_eq!(store.get(1).unwrap().size(), Vec2::new(640.0, 400.0));
        assert_eq!(store.get(2).unwrap().size(), Vec2::new(1280.0, 400.0));
    }

    #[test]
    fn test_slave_reports_master_camera_and_rejects_edits() {
        let master = PerspCameraParams { fov: 50.0, ..Default::default() };
        let (mut roots, _) = build(RootList::new().persp_params(master).persp().slave_to(0));

        assert_eq!(roots.camera_params(1), Ok(master));
        let edit = PerspCameraParams { fov: 10.0, ..Default::default() };
        assert_eq!(roots.set_camera(1, edit), Err(RootError::SlaveCameraEdit(1)));
        assert_eq!(roots.camera_params(1), Ok(master));
        assert_eq!(roots.camera(1).unwrap(), roots.camera(0).unwrap());

        roots.set_camera(0, edit).unwrap();
        roots.refresh_cameras();
        assert_eq!(roots.camera_params(1), Ok(edit));
        assert_eq!(roots.camera(1).unwrap().params().near_plane, edit.near_plane);
    }

    #[test]
    fn test_invalid_slaving_is_rejected() {
        let mut store = SpriteStore::new();
        let list = RootList::new().ortho().persp().slave_to(0);
        assert_eq!(
            EngineRoots::build(&list, &mut store, view()).err(),
            Some(RootError::InvalidMaster { root: 1, master: 0 })
        );
        let list = RootList::new().persp().slave_to(4);
        assert_eq!(EngineRoots::build(&list, &mut store, view()).err(), Some(RootError::BadIndex(4)));
    }

    #[test]
    fn test_camera_rebuilds_lazily() {
        let (mut roots, _) = build(RootList::new().ortho().persp());
        assert!(roots.get(1).unwrap().is_camera_dirty());
        roots.view_projection(1).unwrap();
        assert!(!roots.get(1).unwrap().is_camera_dirty());

        roots.set_camera(1, roots.camera_params(1).unwrap()).unwrap();
        assert!(!roots.get(1).unwrap().is_camera_dirty(), "unchanged params keep the camera");

        roots.set_view(ViewRects { src_rect: Rect2F::new(640.0, 0.0, 640.0, 400.0), ..view() });
        assert!(roots.get(0).unwrap().is_camera_dirty());
        assert!(roots.get(1).unwrap().is_camera_dirty());
        assert_eq!(roots.set_camera(0, PerspCameraParams::default()), Err(RootError::NotPerspective(0)));
    }

    #[test]
    fn test_hit_prefers_later_roots() {
        let (roots, mut store) = build(RootList::new().ortho().ortho());
        let mut make = |root: SpriteId| {
            let id = store.create(root, SpriteKind::Plain).unwrap();
            let sprite = store.get_mut(id).unwrap();
            sprite.set_size(100.0, 100.0);
            sprite.enable(true);
            id
        };
        let lower = make(1);
        let upper = make(2);

        assert_eq!(roots.get_hit(&store, Vec2::new(10.0, 10.0)), Some(upper));
        store.get_mut(upper).unwrap().hide();
        assert_eq!(roots.get_hit(&store, Vec2::new(10.0, 10.0)), Some(lower));
    }

    #[test]
    fn test_draw_sets_camera_per_root() {
        let (mut roots, store) = build(RootList::new().ortho().persp());
        let mut list = DrawList::default();
        roots.draw(&store, &mut list);
        let cameras: Vec<SpriteId> = list.cameras().iter().map(|(root, _)| *root).collect();
        assert_eq!(cameras, vec![1, 2]);
    }

    #[test]
    fn test_screen_to_world_scales_into_src_rect() {
        let view = ViewRects {
            world_size: Vec2::new(2000.0, 1000.0),
            src_rect: Rect2F::new(1000.0, 0.0, 1000.0, 1000.0),
            dst_rect: Rect2F::new(0.0, 0.0, 500.0, 500.0),
        };
        assert_eq!(EngineRoots::screen_to_world(&view, Vec2::new(250.0, 100.0)), Vec2::new(1500.0, 200.0));
        assert_eq!(EngineRoots::world_to_screen(&view, Vec2::new(1500.0, 200.0)), Vec2::new(250.0, 100.0));
    }
}
