use glam::{
    Mat4,
    Vec2,
    Vec3,
    Vec4
};

use super::math::Rect2F;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Picking input for perspective hit tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPick {
    pub ray: Ray,
    pub camera_direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthCameraParams {
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for OrthCameraParams {
    fn default() -> Self {
        Self {
            near_plane: -1.0,
            far_plane: 1.0,
        }
    }
}

impl OrthCameraParams {
    /// Maps `rect` onto the viewport, y grows downwards.
    pub fn projection(&self, rect: &Rect2F) -> Mat4 {
        Mat4::orthographic_rh_gl(
            rect.pos.x,
            rect.x2(),
            rect.y2(),
            rect.pos.y,
            self.near_plane,
            self.far_plane
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspCameraParams {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical, degrees.
    pub fov: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub lens_shift_h: f32,
    pub lens_shift_v: f32,
}

impl Default for PerspCameraParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1000.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 30.0,
            near_plane: 1.0,
            far_plane: 10000.0,
            lens_shift_h: 0.0,
            lens_shift_v: 0.0,
        }
    }
}

impl PerspCameraParams {
    /// The camera is authored for a viewport with the world's aspect ratio. When this
    /// process only shows `src_rect` of the world, field of view and lens shift are
    /// rescaled so the slice renders exactly as that part of the full view.
    pub fn adjusted_for(&self, world_size: Vec2, src_rect: &Rect2F) -> Self {
        let (ww, wh) = (world_size.x, world_size.y);
        let (sw, sh) = (src_rect.width(), src_rect.height());
        if ww <= 0.0 || wh <= 0.0 || sw <= 0.0 || sh <= 0.0 {
            log::warn!("Invalid camera state, world={world_size} src={src_rect}; using unadjusted camera");
            return *self;
        }

        let tan_half_fov = (self.fov / 2.0).to_radians().tan();
        let fov = 2.0 * (sh * tan_half_fov).atan2(wh).to_degrees();
        let lens_shift_h = 1.0 - ww / sw * (self.lens_shift_h + 1.0) + 2.0 * src_rect.pos.x / sw;
        let lens_shift_v = -(1.0 - wh / sh * (self.lens_shift_v + 1.0) + 2.0 * src_rect.pos.y / sh);

        Self {
            fov,
            lens_shift_h,
            lens_shift_v,
            ..*self
        }
    }
}

/// Resolved perspective camera: view and projection for one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspCamera {
    params: PerspCameraParams,
    view: Mat4,
    projection: Mat4,
}

impl PerspCamera {
    pub fn new(params: PerspCameraParams, aspect_ratio: f32) -> Self {
        let view = Mat4::look_at_rh(params.position, params.target, params.up);
        let projection = Self::shifted_frustum(&params, aspect_ratio);
        Self { params, view, projection }
    }

    fn shifted_frustum(params: &PerspCameraParams, aspect_ratio: f32) -> Mat4 {
        let near = params.near_plane;
        let far = params.far_plane;
        let top = near * (params.fov / 2.0).to_radians().tan();
        let right = top * aspect_ratio;

        let (left, right) = (-right + params.lens_shift_h * right, right + params.lens_shift_h * right);
        let (bottom, top) = (-top + params.lens_shift_v * top, top + params.lens_shift_v * top);

        Mat4::from_cols(
            Vec4::new(2.0 * near / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * near / (top - bottom), 0.0, 0.0),
            Vec4::new(
                (right + left) / (right - left),
                (top + bottom) / (top - bottom),
                -(far + near) / (far - near),
                -1.0
            ),
            Vec4::new(0.0, 0.0, -2.0 * far * near / (far - near), 0.0),
        )
    }

    pub fn params(&self) -> &PerspCameraParams {
        &self.params
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn eye(&self) -> Vec3 {
        self.params.position
    }

    pub fn view_direction(&self) -> Vec3 {
        (self.params.target - self.params.position).normalize_or_zero()
    }

    /// `screen_point` is in viewport pixels with the origin at the upper left.
    pub fn pick(&self, screen_point: Vec2, viewport_size: Vec2) -> CameraPick {
        let ndc = Vec2::new(
            2.0 * screen_point.x / viewport_size.x - 1.0,
            1.0 - 2.0 * screen_point.y / viewport_size.y
        );
        let inverse = self.view_projection().inverse();
        let near = inverse.project_point3(Vec3::new(ndc.x, ndc.y, -1.0));
        let direction = (near - self.eye()).normalize_or_zero();

        CameraPick {
            ray: Ray { origin: self.eye(), direction },
            camera_direction: self.view_direction(),
        }
    }
}
