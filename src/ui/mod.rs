pub mod camera;
pub mod draw;
pub mod event;
pub mod math;
pub mod sprite;
pub mod touch;
