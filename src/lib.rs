pub mod app;
pub mod net;
pub mod settings;
pub mod ui;

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:7788";
