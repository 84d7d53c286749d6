pub mod compositor;
pub mod config;
pub mod mirror;
pub mod pacer;
pub mod pixel;
pub mod region;
