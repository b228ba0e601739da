// Library half of `texturer`; `main.rs` wraps the commands into a binary.

pub mod camera;
pub mod config;
pub mod estimator;
pub mod flow;
pub mod geometry;
pub mod grid;
pub mod model;
pub mod picture;
pub mod pipeline;
pub mod render;
pub mod resize;
pub mod sampler;
pub mod segment_images;
pub mod segmentation;
pub mod tensor;
pub mod texture_images;
pub mod visibility;

pub use base;
