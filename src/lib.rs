pub mod cli;
pub mod cluster;
pub mod config;
pub mod ctx;
pub mod io;
pub mod math;
pub mod mesh;
pub mod metrics;
pub mod pipeline;
pub mod predict;
pub mod saliency;
pub mod schema;
pub mod store;
pub mod threshold;
