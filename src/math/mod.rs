pub mod pool;
pub mod sigmoid;
pub mod stats;
