//! Shared layers and tensor helpers.

pub mod blocks;
pub mod ops;

pub use blocks::BasicConv2d;
pub use ops::{global_avg_pool2d, l2_normalize, max_pool2d_padded, COSINE_EPS};
