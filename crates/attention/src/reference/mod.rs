//! Portable, exact implementations of scaled dot-product attention.
//!
//! These paths favour clarity over absolute performance and serve as the
//! baseline every other attention path is compared against.

pub mod scaled_dot_product;

pub use scaled_dot_product::ScaledDotProductAttention;
