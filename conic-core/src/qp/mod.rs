//! Quadratic programs.
//!
//! Only the direct form `min ½ xᵀQx + cᵀx s.t. Ax = b, x ≥ 0` is provided.

pub mod direct;
