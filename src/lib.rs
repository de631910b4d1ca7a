#![no_std]
//! Tests line segments against sealed-world collision BSPs, repairing the two
//! well-known defects of that representation: phantom BSP and BSP leaks.

pub(crate) mod util;

pub mod collision_bsp;
pub mod float;
pub mod leak;
pub mod orientation;
pub mod surface;
pub mod test_vector;
pub mod vector;

#[cfg(test)]
pub(crate) mod test_scenes;
