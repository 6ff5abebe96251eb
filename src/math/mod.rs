//! Mathematical utilities: least squares, robust weights, grids and geometry.

pub mod geometry;
pub mod grid;
pub mod ols;

pub use geometry::*;
pub use grid::*;
pub use ols::*;
