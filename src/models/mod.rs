//! Temporal contrast sensitivity model.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! stay generic:
//!
//! - `response`: frequency response of the two mechanisms and predicted thresholds
//! - `bounds`: the box constraints of local models and global variants
//! - `law`: positional laws mapping eccentricity and polar angle to gain
//! - `layout`: global parameter vectors and their expansion into local models

pub mod bounds;
pub mod law;
pub mod layout;
pub mod response;

pub use bounds::*;
pub use layout::*;
pub use response::*;
