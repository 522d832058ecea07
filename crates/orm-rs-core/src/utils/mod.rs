//! Utility functions for orm-rs.
//!
//! - [`text`]: naming schemes that turn class and attribute names into table
//!   and column names.

pub mod text;
