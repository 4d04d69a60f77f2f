//! Core types for Threadline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod line;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use line::{LineItem, LineItemError};
pub use price::{NegativePrice, Price};
pub use status::*;
