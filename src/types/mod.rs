//! Consolidated type definitions for the quote SDK.
//!
//! This module contains the wizard's persisted trip state, the outbound quote
//! request, the canonical quote record, raw stream payload shapes and the
//! insurer profile table.

mod provider;
mod quote;
mod raw;
mod request;
mod trip;

pub use provider::*;
pub use quote::*;
pub use raw::*;
pub use request::*;
pub use trip::*;
