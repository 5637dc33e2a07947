//! Typed marshaling between host code and an embedded Lua state.
//!
//! - [`Context`]: the evaluation stack values cross the boundary on
//! - [`Marshal`] / [`MarshalMulti`]: host type to script value conversions
//! - [`Table`]: host-side mirror of a script table
//! - [`Runtime`] and [`Library`]: script loading, reload and host function
//!   registration

mod call;
pub mod context;
pub mod library;
pub mod runtime;
pub mod table;
pub mod type_map;
pub mod types;

pub use context::Context;
pub use library::Library;
pub use runtime::Runtime;
pub use table::{Map, Table, Value};
pub use type_map::{Extraction, Marshal, MarshalMulti};
pub use types::{Boolean, HostFunction, Number, Opaque, String, ValueTag};
