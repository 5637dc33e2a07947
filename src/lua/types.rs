//! Host-side types that cross the script boundary.

use std::ffi::c_void;
use std::fmt;

use mlua::Value as LuaValue;

use super::context::Context;
use crate::Result;

/// Script numbers are double precision floats.
pub type Number = f64;

/// Script strings are marshaled as owned UTF-8 text.
pub type String = std::string::String;

/// Script booleans.
pub type Boolean = bool;

/// A host function callable from script.
///
/// The context's stack holds exactly the call's arguments. The returned count
/// selects how many values from the top of the stack are handed back to the
/// script. An `Err` is raised as a script runtime error.
pub type HostFunction = fn(&mut Context<'_>) -> Result<usize>;

/// An opaque host pointer, passed to script as light userdata.
///
/// The script can store and return it but never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opaque(pub *mut c_void);

impl Opaque {
    /// The null pointer.
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Wrap a typed pointer.
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }

    /// Get the raw pointer.
    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Runtime type of a script value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Number,
    String,
    Boolean,
    Function,
    Table,
    Opaque,
}

impl ValueTag {
    /// Tag of an engine value, or `None` for nil and kinds the host cannot store.
    pub fn of(value: &LuaValue) -> Option<Self> {
        match value {
            LuaValue::Integer(_) | LuaValue::Number(_) => Some(ValueTag::Number),
            LuaValue::String(_) => Some(ValueTag::String),
            LuaValue::Boolean(_) => Some(ValueTag::Boolean),
            LuaValue::Function(_) => Some(ValueTag::Function),
            LuaValue::Table(_) => Some(ValueTag::Table),
            LuaValue::LightUserData(_) => Some(ValueTag::Opaque),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueTag::Number => "number",
            ValueTag::String => "string",
            ValueTag::Boolean => "boolean",
            ValueTag::Function => "function",
            ValueTag::Table => "table",
            ValueTag::Opaque => "opaque",
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
