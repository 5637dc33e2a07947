//! Execution context: the evaluation stack values cross the boundary on.
//!
//! A [`Context`] borrows a Lua state and owns a host-side stack of engine
//! values. Marshaling code pushes onto and pops from this stack; the primitives
//! here are the only place that talks to the engine directly.

use std::collections::HashMap;

use mlua::{Function as LuaFunction, LightUserData, Lua, MultiValue, Value as LuaValue};
use tracing::debug;

use super::types::{HostFunction, Number, Opaque, ValueTag};
use crate::error::script_message;
use crate::fatal::{fatal, fatal_assert};
use crate::Result;

/// Named registry prefix for the cached script wrappers of host functions.
const HOST_FUNCTION_KEY: &str = "sl_lua.host_function";

/// Reverse lookup from a script function's address to the host function it wraps.
#[derive(Default)]
struct HostFunctions {
    by_pointer: HashMap<usize, HostFunction>,
}

/// An evaluation stack bound to one Lua state.
pub struct Context<'lua> {
    lua: &'lua Lua,
    stack: Vec<LuaValue>,
}

impl<'lua> Context<'lua> {
    /// Create a context with an empty stack.
    pub fn new(lua: &'lua Lua) -> Self {
        Self {
            lua,
            stack: Vec::new(),
        }
    }

    /// Create a context whose stack holds the given values, last on top.
    pub(crate) fn with_values(lua: &'lua Lua, values: Vec<LuaValue>) -> Self {
        Self { lua, stack: values }
    }

    /// The Lua state this context is bound to.
    pub fn lua(&self) -> &'lua Lua {
        self.lua
    }

    /// Number of values on the stack.
    pub fn top(&self) -> usize {
        self.stack.len()
    }

    /// The value at the top of the stack.
    pub fn peek(&self) -> Option<&LuaValue> {
        self.stack.last()
    }

    /// Runtime type of the top value; `None` when absent, nil, or unsupported.
    pub fn type_of_top(&self) -> Option<ValueTag> {
        self.peek().and_then(ValueTag::of)
    }

    /// Whether the top slot is empty or holds nil.
    pub fn is_absent(&self) -> bool {
        matches!(self.peek(), None | Some(LuaValue::Nil))
    }

    /// Engine type name of the top value, for diagnostics.
    pub fn describe_top(&self) -> &'static str {
        match self.peek() {
            Some(value) => value.type_name(),
            None => "nothing",
        }
    }

    /// Remove `n` values from the top of the stack.
    pub fn pop(&mut self, n: usize) {
        fatal_assert!(
            n <= self.stack.len(),
            "cannot pop {} values from a stack of {}",
            n,
            self.stack.len()
        );
        let keep = self.stack.len() - n;
        self.stack.truncate(keep);
    }

    /// Remove and return the top value.
    pub fn pop_value(&mut self) -> LuaValue {
        match self.stack.pop() {
            Some(value) => value,
            None => fatal!("self.stack.pop()", "evaluation stack is empty"),
        }
    }

    /// Push an engine value as-is.
    pub fn push_value(&mut self, value: LuaValue) {
        self.stack.push(value);
    }

    /// Push nil.
    pub fn push_nil(&mut self) {
        self.stack.push(LuaValue::Nil);
    }

    /// Push a float number.
    pub fn push_number(&mut self, number: Number) {
        self.stack.push(LuaValue::Number(number));
    }

    /// Push an integer, as used for sequence keys.
    pub fn push_integer(&mut self, integer: i64) {
        self.stack.push(LuaValue::Integer(integer));
    }

    /// Push a boolean.
    pub fn push_boolean(&mut self, boolean: bool) {
        self.stack.push(LuaValue::Boolean(boolean));
    }

    /// Push a copy of `text` as a script string.
    pub fn push_string(&mut self, text: &str) -> Result<()> {
        let string = self.lua.create_string(text)?;
        self.stack.push(LuaValue::String(string));
        Ok(())
    }

    /// Push an opaque pointer as light userdata.
    pub fn push_opaque(&mut self, opaque: Opaque) {
        self.stack.push(LuaValue::LightUserData(LightUserData(opaque.as_ptr())));
    }

    /// Push a host function as a callable script value.
    ///
    /// Each host function is wrapped once per Lua state; later pushes reuse
    /// the same script function.
    pub fn push_function(&mut self, func: HostFunction) -> Result<()> {
        let key = format!("{HOST_FUNCTION_KEY}.{:x}", func as usize);
        let function = match self.lua.named_registry_value::<LuaValue>(&key)? {
            LuaValue::Function(function) => function,
            _ => {
                let function = self.wrap_host_function(func)?;
                self.lua.set_named_registry_value(&key, function.clone())?;
                function
            }
        };
        self.stack.push(LuaValue::Function(function));
        Ok(())
    }

    fn wrap_host_function(&self, func: HostFunction) -> Result<LuaFunction> {
        let function = self.lua.create_function(move |lua, args: MultiValue| {
            let mut frame = Context::with_values(lua, args.into_iter().collect());
            let count = func(&mut frame).map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            Ok(frame.take_returns(count))
        })?;

        let pointer = LuaValue::Function(function.clone()).to_pointer() as usize;
        if self.lua.app_data_ref::<HostFunctions>().is_none() {
            self.lua.set_app_data(HostFunctions::default());
        }
        if let Some(mut registry) = self.lua.app_data_mut::<HostFunctions>() {
            registry.by_pointer.insert(pointer, func);
        }
        debug!("Wrapped host function {:p} as script function", func as *const ());
        Ok(function)
    }

    /// Split off the top `count` values as the return values of a host call.
    fn take_returns(&mut self, count: usize) -> MultiValue {
        fatal_assert!(
            count <= self.stack.len(),
            "host function returned {} values but only {} are on the stack",
            count,
            self.stack.len()
        );
        let start = self.stack.len() - count;
        self.stack.split_off(start).into_iter().collect()
    }

    /// Read the top value as a number, coercing numeric strings.
    pub fn to_number(&self) -> Option<Number> {
        match self.peek()? {
            LuaValue::Integer(i) => Some(*i as Number),
            LuaValue::Number(n) => Some(*n),
            value @ LuaValue::String(_) => self.lua.coerce_number(value.clone()).ok().flatten(),
            _ => None,
        }
    }

    /// Read the top value as a string, converting numbers.
    ///
    /// Script strings that are not valid UTF-8 read as `None`.
    pub fn to_string(&self) -> Option<String> {
        let string = match self.peek()? {
            LuaValue::String(s) => s.clone(),
            value @ (LuaValue::Integer(_) | LuaValue::Number(_)) => {
                self.lua.coerce_string(value.clone()).ok().flatten()?
            }
            _ => return None,
        };
        let text = string.to_str().ok()?;
        Some(text.to_string())
    }

    /// Truthiness of the top value; absent counts as false.
    pub fn to_boolean(&self) -> bool {
        !matches!(self.peek(), None | Some(LuaValue::Nil) | Some(LuaValue::Boolean(false)))
    }

    pub fn to_opaque(&self) -> Option<Opaque> {
        match self.peek()? {
            LuaValue::LightUserData(ud) => Some(Opaque(ud.0)),
            _ => None,
        }
    }

    /// The host function behind the top value, if it wraps one.
    pub fn to_host_function(&self) -> Option<HostFunction> {
        let value @ LuaValue::Function(_) = self.peek()? else {
            return None;
        };
        let pointer = value.to_pointer() as usize;
        let registry = self.lua.app_data_ref::<HostFunctions>()?;
        registry.by_pointer.get(&pointer).copied()
    }

    /// Push a new empty table.
    pub fn new_table(&mut self) -> Result<()> {
        let table = self.lua.create_table()?;
        self.stack.push(LuaValue::Table(table));
        Ok(())
    }

    /// With `[.., table, key, value]` on the stack, store `table[key] = value`
    /// and pop the key and value.
    pub fn set_table(&mut self) -> Result<()> {
        fatal_assert!(
            self.stack.len() >= 3,
            "set_table needs a table, a key and a value on the stack"
        );
        let value = self.pop_value();
        let key = self.pop_value();
        let Some(LuaValue::Table(table)) = self.peek() else {
            fatal!("self.peek() is a table", "set_table target is {}", self.describe_top());
        };
        table.set(key, value)?;
        Ok(())
    }

    /// Snapshot of the key/value pairs of the table at the top of the stack.
    pub fn table_entries(&self) -> Result<Vec<(LuaValue, LuaValue)>> {
        let Some(LuaValue::Table(table)) = self.peek() else {
            fatal!("self.peek() is a table", "expected a table, found {}", self.describe_top());
        };
        let table = table.clone();
        let entries = table
            .pairs::<LuaValue, LuaValue>()
            .collect::<mlua::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Push the value of a global variable (nil when unset).
    pub fn push_global(&mut self, name: &str) -> Result<()> {
        let value: LuaValue = self.lua.globals().get(name)?;
        self.stack.push(value);
        Ok(())
    }

    /// Pop the top value into a global variable.
    pub fn pop_into_global(&mut self, name: &str) -> Result<()> {
        let value = self.pop_value();
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Protected call.
    ///
    /// Expects the callee followed by `nargs` arguments at the top of the
    /// stack and consumes them. On success exactly `nresults` values are left,
    /// padded with nil or truncated. On failure nothing is left and the
    /// script's error text is returned.
    pub fn pcall(&mut self, nargs: usize, nresults: usize) -> std::result::Result<(), String> {
        fatal_assert!(
            self.stack.len() > nargs,
            "pcall with {} arguments on a stack of {}",
            nargs,
            self.stack.len()
        );
        let args: MultiValue = self.stack.split_off(self.stack.len() - nargs).into_iter().collect();
        let callee = self.pop_value();

        let outcome = match callee {
            LuaValue::Function(function) => function
                .call::<MultiValue>(args)
                .map_err(|e| script_message(&e)),
            other => Err(format!("attempt to call a {} value", other.type_name())),
        };

        match outcome {
            Ok(values) => {
                let mut values: Vec<LuaValue> = values.into_iter().collect();
                values.resize(nresults, LuaValue::Nil);
                self.stack.extend(values);
                Ok(())
            }
            Err(message) => {
                debug!("Protected call failed: {}", message);
                Err(message)
            }
        }
    }

    /// Run `f`, restoring the stack to its current depth if it fails.
    pub(crate) fn balanced<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let base = self.top();
        let result = f(self);
        if result.is_err() && self.top() > base {
            let extra = self.top() - base;
            self.pop(extra);
        }
        result
    }
}
