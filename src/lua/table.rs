//! Host-side mirror of a script table.
//!
//! A [`Table`] maps string keys to tagged [`Value`]s. Keys keep insertion
//! order so dumps and pushes are deterministic. Cloning a table is O(1): the
//! mapping is reference counted and copied on the first write through a shared
//! handle, so clones behave as independent values.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use mlua::Value as LuaValue;
use tracing::{debug, warn};

use super::context::Context;
use super::type_map::Marshal;
use super::types::{Boolean, HostFunction, Number, Opaque, String, ValueTag};
use crate::fatal::{fatal, fatal_assert};
use crate::Result;

/// A stored table entry. The variant is the value's tag.
#[derive(Clone)]
pub enum Value {
    Number(Number),
    String(String),
    Boolean(Boolean),
    Function(HostFunction),
    Table(Table),
    Opaque(Opaque),
}

impl Value {
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Number(_) => ValueTag::Number,
            Value::String(_) => ValueTag::String,
            Value::Boolean(_) => ValueTag::Boolean,
            Value::Function(_) => ValueTag::Function,
            Value::Table(_) => ValueTag::Table,
            Value::Opaque(_) => ValueTag::Opaque,
        }
    }

    pub(crate) fn push(&self, ctx: &mut Context<'_>) -> Result<()> {
        match self {
            Value::Number(n) => <Number as Marshal>::push(ctx, n),
            Value::String(s) => <String as Marshal>::push(ctx, s),
            Value::Boolean(b) => <Boolean as Marshal>::push(ctx, b),
            Value::Function(f) => <HostFunction as Marshal>::push(ctx, f),
            Value::Table(t) => t.to_stack(ctx),
            Value::Opaque(p) => <Opaque as Marshal>::push(ctx, p),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => *a as usize == *b as usize,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Function(func) => write!(f, "Function({:p})", *func as *const ()),
            Value::Table(t) => f.debug_tuple("Table").field(t).finish(),
            Value::Opaque(p) => write!(f, "Opaque({:p})", p.as_ptr()),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Boolean> for Value {
    fn from(b: Boolean) -> Self {
        Value::Boolean(b)
    }
}

impl From<HostFunction> for Value {
    fn from(f: HostFunction) -> Self {
        Value::Function(f)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Opaque> for Value {
    fn from(p: Opaque) -> Self {
        Value::Opaque(p)
    }
}

/// The raw mapping behind a table.
pub type Map = IndexMap<String, Value>;

/// Host-side associative table.
#[derive(Clone, Default, PartialEq)]
pub struct Table {
    entries: Rc<Map>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            entries: Rc::new(map),
        }
    }

    /// Construct a table by draining the script table at the top of the stack.
    ///
    /// The table is popped.
    pub fn from_context(ctx: &mut Context<'_>) -> Result<Self> {
        let mut table = Self::new();
        table.from_stack(ctx)?;
        Ok(table)
    }

    /// The stored value for `key`. Absence is fatal; check [`has_value`] first.
    ///
    /// [`has_value`]: Table::has_value
    pub fn get_raw(&self, key: &str) -> &Value {
        match self.entries.get(key) {
            Some(value) => value,
            None => fatal!("self.entries.get(key)", "table has no key \"{}\"", key),
        }
    }

    /// Borrow the value for `key` as `T`.
    ///
    /// A missing key or a value of another type is fatal.
    pub fn get<T: Marshal>(&self, key: &str) -> &T {
        let value = self.get_raw(key);
        match T::from_value(value) {
            Some(v) => v,
            None => fatal!(
                "T::from_value(value)",
                "key \"{}\" holds a {}, not a {}",
                key,
                value.tag(),
                T::TAG
            ),
        }
    }

    /// Mutably borrow the value for `key` as `T`.
    pub fn get_mut<T: Marshal>(&mut self, key: &str) -> &mut T {
        let entries = Rc::make_mut(&mut self.entries);
        let Some(value) = entries.get_mut(key) else {
            fatal!("entries.get_mut(key)", "table has no key \"{}\"", key);
        };
        let tag = value.tag();
        match T::from_value_mut(value) {
            Some(v) => v,
            None => fatal!(
                "T::from_value_mut(value)",
                "key \"{}\" holds a {}, not a {}",
                key,
                tag,
                T::TAG
            ),
        }
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Store `value` under `key`, replacing any existing value.
    pub fn set<T: Marshal>(&mut self, key: impl Into<String>, value: T) {
        self.set_value(key, value.into_value());
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        Rc::make_mut(&mut self.entries).insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.has_value(key) {
            return None;
        }
        Rc::make_mut(&mut self.entries).shift_remove(key)
    }

    /// Visit the sequence `"1"`, `"2"`, ... until the first missing index.
    ///
    /// Keys outside the sequence are ignored. A sequence value of another type
    /// than `T` is fatal.
    pub fn each<T: Marshal>(&self, mut f: impl FnMut(u32, &T)) {
        let mut index = 1u32;
        loop {
            let key = index.to_string();
            if !self.has_value(&key) {
                break;
            }
            f(index, self.get::<T>(&key));
            index += 1;
        }
    }

    pub fn each_mut<T: Marshal>(&mut self, mut f: impl FnMut(u32, &mut T)) {
        let mut index = 1u32;
        loop {
            let key = index.to_string();
            if !self.has_value(&key) {
                break;
            }
            f(index, self.get_mut::<T>(&key));
            index += 1;
        }
    }

    /// Call `found` with the value for `key` if present. Returns whether it was.
    pub fn try_get<T: Marshal>(&self, key: &str, found: impl FnOnce(&T)) -> bool {
        if self.has_value(key) {
            found(self.get::<T>(key));
            true
        } else {
            false
        }
    }

    /// Like [`try_get`](Table::try_get), calling `not_found` when the key is absent.
    pub fn try_get_or_else<T: Marshal>(
        &self,
        key: &str,
        found: impl FnOnce(&T),
        not_found: impl FnOnce(),
    ) {
        if !self.try_get(key, found) {
            not_found();
        }
    }

    pub fn try_get_mut<T: Marshal>(&mut self, key: &str, found: impl FnOnce(&mut T)) -> bool {
        if self.has_value(key) {
            found(self.get_mut::<T>(key));
            true
        } else {
            false
        }
    }

    /// Merge the entries of `source` into this table, replacing on collision.
    pub fn superimpose(&mut self, source: &Table) {
        self.superimpose_map(&source.entries);
    }

    pub fn superimpose_map(&mut self, map: &Map) {
        if map.is_empty() {
            return;
        }
        let entries = Rc::make_mut(&mut self.entries);
        for (key, value) in map {
            entries.insert(key.clone(), value.clone());
        }
    }

    /// Replace this table's contents with those of `source`.
    pub fn from_table(&mut self, source: &Table) {
        self.entries = Rc::clone(&source.entries);
    }

    /// The raw mapping, in insertion order.
    pub fn entries(&self) -> &Map {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push the whole table, recursively, as one new script table.
    ///
    /// Keys spelling a positive integer are pushed as integer keys so that
    /// sequences stay sequences on the script side.
    pub fn to_stack(&self, ctx: &mut Context<'_>) -> Result<()> {
        ctx.balanced(|ctx| {
            ctx.new_table()?;
            for (key, value) in self.entries.iter() {
                match sequence_index(key) {
                    Some(index) => ctx.push_integer(index),
                    None => ctx.push_string(key)?,
                }
                value.push(ctx)?;
                ctx.set_table()?;
            }
            Ok(())
        })
    }

    /// Drain the script table at the top of the stack into this table.
    ///
    /// Every entry is copied into host storage with its tag; nested tables
    /// recurse. The script table is popped, so the stack ends exactly one
    /// value shallower whatever the nesting depth, also on error.
    pub fn from_stack(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        fatal_assert!(
            ctx.type_of_top() == Some(ValueTag::Table),
            "expected a table at the top of the stack, found {}",
            ctx.describe_top()
        );
        let base = ctx.top() - 1;
        let result = self.drain(ctx);
        let extra = ctx.top() - base;
        ctx.pop(extra);
        result
    }

    fn drain(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let pairs = ctx.table_entries()?;
        let entries = Rc::make_mut(&mut self.entries);

        for (key, value) in pairs {
            let Some(key) = key_string(&key) else {
                warn!("Skipping table entry with unsupported {} key", key.type_name());
                continue;
            };

            ctx.push_value(value);
            let depth = ctx.top();
            let stored = match ctx.type_of_top() {
                Some(ValueTag::Number) => Some(Value::Number(Number::construct(ctx)?)),
                Some(ValueTag::String) => ctx.to_string().map(Value::String),
                Some(ValueTag::Boolean) => Some(Value::Boolean(Boolean::construct(ctx)?)),
                Some(ValueTag::Opaque) => Some(Value::Opaque(Opaque::construct(ctx)?)),
                Some(ValueTag::Table) => Some(Value::Table(Table::construct(ctx)?)),
                Some(ValueTag::Function) => ctx.to_host_function().map(Value::Function),
                None => None,
            };
            if ctx.top() == depth {
                ctx.pop(1);
            }

            match stored {
                Some(value) => {
                    if let Some(previous) = entries.insert(key.clone(), value) {
                        warn!(
                            "Script keys collide on \"{}\", dropping earlier {} value",
                            key,
                            previous.tag()
                        );
                    }
                }
                None => warn!("Skipping value of key \"{}\" the host cannot store", key),
            }
        }

        debug!("Drained script table into {} entries", entries.len());
        Ok(())
    }

    /// Human-readable dump, nested tables indented by two more spaces.
    pub fn to_string_indented(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        let mut lines = Vec::with_capacity(self.len());
        for (key, value) in self.entries.iter() {
            let line = match value {
                Value::String(s) => format!("{pad}{key} = \"{s}\""),
                Value::Number(n) => format!("{pad}{key} = {n}"),
                Value::Boolean(b) => format!("{pad}{key} = {b}"),
                Value::Table(t) if t.is_empty() => format!("{pad}{key} = {{}}"),
                Value::Table(t) => format!(
                    "{pad}{key} = {{\n{}\n{pad}}}",
                    t.to_string_indented(indent + 2)
                ),
                Value::Function(func) => format!("{pad}{key} = <function {:p}>", *func as *const ()),
                Value::Opaque(p) => format!("{pad}{key} = <opaque {:p}>", p.as_ptr()),
            };
            lines.push(line);
        }
        lines.join(",\n")
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_indented(0))
    }
}

impl From<Map> for Table {
    fn from(map: Map) -> Self {
        Self::from_map(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// The integer a key denotes if it is the canonical spelling of one (`"1"`,
/// `"42"`, never `"01"` or `"-1"`).
fn sequence_index(key: &str) -> Option<i64> {
    let canonical = !key.is_empty()
        && !key.starts_with('0')
        && key.bytes().all(|b| b.is_ascii_digit());
    if canonical {
        key.parse().ok()
    } else {
        None
    }
}

/// Host key for a script key. Integral numbers in `i64` range use their
/// integer spelling; keys that are not valid UTF-8 have none.
fn key_string(key: &LuaValue) -> Option<String> {
    // 2^63, the first float past i64::MAX.
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    match key {
        LuaValue::String(s) => s.to_str().ok().map(|s| s.to_string()),
        LuaValue::Integer(i) => Some(i.to_string()),
        LuaValue::Number(n) if n.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(n) => {
            Some((*n as i64).to_string())
        }
        LuaValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
