//! Named groups of host functions.

use indexmap::IndexMap;
use tracing::debug;

use super::context::Context;
use super::runtime::Runtime;
use super::table::Table;
use super::types::HostFunction;
use crate::Result;

/// A set of host functions published to script under one namespace.
///
/// ```ignore
/// let math = Library::new("HostMath")
///     .function("AddTwo", add_two)
///     .function("Double", double);
/// runtime.register_library(&math)?;
/// ```
#[derive(Clone)]
pub struct Library {
    name: String,
    functions: IndexMap<String, HostFunction>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    /// Add a function under `key`, replacing any previous one.
    pub fn function(mut self, key: impl Into<String>, func: HostFunction) -> Self {
        self.functions.insert(key.into(), func);
        self
    }

    /// Namespace the functions are installed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, HostFunction)> {
        self.functions.iter().map(|(k, f)| (k.as_str(), *f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Install every function as `name.key` in the runtime's globals.
    pub fn register(&self, runtime: &mut Runtime) -> Result<()> {
        for (key, func) in self.functions() {
            runtime.register_function(&self.name, key, func)?;
        }
        debug!("Registered library {} ({} functions)", self.name, self.len());
        Ok(())
    }

    /// Install every function on the state behind `ctx`.
    pub fn install(&self, ctx: &mut Context<'_>) -> Result<()> {
        for (key, func) in self.functions() {
            ctx.register_function(&self.name, key, func)?;
        }
        Ok(())
    }

    /// The functions as a table, for passing the library to script as an object.
    pub fn as_table(&self) -> Table {
        let mut table = Table::new();
        for (key, func) in self.functions() {
            table.set(key, func);
        }
        table
    }
}
