//! Script runtime: owns a Lua state loaded from one script file.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use mlua::Lua;
use tracing::{info, warn};

use super::context::Context;
use super::library::Library;
use super::table::Value;
use super::type_map::{Marshal, MarshalMulti};
use super::types::HostFunction;
use crate::config::RuntimeConfig;
use crate::error::script_message;
use crate::fatal::fatal_assert;
use crate::{Error, Result};

/// Host-side change to the state, replayed in order on reload.
#[derive(Clone)]
enum Replay {
    Function {
        namespace: String,
        name: String,
        func: HostFunction,
    },
    Global { name: String, value: Value },
}

impl Replay {
    fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        match self {
            Replay::Function {
                namespace,
                name,
                func,
            } => ctx.register_function(namespace, name, *func),
            Replay::Global { name, value } => {
                value.push(ctx)?;
                ctx.pop_into_global(name)
            }
        }
    }
}

/// A loaded script and the Lua state it runs in.
pub struct Runtime {
    lua: Lua,
    path: PathBuf,
    chunk_name: String,
    hot_reload: bool,
    source_hash: String,
    /// Functions and globals installed through this runtime, oldest first.
    replay: Vec<Replay>,
}

impl Runtime {
    /// Load and execute a script file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let chunk_name = Self::default_chunk_name(&path);
        Self::open(path, chunk_name, false)
    }

    /// Load the script named by the configuration.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let path = PathBuf::from(&config.script);
        let chunk_name = if config.chunk_name.is_empty() {
            Self::default_chunk_name(&path)
        } else {
            config.chunk_name.clone()
        };
        Self::open(path, chunk_name, config.hot_reload)
    }

    /// Load a script and register the given libraries.
    pub fn with_libraries<P: AsRef<Path>>(path: P, libraries: &[Library]) -> Result<Self> {
        let mut runtime = Self::load(path)?;
        for library in libraries {
            runtime.register_library(library)?;
        }
        Ok(runtime)
    }

    fn open(path: PathBuf, chunk_name: String, hot_reload: bool) -> Result<Self> {
        let source = fs::read_to_string(&path)?;
        let lua = Self::execute(&source, &chunk_name)?;
        info!("Loaded script {}", path.display());

        Ok(Self {
            lua,
            path,
            chunk_name,
            hot_reload,
            source_hash: Self::calculate_hash(&source),
            replay: Vec::new(),
        })
    }

    fn default_chunk_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }

    /// Create a fresh state and run `source` in it.
    fn execute(source: &str, chunk_name: &str) -> Result<Lua> {
        let lua = Lua::new();
        lua.load(source)
            .set_name(format!("@{chunk_name}"))
            .exec()
            .map_err(|e| Error::Load(script_message(&e)))?;
        Ok(lua)
    }

    fn calculate_hash(content: &str) -> String {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Name the script's chunk is known by in error messages.
    pub fn filename(&self) -> &str {
        &self.chunk_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// A fresh context on this runtime's state.
    pub fn context(&self) -> Context<'_> {
        Context::new(&self.lua)
    }

    pub fn hot_reload(&self) -> bool {
        self.hot_reload
    }

    pub fn set_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
    }

    /// Run `f` on a fresh context and check it left the stack empty.
    fn with_context<T>(&self, f: impl FnOnce(&mut Context<'_>) -> Result<T>) -> Result<T> {
        let mut ctx = self.context();
        let result = f(&mut ctx);
        fatal_assert!(
            ctx.top() == 0,
            "operation on {} left {} values on the stack",
            self.chunk_name,
            ctx.top()
        );
        result
    }

    pub fn get_global<T: Marshal>(&self, name: &str) -> Result<T> {
        self.with_context(|ctx| ctx.get_global(name))
    }

    /// Assign a global. The value is kept so it survives a reload.
    pub fn set_global<T: Marshal>(&mut self, name: &str, value: T) -> Result<()> {
        self.with_context(|ctx| ctx.set_global(name, &value))?;
        self.replay
            .retain(|r| !matches!(r, Replay::Global { name: n, .. } if n == name));
        self.replay.push(Replay::Global {
            name: name.to_string(),
            value: value.into_value(),
        });
        Ok(())
    }

    pub fn run_function<A, R>(&self, name: &str, args: A) -> Result<R>
    where
        A: MarshalMulti,
        R: MarshalMulti,
    {
        self.with_context(|ctx| ctx.run_function(name, args))
    }

    /// Install a host function as `namespace.name`. Kept across reloads.
    pub fn register_function(
        &mut self,
        namespace: &str,
        name: &str,
        func: HostFunction,
    ) -> Result<()> {
        self.with_context(|ctx| ctx.register_function(namespace, name, func))?;
        self.replay.retain(|r| {
            !matches!(r, Replay::Function { namespace: ns, name: n, .. }
                if ns == namespace && n == name)
        });
        self.replay.push(Replay::Function {
            namespace: namespace.to_string(),
            name: name.to_string(),
            func,
        });
        Ok(())
    }

    pub fn register_library(&mut self, library: &Library) -> Result<()> {
        library.register(self)
    }

    /// Whether the script file changed since it was last loaded.
    pub fn is_stale(&self) -> Result<bool> {
        let source = fs::read_to_string(&self.path)?;
        Ok(Self::calculate_hash(&source) != self.source_hash)
    }

    /// Rebuild the state from the script file.
    ///
    /// Host functions and globals installed through this runtime are applied
    /// again on the new state, in the order they were first made. On failure
    /// the previous state stays in place.
    pub fn reload(&mut self) -> Result<()> {
        let source = fs::read_to_string(&self.path)?;
        let lua = Self::execute(&source, &self.chunk_name)?;

        {
            let mut ctx = Context::new(&lua);
            for step in &self.replay {
                step.apply(&mut ctx)?;
            }
            fatal_assert!(ctx.top() == 0, "reload left {} values on the stack", ctx.top());
        }

        self.lua = lua;
        self.source_hash = Self::calculate_hash(&source);
        let functions = self
            .replay
            .iter()
            .filter(|r| matches!(r, Replay::Function { .. }))
            .count();
        info!(
            "Reloaded script {} ({} functions, {} globals restored)",
            self.path.display(),
            functions,
            self.replay.len() - functions
        );
        Ok(())
    }

    /// Reload if hot reload is enabled and the file changed.
    ///
    /// Returns whether a reload happened. A script that fails to load is
    /// logged and the previous state is kept.
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        if !self.hot_reload || !self.is_stale()? {
            return Ok(false);
        }
        match self.reload() {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Keeping previous state of {}: {}", self.path.display(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::lua::table::Table;
    use crate::lua::types::{Number, String};

    fn script(source: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn rewrite(file: &NamedTempFile, source: &str) {
        fs::write(file.path(), source).unwrap();
    }

    fn triple(ctx: &mut Context<'_>) -> Result<usize> {
        let (x,) = ctx.args::<(Number,)>()?;
        ctx.returns((x * 3.0,))
    }

    #[test]
    fn test_load_and_call() {
        let file = script("function AddTwo(x) return x + 2 end");
        let runtime = Runtime::load(file.path()).unwrap();
        assert!(runtime.filename().ends_with(".lua"));
        assert_eq!(runtime.path(), file.path());

        let (result,): (Number,) = runtime.run_function("AddTwo", (2.0,)).unwrap();
        assert_eq!(result, 4.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Runtime::load("/nonexistent/dir/script.lua").err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_load_syntax_error() {
        let file = script("function broken(");
        let err = Runtime::load(file.path()).err().unwrap();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_load_runtime_error_names_chunk() {
        let file = script("error('fails at load')");
        let err = Runtime::load(file.path()).err().unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(err.message().contains("fails at load"));
        assert!(err.message().contains(&name));
    }

    #[test]
    fn test_globals() {
        let file = script("Name = 'script'");
        let mut runtime = Runtime::load(file.path()).unwrap();
        assert_eq!(runtime.get_global::<String>("Name").unwrap(), "script");

        runtime.set_global("Name", "host".to_string()).unwrap();
        assert_eq!(runtime.get_global::<String>("Name").unwrap(), "host");
    }

    #[test]
    fn test_is_stale() {
        let file = script("Version = 1");
        let runtime = Runtime::load(file.path()).unwrap();
        assert!(!runtime.is_stale().unwrap());

        rewrite(&file, "Version = 2");
        assert!(runtime.is_stale().unwrap());
    }

    #[test]
    fn test_reload_restores_host_state() {
        let file = script("function Run(x) return Host.Triple(x) end");
        let mut runtime = Runtime::load(file.path()).unwrap();
        runtime.register_function("Host", "Triple", triple).unwrap();
        runtime.set_global("Offset", 10.0).unwrap();

        rewrite(
            &file,
            "function Run(x) return Host.Triple(x) + Offset end",
        );
        runtime.reload().unwrap();
        assert!(!runtime.is_stale().unwrap());

        let (result,): (Number,) = runtime.run_function("Run", (2.0,)).unwrap();
        assert_eq!(result, 16.0);
    }

    #[test]
    fn test_reload_registers_into_host_set_table() {
        let file = script("function Run(x) return Global.Triple(x) + Global.Base end");
        let mut runtime = Runtime::load(file.path()).unwrap();

        let mut global = Table::new();
        global.set("Base", 1.0);
        runtime.set_global("Global", global).unwrap();
        runtime.register_function("Global", "Triple", triple).unwrap();
        let (before,): (Number,) = runtime.run_function("Run", (2.0,)).unwrap();
        assert_eq!(before, 7.0);

        runtime.reload().unwrap();
        let (after,): (Number,) = runtime.run_function("Run", (2.0,)).unwrap();
        assert_eq!(after, 7.0);
    }

    #[test]
    fn test_reload_keeps_latest_global() {
        let file = script("Offset = 0");
        let mut runtime = Runtime::load(file.path()).unwrap();
        runtime.set_global("Offset", 1.0).unwrap();
        runtime.set_global("Offset", 2.0).unwrap();

        runtime.reload().unwrap();
        assert_eq!(runtime.get_global::<Number>("Offset").unwrap(), 2.0);
    }

    #[test]
    fn test_failed_reload_keeps_state() {
        let file = script("Version = 1");
        let mut runtime = Runtime::load(file.path()).unwrap();

        rewrite(&file, "Version = ");
        assert!(matches!(runtime.reload(), Err(Error::Load(_))));
        assert_eq!(runtime.get_global::<Number>("Version").unwrap(), 1.0);
        assert!(runtime.is_stale().unwrap());
    }

    #[test]
    fn test_reload_if_changed() {
        let file = script("Version = 1");
        let mut runtime = Runtime::load(file.path()).unwrap();

        rewrite(&file, "Version = 2");
        assert!(!runtime.reload_if_changed().unwrap());
        assert_eq!(runtime.get_global::<Number>("Version").unwrap(), 1.0);

        runtime.set_hot_reload(true);
        assert!(runtime.reload_if_changed().unwrap());
        assert_eq!(runtime.get_global::<Number>("Version").unwrap(), 2.0);
        assert!(!runtime.reload_if_changed().unwrap());
    }

    #[test]
    fn test_from_config() {
        let file = script("error('oops')");
        let config = RuntimeConfig {
            script: file.path().display().to_string(),
            hot_reload: true,
            chunk_name: "configured".to_string(),
        };
        let err = Runtime::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Load(_)));

        rewrite(&file, "Ready = true");
        let runtime = Runtime::from_config(&config).unwrap();
        assert!(runtime.hot_reload());
        assert_eq!(runtime.filename(), "configured");
    }

    #[test]
    fn test_with_libraries() {
        let file = script("function Run(x) return Host.Triple(x) end");
        let library = Library::new("Host").function("Triple", triple);
        let runtime = Runtime::with_libraries(file.path(), &[library]).unwrap();

        let (result,): (Number,) = runtime.run_function("Run", (4.0,)).unwrap();
        assert_eq!(result, 12.0);
    }
}
