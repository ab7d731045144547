// Host harness for loading a WebAssembly module and inspecting its linear memory.

use std::borrow::Cow;
use std::path::PathBuf;

use tracing::debug;

pub mod config;
pub mod engines;
pub mod heap;
pub mod host;
pub mod inspect;
pub mod memory;
pub mod ops;
pub mod storage;

pub use config::{HarnessConfig, MemoryMode};
pub use heap::BumpAllocator;
pub use inspect::{grow_and_inspect, inspect, InspectionReport};
pub use memory::{HostMemory, LinearMemory, MAX_PAGES, PAGE_SIZE};
pub use storage::{FileSource, MemoryStore};

/// Result alias used by the runtime.
pub type Result<T> = core::result::Result<T, Error>;

/// Common error cases for the runtime and engines.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested module is not present in the source.
    #[error("module `{0}` not found")]
    ModuleNotFound(String),
    #[error("failed to read module {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The module does not export the requested function or memory.
    #[error("export `{0}` not found")]
    ExportNotFound(String),
    #[error("memory holds {len} bytes, at least 4 are needed for inspection")]
    MemoryTooSmall { len: usize },
    #[error("memory access out of bounds: offset {offset}, length {len}, memory size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },
    /// The memory could not be grown. Nothing was changed.
    #[error("memory could not grow: current size {current} pages, requested increase {delta} pages")]
    GrowRefused { current: u32, delta: u32 },
    #[error("heap exhausted: {requested} bytes requested at offset {offset}, memory size {limit}")]
    HeapExhausted {
        requested: u32,
        offset: u32,
        limit: usize,
    },
    /// A host capability trapped (division by zero and friends).
    #[error("trap: {0}")]
    Trap(&'static str),
    /// The underlying engine failed to compile, link or run the module.
    #[error("engine error: {0}")]
    Engine(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Source of WASM bytecode.
pub trait ModuleSource {
    /// Fetches the raw bytes of the module stored under `name`.
    fn fetch(&self, name: &str) -> Result<Cow<'_, [u8]>>;
}

/// Execution engine abstraction so the harness is not tied to one runtime.
pub trait Engine {
    /// One instantiated module together with its memory.
    type Session: Session;

    /// Compiles and instantiates `module` according to `config`.
    ///
    /// The entry function is not run here; see [`Runtime::load`].
    fn instantiate(&mut self, module: &[u8], config: &HarnessConfig) -> Result<Self::Session>;
}

/// A loaded module. Its linear memory is reachable through [`LinearMemory`].
pub trait Session: LinearMemory {
    /// Whether the module exports a function called `name`.
    fn has_function(&mut self, name: &str) -> bool;

    /// Calls an exported function, discarding any results.
    fn call(&mut self, name: &str) -> Result<()>;

    /// Calls the configured print export with `(offset, len)`.
    fn print(&mut self, offset: u32, len: u32) -> Result<()>;

    /// Everything the guest has logged so far.
    fn console(&self) -> &[String];

    /// Takes the guest's log lines, leaving the console empty.
    fn drain_console(&mut self) -> Vec<String>;
}

/// Minimal runtime that orchestrates the load step: fetch, instantiate, run entry.
pub struct Runtime<E, S> {
    engine: E,
    source: S,
}

impl<E, S> Runtime<E, S>
where
    E: Engine,
    S: ModuleSource,
{
    /// Creates a runtime from an engine and a module source.
    pub const fn new(engine: E, source: S) -> Self {
        Self { engine, source }
    }

    /// Fetches `name`, instantiates it and runs the configured entry function.
    pub fn load(&mut self, name: &str, config: &HarnessConfig) -> Result<E::Session> {
        config.validate()?;
        let bytes = self.source.fetch(name)?;
        debug!(module = name, bytes = bytes.len(), "fetched module");

        let mut session = self.engine.instantiate(&bytes, config)?;
        if let Some(entry) = config.entry.as_deref() {
            if session.has_function(entry) {
                debug!(entry, "running entry function");
                session.call(entry)?;
            } else if config.entry_required {
                return Err(Error::ExportNotFound(entry.to_string()));
            } else {
                debug!(entry, "entry function not exported, skipping");
            }
        }
        Ok(session)
    }

    /// Mutable access to the engine.
    pub fn engine(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Console;

    /// Engine whose "modules" are a list of exported function names.
    #[derive(Default)]
    struct MockEngine {
        instantiated: usize,
    }

    struct MockSession {
        memory: HostMemory,
        exports: Vec<String>,
        calls: Vec<String>,
        console: Console,
    }

    impl LinearMemory for MockSession {
        fn byte_len(&self) -> usize {
            self.memory.byte_len()
        }

        fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
            self.memory.read(offset, buf)
        }

        fn grow(&mut self, delta: u32) -> Result<u32> {
            self.memory.grow(delta)
        }
    }

    impl Session for MockSession {
        fn has_function(&mut self, name: &str) -> bool {
            self.exports.iter().any(|e| e == name)
        }

        fn call(&mut self, name: &str) -> Result<()> {
            self.calls.push(name.to_string());
            Ok(())
        }

        fn print(&mut self, offset: u32, len: u32) -> Result<()> {
            let line = host::read_utf8(&self.memory, offset, len)?;
            self.console.log(line);
            Ok(())
        }

        fn console(&self) -> &[String] {
            self.console.lines()
        }

        fn drain_console(&mut self) -> Vec<String> {
            self.console.drain()
        }
    }

    impl Engine for MockEngine {
        type Session = MockSession;

        fn instantiate(&mut self, module: &[u8], _config: &HarnessConfig) -> Result<MockSession> {
            // A zero-length module is treated as invalid.
            if module.is_empty() {
                return Err(Error::Engine("empty module".into()));
            }
            self.instantiated += 1;
            let exports = String::from_utf8_lossy(module)
                .split(',')
                .map(str::to_string)
                .collect();
            Ok(MockSession {
                memory: HostMemory::new(1, Some(2))?,
                exports,
                calls: Vec::new(),
                console: Console::default(),
            })
        }
    }

    fn store_with(name: &str, exports: &str) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.upsert(name, exports.as_bytes());
        store
    }

    #[test]
    fn load_runs_exported_entry() {
        let mut runtime = Runtime::new(MockEngine::default(), store_with("m.wasm", "main,print"));
        let session = runtime.load("m.wasm", &HarnessConfig::default()).unwrap();

        assert_eq!(session.calls, vec!["main"]);
        assert_eq!(runtime.engine().instantiated, 1);
    }

    #[test]
    fn optional_entry_is_skipped_when_absent() {
        let mut runtime = Runtime::new(MockEngine::default(), store_with("m.wasm", "print"));
        let session = runtime.load("m.wasm", &HarnessConfig::default()).unwrap();
        assert!(session.calls.is_empty());
    }

    #[test]
    fn required_entry_must_be_exported() {
        let mut runtime = Runtime::new(MockEngine::default(), store_with("m.wasm", "print"));
        let config = HarnessConfig::default().with_required_entry("exported_func");

        let err = runtime.load("m.wasm", &config).err().unwrap();
        assert!(matches!(err, Error::ExportNotFound(name) if name == "exported_func"));
    }

    #[test]
    fn missing_module_returns_error() {
        let mut runtime = Runtime::new(MockEngine::default(), MemoryStore::new());
        let err = runtime.load("wasmlib.wasm", &HarnessConfig::default()).err().unwrap();
        assert!(matches!(err, Error::ModuleNotFound(_)));
    }

    #[test]
    fn session_grow_and_inspect_round() {
        let mut runtime = Runtime::new(MockEngine::default(), store_with("m.wasm", "main"));
        let mut session = runtime.load("m.wasm", &HarnessConfig::default()).unwrap();

        assert_eq!(inspect(&session).unwrap().pages, 1);
        assert_eq!(grow_and_inspect(&mut session).unwrap().pages, 2);
        assert!(grow_and_inspect(&mut session).is_err());
        assert_eq!(inspect(&session).unwrap().pages, 2);
    }

    #[test]
    fn print_goes_through_the_console() {
        let mut runtime = Runtime::new(MockEngine::default(), store_with("m.wasm", "print"));
        let mut session = runtime.load("m.wasm", &HarnessConfig::default()).unwrap();

        session.print(0, 2).unwrap();
        assert_eq!(session.console(), ["\0\0"]);
        assert_eq!(session.drain_console().len(), 1);
        assert!(session.console().is_empty());
        assert!(matches!(
            session.print(65_535, 2),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
