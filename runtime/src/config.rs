//! Harness configuration shared by every engine.

use crate::{Error, Result, MAX_PAGES};

/// Default module path, relative to the source root.
pub const DEFAULT_MODULE: &str = "wasmlib.wasm";
/// Default name of the exported memory.
pub const DEFAULT_MEMORY_EXPORT: &str = "memory";
/// Initial page count for host-allocated memory.
pub const DEFAULT_HOST_PAGES: u32 = 10;
/// Default entry function, run when exported.
pub const DEFAULT_ENTRY: &str = "main";
/// Default name of the print export.
pub const DEFAULT_PRINT_EXPORT: &str = "print";

/// Where the inspected linear memory comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryMode {
    /// The module defines and exports its own memory.
    Exported { export: String },
    /// The host allocates the memory and passes it in as `js.mem`.
    Host {
        initial_pages: u32,
        maximum_pages: Option<u32>,
    },
}

impl Default for MemoryMode {
    fn default() -> Self {
        MemoryMode::Exported {
            export: DEFAULT_MEMORY_EXPORT.to_string(),
        }
    }
}

impl MemoryMode {
    /// Host-allocated memory with the demo's initial size and no maximum.
    pub fn host() -> Self {
        MemoryMode::Host {
            initial_pages: DEFAULT_HOST_PAGES,
            maximum_pages: None,
        }
    }
}

/// Everything an engine needs to load one module session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub memory: MemoryMode,
    /// Entry function run right after instantiation.
    pub entry: Option<String>,
    /// When set, a missing entry export fails the load instead of being skipped.
    pub entry_required: bool,
    /// Export invoked by the print command, `(offset, len)`.
    pub print_export: String,
    /// Host ceiling on memory size in bytes, applied on top of any declared maximum.
    pub memory_limit: Option<usize>,
    /// First offset handed out by `env.malloc`.
    pub heap_base: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            memory: MemoryMode::default(),
            entry: Some(DEFAULT_ENTRY.to_string()),
            entry_required: false,
            print_export: DEFAULT_PRINT_EXPORT.to_string(),
            memory_limit: None,
            heap_base: 0,
        }
    }
}

impl HarnessConfig {
    pub fn with_memory(mut self, memory: MemoryMode) -> Self {
        self.memory = memory;
        self
    }

    /// Sets an entry function that must be exported.
    pub fn with_required_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self.entry_required = true;
        self
    }

    pub fn without_entry(mut self) -> Self {
        self.entry = None;
        self.entry_required = false;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_heap_base(mut self, base: u32) -> Self {
        self.heap_base = base;
        self
    }

    /// Rejects combinations no engine could honour.
    pub fn validate(&self) -> Result<()> {
        if let MemoryMode::Host {
            initial_pages,
            maximum_pages,
        } = &self.memory
        {
            let max = maximum_pages.unwrap_or(MAX_PAGES);
            if max > MAX_PAGES || *initial_pages > max {
                return Err(Error::Config(format!(
                    "host memory of {initial_pages} pages does not fit maximum {max}"
                )));
            }
        }
        if let MemoryMode::Exported { export } = &self.memory {
            if export.is_empty() {
                return Err(Error::Config("memory export name is empty".into()));
            }
        }
        if self.print_export.is_empty() {
            return Err(Error::Config("print export name is empty".into()));
        }
        Ok(())
    }
}
