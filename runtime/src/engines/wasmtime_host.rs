//! wasmtime-backed engine for host builds.
//!
//! Each session owns its own `Store`, so the memory, the bump allocator and
//! the guest console belong to exactly one loaded module.

use tracing::debug;
use wasmtime::{
    Caller, Config, Engine as HostEngine, Extern, Instance, Linker, Memory, MemoryType, Module,
    OptLevel, Store, StoreLimits, StoreLimitsBuilder, Val,
};

use crate::heap::BumpAllocator;
use crate::host::{self, Console};
use crate::memory::LinearMemory;
use crate::{ops, Engine, Error, HarnessConfig, MemoryMode, Result, Session};

/// Per-store data reachable from host functions.
pub struct HostState {
    limits: StoreLimits,
    memory: Option<Memory>,
    memory_export: Option<String>,
    heap: BumpAllocator,
    console: Console,
}

impl HostState {
    fn new(config: &HarnessConfig) -> Self {
        let mut limits = StoreLimitsBuilder::new();
        if let Some(bytes) = config.memory_limit {
            limits = limits.memory_size(bytes);
        }
        let memory_export = match &config.memory {
            MemoryMode::Exported { export } => Some(export.clone()),
            MemoryMode::Host { .. } => None,
        };
        Self {
            limits: limits.build(),
            memory: None,
            memory_export,
            heap: BumpAllocator::new(config.heap_base),
            console: Console::default(),
        }
    }
}

/// wasmtime-backed engine (host-only).
pub struct WasmtimeEngine {
    engine: HostEngine,
    linker: Linker<HostState>,
}

impl WasmtimeEngine {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.cranelift_opt_level(OptLevel::Speed);
        let engine = HostEngine::new(&config).map_err(engine_error)?;
        let linker = host_linker(&engine).map_err(engine_error)?;
        Ok(Self { engine, linker })
    }
}

/// Registers the host capability set. The memory import is added per session.
fn host_linker(engine: &HostEngine) -> anyhow::Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);

    linker.func_wrap(
        host::CONSOLE_MODULE,
        host::CONSOLE_LOG,
        |mut caller: Caller<'_, HostState>, offset: i32, len: i32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let line = host::read_utf8(memory.data(&caller), offset as u32, len as u32)?;
            caller.data_mut().console.log(line);
            Ok(())
        },
    )?;

    linker.func_wrap(
        host::ENV_MODULE,
        host::ENV_MALLOC,
        |mut caller: Caller<'_, HostState>, size: i32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let limit = memory.data_size(&caller);
            let offset = caller.data_mut().heap.malloc(size as u32, limit)?;
            Ok(offset as i32)
        },
    )?;

    for &(name, op) in ops::BINARY {
        linker.func_wrap(ops::MODULE, name, move |a: i32, b: i32| -> anyhow::Result<i32> {
            Ok(op(a, b)?)
        })?;
    }
    linker.func_wrap(ops::MODULE, "not", |a: i32| -> anyhow::Result<i32> {
        Ok(ops::not(a)?)
    })?;

    Ok(linker)
}

/// Resolves the memory host functions operate on.
///
/// Falls back to the export while instantiation is still running (start
/// functions), before the session has recorded the memory.
fn guest_memory(caller: &mut Caller<'_, HostState>) -> anyhow::Result<Memory> {
    if let Some(memory) = caller.data().memory {
        return Ok(memory);
    }
    let export = caller.data().memory_export.clone();
    export
        .and_then(|name| caller.get_export(&name))
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow::anyhow!("guest memory is not available"))
}

fn engine_error(err: anyhow::Error) -> Error {
    Error::Engine(format!("{err:#}"))
}

/// Unwraps runtime errors raised by our own host functions.
fn call_error(err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(err) => err,
        Err(err) => engine_error(err),
    }
}

impl Engine for WasmtimeEngine {
    type Session = WasmtimeSession;

    fn instantiate(&mut self, module: &[u8], config: &HarnessConfig) -> Result<WasmtimeSession> {
        if module.is_empty() {
            return Err(Error::Engine("wasmtime: empty module".into()));
        }
        // Accepts both binary modules and the text format.
        let compiled = Module::new(&self.engine, module).map_err(engine_error)?;

        let mut store = Store::new(&self.engine, HostState::new(config));
        store.limiter(|state| &mut state.limits);

        let mut linker = self.linker.clone();
        let host_memory = match &config.memory {
            MemoryMode::Host {
                initial_pages,
                maximum_pages,
            } => {
                let ty = MemoryType::new(*initial_pages, *maximum_pages);
                let memory = Memory::new(&mut store, ty).map_err(engine_error)?;
                linker
                    .define(&store, host::MEMORY_MODULE, host::MEMORY_IMPORT, memory)
                    .map_err(engine_error)?;
                store.data_mut().memory = Some(memory);
                debug!(pages = initial_pages, "allocated host memory");
                Some(memory)
            }
            MemoryMode::Exported { .. } => None,
        };

        let instance = linker
            .instantiate(&mut store, &compiled)
            .map_err(call_error)?;

        let memory = match (host_memory, &config.memory) {
            (Some(memory), _) => memory,
            (None, MemoryMode::Exported { export }) => instance
                .get_memory(&mut store, export)
                .ok_or_else(|| Error::ExportNotFound(export.clone()))?,
            (None, MemoryMode::Host { .. }) => {
                return Err(Error::Engine("host memory was not created".into()))
            }
        };
        store.data_mut().memory = Some(memory);
        debug!(bytes = memory.data_size(&store), "module instantiated");

        Ok(WasmtimeSession {
            store,
            instance,
            memory,
            print_export: config.print_export.clone(),
        })
    }
}

/// One instantiated module and the store that owns it.
pub struct WasmtimeSession {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    print_export: String,
}

impl WasmtimeSession {
    /// The allocator behind `env.malloc`.
    pub fn heap(&self) -> &BumpAllocator {
        &self.store.data().heap
    }
}

impl LinearMemory for WasmtimeSession {
    fn byte_len(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.memory.data(&self.store).read(offset, buf)
    }

    fn grow(&mut self, delta: u32) -> Result<u32> {
        let current = self.page_count();
        match self.memory.grow(&mut self.store, u64::from(delta)) {
            Ok(previous) => Ok(previous as u32),
            Err(err) => {
                debug!(error = %err, "wasmtime refused memory.grow");
                Err(Error::GrowRefused { current, delta })
            }
        }
    }
}

impl Session for WasmtimeSession {
    fn has_function(&mut self, name: &str) -> bool {
        self.instance.get_func(&mut self.store, name).is_some()
    }

    fn call(&mut self, name: &str) -> Result<()> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| Error::ExportNotFound(name.to_string()))?;
        let ty = func.ty(&self.store);
        if ty.params().len() != 0 {
            return Err(Error::Config(format!(
                "`{name}` takes {} parameters, only nullary functions can be called",
                ty.params().len()
            )));
        }
        let mut results = vec![Val::I32(0); ty.results().len()];
        func.call(&mut self.store, &[], &mut results)
            .map_err(call_error)?;
        debug!(function = name, results = results.len(), "call returned");
        Ok(())
    }

    fn print(&mut self, offset: u32, len: u32) -> Result<()> {
        let print = self
            .instance
            .get_func(&mut self.store, &self.print_export)
            .ok_or_else(|| Error::ExportNotFound(self.print_export.clone()))?
            .typed::<(i32, i32), ()>(&self.store)
            .map_err(engine_error)?;
        print
            .call(&mut self.store, (offset as i32, len as i32))
            .map_err(call_error)
    }

    fn console(&self) -> &[String] {
        self.store.data().console.lines()
    }

    fn drain_console(&mut self) -> Vec<String> {
        self.store.data_mut().console.drain()
    }
}
