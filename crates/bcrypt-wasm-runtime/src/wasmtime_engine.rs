//! The production engine, backed by wasmtime.

use tracing::{debug, info};
use wasmtime::{
    Caller, Config, Engine, Extern, Instance, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder, TypedFunc,
};

use crate::abi::{
    EXPORT_ALLOC, EXPORT_DEALLOC, EXPORT_HASH, EXPORT_MEMORY, EXPORT_VERIFY, GuestPtr, HashArgs,
    HashParams, IMPORT_MODULE, IMPORT_PANIC, VerifyArgs, VerifyParams,
};
use crate::config::{EngineConfig, EngineKind, InstanceLimits};
use crate::engine::{ExecutionEngine, GuestInstance};
use crate::error::{CallError, CallResult, LoadError, LoadResult, MemoryResult, TrapInfo};
use crate::memory::check_bounds;
use crate::panic::{GuestPanic, PanicSlot, classify_failure};

/// Data stored in each wasmtime store.
struct GuestState {
    limits: StoreLimits,
    panic: PanicSlot,
}

/// Wasmtime with the Cranelift JIT.
pub struct ProductionEngine {
    inner: Engine,
    config: EngineConfig,
}

impl ProductionEngine {
    /// Create a production engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if wasmtime rejects the configuration.
    pub fn new(config: EngineConfig) -> LoadResult<Self> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.max_wasm_stack(config.max_wasm_stack);
        wasmtime_config.cranelift_opt_level(config.opt_level.into());
        wasmtime_config.debug_info(config.debug_info);

        let inner = Engine::new(&wasmtime_config).map_err(|e| LoadError::Engine(format!("{e:#}")))?;

        info!(
            engine = "production",
            opt_level = ?config.opt_level,
            max_wasm_stack = config.max_wasm_stack,
            "Created execution engine"
        );

        Ok(Self { inner, config })
    }

    /// Get a reference to the underlying wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.inner
    }

    /// Get the configuration used to create this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for ProductionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl ExecutionEngine for ProductionEngine {
    fn name(&self) -> &'static str {
        "wasmtime"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Production
    }

    fn instantiate(
        &self,
        wasm: &[u8],
        limits: &InstanceLimits,
    ) -> LoadResult<Box<dyn GuestInstance>> {
        let module = Module::new(&self.inner, wasm).map_err(|e| LoadError::Compile(format!("{e:#}")))?;

        let state = GuestState {
            limits: StoreLimitsBuilder::new()
                .memory_size(limits.max_memory_bytes)
                .instances(1)
                .build(),
            panic: PanicSlot::default(),
        };
        let mut store = Store::new(&self.inner, state);
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(&self.inner);
        linker
            .func_wrap(IMPORT_MODULE, IMPORT_PANIC, on_guest_panic)
            .map_err(|e| LoadError::Instantiate(format!("{e:#}")))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| LoadError::Instantiate(format!("{e:#}")))?;

        let memory = instance
            .get_memory(&mut store, EXPORT_MEMORY)
            .ok_or(LoadError::MissingExport { name: EXPORT_MEMORY })?;
        let alloc = typed_export(&instance, &mut store, EXPORT_ALLOC)?;
        let dealloc = typed_export(&instance, &mut store, EXPORT_DEALLOC)?;
        let hash = typed_export(&instance, &mut store, EXPORT_HASH)?;
        let verify = typed_export(&instance, &mut store, EXPORT_VERIFY)?;

        debug!(
            engine = "production",
            memory_size = memory.data_size(&store),
            "Instantiated guest module"
        );

        Ok(Box::new(ProductionInstance {
            store,
            memory,
            alloc,
            dealloc,
            hash,
            verify,
        }))
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<GuestState>,
    name: &'static str,
) -> LoadResult<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|_| LoadError::MissingExport { name })
}

/// Host side of `env.panic(ptr, len)`.
///
/// Copies the message out, hands the region back to the guest allocator and
/// aborts the running call.
fn on_guest_panic(mut caller: Caller<'_, GuestState>, ptr: i32, len: i32) -> wasmtime::Result<()> {
    let (ptr, len) = (ptr as u32, len as u32);

    let memory = caller
        .get_export(EXPORT_MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest panicked without an exported memory"))?;

    let data = memory.data(&caller);
    check_bounds(ptr as usize, len as usize, data.len())?;
    let panic = GuestPanic::from_bytes(ptr, &data[ptr as usize..ptr as usize + len as usize]);
    let message = panic.message.clone();
    caller.data_mut().panic.record(panic);

    let dealloc = caller
        .get_export(EXPORT_DEALLOC)
        .and_then(Extern::into_func)
        .ok_or_else(|| wasmtime::Error::msg("guest panicked without an exported dealloc"))?
        .typed::<(i32, i32), ()>(&caller)?;
    dealloc.call(&mut caller, (ptr as i32, len as i32))?;

    Err(wasmtime::Error::msg(format!("guest panicked: {message}")))
}

struct ProductionInstance {
    store: Store<GuestState>,
    memory: Memory,
    alloc: TypedFunc<(i32,), i32>,
    dealloc: TypedFunc<(i32, i32), ()>,
    hash: TypedFunc<HashParams, ()>,
    verify: TypedFunc<VerifyParams, ()>,
}

impl ProductionInstance {
    fn run<P, R>(&mut self, func: TypedFunc<P, R>, params: P) -> CallResult<R>
    where
        P: wasmtime::WasmParams,
        R: wasmtime::WasmResults,
    {
        self.store.data_mut().panic.take();
        func.call(&mut self.store, params)
            .map_err(|err| self.classify(err))
    }

    fn classify(&mut self, err: wasmtime::Error) -> CallError {
        let trap = match err.downcast_ref::<wasmtime::Trap>() {
            Some(trap) => TrapInfo::from(*trap),
            None => TrapInfo::new(format!("{err:#}")),
        };
        classify_failure(&mut self.store.data_mut().panic, trap)
    }
}

impl GuestInstance for ProductionInstance {
    fn alloc(&mut self, len: u32) -> CallResult<GuestPtr> {
        let ptr = self.run(self.alloc.clone(), (len as i32,))?;
        Ok(ptr as u32)
    }

    fn dealloc(&mut self, ptr: GuestPtr, len: u32) -> CallResult<()> {
        self.run(self.dealloc.clone(), (ptr as i32, len as i32))
    }

    fn hash(&mut self, args: HashArgs) -> CallResult<()> {
        self.run(self.hash.clone(), args.to_params())
    }

    fn verify(&mut self, args: VerifyArgs) -> CallResult<()> {
        self.run(self.verify.clone(), args.to_params())
    }

    fn read_memory(&self, offset: usize, buf: &mut [u8]) -> MemoryResult<()> {
        let data = self.memory.data(&self.store);
        check_bounds(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_memory(&mut self, offset: usize, bytes: &[u8]) -> MemoryResult<()> {
        let data = self.memory.data_mut(&mut self.store);
        check_bounds(offset, bytes.len(), data.len())?;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}
