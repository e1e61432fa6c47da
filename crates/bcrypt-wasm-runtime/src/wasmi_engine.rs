//! The polyfill engine, backed by the wasmi interpreter.
//!
//! Runs the same guest bytecode as the production engine on hosts where a JIT
//! is unavailable or undesirable. Much slower; behaviour is identical.

use tracing::{debug, info};
use wasmi::{
    Caller, Config, Engine, Extern, Instance, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder, TypedFunc,
};

use crate::abi::{
    EXPORT_ALLOC, EXPORT_DEALLOC, EXPORT_HASH, EXPORT_MEMORY, EXPORT_VERIFY, GuestPtr, HashArgs,
    HashParams, IMPORT_MODULE, IMPORT_PANIC, VerifyArgs, VerifyParams,
};
use crate::config::{EngineKind, InstanceLimits};
use crate::engine::{ExecutionEngine, GuestInstance};
use crate::error::{CallError, CallResult, LoadError, LoadResult, MemoryResult, TrapInfo};
use crate::memory::check_bounds;
use crate::panic::{GuestPanic, PanicSlot, classify_failure};

struct GuestState {
    limits: StoreLimits,
    panic: PanicSlot,
}

/// The wasmi interpreter.
#[derive(Debug)]
pub struct PolyfillEngine {
    inner: Engine,
}

impl PolyfillEngine {
    /// Create a polyfill engine.
    pub fn new() -> Self {
        let inner = Engine::new(&Config::default());
        info!(engine = "polyfill", "Created execution engine");
        Self { inner }
    }

    /// Get a reference to the underlying wasmi engine.
    pub fn inner(&self) -> &Engine {
        &self.inner
    }
}

impl Default for PolyfillEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine for PolyfillEngine {
    fn name(&self) -> &'static str {
        "wasmi"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Polyfill
    }

    fn instantiate(
        &self,
        wasm: &[u8],
        limits: &InstanceLimits,
    ) -> LoadResult<Box<dyn GuestInstance>> {
        let module = Module::new(&self.inner, wasm).map_err(|e| LoadError::Compile(e.to_string()))?;

        let state = GuestState {
            limits: StoreLimitsBuilder::new()
                .memory_size(limits.max_memory_bytes)
                .instances(1)
                .build(),
            panic: PanicSlot::default(),
        };
        let mut store = Store::new(&self.inner, state);
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::<GuestState>::new(&self.inner);
        linker
            .func_wrap(IMPORT_MODULE, IMPORT_PANIC, on_guest_panic)
            .map_err(|e| LoadError::Instantiate(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|e| LoadError::Instantiate(e.to_string()))?;

        let memory = instance
            .get_memory(&store, EXPORT_MEMORY)
            .ok_or(LoadError::MissingExport { name: EXPORT_MEMORY })?;
        let alloc = typed_export(&instance, &store, EXPORT_ALLOC)?;
        let dealloc = typed_export(&instance, &store, EXPORT_DEALLOC)?;
        let hash = typed_export(&instance, &store, EXPORT_HASH)?;
        let verify = typed_export(&instance, &store, EXPORT_VERIFY)?;

        debug!(
            engine = "polyfill",
            memory_size = memory.data(&store).len(),
            "Instantiated guest module"
        );

        Ok(Box::new(PolyfillInstance {
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
    store: &Store<GuestState>,
    name: &'static str,
) -> LoadResult<TypedFunc<P, R>>
where
    P: wasmi::WasmParams,
    R: wasmi::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|_| LoadError::MissingExport { name })
}

fn on_guest_panic(
    mut caller: Caller<'_, GuestState>,
    ptr: i32,
    len: i32,
) -> Result<(), wasmi::Error> {
    let (ptr, len) = (ptr as u32, len as u32);

    let memory = caller
        .get_export(EXPORT_MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmi::Error::new("guest panicked without an exported memory"))?;

    let data = memory.data(&caller);
    check_bounds(ptr as usize, len as usize, data.len())
        .map_err(|e| wasmi::Error::new(e.to_string()))?;
    let panic = GuestPanic::from_bytes(ptr, &data[ptr as usize..ptr as usize + len as usize]);
    let message = panic.message.clone();
    caller.data_mut().panic.record(panic);

    let dealloc = caller
        .get_export(EXPORT_DEALLOC)
        .and_then(Extern::into_func)
        .ok_or_else(|| wasmi::Error::new("guest panicked without an exported dealloc"))?
        .typed::<(i32, i32), ()>(&caller)?;
    dealloc.call(&mut caller, (ptr as i32, len as i32))?;

    Err(wasmi::Error::new(format!("guest panicked: {message}")))
}

struct PolyfillInstance {
    store: Store<GuestState>,
    memory: Memory,
    alloc: TypedFunc<(i32,), i32>,
    dealloc: TypedFunc<(i32, i32), ()>,
    hash: TypedFunc<HashParams, ()>,
    verify: TypedFunc<VerifyParams, ()>,
}

impl PolyfillInstance {
    fn run<P, R>(&mut self, func: TypedFunc<P, R>, params: P) -> CallResult<R>
    where
        P: wasmi::WasmParams,
        R: wasmi::WasmResults,
    {
        self.store.data_mut().panic.take();
        func.call(&mut self.store, params)
            .map_err(|err| self.classify(err))
    }

    fn classify(&mut self, err: wasmi::Error) -> CallError {
        let trap = TrapInfo {
            code: err.as_trap_code().map(|code| format!("{:?}", code)),
            message: err.to_string(),
        };
        classify_failure(&mut self.store.data_mut().panic, trap)
    }
}

impl GuestInstance for PolyfillInstance {
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
        self.memory.data(&self.store).len()
    }
}
