//! The guest memory bridge.
//!
//! Every byte that crosses the host/guest boundary goes through a
//! [`CallScope`]. A scope is borrowed from the [`Runtime`](crate::Runtime)
//! for the duration of one guest operation and keeps a ledger of the regions
//! it allocated. Regions are released exactly once, either explicitly through
//! [`CallScope::release`] or, for anything still outstanding, when the scope
//! is dropped. That covers early `?` returns as well as guest panics and
//! traps, so a failed call never leaks guest memory.
//!
//! Reads and writes go through the [`GuestInstance`] on each access, which
//! resolves the guest's linear memory afresh. A guest call may have grown the
//! memory since the last access.

use tracing::{debug, warn};

use crate::abi::{GuestPtr, HashArgs, VerifyArgs};
use crate::engine::{GuestInstance, InstanceId};
use crate::error::{CallError, CallResult, MemoryError, MemoryResult};

/// A region of guest linear memory.
///
/// A plain handle. Ownership is tracked by the [`CallScope`] that allocated
/// it, not by the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestRegion {
    /// Base offset in guest memory.
    pub ptr: GuestPtr,
    /// Length in bytes.
    pub len: u32,
}

impl GuestRegion {
    /// Base offset as a host index.
    pub fn offset(&self) -> usize {
        self.ptr as usize
    }

    /// Length as a host size.
    pub fn size(&self) -> usize {
        self.len as usize
    }
}

/// Allocation counters for one guest instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Regions allocated over the instance's lifetime.
    pub allocations: u64,
    /// Regions released over the instance's lifetime.
    pub releases: u64,
    /// Regions currently allocated by the host.
    pub live_regions: u64,
    /// Bytes currently allocated by the host.
    pub live_bytes: u64,
    /// High-water mark of `live_bytes`.
    pub peak_live_bytes: u64,
}

impl BridgeStats {
    /// Whether every allocated region has been released.
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.releases && self.live_regions == 0
    }

    fn record_alloc(&mut self, region: GuestRegion) {
        self.allocations += 1;
        self.live_regions += 1;
        self.live_bytes += u64::from(region.len);
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
    }

    fn record_release(&mut self, region: GuestRegion) {
        self.releases += 1;
        self.live_regions = self.live_regions.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(u64::from(region.len));
    }
}

/// Check that `len` bytes at `offset` fit in a memory of `memory_size` bytes.
pub fn check_bounds(offset: usize, len: usize, memory_size: usize) -> MemoryResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= memory_size => Ok(()),
        _ => Err(MemoryError::OutOfBounds {
            offset,
            len,
            memory_size,
        }),
    }
}

/// Scoped access to guest memory for a single guest operation.
pub struct CallScope<'a> {
    instance: &'a mut dyn GuestInstance,
    stats: &'a mut BridgeStats,
    id: InstanceId,
    ledger: Vec<GuestRegion>,
}

impl<'a> CallScope<'a> {
    pub(crate) fn new(
        instance: &'a mut dyn GuestInstance,
        stats: &'a mut BridgeStats,
        id: InstanceId,
    ) -> Self {
        Self {
            instance,
            stats,
            id,
            ledger: Vec::new(),
        }
    }

    /// Allocate a region of at least `len` bytes from the guest allocator.
    ///
    /// A zero length is passed through; the guest rounds it up.
    pub fn allocate(&mut self, len: usize) -> CallResult<GuestRegion> {
        let len = u32::try_from(len).map_err(|_| MemoryError::AllocationFailed { len: u32::MAX })?;

        let ptr = self.instance.alloc(len)?;
        if ptr == 0 {
            warn!(instance_id = %self.id, len, "Guest allocator returned null");
            return Err(MemoryError::AllocationFailed { len }.into());
        }

        let region = GuestRegion { ptr, len };
        self.ledger.push(region);
        self.stats.record_alloc(region);

        debug!(instance_id = %self.id, ptr, len, "Allocated guest region");
        Ok(region)
    }

    /// Allocate a region sized to `bytes` and copy them in.
    pub fn transfer(&mut self, bytes: &[u8]) -> CallResult<GuestRegion> {
        let region = self.allocate(bytes.len())?;
        self.write(region, bytes)?;
        Ok(region)
    }

    /// Copy `bytes` to the start of `region`.
    pub fn write(&mut self, region: GuestRegion, bytes: &[u8]) -> MemoryResult<()> {
        self.check_region(region, bytes.len())?;
        self.instance.write_memory(region.offset(), bytes)
    }

    /// Copy `len` bytes from the start of `region` into a new host buffer.
    pub fn read(&self, region: GuestRegion, len: usize) -> MemoryResult<Vec<u8>> {
        self.check_region(region, len)?;
        let mut buf = vec![0u8; len];
        self.instance.read_memory(region.offset(), &mut buf)?;
        Ok(buf)
    }

    /// Return `region` to the guest allocator.
    ///
    /// Only regions allocated by this scope and not yet released are
    /// accepted; anything else is rejected without reaching the guest.
    pub fn release(&mut self, region: GuestRegion) -> CallResult<()> {
        let index = self
            .ledger
            .iter()
            .position(|owned| *owned == region)
            .ok_or(MemoryError::RegionNotOwned { ptr: region.ptr })?;
        self.ledger.swap_remove(index);
        self.free(region)
    }

    /// Invoke the guest `hash` entry point.
    pub fn hash(&mut self, args: HashArgs) -> CallResult<()> {
        debug!(instance_id = %self.id, cost = args.cost, version = %char::from(args.version_tag), "Calling guest hash");
        let result = self.instance.hash(args);
        self.observe(result)
    }

    /// Invoke the guest `verify` entry point.
    pub fn verify(&mut self, args: VerifyArgs) -> CallResult<()> {
        debug!(instance_id = %self.id, hash_len = args.hash_len, "Calling guest verify");
        let result = self.instance.verify(args);
        self.observe(result)
    }

    /// Number of regions this scope still owns.
    pub fn outstanding(&self) -> usize {
        self.ledger.len()
    }

    /// Release every outstanding region, reporting the first failure.
    pub fn finish(mut self) -> CallResult<()> {
        let mut first_err = None;
        for region in std::mem::take(&mut self.ledger) {
            if let Err(err) = self.free(region) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn free(&mut self, region: GuestRegion) -> CallResult<()> {
        self.instance.dealloc(region.ptr, region.len)?;
        self.stats.record_release(region);
        debug!(instance_id = %self.id, ptr = region.ptr, len = region.len, "Released guest region");
        Ok(())
    }

    fn check_region(&self, region: GuestRegion, len: usize) -> MemoryResult<()> {
        if !self.ledger.contains(&region) {
            return Err(MemoryError::RegionNotOwned { ptr: region.ptr });
        }
        if len > region.size() {
            return Err(MemoryError::RegionTooSmall {
                ptr: region.ptr,
                capacity: region.len,
                requested: len,
            });
        }
        Ok(())
    }

    fn observe(&self, result: CallResult<()>) -> CallResult<()> {
        match &result {
            Err(CallError::Panic(panic)) => {
                warn!(instance_id = %self.id, message = %panic.message, "Guest panicked");
            }
            Err(CallError::Trap(trap)) => {
                warn!(instance_id = %self.id, trap = %trap, "Guest trapped");
            }
            _ => {}
        }
        result
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        for region in std::mem::take(&mut self.ledger) {
            if let Err(err) = self.free(region) {
                warn!(
                    instance_id = %self.id,
                    ptr = region.ptr,
                    len = region.len,
                    error = %err,
                    "Failed to release guest region"
                );
            }
        }
    }
}

impl std::fmt::Debug for CallScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallScope")
            .field("instance_id", &self.id)
            .field("ledger", &self.ledger)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrapInfo;

    /// An in-process stand-in for a guest: a flat buffer and a bump allocator.
    struct FakeGuest {
        memory: Vec<u8>,
        next: u32,
        freed: Vec<(GuestPtr, u32)>,
        fail_dealloc: bool,
    }

    impl FakeGuest {
        fn new() -> Self {
            Self {
                memory: vec![0; 4096],
                next: 16,
                freed: Vec::new(),
                fail_dealloc: false,
            }
        }
    }

    impl GuestInstance for FakeGuest {
        fn alloc(&mut self, len: u32) -> CallResult<GuestPtr> {
            let len = len.max(1);
            if (self.next + len) as usize > self.memory.len() {
                return Ok(0);
            }
            let ptr = self.next;
            self.next += len;
            Ok(ptr)
        }

        fn dealloc(&mut self, ptr: GuestPtr, len: u32) -> CallResult<()> {
            if self.fail_dealloc {
                return Err(TrapInfo::new("dealloc failed").into());
            }
            self.freed.push((ptr, len));
            Ok(())
        }

        fn hash(&mut self, _args: HashArgs) -> CallResult<()> {
            Err(TrapInfo::new("unreachable").into())
        }

        fn verify(&mut self, _args: VerifyArgs) -> CallResult<()> {
            Ok(())
        }

        fn read_memory(&self, offset: usize, buf: &mut [u8]) -> MemoryResult<()> {
            check_bounds(offset, buf.len(), self.memory.len())?;
            buf.copy_from_slice(&self.memory[offset..offset + buf.len()]);
            Ok(())
        }

        fn write_memory(&mut self, offset: usize, data: &[u8]) -> MemoryResult<()> {
            check_bounds(offset, data.len(), self.memory.len())?;
            self.memory[offset..offset + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn memory_size(&self) -> usize {
            self.memory.len()
        }
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(0, 10, 10).is_ok());
        assert!(check_bounds(10, 0, 10).is_ok());
        assert_eq!(
            check_bounds(8, 4, 10),
            Err(MemoryError::OutOfBounds {
                offset: 8,
                len: 4,
                memory_size: 10
            })
        );
        assert!(check_bounds(usize::MAX, 2, 10).is_err());
    }

    #[test]
    fn test_transfer_and_read() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());

        let region = scope.transfer(b"password").unwrap();
        assert_eq!(region.len, 8);
        assert_eq!(scope.read(region, 8).unwrap(), b"password");
        assert_eq!(scope.read(region, 4).unwrap(), b"pass");
        scope.finish().unwrap();

        assert!(stats.is_balanced());
        assert_eq!(stats.peak_live_bytes, 8);
        assert_eq!(guest.freed, vec![(16, 8)]);
    }

    #[test]
    fn test_zero_length_transfer() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());

        let region = scope.transfer(b"").unwrap();
        assert_eq!(region.len, 0);
        assert!(scope.read(region, 0).unwrap().is_empty());
        scope.release(region).unwrap();
        assert_eq!(scope.outstanding(), 0);
    }

    #[test]
    fn test_release_exactly_once() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());

        let region = scope.allocate(32).unwrap();
        scope.release(region).unwrap();
        assert!(matches!(
            scope.release(region),
            Err(CallError::Memory(MemoryError::RegionNotOwned { ptr: 16 }))
        ));
        assert!(matches!(
            scope.read(region, 1),
            Err(MemoryError::RegionNotOwned { .. })
        ));
        drop(scope);

        assert_eq!(guest.freed.len(), 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn test_region_too_small() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());

        let region = scope.allocate(4).unwrap();
        assert_eq!(
            scope.write(region, b"too long"),
            Err(MemoryError::RegionTooSmall {
                ptr: region.ptr,
                capacity: 4,
                requested: 8
            })
        );
    }

    #[test]
    fn test_drop_releases_on_failed_call() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();

        let result = (|| {
            let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());
            let password = scope.transfer(b"password")?;
            let salt = scope.transfer(b"saltsaltsaltsalt")?;
            scope.hash(HashArgs {
                password_ptr: password.ptr,
                password_len: password.len,
                salt_ptr: salt.ptr,
                salt_len: salt.len,
                output_ptr: 0,
                output_cap: 0,
                output_len_ptr: 0,
                version_tag: b'b',
                cost: 10,
            })
        })();

        assert!(matches!(result, Err(CallError::Trap(_))));
        assert_eq!(guest.freed.len(), 2);
        assert!(stats.is_balanced());
        assert_eq!(stats.peak_live_bytes, 24);
    }

    #[test]
    fn test_null_allocation() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());

        let err = scope.allocate(1 << 20).unwrap_err();
        assert!(matches!(
            err,
            CallError::Memory(MemoryError::AllocationFailed { len }) if len == 1 << 20
        ));
        assert_eq!(scope.outstanding(), 0);
    }

    #[test]
    fn test_drop_logs_release_failure() {
        let mut guest = FakeGuest::new();
        let mut stats = BridgeStats::default();
        {
            let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());
            scope.allocate(8).unwrap();
        }
        assert_eq!(stats.releases, 1);
        assert!(stats.is_balanced());

        guest.fail_dealloc = true;
        {
            let mut scope = CallScope::new(&mut guest, &mut stats, InstanceId::new());
            scope.allocate(8).unwrap();
        }
        assert_eq!(stats.live_regions, 1);
    }
}
