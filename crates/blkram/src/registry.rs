use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::queue::QueueSet;
use crate::util::checked_range;
use crate::{
    Arena, BringUpError, Device, DeviceConfig, Dispatcher, Geometry, QueueStats,
    RegistrationError, Result,
};

pub const DEFAULT_DISK_NAME: &str = "blkram";

/// Matches the 20-bit minor number space of a block major.
pub const DEFAULT_MAX_DEVICES: u32 = 1 << 20;

/// Hands out device indexes, lowest free index first.
#[derive(Debug)]
pub struct IndexAllocator {
    max: u32,
    used: BTreeSet<u32>,
}

impl IndexAllocator {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            used: BTreeSet::new(),
        }
    }

    pub fn alloc(&mut self) -> std::result::Result<u32, RegistrationError> {
        let mut candidate = 0u32;
        for &idx in &self.used {
            if idx != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= self.max {
            return Err(RegistrationError::IndexExhausted { max: self.max });
        }
        self.used.insert(candidate);
        Ok(candidate)
    }

    /// Returns `false` if `idx` was not allocated.
    pub fn free(&mut self, idx: u32) -> bool {
        self.used.remove(&idx)
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }
}

/// An allocated index that goes back to the allocator unless committed.
struct IndexReservation<'a> {
    indexes: &'a mut IndexAllocator,
    idx: u32,
    committed: bool,
}

impl<'a> IndexReservation<'a> {
    fn take(indexes: &'a mut IndexAllocator) -> std::result::Result<Self, RegistrationError> {
        let idx = indexes.alloc()?;
        Ok(Self {
            indexes,
            idx,
            committed: false,
        })
    }

    fn commit(mut self) -> u32 {
        self.committed = true;
        self.idx
    }
}

impl Drop for IndexReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.indexes.free(self.idx);
        }
    }
}

/// State shared by every handle to one published disk.
#[derive(Debug)]
pub(crate) struct DiskState {
    name: String,
    index: u32,
    geometry: Geometry,
    online: AtomicBool,
    arena: Mutex<Option<Arena>>,
    queues: QueueSet,
}

impl DiskState {
    pub(crate) fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub(crate) fn lock_arena(&self) -> MutexGuard<'_, Option<Arena>> {
        match self.arena.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    indexes: IndexAllocator,
    disks: BTreeMap<String, Arc<DiskState>>,
    shut_down: bool,
}

#[derive(Debug)]
struct RegistryInner {
    base_name: String,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Publishes RAM disks under stable names so they can be reached by external callers.
///
/// Cloning a registry yields another handle to the same set of disks.
#[derive(Clone, Debug)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_DISK_NAME)
    }
}

impl Registry {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self::with_max_devices(base_name, DEFAULT_MAX_DEVICES)
    }

    pub fn with_max_devices(base_name: impl Into<String>, max_devices: u32) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                base_name: base_name.into(),
                state: Mutex::new(RegistryState {
                    indexes: IndexAllocator::new(max_devices),
                    disks: BTreeMap::new(),
                    shut_down: false,
                }),
            }),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.inner.base_name
    }

    /// Publishes `device` as `<base_name><index>`.
    pub fn register(
        &self,
        device: Device,
    ) -> std::result::Result<RegistrationHandle, RegistrationError> {
        self.publish(device, None)
    }

    /// Publishes `device` under an explicit name.
    pub fn register_as(
        &self,
        device: Device,
        name: &str,
    ) -> std::result::Result<RegistrationHandle, RegistrationError> {
        self.publish(device, Some(name))
    }

    /// Creates a device from `config` and registers it.
    pub fn bring_up(
        &self,
        config: &DeviceConfig,
    ) -> std::result::Result<RegistrationHandle, BringUpError> {
        let device = Device::create(config)?;
        Ok(self.register(device)?)
    }

    fn publish(
        &self,
        device: Device,
        name: Option<&str>,
    ) -> std::result::Result<RegistrationHandle, RegistrationError> {
        // On any early return `device` and the queue set are dropped here, which releases the
        // arena; an uncommitted index reservation is handed back first.
        let published = self.try_publish(device, name);
        match &published {
            Ok(state) => tracing::info!(
                name = %state.name,
                index = state.index,
                capacity_sectors = state.geometry.capacity_sectors(),
                nr_hw_queues = state.queues.len(),
                "ram disk registered"
            ),
            Err(err) => tracing::warn!("ram disk registration failed, resources released: {err}"),
        }
        published.map(|state| RegistrationHandle {
            registry: self.clone(),
            state,
            torn_down: false,
        })
    }

    fn try_publish(
        &self,
        device: Device,
        name: Option<&str>,
    ) -> std::result::Result<Arc<DiskState>, RegistrationError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.shut_down {
            return Err(RegistrationError::RegistryFailure(
                "registry is shut down".into(),
            ));
        }
        if let Some(name) = name {
            validate_name(name)?;
        }

        let queues = QueueSet::new(device.nr_hw_queues(), device.queue_depth());
        let reservation = IndexReservation::take(&mut state.indexes)?;

        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}{}", self.inner.base_name, reservation.idx),
        };
        if state.disks.contains_key(&name) {
            return Err(RegistrationError::RegistryFailure(format!(
                "disk name {name:?} is already registered"
            )));
        }

        let index = reservation.commit();
        let (geometry, arena) = device.into_parts();
        let disk = Arc::new(DiskState {
            name: name.clone(),
            index,
            geometry,
            online: AtomicBool::new(true),
            arena: Mutex::new(Some(arena)),
            queues,
        });
        state.disks.insert(name, Arc::clone(&disk));
        Ok(disk)
    }

    /// Looks up a published disk by name.
    pub fn lookup(&self, name: &str) -> Option<DiskHandle> {
        self.inner.lock().disks.get(name).map(|state| DiskHandle {
            state: Arc::clone(state),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().disks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().disks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of device indexes currently allocated.
    pub fn indexes_in_use(&self) -> usize {
        self.inner.lock().indexes.in_use()
    }

    /// Refuses further registrations. Disks already published stay up until torn down.
    pub fn shutdown(&self) {
        self.inner.lock().shut_down = true;
        tracing::info!(base_name = %self.inner.base_name, "registry shut down");
    }

    fn unpublish(&self, state: &DiskState) {
        let mut guard = self.inner.lock();
        let registry = &mut *guard;
        if registry
            .disks
            .get(&state.name)
            .is_some_and(|d| std::ptr::eq(Arc::as_ptr(d), state))
        {
            registry.disks.remove(&state.name);
        }
    }

    fn release_index(&self, index: u32) {
        self.inner.lock().indexes.free(index);
    }
}

fn validate_name(name: &str) -> std::result::Result<(), RegistrationError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(RegistrationError::RegistryFailure(format!(
            "invalid disk name {name:?}"
        )));
    }
    Ok(())
}

/// Ownership of one published disk.
///
/// Tearing the handle down (explicitly, or by dropping it) takes the disk offline, removes it
/// from the registry, waits for any in-flight request, releases the arena and finally returns
/// the device index. Teardown runs at most once.
#[derive(Debug)]
pub struct RegistrationHandle {
    registry: Registry,
    state: Arc<DiskState>,
    torn_down: bool,
}

impl RegistrationHandle {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Device node path, e.g. `/dev/blkram0`.
    pub fn path(&self) -> PathBuf {
        PathBuf::from("/dev").join(&self.state.name)
    }

    pub fn index(&self) -> u32 {
        self.state.index
    }

    pub fn geometry(&self) -> &Geometry {
        &self.state.geometry
    }

    pub fn is_registered(&self) -> bool {
        !self.torn_down && self.state.is_online()
    }

    pub fn disk(&self) -> DiskHandle {
        DiskHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn teardown(mut self) {
        self.teardown_once();
    }

    fn teardown_once(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.state.online.store(false, Ordering::Release);
        self.registry.unpublish(&self.state);
        // Taking the arena lock waits for the request currently being serviced, if any.
        let arena = self.state.lock_arena().take();
        drop(arena);
        self.registry.release_index(self.state.index);

        tracing::info!(
            name = %self.state.name,
            index = self.state.index,
            "ram disk torn down"
        );
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        self.teardown_once();
    }
}

/// Shared, cloneable access to a published disk: the runtime surface used by external callers.
///
/// Every operation fails with [`IoError::Offline`](crate::IoError::Offline) once the disk has been torn down.
#[derive(Clone, Debug)]
pub struct DiskHandle {
    state: Arc<DiskState>,
}

impl DiskHandle {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn geometry(&self) -> &Geometry {
        &self.state.geometry
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.state.geometry.capacity_bytes()
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    pub fn nr_hw_queues(&self) -> usize {
        self.state.queues.len()
    }

    /// Dispatcher for hardware queue `index`.
    pub fn queue(&self, index: usize) -> Result<Dispatcher<'_>> {
        let queue = self.state.queues.get(index)?;
        Ok(Dispatcher::new(&self.state, queue))
    }

    pub fn stats(&self) -> QueueStats {
        self.state.queues.total_stats()
    }

    pub fn queue_stats(&self, index: usize) -> Result<QueueStats> {
        Ok(self.state.queues.get(index)?.stats())
    }

    /// Reads `len` bytes starting at byte `offset`.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        checked_range(offset, len, self.capacity_bytes())?;
        let mut buf = vec![0u8; len];
        self.queue(0)?.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Writes `data` at byte `offset`, returning the number of bytes written.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        self.queue(0)?.write_at(offset, data)?;
        Ok(data.len())
    }
}
