//! Bounded buffer pools for recovery tasks
//!
//! Recovery holds one buffer per volume unit for the whole call, so the
//! pools cap total memory instead of blocking: when a class is empty,
//! `get` fails immediately and the caller treats it as out-of-memory for
//! this task.

use blobgrid_common::{BufPoolConfig, TaskType};
use parking_lot::Mutex;

use crate::error::{Error, Result};

struct PoolState {
    free: Vec<Vec<u8>>,
    allocated: usize,
}

/// One bounded class of fixed-size buffers
struct SizedPool {
    buf_size: usize,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl SizedPool {
    fn new(buf_size: usize, capacity: usize) -> Self {
        Self {
            buf_size,
            capacity,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                allocated: 0,
            }),
        }
    }

    fn get(&self) -> Result<Vec<u8>> {
        if self.buf_size == 0 || self.capacity == 0 {
            return Err(Error::NoFreeBuffer);
        }
        let mut state = self.state.lock();
        if let Some(buf) = state.free.pop() {
            return Ok(buf);
        }
        if state.allocated < self.capacity {
            state.allocated += 1;
            return Ok(vec![0u8; self.buf_size]);
        }
        Err(Error::NoFreeBuffer)
    }

    fn put(&self, buf: Vec<u8>) {
        if buf.len() != self.buf_size {
            // Not one of ours; drop it instead of poisoning the pool
            return;
        }
        self.state.lock().free.push(buf);
    }
}

/// Buffer pools for the two task families
pub struct TaskBufPool {
    migrate: SizedPool,
    repair: SizedPool,
}

impl TaskBufPool {
    /// Build both classes from configuration
    #[must_use]
    pub fn new(config: &BufPoolConfig) -> Self {
        Self {
            migrate: SizedPool::new(config.migrate_buf_size, config.migrate_buf_capacity),
            repair: SizedPool::new(config.repair_buf_size, config.repair_buf_capacity),
        }
    }

    /// Take a migrate-class buffer
    pub fn get_migrate_buf(&self) -> Result<Vec<u8>> {
        self.migrate.get()
    }

    /// Take a repair-class buffer
    pub fn get_repair_buf(&self) -> Result<Vec<u8>> {
        self.repair.get()
    }

    /// Take a buffer from the class matching `task`
    pub fn acquire(&self, task: TaskType) -> Result<Vec<u8>> {
        match task {
            TaskType::Repair => self.get_repair_buf(),
            TaskType::Migrate => self.get_migrate_buf(),
        }
    }

    /// Return a buffer to the class matching `task`
    pub fn release(&self, task: TaskType, buf: Vec<u8>) {
        match task {
            TaskType::Repair => self.repair.put(buf),
            TaskType::Migrate => self.migrate.put(buf),
        }
    }
}
