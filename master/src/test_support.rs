//! Dobles de prueba compartidos por los tests del master.

use common::{KvStore, MemoryKv, TaskError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Store en memoria que se puede "desconectar" a voluntad.
#[derive(Debug, Default)]
pub struct FlakyKv {
    inner: MemoryKv,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyKv {
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }
}

impl KvStore for FlakyKv {
    fn get(&self, key: &str) -> Result<Option<String>, TaskError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TaskError::StoreUnavailable("lectura caída".into()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), TaskError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TaskError::StoreUnavailable("escritura caída".into()));
        }
        self.inner.set(key, value)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TaskError> {
        self.inner.scan_prefix(prefix)
    }
}
