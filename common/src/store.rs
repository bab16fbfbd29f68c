//! Store de registros de tareas sobre un key/value genérico.
//!
//! Cada registro vive en `task-meta-<id>`; listar = scan por prefijo.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::task::TaskRecord;

/// Prefijo de las claves de registros; no debe chocar con otras claves.
pub const RECORD_KEY_PREFIX: &str = "task-meta-";

pub fn record_key(task_id: &str) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, task_id)
}

/// Capacidad mínima que necesitamos del motor key/value.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TaskError>;
    fn set(&self, key: &str, value: String) -> Result<(), TaskError>;
    /// Claves que empiezan con `prefix`, en orden no especificado
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TaskError>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, TaskError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), TaskError> {
        (**self).set(key, value)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TaskError> {
        (**self).scan_prefix(prefix)
    }
}

fn lock_map(
    map: &Mutex<HashMap<String, String>>,
) -> Result<MutexGuard<'_, HashMap<String, String>>, TaskError> {
    map.lock()
        .map_err(|_| TaskError::StoreUnavailable("lock del store envenenado".to_string()))
}

/* ---------------- store en memoria ---------------- */

#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, TaskError> {
        Ok(lock_map(&self.map)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), TaskError> {
        lock_map(&self.map)?.insert(key.to_string(), value);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TaskError> {
        Ok(lock_map(&self.map)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/* ---------------- store en archivo JSON ---------------- */

/// Igual que `MemoryKv` pero vuelca todo el mapa a un archivo JSON en cada
/// escritura, así los registros sobreviven a un reinicio del master.
#[derive(Debug, Clone)]
pub struct JsonFileKv {
    path: PathBuf,
    map: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Serialize, Deserialize, Default)]
struct FileContents {
    entries: HashMap<String, String>,
}

impl JsonFileKv {
    /// Abre (o crea) el store en `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                TaskError::StoreUnavailable(format!("leyendo {}: {}", path.display(), e))
            })?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                let contents: FileContents = serde_json::from_str(&raw).map_err(|e| {
                    TaskError::StoreUnavailable(format!("parseando {}: {}", path.display(), e))
                })?;
                contents.entries
            }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|e| {
                        TaskError::StoreUnavailable(format!(
                            "creando {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            HashMap::new()
        };

        debug!("store abierto en {} ({} claves)", path.display(), entries.len());

        Ok(Self {
            path,
            map: Arc::new(Mutex::new(entries)),
        })
    }

    /// Reescribe el archivo completo con el lock tomado: O(n) por escritura.
    /// Sirve para unos miles de tareas; más allá conviene un store real.
    fn flush(&self, map: &HashMap<String, String>) -> Result<(), TaskError> {
        let contents = FileContents {
            entries: map.clone(),
        };
        let json = serde_json::to_string_pretty(&contents)
            .map_err(|e| TaskError::StoreUnavailable(format!("serializando store: {}", e)))?;

        // escribir a un temporal y renombrar, para no dejar el archivo a medias
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| {
            TaskError::StoreUnavailable(format!("escribiendo {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            TaskError::StoreUnavailable(format!("renombrando a {}: {}", self.path.display(), e))
        })
    }
}

impl KvStore for JsonFileKv {
    fn get(&self, key: &str) -> Result<Option<String>, TaskError> {
        Ok(lock_map(&self.map)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), TaskError> {
        let mut map = lock_map(&self.map)?;
        // el mapa visible solo cambia si el archivo quedó escrito
        let mut next = map.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *map = next;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TaskError> {
        Ok(lock_map(&self.map)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/* ---------------- adaptador de registros ---------------- */

/// Lectura/escritura de `TaskRecord` sobre cualquier `KvStore`.
#[derive(Debug, Clone)]
pub struct TaskRecordStore<S> {
    kv: S,
}

impl<S: KvStore> TaskRecordStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn get(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        let raw = self
            .kv
            .get(&record_key(task_id))?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        serde_json::from_str(&raw).map_err(|e| {
            TaskError::StoreUnavailable(format!("registro {} corrupto: {}", task_id, e))
        })
    }

    /// Lo llama el backend de ejecución al terminar una tarea.
    pub fn put(&self, record: &TaskRecord) -> Result<(), TaskError> {
        let json = serde_json::to_string(record)
            .map_err(|e| TaskError::StoreUnavailable(format!("serializando registro: {}", e)))?;
        self.kv.set(&record_key(&record.task_id), json)
    }

    /// Recorre todos los registros. El iterador es perezoso: cada registro se
    /// lee al avanzar. Las claves que desaparecen o no parsean se saltan;
    /// un fallo del store se entrega como `Err` para que el consumidor corte.
    pub fn scan_all(
        &self,
    ) -> Result<impl Iterator<Item = Result<TaskRecord, TaskError>> + '_, TaskError> {
        let keys = self.kv.scan_prefix(RECORD_KEY_PREFIX)?;

        Ok(keys.into_iter().filter_map(move |key| {
            let raw = match self.kv.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            match serde_json::from_str::<TaskRecord>(&raw) {
                Ok(record) => Some(Ok(record)),
                Err(e) => {
                    warn!("registro {} ignorado, no parsea: {}", key, e);
                    None
                }
            }
        }))
    }
}
