// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Two-level artifact storage (spec §4.2), grounded on
//! `fvm::engine::Engine::load_raw`/`preload`: an in-memory compiled-module
//! cache backed by an on-disk gzip binary store, both keyed by `ModuleId`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cu_shared::ModuleId;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::cache::BoundedCache;
use crate::runtime::WasmRuntime;

/// Two-level artifact storage, shared (via `Arc`) across every execution
/// worker (spec §5: "the compiled-module cache and on-disk binary cache are
/// shared across workers").
pub struct ArtifactStore<R: WasmRuntime> {
    binary_dir: PathBuf,
    compiled_cache: Mutex<BoundedCache<ModuleId, Arc<R::Module>>>,
}

impl<R: WasmRuntime> ArtifactStore<R> {
    pub fn new(binary_dir: impl Into<PathBuf>, compiled_cache_capacity: usize) -> Self {
        Self {
            binary_dir: binary_dir.into(),
            compiled_cache: Mutex::new(BoundedCache::new(compiled_cache_capacity)),
        }
    }

    fn binary_path(&self, id: &ModuleId) -> PathBuf {
        self.binary_dir.join(format!("{}.wasm.gz", id.as_str()))
    }

    pub fn get_compiled(&self, id: &ModuleId) -> Option<Arc<R::Module>> {
        self.compiled_cache
            .lock()
            .expect("compiled module cache poisoned")
            .get(id)
            .cloned()
    }

    /// Content-addressed by `ModuleId`, so a racing concurrent insert for
    /// the same id is harmless: both writers hold equivalent bytes (spec §3
    /// invariant 1), and the second `put` simply replaces the first with an
    /// equal value.
    pub fn insert_compiled(&self, id: ModuleId, module: Arc<R::Module>) {
        self.compiled_cache
            .lock()
            .expect("compiled module cache poisoned")
            .put(id, module);
    }

    /// Reads and gunzips `<dir>/<id>.wasm.gz`, returning `None` if it isn't
    /// on disk. IO errors beyond "not found" are reported, since a corrupt
    /// on-disk artifact for a module we're about to trust is worth
    /// surfacing rather than silently falling through to the gateway.
    pub fn read_binary(&self, id: &ModuleId) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.binary_path(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut decoder = GzDecoder::new(file);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Streams `raw_wasm` through a gzip encoder to disk. Per spec §4.2,
    /// write failures are non-fatal: the in-memory compiled module is still
    /// usable, so this logs and returns rather than propagating.
    pub fn write_binary(&self, id: &ModuleId, raw_wasm: &[u8]) {
        if let Err(err) = self.try_write_binary(id, raw_wasm) {
            log::warn!("disk cache write failed for module {id}: {err}");
        }
    }

    fn try_write_binary(&self, id: &ModuleId, raw_wasm: &[u8]) -> std::io::Result<()> {
        if !self.binary_dir.exists() {
            fs::create_dir_all(&self.binary_dir)?;
        }
        let path = self.binary_path(id);
        let tmp_path = path.with_extension("wasm.gz.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(raw_wasm)?;
            encoder.finish()?;
        }
        fs::rename(&tmp_path, &path)
    }

    pub fn binary_dir(&self) -> &Path {
        &self.binary_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopRuntime;

    impl WasmRuntime for NoopRuntime {
        type Module = ();
        type Instance = ();

        fn compile(&self, _wasm_bytes: &[u8]) -> Result<Self::Module, crate::error::CompileError> {
            Ok(())
        }

        fn instantiate(
            &self,
            _module: &Self::Module,
            _gas_limit: cu_shared::Gas,
            _mem_limit: cu_shared::MemoryPages,
        ) -> Result<Self::Instance, crate::error::WasmInvocationError> {
            Ok(())
        }

        fn invoke(
            &self,
            _instance: &mut Self::Instance,
            _memory: cu_shared::Memory,
            _message: &cu_shared::Message,
            _ao_global: &serde_json::Value,
        ) -> Result<crate::runtime::RawInvocationResult, crate::error::WasmInvocationError> {
            Ok(Default::default())
        }
    }

    #[test]
    fn round_trips_a_binary_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store: ArtifactStore<NoopRuntime> = ArtifactStore::new(dir.path(), 4);
        let id = ModuleId::new("abc123");

        assert!(store.read_binary(&id).unwrap().is_none());
        store.write_binary(&id, b"\0asm fake wasm bytes");
        let bytes = store.read_binary(&id).unwrap().unwrap();
        assert_eq!(bytes, b"\0asm fake wasm bytes");
    }

    #[test]
    fn compiled_cache_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store: ArtifactStore<NoopRuntime> = ArtifactStore::new(dir.path(), 4);
        let id = ModuleId::new("abc123");
        assert!(store.get_compiled(&id).is_none());
        store.insert_compiled(id.clone(), Arc::new(()));
        assert!(store.get_compiled(&id).is_some());
    }
}
