//! Guest module compilation.
//!
//! A [`CompiledModule`] comes from one of three places:
//! - a Wasm binary, compiled with Cranelift when it is loaded
//! - WAT text, mostly for tests and small fixtures
//! - a `<content_hash>.cwasm` artifact written by `ssr-engine compile`

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, Module};

use ssr_engine_common::RenderError;

const WASM_MAGIC: &[u8; 4] = b"\0asm";
const ARTIFACT_EXTENSION: &str = "cwasm";

/// Where a compiled module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Binary,
    Text,
    Precompiled(PathBuf),
}

/// A compiled guest module, shared by every instance created from it.
///
/// Clones share the underlying machine code.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,
    content_hash: Arc<str>,
    origin: ModuleOrigin,
}

impl CompiledModule {
    /// Compile a Wasm binary.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CompilationFailed`] if `bytes` is not a valid
    /// Wasm binary.
    #[instrument(skip_all, fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RenderError> {
        check_magic(bytes)?;
        Self::compile(engine, bytes, ModuleOrigin::Binary)
    }

    /// Compile WebAssembly text.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CompilationFailed`] if the text does not parse
    /// or validate.
    #[instrument(skip_all, fields(bytes_len = wat.len()))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RenderError> {
        Self::compile(engine, wat.as_bytes(), ModuleOrigin::Text)
    }

    fn compile(engine: &Engine, source: &[u8], origin: ModuleOrigin) -> Result<Self, RenderError> {
        let start = Instant::now();
        let module = Module::new(engine, source)
            .map_err(|e| RenderError::compilation_failed(format!("{origin:?} module: {e}")))?;
        let content_hash = content_hash(source);

        info!(
            %content_hash,
            ?origin,
            duration_ms = start.elapsed().as_millis(),
            "Module compiled"
        );

        Ok(Self {
            module,
            content_hash: content_hash.into(),
            origin,
        })
    }

    /// Load an artifact written from [`CompiledModule::serialize`].
    ///
    /// The content hash is taken from the file stem, so artifacts keep the
    /// name [`CompiledModule::artifact_name`] gave them.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CompilationFailed`] if the file is missing or
    /// was produced by a different Wasmtime version or engine configuration.
    #[allow(unsafe_code)]
    #[instrument(skip(engine, path), fields(path = %path.as_ref().display()))]
    pub fn from_precompiled(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let start = Instant::now();

        // SAFETY: only artifacts written by `ssr-engine compile` for this
        // engine configuration are loaded; wasmtime checks version and
        // settings compatibility in the header.
        let module = unsafe { Module::deserialize_file(engine, path) }.map_err(|e| {
            RenderError::compilation_failed(format!(
                "Cannot load precompiled module {}: {e}",
                path.display()
            ))
        })?;

        let content_hash = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown");

        debug!(
            content_hash,
            duration_us = start.elapsed().as_micros(),
            "Precompiled module loaded"
        );

        Ok(Self {
            module,
            content_hash: content_hash.into(),
            origin: ModuleOrigin::Precompiled(path.to_path_buf()),
        })
    }

    /// Machine code for [`CompiledModule::from_precompiled`].
    ///
    /// # Errors
    ///
    /// Returns an error if wasmtime cannot serialize the module.
    pub fn serialize(&self) -> Result<Vec<u8>, RenderError> {
        self.module
            .serialize()
            .map_err(|e| RenderError::compilation_failed(format!("Cannot serialize module: {e}")))
    }

    /// File name to store [`CompiledModule::serialize`] output under.
    pub fn artifact_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.content_hash)
    }

    /// Hash of the source the module was compiled from.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn as_module(&self) -> &Module {
        &self.module
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Reject non-Wasm input before it reaches Cranelift.
fn check_magic(bytes: &[u8]) -> Result<(), RenderError> {
    match bytes.get(..4) {
        Some(magic) if magic == WASM_MAGIC && bytes.len() >= 8 => Ok(()),
        Some(magic) if magic != WASM_MAGIC => {
            Err(RenderError::compilation_failed("Not a Wasm binary: bad magic number"))
        }
        _ => Err(RenderError::compilation_failed("Not a Wasm binary: truncated header")),
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use ssr_engine_common::EngineConfig;

    // magic + version 1, no sections
    const EMPTY_MODULE: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_check_magic() {
        assert!(check_magic(EMPTY_MODULE).is_ok());
        assert!(check_magic(&[0x00, 0x61]).is_err());
        assert!(check_magic(&EMPTY_MODULE[..6]).is_err());
        assert!(check_magic(b"<html></html>").is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
        assert_eq!(content_hash(b"hello").len(), 16);
    }

    #[test]
    fn test_from_bytes() {
        let engine = engine();
        let module = CompiledModule::from_bytes(engine.inner(), EMPTY_MODULE).unwrap();

        assert_eq!(module.origin(), &ModuleOrigin::Binary);
        assert_eq!(module.artifact_name(), format!("{}.cwasm", module.content_hash()));
    }

    #[test]
    fn test_invalid_wat() {
        let engine = engine();
        let err = CompiledModule::from_wat(engine.inner(), "(module (func").unwrap_err();
        assert!(matches!(err, RenderError::CompilationFailed { .. }));
    }

    #[test]
    fn test_precompiled_artifact() {
        let engine = engine();
        let module =
            CompiledModule::from_wat(engine.inner(), r#"(module (func (export "render")))"#).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(module.artifact_name());
        std::fs::write(&path, module.serialize().unwrap()).unwrap();

        let loaded = CompiledModule::from_precompiled(engine.inner(), &path).unwrap();
        assert_eq!(loaded.content_hash(), module.content_hash());
        assert_eq!(loaded.origin(), &ModuleOrigin::Precompiled(path));
    }

    #[test]
    fn test_missing_artifact() {
        let engine = engine();
        let err = CompiledModule::from_precompiled(engine.inner(), "/nonexistent/app.cwasm")
            .unwrap_err();
        assert!(matches!(err, RenderError::CompilationFailed { .. }));
    }
}
