//! Host function registration for Wasmtime linkers.
//!
//! Every function lives in the `env` module. Functions returning data write
//! into a guest buffer `(ptr, cap)` and return the number of bytes written;
//! they return `-1` when the buffer is too small or out of bounds, and do
//! not write anything in that case. Callers size buffers with the matching
//! `*_len` function first.

use std::ops::Range;
use std::sync::Arc;

use ssr_engine_common::RenderError;
use ssr_engine_core::store::GuestContext;
use tracing::warn;
use wasmtime::{Caller, Linker, Memory};

use crate::document::DocumentHost;
use crate::logging::{LoggingHost, level_from_i32};
use crate::request::RequestHost;
use crate::response::ResponseHost;

const OK: i32 = 0;
const ERR: i32 = -1;

/// Register all host functions on a linker.
///
/// | import | signature |
/// |--------|-----------|
/// | `log` | `(level, ptr, len)` |
/// | `url_len` | `() -> len` |
/// | `url_read` | `(ptr, cap) -> written` |
/// | `header_len` | `(name_ptr, name_len) -> len` (`-1` if absent) |
/// | `header_read` | `(name_ptr, name_len, ptr, cap) -> written` |
/// | `document_len` | `() -> len` |
/// | `document_read` | `(ptr, cap) -> written` |
/// | `document_write` | `(ptr, len) -> 0 / -1` |
/// | `set_status` | `(status) -> 0 / -1` |
/// | `set_header` | `(name_ptr, name_len, value_ptr, value_len) -> 0 / -1` |
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<GuestContext>) -> Result<(), RenderError> {
    register_logging(linker)?;
    register_request(linker)?;
    register_document(linker)?;
    register_response(linker)?;
    Ok(())
}

/// Register `env::log(level: i32, ptr: i32, len: i32)`.
///
/// Levels: 0=debug, 1=info, 2=warn, 3=error.
pub fn register_logging(linker: &mut Linker<GuestContext>) -> Result<(), RenderError> {
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, GuestContext>, level: i32, ptr: i32, len: i32| {
                let Some(message) = read_guest_string(&mut caller, ptr, len) else {
                    return;
                };
                LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| registration_failed("log", &e))?;

    Ok(())
}

/// Register `env::url_len`, `env::url_read`, `env::header_len` and
/// `env::header_read`.
pub fn register_request(linker: &mut Linker<GuestContext>) -> Result<(), RenderError> {
    linker
        .func_wrap("env", "url_len", |caller: Caller<'_, GuestContext>| -> i32 {
            len_to_i32(RequestHost::url(caller.data()).len())
        })
        .map_err(|e| registration_failed("url_len", &e))?;

    linker
        .func_wrap(
            "env",
            "url_read",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, cap: i32| -> i32 {
                let request = Arc::clone(&caller.data().request);
                write_guest_bytes(&mut caller, ptr, cap, request.url.as_bytes())
            },
        )
        .map_err(|e| registration_failed("url_read", &e))?;

    linker
        .func_wrap(
            "env",
            "header_len",
            |mut caller: Caller<'_, GuestContext>, name_ptr: i32, name_len: i32| -> i32 {
                let Some(name) = read_guest_string(&mut caller, name_ptr, name_len) else {
                    return ERR;
                };
                RequestHost::header(caller.data(), &name).map_or(ERR, |v| len_to_i32(v.len()))
            },
        )
        .map_err(|e| registration_failed("header_len", &e))?;

    linker
        .func_wrap(
            "env",
            "header_read",
            |mut caller: Caller<'_, GuestContext>,
             name_ptr: i32,
             name_len: i32,
             ptr: i32,
             cap: i32|
             -> i32 {
                let Some(name) = read_guest_string(&mut caller, name_ptr, name_len) else {
                    return ERR;
                };
                let request = Arc::clone(&caller.data().request);
                match request.header(&name) {
                    Some(value) => write_guest_bytes(&mut caller, ptr, cap, value.as_bytes()),
                    None => ERR,
                }
            },
        )
        .map_err(|e| registration_failed("header_read", &e))?;

    Ok(())
}

/// Register `env::document_len`, `env::document_read` and `env::document_write`.
pub fn register_document(linker: &mut Linker<GuestContext>) -> Result<(), RenderError> {
    linker
        .func_wrap("env", "document_len", |caller: Caller<'_, GuestContext>| -> i32 {
            len_to_i32(DocumentHost::read(caller.data()).len())
        })
        .map_err(|e| registration_failed("document_len", &e))?;

    linker
        .func_wrap(
            "env",
            "document_read",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, cap: i32| -> i32 {
                let document = DocumentHost::read(caller.data());
                write_guest_bytes(&mut caller, ptr, cap, document.as_bytes())
            },
        )
        .map_err(|e| registration_failed("document_read", &e))?;

    linker
        .func_wrap(
            "env",
            "document_write",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, len: i32| -> i32 {
                let Some(document) = read_guest_string(&mut caller, ptr, len) else {
                    return ERR;
                };
                DocumentHost::write(caller.data(), document);
                OK
            },
        )
        .map_err(|e| registration_failed("document_write", &e))?;

    Ok(())
}

/// Register `env::set_status` and `env::set_header`.
pub fn register_response(linker: &mut Linker<GuestContext>) -> Result<(), RenderError> {
    linker
        .func_wrap(
            "env",
            "set_status",
            |caller: Caller<'_, GuestContext>, status: i32| -> i32 {
                if ResponseHost::set_status(caller.data(), status) {
                    OK
                } else {
                    ERR
                }
            },
        )
        .map_err(|e| registration_failed("set_status", &e))?;

    linker
        .func_wrap(
            "env",
            "set_header",
            |mut caller: Caller<'_, GuestContext>,
             name_ptr: i32,
             name_len: i32,
             value_ptr: i32,
             value_len: i32|
             -> i32 {
                let Some(name) = read_guest_string(&mut caller, name_ptr, name_len) else {
                    return ERR;
                };
                let Some(value) = read_guest_string(&mut caller, value_ptr, value_len) else {
                    return ERR;
                };
                if ResponseHost::set_header(caller.data(), name, value) {
                    OK
                } else {
                    ERR
                }
            },
        )
        .map_err(|e| registration_failed("set_header", &e))?;

    Ok(())
}

fn registration_failed(name: &str, error: &wasmtime::Error) -> RenderError {
    RenderError::invalid_config(format!("Failed to register {name} function: {error}"))
}

fn guest_memory(caller: &mut Caller<'_, GuestContext>) -> Option<Memory> {
    let memory = caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory);
    if memory.is_none() {
        warn!("Memory export not found in guest module");
    }
    memory
}

/// Validate `ptr..ptr + len` against a memory of `size` bytes.
fn guest_range(ptr: i32, len: i32, size: usize) -> Option<Range<usize>> {
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        warn!(ptr, len, "Invalid pointer or length (negative value)");
        return None;
    };
    let Some(end) = start.checked_add(len) else {
        warn!(ptr, len, "Pointer + length overflow");
        return None;
    };
    if end > size {
        warn!(start, end, memory_size = size, "Memory access out of bounds");
        return None;
    }
    Some(start..end)
}

/// Copy a UTF-8 string out of guest memory.
fn read_guest_string(caller: &mut Caller<'_, GuestContext>, ptr: i32, len: i32) -> Option<String> {
    let memory = guest_memory(caller)?;
    let data = memory.data(&*caller);
    let range = guest_range(ptr, len, data.len())?;

    match std::str::from_utf8(&data[range]) {
        Ok(text) => Some(text.to_string()),
        Err(e) => {
            warn!(error = %e, "Guest passed invalid UTF-8");
            None
        }
    }
}

/// Copy `bytes` into the guest buffer `ptr..ptr + cap`.
fn write_guest_bytes(caller: &mut Caller<'_, GuestContext>, ptr: i32, cap: i32, bytes: &[u8]) -> i32 {
    let Ok(len) = i32::try_from(bytes.len()) else {
        return ERR;
    };
    if len > cap {
        return ERR;
    }

    let Some(memory) = guest_memory(caller) else {
        return ERR;
    };
    let data = memory.data_mut(&mut *caller);
    let Some(range) = guest_range(ptr, len, data.len()) else {
        return ERR;
    };

    data[range].copy_from_slice(bytes);
    len
}

fn len_to_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(ERR)
}
