// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: C ABI entry points matching the runtime's dl-fallback callback signatures.
// Author: Lukas Bower
#![allow(unsafe_code)]

//! `extern "C"` trampolines registered with the runtime as its loader fallback.
//!
//! `user_data` is the pointer returned by [`resolver_user_data`]; the host
//! keeps the owning `Arc` alive for as long as the runtime may call back.

use core::ffi::{c_char, c_int, c_void, CStr};
use core::ptr;
use std::sync::Arc;

use super::handle::LibraryHandle;
use super::symbols::SymbolResolver;

/// Pointer to pass as `user_data` when registering the trampolines.
#[must_use]
pub fn resolver_user_data(resolver: &Arc<SymbolResolver>) -> *mut c_void {
    Arc::as_ptr(resolver) as *mut c_void
}

unsafe fn resolver_from<'a>(user_data: *mut c_void) -> Option<&'a SymbolResolver> {
    // SAFETY: caller guarantees `user_data` came from `resolver_user_data` and is still alive.
    unsafe { (user_data as *const SymbolResolver).as_ref() }
}

unsafe fn name_from<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    // SAFETY: the runtime passes NUL-terminated names that outlive the call.
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}

/// Loader fallback: map a library name to an opaque handle, or null.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string and `user_data` must
/// come from [`resolver_user_data`].
#[no_mangle]
pub unsafe extern "C" fn embedhost_dl_load(
    name: *const c_char,
    _flags: c_int,
    _err: *mut *mut c_char,
    user_data: *mut c_void,
) -> *mut c_void {
    // SAFETY: forwarded from this function's contract.
    let Some(resolver) = (unsafe { resolver_from(user_data) }) else {
        return ptr::null_mut();
    };
    let requested = if name.is_null() {
        None
    } else {
        // SAFETY: non-null and valid per this function's contract.
        match unsafe { name_from(name) } {
            Some(name) => Some(name),
            None => return ptr::null_mut(),
        }
    };
    match resolver.load(requested) {
        Ok(handle) => handle.to_raw().get() as *mut c_void,
        Err(_) => ptr::null_mut(),
    }
}

/// Loader fallback: resolve a symbol inside a previously returned handle, or null.
///
/// # Safety
/// `name` must be a valid NUL-terminated string and `user_data` must come from
/// [`resolver_user_data`].
#[no_mangle]
pub unsafe extern "C" fn embedhost_dl_symbol(
    handle: *mut c_void,
    name: *const c_char,
    _err: *mut *mut c_char,
    user_data: *mut c_void,
) -> *mut c_void {
    // SAFETY: forwarded from this function's contract.
    let Some(resolver) = (unsafe { resolver_from(user_data) }) else {
        return ptr::null_mut();
    };
    // SAFETY: forwarded from this function's contract.
    let Some(name) = (unsafe { name_from(name) }) else {
        return ptr::null_mut();
    };
    match resolver.resolve_raw(handle as usize, name) {
        Ok(addr) => addr.as_ptr(),
        Err(_) => ptr::null_mut(),
    }
}

/// Loader fallback: close a handle. Wrapped modules are static; always null.
///
/// # Safety
/// `user_data` must be null or come from [`resolver_user_data`].
#[no_mangle]
pub unsafe extern "C" fn embedhost_dl_close(handle: *mut c_void, user_data: *mut c_void) -> *mut c_void {
    // SAFETY: forwarded from this function's contract.
    if let Some(resolver) = unsafe { resolver_from(user_data) } {
        if let Some(handle) = LibraryHandle::from_raw(handle as usize) {
            resolver.close(handle);
        }
    }
    ptr::null_mut()
}
