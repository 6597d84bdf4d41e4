// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-module symbol dispatch backing the runtime's dl fallback.
// Author: Lukas Bower

use core::ffi::c_void;
use core::fmt;
use core::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use super::handle::{resolve_handle, LibraryHandle};
use super::ResolveError;

/// Callable address returned to the runtime. Never null.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(NonZeroUsize);

impl SymbolAddress {
    /// Wrap a raw address, rejecting null.
    #[must_use]
    pub const fn new(addr: usize) -> Option<Self> {
        match NonZeroUsize::new(addr) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Wrap a code or data pointer, rejecting null.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    /// Address as an integer.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Address as the untyped pointer the runtime expects.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress(0x{:x})", self.0)
    }
}

/// Name-to-address routine exported by a wrapped module's binding layer.
pub type LookupFn = fn(&str) -> Option<SymbolAddress>;

/// Lookup routines for every wrapped module, indexed by [`LibraryHandle`].
#[derive(Clone, Copy, Default)]
pub struct ModuleTables {
    tables: [Option<LookupFn>; LibraryHandle::COUNT],
}

impl ModuleTables {
    /// Tables with no module registered.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            tables: [None; LibraryHandle::COUNT],
        }
    }

    /// Register the lookup routine for `handle`, replacing any earlier one.
    #[must_use]
    pub const fn with(mut self, handle: LibraryHandle, lookup: LookupFn) -> Self {
        self.tables[handle.index()] = Some(lookup);
        self
    }

    fn lookup(&self, handle: LibraryHandle, name: &str) -> Option<SymbolAddress> {
        self.tables[handle.index()].and_then(|lookup| lookup(name))
    }
}

impl fmt::Debug for ModuleTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for handle in LibraryHandle::ALL {
            if self.tables[handle.index()].is_some() {
                list.entry(&handle.library_name());
            }
        }
        list.finish()
    }
}

/// Host-provided function exposed through the `Internal` handle.
#[derive(Clone, Copy, Debug)]
pub struct HostExtension {
    /// Symbol name guest code binds to.
    pub name: &'static str,
    /// Function address.
    pub address: SymbolAddress,
}

/// Resolves `(handle, symbol)` pairs against static module tables.
///
/// Built once at startup and shared with runtime worker threads; lookups read
/// immutable data only.
#[derive(Debug)]
pub struct SymbolResolver {
    tables: ModuleTables,
    extensions: Vec<HostExtension>,
    verbose: AtomicBool,
}

impl SymbolResolver {
    /// Create a resolver over `tables` with the given `Internal` extensions.
    #[must_use]
    pub fn new(tables: ModuleTables, extensions: Vec<HostExtension>) -> Self {
        Self {
            tables,
            extensions,
            verbose: AtomicBool::new(false),
        }
    }

    /// Enable or disable logging of failed lookups.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    fn verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Map a library name to its handle, logging misses when verbose.
    pub fn load(&self, name: Option<&str>) -> Result<LibraryHandle, ResolveError> {
        resolve_handle(name).map_err(|err| {
            if self.verbose() {
                warn!("[dl] load: {err}");
            }
            err
        })
    }

    /// Resolve `name` inside the module identified by `handle`.
    pub fn resolve_symbol(
        &self,
        handle: LibraryHandle,
        name: &str,
    ) -> Result<SymbolAddress, ResolveError> {
        let found = match handle {
            LibraryHandle::Internal => self
                .extension(name)
                .or_else(|| self.tables.lookup(handle, name)),
            LibraryHandle::SystemNative
            | LibraryHandle::GlobalizationNative
            | LibraryHandle::UiBindings
            | LibraryHandle::MediaLib
            | LibraryHandle::MediaLibCodec
            | LibraryHandle::PlatformSdk => self.tables.lookup(handle, name),
        };
        found.ok_or_else(|| {
            let err = ResolveError::UnknownSymbol {
                library: handle.library_name(),
                symbol: name.to_owned(),
            };
            if self.verbose() {
                warn!("[dl] symbol: {err}");
            }
            err
        })
    }

    /// Resolve against a raw handle received over the C ABI.
    pub fn resolve_raw(&self, raw: usize, name: &str) -> Result<SymbolAddress, ResolveError> {
        match LibraryHandle::from_raw(raw) {
            Some(handle) => self.resolve_symbol(handle, name),
            None => {
                let err = ResolveError::InvalidHandle(raw);
                if self.verbose() {
                    warn!("[dl] symbol: {err} symbol={name}");
                }
                Err(err)
            }
        }
    }

    /// Release a handle. Wrapped modules are static, so this never fails.
    pub fn close(&self, _handle: LibraryHandle) {}

    fn extension(&self, name: &str) -> Option<SymbolAddress> {
        self.extensions
            .iter()
            .find(|ext| ext.name == name)
            .map(|ext| ext.address)
    }
}
