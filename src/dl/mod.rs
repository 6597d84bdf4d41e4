// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Loader shim answering the runtime's library and symbol lookups from static tables.
// Author: Lukas Bower

//! Stand-in for the platform's missing dynamic loader.
//!
//! The runtime "loads" a library by name and receives a [`LibraryHandle`];
//! symbols are then resolved against the statically linked lookup routine
//! registered for that handle in [`ModuleTables`]. Nothing here touches the
//! filesystem.

pub mod ffi;
pub mod handle;
pub mod symbols;

use thiserror::Error;

pub use handle::{resolve_handle, LibraryHandle, INTERNAL_LIBRARY_NAME};
pub use symbols::{HostExtension, LookupFn, ModuleTables, SymbolAddress, SymbolResolver};

/// Lookup failures. Both are soft: the runtime decides how to cope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No wrapped module carries this name.
    #[error("unknown library {0}")]
    UnknownLibrary(String),
    /// The raw handle does not decode to a wrapped module.
    #[error("invalid handle 0x{0:x}")]
    InvalidHandle(usize),
    /// The module has no symbol with this name.
    #[error("invalid symbol {symbol} in {library}")]
    UnknownSymbol {
        /// Library the lookup targeted.
        library: &'static str,
        /// Requested symbol name.
        symbol: String,
    },
}
