// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Closed set of wrapped native modules and the name-to-handle registry.
// Author: Lukas Bower

use core::num::NonZeroUsize;

use super::ResolveError;

/// Library name the runtime uses for symbols exported by the host process itself.
pub const INTERNAL_LIBRARY_NAME: &str = "__Internal";

/// Wrapped native module known to the loader shim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LibraryHandle {
    /// The hosting process itself.
    Internal,
    /// Runtime system-native support library.
    SystemNative,
    /// Runtime globalization support library.
    GlobalizationNative,
    /// Immediate-mode UI bindings.
    UiBindings,
    /// Media (window/audio/input) library.
    MediaLib,
    /// Image codec companion of the media library.
    MediaLibCodec,
    /// Console platform SDK.
    PlatformSdk,
}

impl LibraryHandle {
    /// Number of wrapped modules.
    pub const COUNT: usize = 7;

    /// Every handle in table order.
    pub const ALL: [LibraryHandle; LibraryHandle::COUNT] = [
        LibraryHandle::Internal,
        LibraryHandle::SystemNative,
        LibraryHandle::GlobalizationNative,
        LibraryHandle::UiBindings,
        LibraryHandle::MediaLib,
        LibraryHandle::MediaLibCodec,
        LibraryHandle::PlatformSdk,
    ];

    /// Library name the runtime asks for.
    #[must_use]
    pub const fn library_name(self) -> &'static str {
        match self {
            LibraryHandle::Internal => INTERNAL_LIBRARY_NAME,
            LibraryHandle::SystemNative => "libSystem.Native",
            LibraryHandle::GlobalizationNative => "libSystem.Globalization.Native",
            LibraryHandle::UiBindings => "cimgui",
            LibraryHandle::MediaLib => "SDL2",
            LibraryHandle::MediaLibCodec => "SDL2_image",
            LibraryHandle::PlatformSdk => "libnx",
        }
    }

    /// Position of this handle in [`LibraryHandle::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            LibraryHandle::Internal => 0,
            LibraryHandle::SystemNative => 1,
            LibraryHandle::GlobalizationNative => 2,
            LibraryHandle::UiBindings => 3,
            LibraryHandle::MediaLib => 4,
            LibraryHandle::MediaLibCodec => 5,
            LibraryHandle::PlatformSdk => 6,
        }
    }

    /// Opaque value handed across the C ABI.
    ///
    /// Raw handles live in `1..=COUNT`, inside the never-mapped first page, so
    /// they cannot alias a real allocation.
    #[must_use]
    pub const fn to_raw(self) -> NonZeroUsize {
        match NonZeroUsize::new(self.index() + 1) {
            Some(raw) => raw,
            None => NonZeroUsize::MIN,
        }
    }

    /// Decode a raw handle previously produced by [`LibraryHandle::to_raw`].
    #[must_use]
    pub fn from_raw(raw: usize) -> Option<LibraryHandle> {
        raw.checked_sub(1)
            .and_then(|idx| LibraryHandle::ALL.get(idx).copied())
    }
}

/// Map a requested library name onto a wrapped module.
///
/// An absent name and [`INTERNAL_LIBRARY_NAME`] both mean the host process.
/// Matching is exact and case-sensitive.
pub fn resolve_handle(name: Option<&str>) -> Result<LibraryHandle, ResolveError> {
    let Some(name) = name else {
        return Ok(LibraryHandle::Internal);
    };
    LibraryHandle::ALL
        .iter()
        .copied()
        .find(|handle| handle.library_name() == name)
        .ok_or_else(|| ResolveError::UnknownLibrary(name.to_owned()))
}
