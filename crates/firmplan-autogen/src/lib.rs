//!
//! ## Introduction
//! This crate resolves the metadata of a firmware platform build: the platform descriptor (DSC),
//! the module descriptors (INF) it lists, and the package declarations (DEC) those depend on. The
//! result is one build context per platform and architecture, and one per module inside it, with
//! everything a makefile or code generator needs already decided.
//!
//! Descriptors are not parsed here. They arrive as typed records through a
//! [`record::RecordStore`], so the resolver can be fed from a parser, a cache or a test fixture.
//!
//! ## Terminology
//!
//! ### PCDs
//! A **PCD** (platform configuration database item) is a named configuration value. Packages
//! declare it with a token space, a token value, a datum type and a default. Modules say how they
//! access it (their **PCD type**: `FixedAtBuild`, `PatchableInModule`, `FeatureFlag`, `Dynamic`,
//! `DynamicEx`, and the `Hii`/`Vpd` storage flavours of the last two). The platform gives values.
//!
//! The value a module ends up with is decided by the **override chain**:
//!
//! ```text
//! package declaration -> module usage -> platform setting -> platform component setting
//! ```
//!
//! Each step only replaces the fields it actually sets. See [`override_chain`].
//!
//! ### Library classes and instances
//! Modules link against **library classes**, and the platform binds each class to an
//! **instance** (itself a module descriptor), optionally per module type and per component. The
//! `NULL` class forces an instance into every module. Instances with constructors are ordered so
//! that a library's constructor runs before those of the libraries depending on it. See
//! [`library`].
//!
//! ### Build options
//! Build options are keyed `TARGET_TOOLCHAIN_ARCH_TOOL_ATTRIBUTE`, any of the first three fields
//! possibly `*`:
//!
//! ```text
//! GCC:*_*_X64_CC_FLAGS      = -mcmodel=small
//! GCC:DEBUG_GCC5_*_CC_FLAGS = -O0
//! ```
//!
//! Options are layered tool definition, module, platform, platform component. Within a layer, the
//! more specific of two overlapping `=` overrides wins. See [`build_option`].
//!
//! ### Build contexts
//! [`autogen::WorkspaceAutoGen`] drives one build: it creates an [`autogen::PlatformAutoGen`]
//! per arch, an [`autogen::ModuleAutoGen`] per component and library, collects every dynamic PCD
//! into one database and numbers the tokens. Contexts are cached by
//! `(target, toolchain, arch, descriptor)`, so asking twice yields the same one.
//!
//! ### VPD
//! Dynamic PCDs stored in flash (**VPD**) need an offset. Items given `*` get theirs from an
//! external tool; see [`vpd`].
pub mod as_built;
pub mod autogen;
pub mod build_option;
pub mod config;
pub mod database;
pub mod depex;
pub mod errors;
pub mod library;
pub mod meta_file;
pub mod module;
pub mod override_chain;
pub mod package;
pub mod pcd;
pub mod pcd_db;
pub mod platform;
pub mod record;
pub mod types;
pub mod vpd;

#[cfg(test)]
mod tests;

pub use autogen::{ModuleAutoGen, PlatformAutoGen, WorkspaceAutoGen};
pub use config::{BuildConfig, BuildConfigBuilder, ToolsDef};
pub use errors::{AutoGenError, AutoGenResult, ErrorCode};
pub use meta_file::MetaFile;
pub use record::{InMemoryRecordStore, Record, RecordKind, RecordStore};
