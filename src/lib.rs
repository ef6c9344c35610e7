// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

//! # cilemit
//!
//! A pure-Rust writer for ECMA-335 CLI metadata and PE images. `cilemit` takes an in-memory
//! module description and produces a complete, loadable .NET executable or library: metadata
//! tables and heaps, serialized method bodies, and the surrounding PE plumbing, without
//! requiring Windows or the .NET runtime.
//!
//! ## Features
//!
//! - **Complete table emission** - All ECMA-335 metadata tables, coded indices and heap
//!   references with automatic 2-vs-4-byte width selection
//! - **Method body serialization** - Tiny/fat header selection, exception handling sections,
//!   pseudo-token fixup and identical-body folding
//! - **PE image assembly** - PE32 and PE32+ images with the CLI header, startup stub and
//!   relocations where the target machine needs them
//! - **Deterministic output** - Content-derived module version id and timestamp, so equal
//!   input modules produce byte-identical images
//! - **Edit and continue** - Delta metadata with `EncLog`/`EncMap` tables and minimal-delta
//!   heap layout
//!
//! ## Quick Start
//!
//! ```rust
//! use cilemit::diagnostics::CollectingSink;
//! use cilemit::model::Module;
//! use cilemit::writer::{EmitOptions, MetadataWriter};
//!
//! let module = Module::new("empty.dll");
//! let mut diagnostics = CollectingSink::default();
//! let image = MetadataWriter::new(&module, EmitOptions::default(), &mut diagnostics).emit()?;
//! assert!(image.starts_with(b"MZ"));
//! # Ok::<(), cilemit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`model`] - The module description the caller builds: types, members, bodies, attributes
//! - [`metadata`] - Physical format building blocks: tokens, tables, heaps, size arithmetic
//! - [`writer`] - The emission pipeline from model walk to finished image
//! - [`diagnostics`] - Recoverable warnings raised during emission
//! - [`Error`] and [`Result`] - Error handling across the crate

pub mod diagnostics;
pub mod metadata;
pub mod model;
pub mod prelude;
pub mod writer;

mod error;

pub use error::{Error, Result};
pub use writer::{CancellationToken, DebugSink, EmitOptions, MetadataWriter};
