//! The emission pipeline.
//!
//! ## Architecture
//!
//! [`MetadataWriter`] drives one module through a fixed sequence of phases:
//!
//! 1. walk - assign definition rows, discover references ([`walker`])
//! 2. bodies - serialize IL, claim `StandAloneSig` rows and `#US` offsets ([`bodies`])
//! 3. populate - fill every metadata table and heap ([`populate`])
//! 4. freeze - seal heaps, fix index widths and the `.text` layout ([`crate::metadata::sizes`],
//!    [`pe::TextLayout`])
//! 5. serialize - metadata blob, then the PE image ([`streams`], [`pe`])
//!
//! Later phases only widen earlier decisions into bytes; nothing after the freeze may change
//! a size. Cancellation is cooperative and checked at each phase boundary, never mid-phase.
//!
//! ## Key Components
//!
//! - [`MetadataWriter`] - one emission session over a borrowed [`Module`]
//! - [`EmitOptions`] - image and metadata-root knobs
//! - [`CancellationToken`] - shared flag polled between phases
//! - [`DebugSink`] - callback surface for symbol writers

pub mod bodies;
pub mod output;
pub mod pe;
pub mod populate;
pub mod refs;
pub mod signatures;
pub mod streams;
pub mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::diagnostics::DiagnosticSink;
use crate::metadata::heaps::{BlobsBuilder, GuidsBuilder, StringsBuilder, UserStringsBuilder};
use crate::metadata::sizes::MetadataSizes;
use crate::metadata::tables::{TableId, TableSet};
use crate::metadata::token::Token;
use crate::model::Module;
use crate::writer::pe::{ImageContent, PeOptions, TextLayout};
use crate::writer::refs::ModuleIndices;
use crate::writer::streams::MetadataRootOptions;
use crate::{Error, Result};

/// Shared flag for cancelling an emission between phases.
///
/// Clones observe the same flag. Cancellation is cooperative; a phase in progress runs to its
/// end before the session notices.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Callback surface a symbol writer implements to learn where bodies landed.
///
/// Called once per serialized method body, in declaration order, after the image layout is
/// frozen. Implementations report failures as [`Error::DebugInfoWriteFailed`].
pub trait DebugSink {
    fn method_body_emitted(
        &mut self,
        method: Token,
        rva: u32,
        local_signature: Token,
    ) -> Result<()>;
}

/// Everything configurable about one emission.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Target runtime version written to the metadata root.
    pub runtime_version: String,
    /// Emit a minimal edit-and-continue delta: all indices wide, `#JTD` marker present.
    pub is_minimal_delta: bool,
    pub pe: PeOptions,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            runtime_version: "v4.0.30319".to_string(),
            is_minimal_delta: false,
            pe: PeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Created,
    Walked,
    BodiesSerialized,
    TablesPopulated,
    MetadataSerialized,
}

/// One emission session: borrows a module, produces a PE image.
pub struct MetadataWriter<'a> {
    module: &'a Module,
    options: EmitOptions,
    diagnostics: &'a mut dyn DiagnosticSink,
    debug_sink: Option<&'a mut dyn DebugSink>,
    cancellation: CancellationToken,
    phase: Phase,
}

impl<'a> MetadataWriter<'a> {
    pub fn new(
        module: &'a Module,
        options: EmitOptions,
        diagnostics: &'a mut dyn DiagnosticSink,
    ) -> Self {
        MetadataWriter {
            module,
            options,
            diagnostics,
            debug_sink: None,
            cancellation: CancellationToken::new(),
            phase: Phase::Created,
        }
    }

    #[must_use]
    pub fn with_debug_sink(mut self, sink: &'a mut dyn DebugSink) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn advance(&mut self, next: Phase) -> Result<()> {
        debug_assert!(self.phase < next, "phases advance monotonically");
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.phase = next;
        Ok(())
    }

    /// Runs the whole pipeline and returns the finished image.
    pub fn emit(mut self) -> Result<Vec<u8>> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut indices = ModuleIndices::default();
        walker::walk(self.module, &mut indices)?;
        self.advance(Phase::Walked)?;

        let mut user_strings = UserStringsBuilder::new();
        let serialized_bodies =
            bodies::serialize_method_bodies(self.module, &mut indices, &mut user_strings)?;
        self.advance(Phase::BodiesSerialized)?;

        let mut strings = StringsBuilder::new();
        let mut blobs = BlobsBuilder::new();
        let mut guids = GuidsBuilder::new();
        let mut tables = TableSet::default();
        let blocks = populate::populate_tables(
            self.module,
            &indices,
            &serialized_bodies.body_offsets,
            &mut strings,
            &mut blobs,
            &mut guids,
            &mut tables,
            &mut *self.diagnostics,
        )?;
        self.advance(Phase::TablesPopulated)?;

        strings.seal();
        user_strings.seal();
        blobs.seal();
        guids.seal();
        let sizes = MetadataSizes::new(
            &tables,
            strings.unaligned_size()?,
            user_strings.unaligned_size(),
            blobs.unaligned_size(),
            guids.size(),
            self.options.is_minimal_delta,
        );
        let root_options = MetadataRootOptions {
            runtime_version: self.options.runtime_version.clone(),
            is_minimal_delta: self.options.is_minimal_delta,
        };

        let layout = TextLayout::compute(
            &self.options.pe,
            serialized_bodies.il_stream.len() as u32,
            streams::metadata_size(&sizes, &root_options),
            blocks.managed_resources.len() as u32,
            blocks.mapped_field_data.len() as u32,
        );
        let metadata = streams::serialize_metadata(
            &tables,
            &sizes,
            &strings,
            &user_strings,
            &blobs,
            &guids,
            &root_options,
            layout.il_rva(),
            layout.mapped_field_data_rva(),
        )?;
        self.advance(Phase::MetadataSerialized)?;

        if let Some(sink) = self.debug_sink.take() {
            notify_debug_sink(self.module, &indices, &serialized_bodies, &layout, sink)?;
        }

        let entry_point_token = match self.module.entry_point {
            Some(id) => Token::from_table_row(TableId::MethodDef, indices.method_row(id)?).value(),
            None => 0,
        };
        let content = ImageContent {
            il: &serialized_bodies.il_stream,
            metadata: &metadata.bytes,
            metadata_mvid_offset: if self.options.pe.deterministic {
                metadata.mvid_offset
            } else {
                None
            },
            managed_resources: &blocks.managed_resources,
            mapped_field_data: &blocks.mapped_field_data,
            entry_point_token,
            win32_resources: self.module.win32_resources.as_deref(),
        };
        pe::write_image(&self.options.pe, &layout, &content)
    }
}

fn notify_debug_sink(
    module: &Module,
    indices: &ModuleIndices,
    serialized_bodies: &bodies::SerializedBodies,
    layout: &TextLayout,
    sink: &mut dyn DebugSink,
) -> Result<()> {
    for type_def in &module.type_defs {
        for method_id in &type_def.methods {
            let Some(offset) = serialized_bodies.body_offsets.get(method_id) else {
                continue;
            };
            let method = Token::from_table_row(TableId::MethodDef, indices.method_row(*method_id)?);
            let local_signature = Token(
                serialized_bodies
                    .local_signature_tokens
                    .get(method_id)
                    .copied()
                    .unwrap_or(0),
            );
            sink.method_body_emitted(method, layout.il_rva() + offset, local_signature)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::model::body::MethodBody;
    use crate::model::members::{
        Method, MethodFlags, MethodImplFlags, MethodSignature, SignatureParam, TypeDef,
    };
    use crate::model::types::{PrimitiveKind, TypeShape};
    use crate::model::MethodId;

    fn hello_module() -> Module {
        let mut module = Module::new("app.exe");
        let mut module_type = TypeDef {
            name: "<Module>".to_string(),
            ..TypeDef::default()
        };
        module.methods.push(Method {
            name: "Main".to_string(),
            flags: MethodFlags::STATIC,
            impl_flags: MethodImplFlags::empty(),
            signature: MethodSignature {
                has_this: false,
                explicit_this: false,
                calling_convention: Default::default(),
                generic_param_count: 0,
                return_type: SignatureParam::plain(TypeShape::Primitive(PrimitiveKind::Void)),
                params: Vec::new(),
            },
            params: Vec::new(),
            return_param: None,
            generic_params: Vec::new(),
            body: Some(MethodBody {
                il: vec![0x2A],
                max_stack: 8,
                ..MethodBody::default()
            }),
            pinvoke: None,
            security: Vec::new(),
            custom_attributes: Vec::new(),
        });
        module_type.methods.push(MethodId(0));
        module.type_defs.push(module_type);
        module.entry_point = Some(MethodId(0));
        module
    }

    #[test]
    fn test_emit_produces_a_pe_image_with_metadata() {
        let module = hello_module();
        let mut sink = CollectingSink::default();
        let image = MetadataWriter::new(&module, EmitOptions::default(), &mut sink)
            .emit()
            .expect("emission should succeed");
        assert_eq!(&image[0..2], b"MZ");
        assert!(image.windows(4).any(|w| w == b"BSJB"));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_emit_is_reproducible() {
        let module = hello_module();
        let mut sink = CollectingSink::default();
        let first = MetadataWriter::new(&module, EmitOptions::default(), &mut sink)
            .emit()
            .expect("emission should succeed");
        let second = MetadataWriter::new(&module, EmitOptions::default(), &mut sink)
            .emit()
            .expect("emission should succeed");
        assert_eq!(first, second);
    }

    #[test]
    fn test_cancelled_session_stops_at_the_first_boundary() {
        let module = hello_module();
        let mut sink = CollectingSink::default();
        let token = CancellationToken::new();
        token.cancel();
        let result = MetadataWriter::new(&module, EmitOptions::default(), &mut sink)
            .with_cancellation(token)
            .emit();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    struct RecordingDebugSink {
        calls: Vec<(u32, u32, u32)>,
    }

    impl DebugSink for RecordingDebugSink {
        fn method_body_emitted(
            &mut self,
            method: Token,
            rva: u32,
            local_signature: Token,
        ) -> Result<()> {
            self.calls.push((method.value(), rva, local_signature.value()));
            Ok(())
        }
    }

    #[test]
    fn test_debug_sink_sees_each_body_once() {
        let module = hello_module();
        let mut sink = CollectingSink::default();
        let mut debug = RecordingDebugSink { calls: Vec::new() };
        MetadataWriter::new(&module, EmitOptions::default(), &mut sink)
            .with_debug_sink(&mut debug)
            .emit()
            .expect("emission should succeed");
        assert_eq!(debug.calls.len(), 1);
        let (method, rva, local_signature) = debug.calls[0];
        assert_eq!(method, 0x0600_0001);
        assert!(rva >= 0x2000, "body RVA lands inside .text");
        assert_eq!(local_signature, 0);
    }
}
