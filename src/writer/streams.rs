//! Metadata root and stream serialization.
//!
//! ## Architecture
//!
//! The metadata blob is the root header (`BSJB` magic, runtime version, stream directory)
//! followed by the streams in fixed order: `#~`, `#Strings`, `#US`, `#GUID`, `#Blob`, plus a
//! zero-length `#JTD` marker on minimal edit-and-continue deltas. Every size here must agree
//! with [`MetadataSizes`], which froze the layout before serialization started; the stream
//! directory is written from those sizes, not measured afterwards.
//!
//! Two columns get rebased while rows are written out: `MethodDef.RVA` adds the IL block's
//! image RVA (bodiless methods write 0) and `FieldRVA` adds the mapped-field-data RVA.

use crate::metadata::heaps::{
    BlobHandle, BlobsBuilder, GuidHandle, GuidsBuilder, StringHandle, StringsBuilder,
    UserStringsBuilder,
};
use crate::metadata::sizes::MetadataSizes;
use crate::metadata::tables::{TableId, TableSet, SORTED_TABLES_MASK};
use crate::writer::output::Output;
use crate::{Error, Result};

const METADATA_MAGIC: u32 = 0x424A_5342;
const METADATA_MAJOR_VERSION: u16 = 1;
const METADATA_MINOR_VERSION: u16 = 1;

/// Inputs that shape the metadata root header.
#[derive(Debug, Clone)]
pub struct MetadataRootOptions {
    /// Target runtime version string, e.g. `v4.0.30319`.
    pub runtime_version: String,
    pub is_minimal_delta: bool,
}

impl Default for MetadataRootOptions {
    fn default() -> Self {
        MetadataRootOptions {
            runtime_version: "v4.0.30319".to_string(),
            is_minimal_delta: false,
        }
    }
}

/// The serialized metadata blob with the offsets later stages patch or point at.
#[derive(Debug)]
pub struct SerializedMetadata {
    pub bytes: Vec<u8>,
    /// Offset of the module version GUID within `bytes`, for the deterministic-id patch.
    pub mvid_offset: Option<u32>,
}

/// Total size of the metadata blob [`serialize_metadata`] will produce.
///
/// The PE layout needs this before serialization because the blob's own contents depend on
/// RVAs the layout assigns.
#[must_use]
pub fn metadata_size(sizes: &MetadataSizes, options: &MetadataRootOptions) -> u32 {
    let version_bytes = options.runtime_version.len() as u32;
    let padded_version = (version_bytes + 1 + 3) & !3;
    let mut size = 16 + padded_version + 4;
    size += stream_header_size("#~")
        + stream_header_size("#Strings")
        + stream_header_size("#US")
        + stream_header_size("#GUID")
        + stream_header_size("#Blob");
    if options.is_minimal_delta {
        size += stream_header_size("#JTD");
    }
    size + sizes.table_stream_size()
        + sizes.string_heap_size
        + sizes.user_string_heap_size
        + sizes.guid_heap_size
        + sizes.blob_heap_size
}

/// Serializes the complete metadata blob.
///
/// `il_base_rva` is the image RVA the IL block will land at; `mapped_field_data_rva` the RVA
/// of the `FieldRVA` data block.
#[allow(clippy::too_many_arguments)]
pub fn serialize_metadata(
    tables: &TableSet,
    sizes: &MetadataSizes,
    strings: &StringsBuilder,
    user_strings: &UserStringsBuilder,
    blobs: &BlobsBuilder,
    guids: &GuidsBuilder,
    options: &MetadataRootOptions,
    il_base_rva: u32,
    mapped_field_data_rva: u32,
) -> Result<SerializedMetadata> {
    let mut output = Output::new();

    let table_stream_size = sizes.table_stream_size();
    let guid_heap_offset = serialize_root_header(&mut output, sizes, options, table_stream_size);

    let table_stream_start = output.position();
    serialize_table_stream(
        &mut output,
        tables,
        sizes,
        strings,
        il_base_rva,
        mapped_field_data_rva,
    )?;
    output.align(4);
    if output.position() - table_stream_start != table_stream_size {
        return Err(Error::InvariantViolated(
            "table stream size diverged from the frozen layout",
        ));
    }

    write_padded_heap(&mut output, strings.bytes()?, sizes.string_heap_size);
    write_padded_heap(&mut output, user_strings.bytes(), sizes.user_string_heap_size);

    let guid_bytes = guids.bytes();
    let guid_heap_start = output.position();
    debug_assert_eq!(guid_heap_start, guid_heap_offset);
    output.write_bytes(&guid_bytes);

    write_padded_heap(&mut output, blobs.bytes(), sizes.blob_heap_size);

    let mvid_offset = tables.module.first().and_then(|row| {
        guids
            .offset_of(row.module_version_id)
            .map(|offset| guid_heap_start + offset)
    });

    Ok(SerializedMetadata {
        bytes: output.into_bytes(),
        mvid_offset,
    })
}

fn write_padded_heap(output: &mut Output, bytes: &[u8], aligned_size: u32) {
    output.write_bytes(bytes);
    output.pad(aligned_size - bytes.len() as u32);
}

/// Writes the root header and stream directory, returning the `#GUID` heap's offset.
fn serialize_root_header(
    output: &mut Output,
    sizes: &MetadataSizes,
    options: &MetadataRootOptions,
    table_stream_size: u32,
) -> u32 {
    output.write_u32(METADATA_MAGIC);
    output.write_u16(METADATA_MAJOR_VERSION);
    output.write_u16(METADATA_MINOR_VERSION);
    output.write_u32(0);

    let version_bytes = options.runtime_version.as_bytes();
    let padded_version = (version_bytes.len() as u32 + 1 + 3) & !3;
    output.write_u32(padded_version);
    output.write_bytes(version_bytes);
    output.pad(padded_version - version_bytes.len() as u32);

    output.write_u16(0);
    let stream_count = if options.is_minimal_delta { 6 } else { 5 };
    output.write_u16(stream_count);

    // Directory size is knowable up front, so stream offsets are too.
    let header_size = output.position()
        + stream_header_size("#~")
        + stream_header_size("#Strings")
        + stream_header_size("#US")
        + stream_header_size("#GUID")
        + stream_header_size("#Blob")
        + if options.is_minimal_delta {
            stream_header_size("#JTD")
        } else {
            0
        };

    fn write_header(output: &mut Output, offset: &mut u32, name: &str, size: u32) {
        output.write_u32(*offset);
        output.write_u32(size);
        let name_bytes = name.as_bytes();
        output.write_bytes(name_bytes);
        let padded = (name_bytes.len() as u32 + 1 + 3) & !3;
        output.pad(padded - name_bytes.len() as u32);
        *offset += size;
    }

    let mut offset = header_size;
    write_header(output, &mut offset, "#~", table_stream_size);
    write_header(output, &mut offset, "#Strings", sizes.string_heap_size);
    write_header(output, &mut offset, "#US", sizes.user_string_heap_size);
    let guid_heap_offset = offset;
    write_header(output, &mut offset, "#GUID", sizes.guid_heap_size);
    write_header(output, &mut offset, "#Blob", sizes.blob_heap_size);
    if options.is_minimal_delta {
        write_header(output, &mut offset, "#JTD", 0);
    }
    guid_heap_offset
}

fn stream_header_size(name: &str) -> u32 {
    8 + ((name.len() as u32 + 1 + 3) & !3)
}

struct RowWriter<'a> {
    output: &'a mut Output,
    sizes: &'a MetadataSizes,
    strings: &'a StringsBuilder,
}

impl RowWriter<'_> {
    fn write_value(&mut self, width: u32, value: u32) {
        if width == 2 {
            self.output.write_u16(value as u16);
        } else {
            self.output.write_u32(value);
        }
    }

    fn write_string(&mut self, handle: StringHandle) -> Result<()> {
        let offset = self.strings.resolve(handle)?;
        self.write_value(self.sizes.string_index_size(), offset);
        Ok(())
    }

    fn write_blob(&mut self, handle: BlobHandle) {
        self.write_value(self.sizes.blob_index_size(), handle.0);
    }

    fn write_guid(&mut self, handle: GuidHandle) {
        self.write_value(self.sizes.guid_index_size(), handle.0);
    }

    fn write_index(&mut self, table: TableId, row: u32) {
        self.write_value(self.sizes.table_index_size(table), row);
    }

    fn write_coded(&mut self, kind: crate::metadata::tables::CodedIndexKind, value: u32) {
        self.write_value(self.sizes.coded_index_size(kind), value);
    }
}

fn serialize_table_stream(
    output: &mut Output,
    tables: &TableSet,
    sizes: &MetadataSizes,
    strings: &StringsBuilder,
    il_base_rva: u32,
    mapped_field_data_rva: u32,
) -> Result<()> {
    use crate::metadata::tables::CodedIndexKind as Coded;
    use crate::metadata::tables::TABLE_SERIALIZATION_ORDER;

    output.write_u32(0);
    let (major, minor) = sizes.table_stream_version();
    output.write_u8(major);
    output.write_u8(minor);
    output.write_u8(sizes.heap_sizes_byte());
    output.write_u8(1);
    output.write_u64(sizes.valid_tables_mask());
    output.write_u64(SORTED_TABLES_MASK);

    for table in TABLE_SERIALIZATION_ORDER {
        if sizes.row_count(*table) > 0 {
            output.write_u32(sizes.row_count(*table));
        }
    }

    let mut w = RowWriter {
        output,
        sizes,
        strings,
    };

    for row in &tables.module {
        w.output.write_u16(row.generation);
        w.write_string(row.name)?;
        w.write_guid(row.module_version_id);
        w.write_guid(row.enc_id);
        w.write_guid(row.enc_base_id);
    }
    for row in &tables.type_ref {
        w.write_coded(Coded::ResolutionScope, row.resolution_scope);
        w.write_string(row.name)?;
        w.write_string(row.namespace)?;
    }
    for row in &tables.type_def {
        w.output.write_u32(row.flags);
        w.write_string(row.name)?;
        w.write_string(row.namespace)?;
        w.write_coded(Coded::TypeDefOrRef, row.extends);
        w.write_index(TableId::Field, row.field_list);
        w.write_index(TableId::MethodDef, row.method_list);
    }
    for row in &tables.field {
        w.output.write_u16(row.flags);
        w.write_string(row.name)?;
        w.write_blob(row.signature);
    }
    for row in &tables.method_def {
        let rva = if row.rva == u32::MAX {
            0
        } else {
            il_base_rva + row.rva
        };
        w.output.write_u32(rva);
        w.output.write_u16(row.impl_flags);
        w.output.write_u16(row.flags);
        w.write_string(row.name)?;
        w.write_blob(row.signature);
        w.write_index(TableId::Param, row.param_list);
    }
    for row in &tables.param {
        w.output.write_u16(row.flags);
        w.output.write_u16(row.sequence);
        w.write_string(row.name)?;
    }
    for row in &tables.interface_impl {
        w.write_index(TableId::TypeDef, row.class);
        w.write_coded(Coded::TypeDefOrRef, row.interface);
    }
    for row in &tables.member_ref {
        w.write_coded(Coded::MemberRefParent, row.class);
        w.write_string(row.name)?;
        w.write_blob(row.signature);
    }
    for row in &tables.constant {
        w.output.write_u8(row.type_code);
        w.output.write_u8(0);
        w.write_coded(Coded::HasConstant, row.parent);
        w.write_blob(row.value);
    }
    for row in &tables.custom_attribute {
        w.write_coded(Coded::HasCustomAttribute, row.parent);
        w.write_coded(Coded::CustomAttributeType, row.constructor);
        w.write_blob(row.value);
    }
    for row in &tables.field_marshal {
        w.write_coded(Coded::HasFieldMarshal, row.parent);
        w.write_blob(row.native_type);
    }
    for row in &tables.decl_security {
        w.output.write_u16(row.action);
        w.write_coded(Coded::HasDeclSecurity, row.parent);
        w.write_blob(row.permission_set);
    }
    for row in &tables.class_layout {
        w.output.write_u16(row.packing_size);
        w.output.write_u32(row.class_size);
        w.write_index(TableId::TypeDef, row.parent);
    }
    for row in &tables.field_layout {
        w.output.write_u32(row.offset);
        w.write_index(TableId::Field, row.field);
    }
    for row in &tables.stand_alone_sig {
        w.write_blob(row.signature);
    }
    for row in &tables.event_map {
        w.write_index(TableId::TypeDef, row.parent);
        w.write_index(TableId::Event, row.event_list);
    }
    for row in &tables.event {
        w.output.write_u16(row.event_flags);
        w.write_string(row.name)?;
        w.write_coded(Coded::TypeDefOrRef, row.event_type);
    }
    for row in &tables.property_map {
        w.write_index(TableId::TypeDef, row.parent);
        w.write_index(TableId::Property, row.property_list);
    }
    for row in &tables.property {
        w.output.write_u16(row.prop_flags);
        w.write_string(row.name)?;
        w.write_blob(row.signature);
    }
    for row in &tables.method_semantics {
        w.output.write_u16(row.semantic);
        w.write_index(TableId::MethodDef, row.method);
        w.write_coded(Coded::HasSemantics, row.association);
    }
    for row in &tables.method_impl {
        w.write_index(TableId::TypeDef, row.class);
        w.write_coded(Coded::MethodDefOrRef, row.method_body);
        w.write_coded(Coded::MethodDefOrRef, row.method_decl);
    }
    for row in &tables.module_ref {
        w.write_string(row.name)?;
    }
    for row in &tables.type_spec {
        w.write_blob(row.signature);
    }
    for row in &tables.impl_map {
        w.output.write_u16(row.mapping_flags);
        w.write_coded(Coded::MemberForwarded, row.member_forwarded);
        w.write_string(row.import_name)?;
        w.write_index(TableId::ModuleRef, row.import_scope);
    }
    for row in &tables.field_rva {
        w.output.write_u32(mapped_field_data_rva + row.offset);
        w.write_index(TableId::Field, row.field);
    }
    for row in &tables.enc_log {
        w.output.write_u32(row.token);
        w.output.write_u32(row.func_code);
    }
    for row in &tables.enc_map {
        w.output.write_u32(row.token);
    }
    for row in &tables.assembly {
        w.output.write_u32(row.hash_algorithm);
        w.output.write_u16(row.major_version);
        w.output.write_u16(row.minor_version);
        w.output.write_u16(row.build_number);
        w.output.write_u16(row.revision_number);
        w.output.write_u32(row.flags);
        w.write_blob(row.public_key);
        w.write_string(row.name)?;
        w.write_string(row.culture)?;
    }
    for row in &tables.assembly_ref {
        w.output.write_u16(row.major_version);
        w.output.write_u16(row.minor_version);
        w.output.write_u16(row.build_number);
        w.output.write_u16(row.revision_number);
        w.output.write_u32(row.flags);
        w.write_blob(row.public_key_or_token);
        w.write_string(row.name)?;
        w.write_string(row.culture)?;
        w.write_blob(row.hash_value);
    }
    for row in &tables.file {
        w.output.write_u32(row.flags);
        w.write_string(row.name)?;
        w.write_blob(row.hash_value);
    }
    for row in &tables.exported_type {
        w.output.write_u32(row.flags);
        w.output.write_u32(row.type_def_id);
        w.write_string(row.name)?;
        w.write_string(row.namespace)?;
        w.write_coded(Coded::Implementation, row.implementation);
    }
    for row in &tables.manifest_resource {
        w.output.write_u32(row.offset);
        w.output.write_u32(row.flags);
        w.write_string(row.name)?;
        w.write_coded(Coded::Implementation, row.implementation);
    }
    for row in &tables.nested_class {
        w.write_index(TableId::TypeDef, row.nested_class);
        w.write_index(TableId::TypeDef, row.enclosing_class);
    }
    for row in &tables.generic_param {
        w.output.write_u16(row.number);
        w.output.write_u16(row.flags);
        w.write_coded(Coded::TypeOrMethodDef, row.owner);
        w.write_string(row.name)?;
    }
    for row in &tables.method_spec {
        w.write_coded(Coded::MethodDefOrRef, row.method);
        w.write_blob(row.instantiation);
    }
    for row in &tables.generic_param_constraint {
        w.write_index(TableId::GenericParam, row.owner);
        w.write_coded(Coded::TypeDefOrRef, row.constraint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::ModuleRow;
    use uguid::guid;

    fn minimal_fixture() -> (TableSet, StringsBuilder, UserStringsBuilder, BlobsBuilder, GuidsBuilder)
    {
        let mut strings = StringsBuilder::new();
        let user_strings = UserStringsBuilder::new();
        let blobs = BlobsBuilder::new();
        let mut guids = GuidsBuilder::new();

        let name = strings.intern("test.dll").expect("intern");
        let mvid = guids
            .intern(guid!("11111111-2222-3333-4444-555566667777"))
            .expect("intern");
        strings.seal();

        let mut tables = TableSet::default();
        tables.module.push(ModuleRow {
            generation: 0,
            name,
            module_version_id: mvid,
            enc_id: GuidHandle::NONE,
            enc_base_id: GuidHandle::NONE,
        });
        (tables, strings, user_strings, blobs, guids)
    }

    fn serialize_fixture(options: &MetadataRootOptions) -> (SerializedMetadata, MetadataSizes) {
        let (tables, strings, user_strings, blobs, guids) = minimal_fixture();
        let sizes = MetadataSizes::new(
            &tables,
            strings.unaligned_size().expect("sealed"),
            user_strings.unaligned_size(),
            blobs.unaligned_size(),
            guids.size(),
            options.is_minimal_delta,
        );
        let metadata = serialize_metadata(
            &tables,
            &sizes,
            &strings,
            &user_strings,
            &blobs,
            &guids,
            options,
            0x2000,
            0,
        )
        .expect("serialization should succeed");
        (metadata, sizes)
    }

    #[test]
    fn test_root_header_layout() {
        let (metadata, _) = serialize_fixture(&MetadataRootOptions::default());
        let bytes = &metadata.bytes;

        assert_eq!(&bytes[0..4], &0x424A_5342u32.to_le_bytes());
        // Version string field: 12 bytes for "v4.0.30319" plus terminator, 4-aligned.
        let version_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(version_len, 12);
        assert_eq!(&bytes[16..26], b"v4.0.30319");
        let stream_count = u16::from_le_bytes(bytes[30..32].try_into().unwrap());
        assert_eq!(stream_count, 5);
    }

    #[test]
    fn test_stream_directory_is_contiguous() {
        let (metadata, sizes) = serialize_fixture(&MetadataRootOptions::default());
        let bytes = &metadata.bytes;

        // First stream header sits right after the fixed root header.
        let mut cursor = 32;
        let mut expected_offset: Option<u32> = None;
        let mut total = 0u32;
        for name in ["#~\0\0", "#Strings\0\0\0\0", "#US\0", "#GUID\0\0\0", "#Blob\0\0\0"] {
            let offset = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
            let size = u32::from_le_bytes(bytes[cursor + 4..cursor + 8].try_into().unwrap());
            cursor += 8;
            assert_eq!(&bytes[cursor..cursor + name.len()], name.as_bytes());
            cursor += name.len();
            if let Some(expected) = expected_offset {
                assert_eq!(offset, expected);
            }
            expected_offset = Some(offset + size);
            total = offset + size;
        }
        // The directory accounts for the whole blob.
        assert_eq!(total as usize, bytes.len());
        // The second stream's offset field (at 44, past the `#~\0\0` name) starts where the
        // table stream ends.
        assert_eq!(
            u32::from_le_bytes(bytes[32..36].try_into().unwrap()) + sizes.table_stream_size(),
            u32::from_le_bytes(bytes[44..48].try_into().unwrap()),
        );
    }

    #[test]
    fn test_table_stream_header() {
        let (metadata, sizes) = serialize_fixture(&MetadataRootOptions::default());
        let bytes = &metadata.bytes;
        let start = u32::from_le_bytes(bytes[32..36].try_into().unwrap()) as usize;

        assert_eq!(&bytes[start..start + 4], &[0, 0, 0, 0]);
        assert_eq!(bytes[start + 4], 2); // major
        assert_eq!(bytes[start + 5], 0); // minor
        assert_eq!(bytes[start + 6], sizes.heap_sizes_byte());
        assert_eq!(bytes[start + 7], 1);
        let valid = u64::from_le_bytes(bytes[start + 8..start + 16].try_into().unwrap());
        assert_eq!(valid, 1); // only the Module table
        let sorted = u64::from_le_bytes(bytes[start + 16..start + 24].try_into().unwrap());
        assert_eq!(sorted, SORTED_TABLES_MASK);
        let module_rows = u32::from_le_bytes(bytes[start + 24..start + 28].try_into().unwrap());
        assert_eq!(module_rows, 1);
    }

    #[test]
    fn test_metadata_size_matches_serialized_length() {
        let (tables, strings, user_strings, blobs, guids) = minimal_fixture();
        let options = MetadataRootOptions::default();
        let sizes = MetadataSizes::new(
            &tables,
            strings.unaligned_size().expect("sealed"),
            user_strings.unaligned_size(),
            blobs.unaligned_size(),
            guids.size(),
            false,
        );
        let predicted = metadata_size(&sizes, &options);
        let metadata = serialize_metadata(
            &tables,
            &sizes,
            &strings,
            &user_strings,
            &blobs,
            &guids,
            &options,
            0x2000,
            0,
        )
        .expect("serialization should succeed");
        assert_eq!(predicted as usize, metadata.bytes.len());
    }

    #[test]
    fn test_minimal_delta_adds_jtd_stream() {
        let options = MetadataRootOptions {
            is_minimal_delta: true,
            ..MetadataRootOptions::default()
        };
        let (metadata, _) = serialize_fixture(&options);
        let bytes = &metadata.bytes;
        let stream_count = u16::from_le_bytes(bytes[30..32].try_into().unwrap());
        assert_eq!(stream_count, 6);
        assert!(bytes
            .windows(4)
            .any(|window| window == b"#JTD"));
    }

    #[test]
    fn test_mvid_offset_points_at_the_guid() {
        let (metadata, _) = serialize_fixture(&MetadataRootOptions::default());
        let offset = metadata.mvid_offset.expect("module row exists") as usize;
        // First GUID slot: the interned value starts with the little-endian time-low field.
        assert_eq!(&metadata.bytes[offset..offset + 4], &[0x11, 0x11, 0x11, 0x11]);
    }

    #[test]
    fn test_method_rva_rebasing() {
        use crate::metadata::heaps::BlobHandle;
        use crate::metadata::tables::MethodDefRow;

        let (tables, mut strings, user_strings, blobs, guids) = {
            let mut strings = StringsBuilder::new();
            let name = strings.intern("M").expect("intern");
            let mut tables = TableSet::default();
            tables.method_def.push(MethodDefRow {
                rva: 4,
                impl_flags: 0,
                flags: 0,
                name,
                signature: BlobHandle::EMPTY,
                param_list: 1,
            });
            tables.method_def.push(MethodDefRow {
                rva: u32::MAX,
                impl_flags: 0,
                flags: 0,
                name,
                signature: BlobHandle::EMPTY,
                param_list: 1,
            });
            (
                tables,
                strings,
                UserStringsBuilder::new(),
                BlobsBuilder::new(),
                GuidsBuilder::new(),
            )
        };
        strings.seal();
        let sizes = MetadataSizes::new(
            &tables,
            strings.unaligned_size().expect("sealed"),
            user_strings.unaligned_size(),
            blobs.unaligned_size(),
            guids.size(),
            false,
        );
        let metadata = serialize_metadata(
            &tables,
            &sizes,
            &strings,
            &user_strings,
            &blobs,
            &guids,
            &MetadataRootOptions::default(),
            0x2000,
            0,
        )
        .expect("serialization should succeed");

        let start = u32::from_le_bytes(metadata.bytes[32..36].try_into().unwrap()) as usize;
        // Header (24) + one present-table row count.
        let rows = start + 24 + 4;
        let first_rva = u32::from_le_bytes(metadata.bytes[rows..rows + 4].try_into().unwrap());
        assert_eq!(first_rva, 0x2004);
        let row_size = sizes.table_row_size(TableId::MethodDef) as usize;
        let second_rva = u32::from_le_bytes(
            metadata.bytes[rows + row_size..rows + row_size + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(second_rva, 0);
    }
}
