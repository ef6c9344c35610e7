//! Final layout sizing for the `#~` table stream.
//!
//! ## Architecture
//!
//! Index widths are a global property of the finished metadata: whether a `TypeDef` column
//! occupies 2 or 4 bytes depends on the final `TypeDef` row count, and a coded index column
//! depends on the largest row count among every table in its tag space. [`MetadataSizes`] is
//! therefore constructed exactly once, after all tables are populated and all heaps are
//! sealed, and every width decision downstream reads from it. No row may be added afterwards.
//!
//! A minimal edit-and-continue delta forces every table index and heap index to 4 bytes so
//! that successive generations agree on column layout regardless of their row counts.

use crate::metadata::tables::{
    CodedIndexKind, TableId, TableSet, TABLE_COUNT, TABLE_SERIALIZATION_ORDER,
};

/// Version of the `#~` stream format this writer produces.
const TABLE_STREAM_MAJOR_VERSION: u8 = 2;
const TABLE_STREAM_MINOR_VERSION: u8 = 0;

/// `HeapSizes` bit: `#Strings` indices are 4 bytes.
const HEAP_SIZES_STRING_LARGE: u8 = 0x01;
/// `HeapSizes` bit: `#GUID` indices are 4 bytes.
const HEAP_SIZES_GUID_LARGE: u8 = 0x02;
/// `HeapSizes` bit: `#Blob` indices are 4 bytes.
const HEAP_SIZES_BLOB_LARGE: u8 = 0x04;
/// `HeapSizes` bit: stream carries edit-and-continue deltas.
const HEAP_SIZES_ENC_DELTAS: u8 = 0x20;

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

/// Frozen row counts and heap sizes with every derived width decision.
#[derive(Debug)]
pub struct MetadataSizes {
    row_counts: [u32; TABLE_COUNT],
    /// Heap byte sizes after 4-byte stream alignment.
    pub string_heap_size: u32,
    pub user_string_heap_size: u32,
    pub blob_heap_size: u32,
    pub guid_heap_size: u32,
    pub is_minimal_delta: bool,
}

impl MetadataSizes {
    /// Captures the final row counts and heap sizes. Tables and heaps must not change after
    /// this point.
    #[must_use]
    pub fn new(
        tables: &TableSet,
        string_heap: u32,
        user_string_heap: u32,
        blob_heap: u32,
        guid_heap: u32,
        is_minimal_delta: bool,
    ) -> Self {
        let mut row_counts = [0u32; TABLE_COUNT];
        for table in TABLE_SERIALIZATION_ORDER {
            row_counts[*table as usize] = tables.row_count(*table);
        }
        MetadataSizes {
            row_counts,
            string_heap_size: align4(string_heap),
            user_string_heap_size: align4(user_string_heap),
            blob_heap_size: align4(blob_heap),
            guid_heap_size: guid_heap,
            is_minimal_delta,
        }
    }

    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table as usize]
    }

    /// Byte width of a column holding a plain row index into `table`.
    #[must_use]
    pub fn table_index_size(&self, table: TableId) -> u32 {
        if self.is_minimal_delta || self.row_count(table) >= 1 << 16 {
            4
        } else {
            2
        }
    }

    /// Byte width of a column holding a `kind` coded index.
    ///
    /// Small only while every member table's row count stays strictly below
    /// `2^(16 - tag bits)`; a table sitting exactly at that limit already needs 4 bytes,
    /// because its highest packed value would not fit 16 bits.
    #[must_use]
    pub fn coded_index_size(&self, kind: CodedIndexKind) -> u32 {
        if self.is_minimal_delta {
            return 4;
        }
        let limit = 1u32 << (16 - kind.tag_bits());
        let small = kind
            .tables()
            .iter()
            .all(|table| self.row_count(*table) < limit);
        if small {
            2
        } else {
            4
        }
    }

    #[must_use]
    pub fn string_index_size(&self) -> u32 {
        if self.is_minimal_delta || self.string_heap_size > 0xFFFF {
            4
        } else {
            2
        }
    }

    #[must_use]
    pub fn blob_index_size(&self) -> u32 {
        if self.is_minimal_delta || self.blob_heap_size > 0xFFFF {
            4
        } else {
            2
        }
    }

    #[must_use]
    pub fn guid_index_size(&self) -> u32 {
        if self.is_minimal_delta || self.guid_heap_size > 0xFFFF {
            4
        } else {
            2
        }
    }

    /// The `HeapSizes` byte of the `#~` header.
    #[must_use]
    pub fn heap_sizes_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.string_index_size() == 4 {
            byte |= HEAP_SIZES_STRING_LARGE;
        }
        if self.guid_index_size() == 4 {
            byte |= HEAP_SIZES_GUID_LARGE;
        }
        if self.blob_index_size() == 4 {
            byte |= HEAP_SIZES_BLOB_LARGE;
        }
        if self.is_minimal_delta {
            byte |= HEAP_SIZES_ENC_DELTAS;
        }
        byte
    }

    /// Bitmask of tables that carry at least one row.
    #[must_use]
    pub fn valid_tables_mask(&self) -> u64 {
        let mut mask = 0u64;
        for table in TABLE_SERIALIZATION_ORDER {
            if self.row_count(*table) > 0 {
                mask |= 1u64 << (*table as u8);
            }
        }
        mask
    }

    /// Number of tables with at least one row, which is how many row counts the header lists.
    #[must_use]
    pub fn present_table_count(&self) -> u32 {
        self.valid_tables_mask().count_ones()
    }

    /// Format version pair written into the `#~` header.
    #[must_use]
    pub fn table_stream_version(&self) -> (u8, u8) {
        (TABLE_STREAM_MAJOR_VERSION, TABLE_STREAM_MINOR_VERSION)
    }

    /// Serialized byte width of one row of `table` under the frozen widths.
    #[must_use]
    pub fn table_row_size(&self, table: TableId) -> u32 {
        let string = self.string_index_size();
        let blob = self.blob_index_size();
        let guid = self.guid_index_size();
        let idx = |table| self.table_index_size(table);
        let coded = |kind| self.coded_index_size(kind);
        match table {
            TableId::Module => 2 + string + 3 * guid,
            TableId::TypeRef => coded(CodedIndexKind::ResolutionScope) + 2 * string,
            TableId::TypeDef => {
                4 + 2 * string
                    + coded(CodedIndexKind::TypeDefOrRef)
                    + idx(TableId::Field)
                    + idx(TableId::MethodDef)
            }
            TableId::Field => 2 + string + blob,
            TableId::MethodDef => 4 + 2 + 2 + string + blob + idx(TableId::Param),
            TableId::Param => 2 + 2 + string,
            TableId::InterfaceImpl => {
                idx(TableId::TypeDef) + coded(CodedIndexKind::TypeDefOrRef)
            }
            TableId::MemberRef => coded(CodedIndexKind::MemberRefParent) + string + blob,
            TableId::Constant => 1 + 1 + coded(CodedIndexKind::HasConstant) + blob,
            TableId::CustomAttribute => {
                coded(CodedIndexKind::HasCustomAttribute)
                    + coded(CodedIndexKind::CustomAttributeType)
                    + blob
            }
            TableId::FieldMarshal => coded(CodedIndexKind::HasFieldMarshal) + blob,
            TableId::DeclSecurity => 2 + coded(CodedIndexKind::HasDeclSecurity) + blob,
            TableId::ClassLayout => 2 + 4 + idx(TableId::TypeDef),
            TableId::FieldLayout => 4 + idx(TableId::Field),
            TableId::StandAloneSig => blob,
            TableId::EventMap => idx(TableId::TypeDef) + idx(TableId::Event),
            TableId::Event => 2 + string + coded(CodedIndexKind::TypeDefOrRef),
            TableId::PropertyMap => idx(TableId::TypeDef) + idx(TableId::Property),
            TableId::Property => 2 + string + blob,
            TableId::MethodSemantics => {
                2 + idx(TableId::MethodDef) + coded(CodedIndexKind::HasSemantics)
            }
            TableId::MethodImpl => {
                idx(TableId::TypeDef) + 2 * coded(CodedIndexKind::MethodDefOrRef)
            }
            TableId::ModuleRef => string,
            TableId::TypeSpec => blob,
            TableId::ImplMap => {
                2 + coded(CodedIndexKind::MemberForwarded) + string + idx(TableId::ModuleRef)
            }
            TableId::FieldRva => 4 + idx(TableId::Field),
            TableId::EncLog => 4 + 4,
            TableId::EncMap => 4,
            TableId::Assembly => 4 + 4 * 2 + 4 + blob + 2 * string,
            TableId::AssemblyRef => 4 * 2 + 4 + 2 * blob + 2 * string,
            TableId::File => 4 + string + blob,
            TableId::ExportedType => {
                4 + 4 + 2 * string + coded(CodedIndexKind::Implementation)
            }
            TableId::ManifestResource => {
                4 + 4 + string + coded(CodedIndexKind::Implementation)
            }
            TableId::NestedClass => 2 * idx(TableId::TypeDef),
            TableId::GenericParam => {
                2 + 2 + coded(CodedIndexKind::TypeOrMethodDef) + string
            }
            TableId::MethodSpec => coded(CodedIndexKind::MethodDefOrRef) + blob,
            TableId::GenericParamConstraint => {
                idx(TableId::GenericParam) + coded(CodedIndexKind::TypeDefOrRef)
            }
            TableId::FieldPtr
            | TableId::MethodPtr
            | TableId::ParamPtr
            | TableId::EventPtr
            | TableId::PropertyPtr
            | TableId::AssemblyProcessor
            | TableId::AssemblyOs
            | TableId::AssemblyRefProcessor
            | TableId::AssemblyRefOs => 0,
        }
    }

    /// Total aligned byte size of the `#~` stream: 24-byte header, one row count per present
    /// table, then the row blocks.
    #[must_use]
    pub fn table_stream_size(&self) -> u32 {
        let mut size = 24 + 4 * self.present_table_count();
        for table in TABLE_SERIALIZATION_ORDER {
            size += self.row_count(*table) * self.table_row_size(*table);
        }
        align4(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::heaps::{GuidHandle, StringHandle};
    use crate::metadata::tables::{ModuleRow, TypeRefRow};

    fn empty_sizes() -> MetadataSizes {
        MetadataSizes::new(&TableSet::default(), 1, 1, 1, 16, false)
    }

    fn sizes_with_rows(type_ref_rows: u32) -> MetadataSizes {
        let mut tables = TableSet::default();
        tables.module.push(ModuleRow {
            generation: 0,
            name: StringHandle::EMPTY,
            module_version_id: GuidHandle(1),
            enc_id: GuidHandle::NONE,
            enc_base_id: GuidHandle::NONE,
        });
        for _ in 0..type_ref_rows {
            tables.type_ref.push(TypeRefRow {
                resolution_scope: 0,
                name: StringHandle::EMPTY,
                namespace: StringHandle::EMPTY,
            });
        }
        MetadataSizes::new(&tables, 1, 1, 1, 16, false)
    }

    #[test]
    fn test_small_tables_use_two_byte_indices() {
        let sizes = sizes_with_rows(10);
        assert_eq!(sizes.table_index_size(TableId::TypeRef), 2);
        assert_eq!(sizes.string_index_size(), 2);
        assert_eq!(sizes.heap_sizes_byte(), 0);
    }

    #[test]
    fn test_coded_index_widens_exactly_at_threshold() {
        // ResolutionScope has 2 tag bits, so 2^14 rows in any member table force 4 bytes.
        let below = sizes_with_rows((1 << 14) - 1);
        assert_eq!(below.coded_index_size(CodedIndexKind::ResolutionScope), 2);
        let at = sizes_with_rows(1 << 14);
        assert_eq!(at.coded_index_size(CodedIndexKind::ResolutionScope), 4);
        // The plain index over the same table stays small far longer.
        assert_eq!(at.table_index_size(TableId::TypeRef), 2);
    }

    #[test]
    fn test_minimal_delta_forces_large_everything() {
        let sizes = MetadataSizes::new(&TableSet::default(), 1, 1, 1, 16, true);
        assert_eq!(sizes.table_index_size(TableId::TypeDef), 4);
        assert_eq!(sizes.coded_index_size(CodedIndexKind::TypeDefOrRef), 4);
        assert_eq!(sizes.string_index_size(), 4);
        assert_eq!(sizes.heap_sizes_byte(), 0x27);
    }

    #[test]
    fn test_large_string_heap_widens_string_indices() {
        let sizes = MetadataSizes::new(&TableSet::default(), 0x1_0001, 1, 1, 16, false);
        assert_eq!(sizes.string_index_size(), 4);
        assert_eq!(sizes.blob_index_size(), 2);
        assert_eq!(sizes.heap_sizes_byte(), 0x01);
    }

    #[test]
    fn test_valid_mask_tracks_presence() {
        let sizes = sizes_with_rows(1);
        assert_eq!(
            sizes.valid_tables_mask(),
            (1 << TableId::Module as u8) | (1 << TableId::TypeRef as u8)
        );
        assert_eq!(sizes.present_table_count(), 2);
        assert_eq!(empty_sizes().valid_tables_mask(), 0);
    }

    #[test]
    fn test_module_row_size_with_small_heaps() {
        let sizes = empty_sizes();
        // generation + string + 3 GUID indices, all small.
        assert_eq!(sizes.table_row_size(TableId::Module), 2 + 2 + 6);
        assert_eq!(sizes.table_row_size(TableId::FieldPtr), 0);
    }

    #[test]
    fn test_empty_table_stream_size_is_header_only() {
        assert_eq!(empty_sizes().table_stream_size(), 24);
    }

    #[test]
    fn test_stream_size_includes_counts_and_rows() {
        let sizes = sizes_with_rows(2);
        let expected = 24
            + 4 * 2
            + sizes.table_row_size(TableId::Module)
            + 2 * sizes.table_row_size(TableId::TypeRef);
        assert_eq!(sizes.table_stream_size(), align4(expected));
    }
}
