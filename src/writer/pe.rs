//! PE image assembly around the serialized metadata.
//!
//! ## Architecture
//!
//! Image production is two-phase. [`TextLayout::compute`] fixes every offset inside the
//! `.text` section from block sizes alone, so the metadata serializer can embed real RVAs
//! (method body RVAs, mapped field data) before a single image byte exists. [`write_image`]
//! then lays the blocks down exactly where the layout said they would be and fails if they
//! drift.
//!
//! The `.text` block order follows the reference layout: import address table, CLI header,
//! IL, metadata, managed resources, strong-name space, debug directory, import table and
//! startup stub, mapped field data. A 32-bit image gets the `_CorExeMain`/`_CorDllMain`
//! startup stub, an import table for `mscoree.dll` and a `.reloc` section with the single
//! HIGHLOW fixup for the stub's operand; other machines boot through the CLI header alone.
//!
//! Deterministic emission writes a zeroed MVID and timestamp, hashes the finished image with
//! SHA-1 once and patches both values from the digest. The patches deliberately invalidate
//! the hash; nothing re-reads it.

use sha1::{Digest, Sha1};

use crate::writer::output::Output;
use crate::{Error, Result};

const SECTION_ALIGNMENT: u32 = 0x2000;
const FILE_ALIGNMENT: u32 = 0x200;
const TEXT_RVA: u32 = 0x2000;

const CLI_HEADER_SIZE: u32 = 72;
const DEBUG_DIRECTORY_ENTRY_SIZE: u32 = 28;

const DOS_STUB: [u8; 128] = [
    0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00,
    0x00, 0xB8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x80, 0x00, 0x00, 0x00, 0x0E, 0x1F, 0xBA, 0x0E, 0x00, 0xB4, 0x09, 0xCD, 0x21, 0xB8, 0x01,
    0x4C, 0xCD, 0x21, 0x54, 0x68, 0x69, 0x73, 0x20, 0x70, 0x72, 0x6F, 0x67, 0x72, 0x61, 0x6D,
    0x20, 0x63, 0x61, 0x6E, 0x6E, 0x6F, 0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6E, 0x20,
    0x69, 0x6E, 0x20, 0x44, 0x4F, 0x53, 0x20, 0x6D, 0x6F, 0x64, 0x65, 0x2E, 0x0D, 0x0D, 0x0A,
    0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// `Characteristics` bits of the CLI header's `Flags` field.
pub mod cor_flags {
    pub const IL_ONLY: u32 = 0x0000_0001;
    pub const REQUIRES_32_BIT: u32 = 0x0000_0002;
    pub const STRONG_NAME_SIGNED: u32 = 0x0000_0008;
}

/// Target machine of the image. Decides PE32 vs PE32+ and whether the native startup stub
/// is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    I386,
    Amd64,
}

impl Machine {
    fn coff_value(self) -> u16 {
        match self {
            Machine::I386 => 0x014C,
            Machine::Amd64 => 0x8664,
        }
    }

    fn is_pe32_plus(self) -> bool {
        matches!(self, Machine::Amd64)
    }

    /// Only 32-bit images need the unmanaged `mscoree` entry thunk.
    fn requires_startup_stub(self) -> bool {
        matches!(self, Machine::I386)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Exe,
    Dll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    WindowsGui,
    WindowsConsole,
}

impl Subsystem {
    fn value(self) -> u16 {
        match self {
            Subsystem::WindowsGui => 2,
            Subsystem::WindowsConsole => 3,
        }
    }
}

/// CodeView record emitted into the debug directory when a PDB exists.
#[derive(Debug, Clone)]
pub struct PdbInfo {
    pub path: String,
    pub guid: [u8; 16],
    pub age: u32,
}

/// Image-level knobs of one emission.
#[derive(Debug, Clone)]
pub struct PeOptions {
    pub machine: Machine,
    pub image_kind: ImageKind,
    pub subsystem: Subsystem,
    /// CLI header flags, see [`cor_flags`].
    pub cor_flags: u32,
    /// Reserved byte size of the strong-name signature directory, 0 when unsigned.
    pub strong_name_signature_size: u32,
    pub pdb_info: Option<PdbInfo>,
    /// Zero MVID and timestamp, then patch both from a SHA-1 of the image.
    pub deterministic: bool,
}

impl Default for PeOptions {
    fn default() -> Self {
        PeOptions {
            machine: Machine::I386,
            image_kind: ImageKind::Exe,
            subsystem: Subsystem::WindowsConsole,
            cor_flags: cor_flags::IL_ONLY,
            strong_name_signature_size: 0,
            pdb_info: None,
            deterministic: true,
        }
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Offsets of every block inside `.text`, relative to the section start.
///
/// RVAs are `TEXT_RVA` plus the offset; accessors below expose the ones other stages need.
#[derive(Debug, Clone)]
pub struct TextLayout {
    iat_size: u32,
    il_offset: u32,
    il_size: u32,
    metadata_offset: u32,
    metadata_size: u32,
    resources_offset: u32,
    resources_size: u32,
    strong_name_offset: u32,
    strong_name_size: u32,
    debug_table_offset: u32,
    debug_data_size: u32,
    import_table_offset: u32,
    entry_stub_offset: u32,
    mapped_field_data_offset: u32,
    mapped_field_data_size: u32,
    virtual_size: u32,
    has_startup_stub: bool,
}

impl TextLayout {
    /// Fixes the `.text` layout from block sizes. Nothing may change size afterwards.
    #[must_use]
    pub fn compute(
        options: &PeOptions,
        il_size: u32,
        metadata_size: u32,
        resources_size: u32,
        mapped_field_data_size: u32,
    ) -> Self {
        let has_startup_stub = options.machine.requires_startup_stub();
        let iat_size = if has_startup_stub { 8 } else { 0 };

        let il_offset = iat_size + CLI_HEADER_SIZE;
        let mut position = il_offset + il_size;

        position = align_to(position, 4);
        let metadata_offset = position;
        position += metadata_size;

        position = align_to(position, 8);
        let resources_offset = position;
        position += resources_size;

        position = align_to(position, 4);
        let strong_name_offset = position;
        position += options.strong_name_signature_size;

        let (debug_table_offset, debug_data_size) = match &options.pdb_info {
            Some(pdb) => {
                position = align_to(position, 4);
                let offset = position;
                let data_size = 24 + pdb.path.len() as u32 + 1;
                position += DEBUG_DIRECTORY_ENTRY_SIZE + data_size;
                (offset, data_size)
            }
            None => (0, 0),
        };

        let (import_table_offset, entry_stub_offset) = if has_startup_stub {
            position = align_to(position, 4);
            let import_offset = position;
            // Directory (two entries), lookup table, hint/name, dll name.
            position += 40 + 8 + 14 + 12;
            position = align_to(position, 4);
            let stub_offset = position + 2;
            position += 8;
            (import_offset, stub_offset)
        } else {
            (0, 0)
        };

        position = align_to(position, 8);
        let mapped_field_data_offset = position;
        position += mapped_field_data_size;

        TextLayout {
            iat_size,
            il_offset,
            il_size,
            metadata_offset,
            metadata_size,
            resources_offset,
            resources_size,
            strong_name_offset,
            strong_name_size: options.strong_name_signature_size,
            debug_table_offset,
            debug_data_size,
            import_table_offset,
            entry_stub_offset,
            mapped_field_data_offset,
            mapped_field_data_size,
            virtual_size: position,
            has_startup_stub,
        }
    }

    /// RVA the IL block lands at; method body offsets rebase onto this.
    #[must_use]
    pub fn il_rva(&self) -> u32 {
        TEXT_RVA + self.il_offset
    }

    /// RVA of the mapped-field-data block for `FieldRVA` rebasing.
    #[must_use]
    pub fn mapped_field_data_rva(&self) -> u32 {
        TEXT_RVA + self.mapped_field_data_offset
    }

    fn raw_size(&self) -> u32 {
        align_to(self.virtual_size, FILE_ALIGNMENT)
    }
}

/// Content blocks placed into the image.
#[derive(Debug)]
pub struct ImageContent<'a> {
    pub il: &'a [u8],
    pub metadata: &'a [u8],
    /// Offset of the MVID inside `metadata`, for the deterministic patch.
    pub metadata_mvid_offset: Option<u32>,
    pub managed_resources: &'a [u8],
    pub mapped_field_data: &'a [u8],
    /// Entry point token, 0 for images without one.
    pub entry_point_token: u32,
    /// Pre-built `.rsrc` section payload, passed through opaquely.
    pub win32_resources: Option<&'a [u8]>,
}

struct SectionPlan {
    text_raw_offset: u32,
    rsrc_rva: u32,
    rsrc_virtual_size: u32,
    rsrc_raw_offset: u32,
    reloc_rva: u32,
    reloc_raw_offset: u32,
    reloc_size: u32,
    image_size: u32,
    section_count: u16,
    header_size: u32,
}

fn plan_sections(options: &PeOptions, layout: &TextLayout, content: &ImageContent<'_>) -> SectionPlan {
    let has_reloc = layout.has_startup_stub;
    let rsrc_size = content.win32_resources.map_or(0, |blob| blob.len() as u32);
    let section_count = 1 + u16::from(rsrc_size > 0) + u16::from(has_reloc);

    let optional_header_size: u32 = if options.machine.is_pe32_plus() { 240 } else { 224 };
    let header_size = align_to(
        DOS_STUB.len() as u32 + 4 + 20 + optional_header_size + 40 * u32::from(section_count),
        FILE_ALIGNMENT,
    );

    let text_raw_offset = header_size;
    let mut next_rva = align_to(TEXT_RVA + layout.virtual_size, SECTION_ALIGNMENT);
    let mut next_raw = text_raw_offset + layout.raw_size();

    let (rsrc_rva, rsrc_raw_offset) = if rsrc_size > 0 {
        let placed = (next_rva, next_raw);
        next_rva = align_to(next_rva + rsrc_size, SECTION_ALIGNMENT);
        next_raw += align_to(rsrc_size, FILE_ALIGNMENT);
        placed
    } else {
        (0, 0)
    };

    let reloc_size = if has_reloc { 12 } else { 0 };
    let (reloc_rva, reloc_raw_offset) = if has_reloc {
        let placed = (next_rva, next_raw);
        next_rva = align_to(next_rva + reloc_size, SECTION_ALIGNMENT);
        placed
    } else {
        (0, 0)
    };

    SectionPlan {
        text_raw_offset,
        rsrc_rva,
        rsrc_virtual_size: rsrc_size,
        rsrc_raw_offset,
        reloc_rva,
        reloc_raw_offset,
        reloc_size,
        image_size: next_rva,
        section_count,
        header_size,
    }
}

/// Assembles the complete image and applies the deterministic patch.
pub fn write_image(
    options: &PeOptions,
    layout: &TextLayout,
    content: &ImageContent<'_>,
) -> Result<Vec<u8>> {
    if content.il.len() as u32 != layout.il_size
        || content.metadata.len() as u32 != layout.metadata_size
        || content.managed_resources.len() as u32 != layout.resources_size
        || content.mapped_field_data.len() as u32 != layout.mapped_field_data_size
    {
        return Err(Error::InvariantViolated(
            "content block size diverged from the frozen text layout",
        ));
    }

    let plan = plan_sections(options, layout, content);
    let mut output = Output::with_capacity(plan.header_size as usize + layout.raw_size() as usize);

    write_headers(&mut output, options, layout, &plan);
    output.pad(plan.header_size - output.position());

    write_text_section(&mut output, options, layout, content, &plan)?;

    if let Some(blob) = content.win32_resources {
        debug_assert_eq!(output.position(), plan.rsrc_raw_offset);
        output.write_bytes(blob);
        output.align(FILE_ALIGNMENT);
    }

    if layout.has_startup_stub {
        debug_assert_eq!(output.position(), plan.reloc_raw_offset);
        write_reloc_section(&mut output, layout);
        output.align(FILE_ALIGNMENT);
    }

    let mut image = output.into_bytes();
    if options.deterministic {
        apply_deterministic_patch(&mut image, layout, content, &plan)?;
    }
    Ok(image)
}

fn write_headers(output: &mut Output, options: &PeOptions, layout: &TextLayout, plan: &SectionPlan) {
    output.write_bytes(&DOS_STUB);
    output.write_bytes(b"PE\0\0");

    // COFF file header.
    output.write_u16(options.machine.coff_value());
    output.write_u16(plan.section_count);
    output.write_u32(0); // timestamp, patched under deterministic emission
    output.write_u32(0);
    output.write_u32(0);
    output.write_u16(if options.machine.is_pe32_plus() { 240 } else { 224 });
    let mut characteristics: u16 = 0x0002; // EXECUTABLE_IMAGE
    if options.image_kind == ImageKind::Dll {
        characteristics |= 0x2000;
    }
    characteristics |= match options.machine {
        Machine::I386 => 0x0100,  // 32BIT_MACHINE
        Machine::Amd64 => 0x0020, // LARGE_ADDRESS_AWARE
    };
    output.write_u16(characteristics);

    let pe32_plus = options.machine.is_pe32_plus();
    output.write_u16(if pe32_plus { 0x20B } else { 0x10B });
    output.write_u8(0x30); // linker version
    output.write_u8(0);
    output.write_u32(layout.raw_size()); // code size
    output.write_u32(0); // initialized data
    output.write_u32(0); // uninitialized data
    let entry_point = if layout.has_startup_stub {
        TEXT_RVA + layout.entry_stub_offset
    } else {
        0
    };
    output.write_u32(entry_point);
    output.write_u32(TEXT_RVA); // base of code
    let image_base: u64 = match (options.machine, options.image_kind) {
        (Machine::I386, ImageKind::Exe) => 0x0040_0000,
        (Machine::I386, ImageKind::Dll) => 0x1000_0000,
        (Machine::Amd64, ImageKind::Exe) => 0x1_4000_0000,
        (Machine::Amd64, ImageKind::Dll) => 0x1_8000_0000,
    };
    if pe32_plus {
        output.write_u64(image_base);
    } else {
        output.write_u32(0); // base of data
        output.write_u32(image_base as u32);
    }
    output.write_u32(SECTION_ALIGNMENT);
    output.write_u32(FILE_ALIGNMENT);
    output.write_u16(4); // OS version
    output.write_u16(0);
    output.write_u16(0); // image version
    output.write_u16(0);
    output.write_u16(4); // subsystem version
    output.write_u16(0);
    output.write_u32(0);
    output.write_u32(plan.image_size);
    output.write_u32(plan.header_size);
    output.write_u32(0); // checksum
    output.write_u16(options.subsystem.value());
    // DYNAMIC_BASE | NX_COMPAT | NO_SEH | TERMINAL_SERVER_AWARE
    output.write_u16(0x8540);
    if pe32_plus {
        output.write_u64(0x40_0000);
        output.write_u64(0x4000);
        output.write_u64(0x10_0000);
        output.write_u64(0x1000);
    } else {
        output.write_u32(0x10_0000);
        output.write_u32(0x1000);
        output.write_u32(0x10_0000);
        output.write_u32(0x1000);
    }
    output.write_u32(0); // loader flags
    output.write_u32(16); // directory count

    // Data directories, in header order.
    let zero = (0u32, 0u32);
    let import = if layout.has_startup_stub {
        (TEXT_RVA + layout.import_table_offset, 74)
    } else {
        zero
    };
    let debug = if layout.debug_data_size > 0 {
        (
            TEXT_RVA + layout.debug_table_offset,
            DEBUG_DIRECTORY_ENTRY_SIZE,
        )
    } else {
        zero
    };
    let rsrc = if plan.rsrc_virtual_size > 0 {
        (plan.rsrc_rva, plan.rsrc_virtual_size)
    } else {
        zero
    };
    let reloc = if layout.has_startup_stub {
        (plan.reloc_rva, plan.reloc_size)
    } else {
        zero
    };
    let iat = if layout.has_startup_stub {
        (TEXT_RVA, layout.iat_size)
    } else {
        zero
    };
    let cli = (TEXT_RVA + layout.iat_size, CLI_HEADER_SIZE);
    let directories = [
        zero,   // export
        import, // import
        rsrc,   // resource
        zero,   // exception
        zero,   // certificate
        reloc,  // base relocation
        debug,  // debug
        zero,   // architecture
        zero,   // global pointer
        zero,   // TLS
        zero,   // load config
        zero,   // bound import
        iat,    // IAT
        zero,   // delay import
        cli,    // CLI header
        zero,   // reserved
    ];
    for (rva, size) in directories {
        output.write_u32(rva);
        output.write_u32(size);
    }

    write_section_header(
        output,
        b".text\0\0\0",
        layout.virtual_size,
        TEXT_RVA,
        layout.raw_size(),
        plan.text_raw_offset,
        0x6000_0020, // code | execute | read
    );
    if plan.rsrc_virtual_size > 0 {
        write_section_header(
            output,
            b".rsrc\0\0\0",
            plan.rsrc_virtual_size,
            plan.rsrc_rva,
            align_to(plan.rsrc_virtual_size, FILE_ALIGNMENT),
            plan.rsrc_raw_offset,
            0x4000_0040, // initialized data | read
        );
    }
    if layout.has_startup_stub {
        write_section_header(
            output,
            b".reloc\0\0",
            plan.reloc_size,
            plan.reloc_rva,
            align_to(plan.reloc_size, FILE_ALIGNMENT),
            plan.reloc_raw_offset,
            0x4200_0040, // initialized data | discardable | read
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn write_section_header(
    output: &mut Output,
    name: &[u8; 8],
    virtual_size: u32,
    rva: u32,
    raw_size: u32,
    raw_offset: u32,
    characteristics: u32,
) {
    output.write_bytes(name);
    output.write_u32(virtual_size);
    output.write_u32(rva);
    output.write_u32(raw_size);
    output.write_u32(raw_offset);
    output.write_u32(0);
    output.write_u32(0);
    output.write_u16(0);
    output.write_u16(0);
    output.write_u32(characteristics);
}

fn write_text_section(
    output: &mut Output,
    options: &PeOptions,
    layout: &TextLayout,
    content: &ImageContent<'_>,
    plan: &SectionPlan,
) -> Result<()> {
    let section_start = output.position();
    let at = |offset: u32| plan.text_raw_offset + offset;
    debug_assert_eq!(section_start, plan.text_raw_offset);

    if layout.has_startup_stub {
        // IAT: one pointer to the hint/name entry, then the null terminator.
        let hint_name_rva = TEXT_RVA + layout.import_table_offset + 48;
        output.write_u32(hint_name_rva);
        output.write_u32(0);
    }

    // CLI header.
    output.write_u32(CLI_HEADER_SIZE);
    output.write_u16(2); // runtime major
    output.write_u16(5); // runtime minor
    output.write_u32(TEXT_RVA + layout.metadata_offset);
    output.write_u32(layout.metadata_size);
    output.write_u32(options.cor_flags);
    output.write_u32(content.entry_point_token);
    if layout.resources_size > 0 {
        output.write_u32(TEXT_RVA + layout.resources_offset);
        output.write_u32(layout.resources_size);
    } else {
        output.write_u64(0);
    }
    if layout.strong_name_size > 0 {
        output.write_u32(TEXT_RVA + layout.strong_name_offset);
        output.write_u32(layout.strong_name_size);
    } else {
        output.write_u64(0);
    }
    output.write_u64(0); // code manager
    output.write_u64(0); // vtable fixups
    output.write_u64(0); // export address table jumps
    output.write_u64(0); // managed native header

    output.write_bytes(content.il);

    output.pad(at(layout.metadata_offset) - output.position());
    output.write_bytes(content.metadata);

    output.pad(at(layout.resources_offset) - output.position());
    output.write_bytes(content.managed_resources);

    output.pad(at(layout.strong_name_offset) - output.position());
    output.pad(layout.strong_name_size);

    if let Some(pdb) = &options.pdb_info {
        output.pad(at(layout.debug_table_offset) - output.position());
        let data_rva = TEXT_RVA + layout.debug_table_offset + DEBUG_DIRECTORY_ENTRY_SIZE;
        let data_offset = at(layout.debug_table_offset) + DEBUG_DIRECTORY_ENTRY_SIZE;
        output.write_u32(0); // characteristics
        output.write_u32(0); // timestamp
        output.write_u16(0); // version
        output.write_u16(0);
        output.write_u32(2); // IMAGE_DEBUG_TYPE_CODEVIEW
        output.write_u32(layout.debug_data_size);
        output.write_u32(data_rva);
        output.write_u32(data_offset);
        output.write_bytes(b"RSDS");
        output.write_bytes(&pdb.guid);
        output.write_u32(pdb.age);
        output.write_utf8(&pdb.path);
        output.write_u8(0);
    }

    if layout.has_startup_stub {
        output.pad(at(layout.import_table_offset) - output.position());
        let import_rva = TEXT_RVA + layout.import_table_offset;
        let lookup_rva = import_rva + 40;
        let hint_name_rva = import_rva + 48;
        let dll_name_rva = import_rva + 62;

        // Import directory: one mscoree entry, then the null terminator entry.
        output.write_u32(lookup_rva);
        output.write_u32(0);
        output.write_u32(0);
        output.write_u32(dll_name_rva);
        output.write_u32(TEXT_RVA); // IAT sits at the section start
        output.pad(20);

        output.write_u32(hint_name_rva);
        output.write_u32(0);

        output.write_u16(0);
        if options.image_kind == ImageKind::Exe {
            output.write_bytes(b"_CorExeMain\0");
        } else {
            output.write_bytes(b"_CorDllMain\0");
        }
        output.write_bytes(b"mscoree.dll\0");

        output.pad(at(layout.entry_stub_offset - 2) - output.position());
        output.write_u16(0);
        output.write_u8(0xFF);
        output.write_u8(0x25);
        let image_base = match options.image_kind {
            ImageKind::Exe => 0x0040_0000u32,
            ImageKind::Dll => 0x1000_0000,
        };
        output.write_u32(image_base + TEXT_RVA); // absolute address of the IAT slot
    }

    output.pad(at(layout.mapped_field_data_offset) - output.position());
    output.write_bytes(content.mapped_field_data);

    if output.position() - section_start != layout.virtual_size {
        return Err(Error::InvariantViolated(
            "text section size diverged from the frozen layout",
        ));
    }
    output.align(FILE_ALIGNMENT);
    Ok(())
}

fn write_reloc_section(output: &mut Output, layout: &TextLayout) {
    // Single HIGHLOW fixup for the startup stub's 4-byte operand.
    let fixup_rva = TEXT_RVA + layout.entry_stub_offset + 2;
    let page = fixup_rva & !0xFFF;
    output.write_u32(page);
    output.write_u32(12);
    output.write_u16(0x3000 | (fixup_rva & 0xFFF) as u16);
    output.write_u16(0);
}

/// Derives the MVID and timestamp from a SHA-1 of the image and writes them in place.
fn apply_deterministic_patch(
    image: &mut [u8],
    layout: &TextLayout,
    content: &ImageContent<'_>,
    plan: &SectionPlan,
) -> Result<()> {
    let digest = Sha1::digest(&*image);

    // COFF timestamp: DOS stub, PE signature, machine, section count.
    let timestamp_offset = DOS_STUB.len() + 4 + 4;
    let timestamp =
        u32::from_le_bytes([digest[16], digest[17], digest[18], digest[19]]) | 0x8000_0000;
    image[timestamp_offset..timestamp_offset + 4].copy_from_slice(&timestamp.to_le_bytes());

    if let Some(mvid_offset) = content.metadata_mvid_offset {
        let mut mvid = [0u8; 16];
        mvid.copy_from_slice(&digest[0..16]);
        // Mark as a version-4 GUID so it is well-formed wherever it surfaces.
        mvid[7] = (mvid[7] & 0x0F) | 0x40;
        mvid[8] = (mvid[8] & 0x3F) | 0x80;
        let file_offset =
            (plan.text_raw_offset + layout.metadata_offset + mvid_offset) as usize;
        if file_offset + 16 > image.len() {
            return Err(Error::InvariantViolated(
                "MVID patch offset outside the image",
            ));
        }
        image[file_offset..file_offset + 16].copy_from_slice(&mvid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content<'a>(metadata: &'a [u8], mvid_offset: Option<u32>) -> ImageContent<'a> {
        ImageContent {
            il: &[],
            metadata,
            metadata_mvid_offset: mvid_offset,
            managed_resources: &[],
            mapped_field_data: &[],
            entry_point_token: 0x0600_0001,
            win32_resources: None,
        }
    }

    #[test]
    fn test_layout_block_order_and_alignment() {
        let options = PeOptions::default();
        let layout = TextLayout::compute(&options, 10, 100, 0, 16);
        // IAT (8) + CLI header (72).
        assert_eq!(layout.il_rva(), TEXT_RVA + 80);
        assert_eq!(layout.metadata_offset, 92); // 90 aligned to 4
        assert_eq!(layout.resources_offset, 192);
        assert_eq!(layout.mapped_field_data_offset % 8, 0);
        assert!(layout.virtual_size >= layout.mapped_field_data_offset + 16);
    }

    #[test]
    fn test_layout_without_stub_has_no_iat() {
        let options = PeOptions {
            machine: Machine::Amd64,
            ..PeOptions::default()
        };
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        assert_eq!(layout.il_rva(), TEXT_RVA + CLI_HEADER_SIZE);
        assert!(!layout.has_startup_stub);
    }

    #[test]
    fn test_image_starts_with_dos_stub_and_pe_signature() {
        let options = PeOptions {
            deterministic: false,
            ..PeOptions::default()
        };
        let metadata = vec![0u8; 64];
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        let image =
            write_image(&options, &layout, &content(&metadata, None)).expect("image");
        assert_eq!(&image[0..2], b"MZ");
        let pe_offset = u32::from_le_bytes(image[0x3C..0x40].try_into().unwrap()) as usize;
        assert_eq!(&image[pe_offset..pe_offset + 4], b"PE\0\0");
        assert_eq!(
            u16::from_le_bytes(image[pe_offset + 4..pe_offset + 6].try_into().unwrap()),
            0x014C
        );
    }

    #[test]
    fn test_32_bit_image_has_reloc_section() {
        let options = PeOptions {
            deterministic: false,
            ..PeOptions::default()
        };
        let metadata = vec![0u8; 64];
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        let image =
            write_image(&options, &layout, &content(&metadata, None)).expect("image");
        let pe_offset = u32::from_le_bytes(image[0x3C..0x40].try_into().unwrap()) as usize;
        let section_count =
            u16::from_le_bytes(image[pe_offset + 6..pe_offset + 8].try_into().unwrap());
        assert_eq!(section_count, 2); // .text and .reloc
        assert!(image.windows(8).any(|w| w == b".reloc\0\0"));
    }

    #[test]
    fn test_64_bit_image_has_single_section() {
        let options = PeOptions {
            machine: Machine::Amd64,
            deterministic: false,
            ..PeOptions::default()
        };
        let metadata = vec![0u8; 64];
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        let image =
            write_image(&options, &layout, &content(&metadata, None)).expect("image");
        let pe_offset = u32::from_le_bytes(image[0x3C..0x40].try_into().unwrap()) as usize;
        let section_count =
            u16::from_le_bytes(image[pe_offset + 6..pe_offset + 8].try_into().unwrap());
        assert_eq!(section_count, 1);
        assert!(!image.windows(8).any(|w| w == b".reloc\0\0"));
        // PE32+ magic.
        let magic =
            u16::from_le_bytes(image[pe_offset + 24..pe_offset + 26].try_into().unwrap());
        assert_eq!(magic, 0x20B);
    }

    #[test]
    fn test_deterministic_patch_is_stable_and_nonzero() {
        let options = PeOptions::default();
        let metadata = vec![0u8; 64];
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        let first =
            write_image(&options, &layout, &content(&metadata, Some(16))).expect("image");
        let second =
            write_image(&options, &layout, &content(&metadata, Some(16))).expect("image");
        assert_eq!(first, second, "deterministic emission must be reproducible");

        // The MVID slot inside the metadata block was zero going in.
        let plan = plan_sections(&options, &layout, &content(&metadata, Some(16)));
        let mvid_at = (plan.text_raw_offset + layout.metadata_offset + 16) as usize;
        assert!(first[mvid_at..mvid_at + 16].iter().any(|b| *b != 0));

        let timestamp_offset = DOS_STUB.len() + 8;
        let timestamp =
            u32::from_le_bytes(first[timestamp_offset..timestamp_offset + 4].try_into().unwrap());
        assert_ne!(timestamp, 0);
        assert_eq!(timestamp & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let options = PeOptions {
            deterministic: false,
            ..PeOptions::default()
        };
        let metadata = vec![0u8; 32]; // layout expects 64
        let layout = TextLayout::compute(&options, 0, 64, 0, 0);
        assert!(write_image(&options, &layout, &content(&metadata, None)).is_err());
    }
}
