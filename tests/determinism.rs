//! Deterministic-build guarantees: byte-identical re-emission and content-derived identity.

use cilemit::prelude::*;
use cilemit::model::body::string_pseudo_token;
use cilemit::model::members::{MethodFlags, MethodImplFlags, SignatureParam};
use uguid::guid;

fn module_with_main(literal: Option<&str>) -> Module {
    let mut module = Module::new("app.exe");
    let il = match literal {
        Some(value) => {
            module.il_strings.push(value.to_string());
            let pseudo = string_pseudo_token(0).to_le_bytes();
            vec![0x72, pseudo[0], pseudo[1], pseudo[2], pseudo[3], 0x26, 0x2A]
        }
        None => vec![0x2A],
    };
    module.methods.push(Method {
        name: "Main".to_string(),
        flags: MethodFlags::PUBLIC | MethodFlags::STATIC,
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
            il,
            max_stack: 8,
            ..MethodBody::default()
        }),
        pinvoke: None,
        security: Vec::new(),
        custom_attributes: Vec::new(),
    });
    module.type_defs.push(TypeDef {
        name: "<Module>".to_string(),
        methods: vec![MethodId(0)],
        ..TypeDef::default()
    });
    module.entry_point = Some(MethodId(0));
    module
}

fn emit_with(module: &Module, options: EmitOptions) -> Vec<u8> {
    let mut diagnostics = CollectingSink::default();
    MetadataWriter::new(module, options, &mut diagnostics)
        .emit()
        .expect("emission should succeed")
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Returns the 16 bytes of the `#GUID` heap, which holds only the MVID here.
fn read_mvid(image: &[u8]) -> [u8; 16] {
    let metadata_start = image
        .windows(4)
        .position(|w| w == b"BSJB")
        .expect("metadata root magic present");
    let version_len = read_u32(image, metadata_start + 12) as usize;
    let mut cursor = metadata_start + 16 + version_len + 2;
    let stream_count = u16::from_le_bytes(image[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;

    for _ in 0..stream_count {
        let offset = read_u32(image, cursor) as usize;
        cursor += 8;
        let name_start = cursor;
        while image[cursor] != 0 {
            cursor += 1;
        }
        let name = &image[name_start..cursor];
        cursor = name_start + ((cursor - name_start + 1 + 3) & !3);
        if name == b"#GUID" {
            let start = metadata_start + offset;
            return image[start..start + 16].try_into().unwrap();
        }
    }
    panic!("no #GUID stream");
}

fn coff_timestamp(image: &[u8]) -> u32 {
    let pe_offset = read_u32(image, 0x3C) as usize;
    read_u32(image, pe_offset + 8)
}

#[test]
fn test_double_emission_is_byte_identical() {
    let module = module_with_main(None);
    let first = emit_with(&module, EmitOptions::default());
    let second = emit_with(&module, EmitOptions::default());
    assert_eq!(first, second);
}

#[test]
fn test_mvid_and_timestamp_derive_from_content() {
    let first = emit_with(&module_with_main(None), EmitOptions::default());
    let second = emit_with(&module_with_main(Some("changed")), EmitOptions::default());

    let first_mvid = read_mvid(&first);
    let second_mvid = read_mvid(&second);
    assert_ne!(first_mvid, [0u8; 16], "deterministic MVID must be patched in");
    assert_ne!(first_mvid, second_mvid, "different content, different MVID");

    assert_eq!(coff_timestamp(&first) & 0x8000_0000, 0x8000_0000);
    assert_ne!(coff_timestamp(&first), coff_timestamp(&second));
}

#[test]
fn test_patched_mvid_is_a_version_4_guid() {
    let image = emit_with(&module_with_main(None), EmitOptions::default());
    let mvid = read_mvid(&image);
    assert_eq!(mvid[7] & 0xF0, 0x40);
    assert_eq!(mvid[8] & 0xC0, 0x80);
}

#[test]
fn test_non_deterministic_emission_keeps_the_model_mvid() {
    let mut module = module_with_main(None);
    module.mvid = guid!("0a0b0c0d-0e0f-1011-1213-141516171819");
    let mut options = EmitOptions::default();
    options.pe.deterministic = false;

    let image = emit_with(&module, options);
    assert_eq!(coff_timestamp(&image), 0);
    let mvid = read_mvid(&image);
    assert!(mvid.iter().any(|b| *b != 0), "model MVID written as given");
    // Re-emission without hashing is still reproducible.
    let mut module_again = module_with_main(None);
    module_again.mvid = guid!("0a0b0c0d-0e0f-1011-1213-141516171819");
    let mut options_again = EmitOptions::default();
    options_again.pe.deterministic = false;
    assert_eq!(image, emit_with(&module_again, options_again));
}
