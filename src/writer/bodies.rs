//! Method body serialization: header selection, IL pseudo-token fixup and exception
//! handling sections.
//!
//! ## Architecture
//!
//! Bodies are concatenated into one IL block in method declaration order. Each body's offset
//! within the block is recorded; the stream writer later rebases those offsets onto the IL
//! block's RVA. Serialization happens before table population because it is the last stage
//! that creates rows: `calli` sites and local signatures claim `StandAloneSig` rows here, and
//! `ldstr` operands intern into the `#US` heap here.
//!
//! IL arrives with pseudo-tokens (see [`crate::model::body`]). The fixup walk decodes one
//! opcode at a time, skips data operands by size and rewrites token operands in place. A body
//! eligible for the tiny header that is byte-identical to an earlier one after fixup reuses
//! the earlier offset instead of being written again.

use std::collections::HashMap;

use crate::metadata::heaps::UserStringsBuilder;
use crate::metadata::tables::TableId;
use crate::metadata::token::Token;
use crate::model::body::{
    ExceptionRegion, ExceptionRegionKind, IlReference, MethodBody, IL_REFERENCE_TAG,
    IL_STRING_TAG,
};
use crate::model::{MethodId, Module};
use crate::writer::output::Output;
use crate::writer::refs::ModuleIndices;
use crate::writer::signatures::SignatureEncoder;
use crate::{Error, Result};

/// Tiny-format headers require fewer than 64 bytes of IL and the default max stack.
const TINY_BODY_SIZE_LIMIT: usize = 64;
const TINY_MAX_STACK: u16 = 8;

const FAT_HEADER_FLAGS: u16 = 0x3003;
const FAT_HEADER_MORE_SECTS: u16 = 0x0008;
const FAT_HEADER_INIT_LOCALS: u16 = 0x0010;

const EH_SECTION_SMALL: u8 = 0x01;
const EH_SECTION_FAT: u8 = 0x41;

/// The serialized IL block and the offset of each method's body within it.
#[derive(Debug, Default)]
pub struct SerializedBodies {
    pub il_stream: Vec<u8>,
    /// Methods without a body have no entry.
    pub body_offsets: HashMap<MethodId, u32>,
    /// `StandAloneSig` token of each fat body's local signature, 0 for bodies without locals.
    pub local_signature_tokens: HashMap<MethodId, u32>,
}

/// Serializes every method body, assigning `StandAloneSig` rows and `#US` offsets on the way.
pub fn serialize_method_bodies(
    module: &Module,
    indices: &mut ModuleIndices,
    user_strings: &mut UserStringsBuilder,
) -> Result<SerializedBodies> {
    let mut output = Output::new();
    let mut body_offsets = HashMap::new();
    let mut local_signature_tokens = HashMap::new();
    let mut small_bodies: HashMap<Vec<u8>, u32> = HashMap::new();

    for type_def in &module.type_defs {
        for method_id in &type_def.methods {
            let method = module.method(*method_id).ok_or_else(|| {
                Error::UnresolvedReference(format!("method definition {method_id:?}"))
            })?;
            let Some(body) = &method.body else {
                continue;
            };
            let (offset, local_sig_token) = serialize_body(
                module,
                indices,
                user_strings,
                &mut output,
                &mut small_bodies,
                body,
            )?;
            body_offsets.insert(*method_id, offset);
            local_signature_tokens.insert(*method_id, local_sig_token);
        }
    }

    Ok(SerializedBodies {
        il_stream: output.into_bytes(),
        body_offsets,
        local_signature_tokens,
    })
}

fn serialize_body(
    module: &Module,
    indices: &mut ModuleIndices,
    user_strings: &mut UserStringsBuilder,
    output: &mut Output,
    small_bodies: &mut HashMap<Vec<u8>, u32>,
    body: &MethodBody,
) -> Result<(u32, u32)> {
    let il = fix_up_il(module, indices, user_strings, &body.il)?;

    let is_tiny = il.len() < TINY_BODY_SIZE_LIMIT
        && body.max_stack <= TINY_MAX_STACK
        && body.locals.is_empty()
        && body.exception_regions.is_empty();

    if is_tiny {
        if let Some(offset) = small_bodies.get(&il) {
            return Ok((*offset, 0));
        }
        let offset = output.position();
        output.write_u8(((il.len() as u8) << 2) | 0x2);
        output.write_bytes(&il);
        small_bodies.insert(il, offset);
        return Ok((offset, 0));
    }

    let local_sig_token = if body.locals.is_empty() {
        0u32
    } else {
        let blob = SignatureEncoder::new(module, indices).local_signature(&body.locals)?;
        let row = indices.standalone_sigs.get_or_add(blob);
        Token::from_table_row(TableId::StandAloneSig, row).value()
    };

    output.align(4);
    let offset = output.position();

    let mut flags = FAT_HEADER_FLAGS;
    if !body.exception_regions.is_empty() {
        flags |= FAT_HEADER_MORE_SECTS;
    }
    if body.init_locals {
        flags |= FAT_HEADER_INIT_LOCALS;
    }
    output.write_u16(flags);
    output.write_u16(body.max_stack);
    output.write_u32(il.len() as u32);
    output.write_u32(local_sig_token);
    output.write_bytes(&il);

    if !body.exception_regions.is_empty() {
        output.align(4);
        serialize_exception_regions(indices, output, &body.exception_regions)?;
    }
    Ok((offset, local_sig_token))
}

fn region_token(indices: &ModuleIndices, kind: &ExceptionRegionKind) -> Result<u32> {
    match kind {
        ExceptionRegionKind::Catch(shape) => {
            let (table, row) = indices.type_def_or_ref(shape)?;
            Ok(Token::from_table_row(table, row).value())
        }
        ExceptionRegionKind::Filter { filter_offset } => Ok(*filter_offset),
        ExceptionRegionKind::Finally | ExceptionRegionKind::Fault => Ok(0),
    }
}

fn serialize_exception_regions(
    indices: &ModuleIndices,
    output: &mut Output,
    regions: &[ExceptionRegion],
) -> Result<()> {
    let small_size = regions.len() * 12 + 4;
    let fits_small = small_size <= 0xFF
        && regions.iter().all(|region| {
            region.try_offset <= 0xFFFF
                && region.try_length <= 0xFF
                && region.handler_offset <= 0xFFFF
                && region.handler_length <= 0xFF
        });

    if fits_small {
        output.write_u8(EH_SECTION_SMALL);
        output.write_u8(small_size as u8);
        output.write_u16(0);
        for region in regions {
            output.write_u16(region.kind.code() as u16);
            output.write_u16(region.try_offset as u16);
            output.write_u8(region.try_length as u8);
            output.write_u16(region.handler_offset as u16);
            output.write_u8(region.handler_length as u8);
            output.write_u32(region_token(indices, &region.kind)?);
        }
    } else {
        let fat_size = regions.len() * 24 + 4;
        output.write_u8(EH_SECTION_FAT);
        output.write_u8((fat_size & 0xFF) as u8);
        output.write_u16(((fat_size >> 8) & 0xFFFF) as u16);
        for region in regions {
            output.write_u32(region.kind.code());
            output.write_u32(region.try_offset);
            output.write_u32(region.try_length);
            output.write_u32(region.handler_offset);
            output.write_u32(region.handler_length);
            output.write_u32(region_token(indices, &region.kind)?);
        }
    }
    Ok(())
}

/// Operand layout of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    None,
    Size1,
    Size2,
    Size4,
    Size8,
    /// A 4-byte slot holding a metadata token, subject to pseudo-token fixup.
    TokenSlot,
    /// `switch`: a 4-byte count followed by that many 4-byte targets.
    Switch,
}

fn operand_of(opcode: u8) -> Operand {
    match opcode {
        // ldarg.s .. stloc.s, ldc.i4.s, short branches, leave.s
        0x0E..=0x13 | 0x1F | 0x2B..=0x37 | 0xDE => Operand::Size1,
        0x20 | 0x22 | 0x38..=0x44 | 0xDD => Operand::Size4,
        0x21 | 0x23 => Operand::Size8,
        0x45 => Operand::Switch,
        // jmp, call, callvirt, newobj, field and type operands, ldstr, ldtoken
        0x27 | 0x28 | 0x29 | 0x6F | 0x70 | 0x71 | 0x72 | 0x73 | 0x74 | 0x75 | 0x79
        | 0x7B..=0x81 | 0x8C | 0x8D | 0x8F | 0xA3 | 0xA4 | 0xA5 | 0xC2 | 0xC6 | 0xD0 => {
            Operand::TokenSlot
        }
        _ => Operand::None,
    }
}

fn extended_operand_of(opcode: u8) -> Operand {
    match opcode {
        // ldftn, ldvirtftn, initobj, constrained., sizeof
        0x06 | 0x07 | 0x15 | 0x16 | 0x1C => Operand::TokenSlot,
        // ldarg .. stloc wide forms
        0x09..=0x0E => Operand::Size2,
        // unaligned., no.
        0x12 | 0x19 => Operand::Size1,
        _ => Operand::None,
    }
}

/// Rewrites every pseudo-token in the IL stream with the real metadata token.
fn fix_up_il(
    module: &Module,
    indices: &mut ModuleIndices,
    user_strings: &mut UserStringsBuilder,
    il: &[u8],
) -> Result<Vec<u8>> {
    let mut fixed = il.to_vec();
    let mut cursor = 0usize;

    while cursor < fixed.len() {
        let opcode = fixed[cursor];
        cursor += 1;
        let operand = if opcode == 0xFE {
            let extended = *fixed
                .get(cursor)
                .ok_or(Error::InvariantViolated("truncated extended opcode"))?;
            cursor += 1;
            extended_operand_of(extended)
        } else {
            operand_of(opcode)
        };

        match operand {
            Operand::None => {}
            Operand::Size1 => cursor += 1,
            Operand::Size2 => cursor += 2,
            Operand::Size4 => cursor += 4,
            Operand::Size8 => cursor += 8,
            Operand::Switch => {
                let slot = fixed
                    .get(cursor..cursor + 4)
                    .ok_or(Error::InvariantViolated("truncated switch operand"))?;
                let count = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                cursor += 4 + count as usize * 4;
            }
            Operand::TokenSlot => {
                let slot = fixed
                    .get(cursor..cursor + 4)
                    .ok_or(Error::InvariantViolated("truncated token operand"))?;
                let pseudo = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                let token = resolve_pseudo_token(module, indices, user_strings, pseudo)?;
                fixed[cursor..cursor + 4].copy_from_slice(&token.to_le_bytes());
                cursor += 4;
            }
        }
    }

    if cursor != fixed.len() {
        return Err(Error::InvariantViolated("IL operand extends past stream end"));
    }
    Ok(fixed)
}

fn resolve_pseudo_token(
    module: &Module,
    indices: &mut ModuleIndices,
    user_strings: &mut UserStringsBuilder,
    pseudo: u32,
) -> Result<u32> {
    let tag = (pseudo >> 24) as u8;
    let index = (pseudo & 0x00FF_FFFF) as usize;
    match tag {
        IL_STRING_TAG => {
            let value = module.il_strings.get(index).ok_or_else(|| {
                Error::UnresolvedReference(format!("IL string {index}"))
            })?;
            let offset = user_strings.intern(value)?;
            Ok(Token::user_string(offset).value())
        }
        IL_REFERENCE_TAG => {
            let reference = module.il_references.get(index).ok_or_else(|| {
                Error::UnresolvedReference(format!("IL reference {index}"))
            })?;
            let (table, row) = match reference {
                IlReference::Type(shape) => indices.type_def_or_ref(shape)?,
                IlReference::Field(field) => indices.field_def_or_ref(*field)?,
                IlReference::Method(method) => indices.method_def_or_ref(*method)?,
                IlReference::MethodSpec(id) => {
                    let row = indices.method_specs.get(id).ok_or_else(|| {
                        Error::UnresolvedReference(format!("method instantiation {id:?}"))
                    })?;
                    (TableId::MethodSpec, row)
                }
                IlReference::Signature(sig_index) => {
                    let standalone = module
                        .il_signatures
                        .get(*sig_index as usize)
                        .ok_or_else(|| {
                            Error::UnresolvedReference(format!(
                                "IL signature {sig_index}"
                            ))
                        })?;
                    let blob = SignatureEncoder::new(module, indices)
                        .method_signature(&standalone.signature)?;
                    let row = indices.standalone_sigs.get_or_add(blob);
                    (TableId::StandAloneSig, row)
                }
            };
            Ok(Token::from_table_row(table, row).value())
        }
        _ => Err(Error::InvariantViolated(
            "token operand in model IL is not a pseudo-token",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::body::{string_pseudo_token, LocalSlot};
    use crate::model::members::{
        Method, MethodFlags, MethodImplFlags, MethodSignature, SignatureParam, TypeDef,
    };
    use crate::model::types::{PrimitiveKind, TypeShape};
    use crate::model::MethodId;
    use crate::writer::walker;

    fn void_signature() -> MethodSignature {
        MethodSignature {
            has_this: false,
            explicit_this: false,
            calling_convention: Default::default(),
            generic_param_count: 0,
            return_type: SignatureParam::plain(TypeShape::Primitive(PrimitiveKind::Void)),
            params: Vec::new(),
        }
    }

    fn module_with_bodies(bodies: Vec<MethodBody>) -> Module {
        let mut module = Module::new("test.dll");
        let mut type_def = TypeDef {
            name: "<Module>".to_string(),
            ..TypeDef::default()
        };
        for (index, body) in bodies.into_iter().enumerate() {
            module.methods.push(Method {
                name: format!("M{index}"),
                flags: MethodFlags::STATIC,
                impl_flags: MethodImplFlags::empty(),
                signature: void_signature(),
                params: Vec::new(),
                return_param: None,
                generic_params: Vec::new(),
                body: Some(body),
                pinvoke: None,
                security: Vec::new(),
                custom_attributes: Vec::new(),
            });
            type_def.methods.push(MethodId(index as u32));
        }
        module.type_defs.push(type_def);
        module
    }

    fn serialize(module: &Module) -> (SerializedBodies, ModuleIndices) {
        let mut indices = ModuleIndices::default();
        walker::walk(module, &mut indices).expect("walk should succeed");
        let mut user_strings = UserStringsBuilder::new();
        let bodies = serialize_method_bodies(module, &mut indices, &mut user_strings)
            .expect("body serialization should succeed");
        (bodies, indices)
    }

    #[test]
    fn test_tiny_body_header() {
        let module = module_with_bodies(vec![MethodBody {
            il: vec![0x2A],
            max_stack: 8,
            ..MethodBody::default()
        }]);
        let (bodies, _) = serialize(&module);
        // One byte of IL: header (1 << 2) | 0x2, then the ret opcode.
        assert_eq!(bodies.il_stream, vec![0x06, 0x2A]);
        assert_eq!(bodies.body_offsets[&MethodId(0)], 0);
    }

    #[test]
    fn test_identical_tiny_bodies_share_an_offset() {
        let body = MethodBody {
            il: vec![0x16, 0x2A],
            max_stack: 1,
            ..MethodBody::default()
        };
        let module = module_with_bodies(vec![body.clone(), body]);
        let (bodies, _) = serialize(&module);
        assert_eq!(
            bodies.body_offsets[&MethodId(0)],
            bodies.body_offsets[&MethodId(1)]
        );
        assert_eq!(bodies.il_stream.len(), 3);
    }

    #[test]
    fn test_fat_body_with_locals() {
        let module = module_with_bodies(vec![MethodBody {
            il: vec![0x2A],
            max_stack: 1,
            init_locals: true,
            locals: vec![LocalSlot::plain(TypeShape::Primitive(PrimitiveKind::Int32))],
            ..MethodBody::default()
        }]);
        let (bodies, indices) = serialize(&module);

        let flags = u16::from_le_bytes([bodies.il_stream[0], bodies.il_stream[1]]);
        assert_eq!(flags, FAT_HEADER_FLAGS | FAT_HEADER_INIT_LOCALS);
        let max_stack = u16::from_le_bytes([bodies.il_stream[2], bodies.il_stream[3]]);
        assert_eq!(max_stack, 1);
        let code_size = u32::from_le_bytes(bodies.il_stream[4..8].try_into().unwrap());
        assert_eq!(code_size, 1);
        let local_sig = u32::from_le_bytes(bodies.il_stream[8..12].try_into().unwrap());
        assert_eq!(local_sig, 0x1100_0001);
        assert_eq!(bodies.local_signature_tokens[&MethodId(0)], 0x1100_0001);
        assert_eq!(indices.standalone_sigs.len(), 1);
    }

    #[test]
    fn test_ldstr_pseudo_token_fixup() {
        let pseudo = string_pseudo_token(0).to_le_bytes();
        let module = {
            let mut module = module_with_bodies(vec![MethodBody {
                il: vec![0x72, pseudo[0], pseudo[1], pseudo[2], pseudo[3], 0x26, 0x2A],
                max_stack: 1,
                ..MethodBody::default()
            }]);
            module.il_strings.push("hello".to_string());
            module
        };
        let (bodies, _) = serialize(&module);
        // Tiny header, then ldstr with a #US token. The heap starts with its reserved zero
        // byte, so the first interned string lands at offset 1.
        let token = u32::from_le_bytes(bodies.il_stream[2..6].try_into().unwrap());
        assert_eq!(token, 0x7000_0001);
    }

    #[test]
    fn test_switch_targets_are_not_treated_as_tokens() {
        // switch with two targets whose bytes would look like a pseudo-token tag.
        let il = vec![
            0x45, 0x02, 0x00, 0x00, 0x00, // switch, count 2
            0x00, 0x00, 0x00, 0x7F, // target 1
            0x00, 0x00, 0x00, 0x7E, // target 2
            0x2A, // ret
        ];
        let module = module_with_bodies(vec![MethodBody {
            il: il.clone(),
            max_stack: 1,
            ..MethodBody::default()
        }]);
        let (bodies, _) = serialize(&module);
        // Tiny header then the IL unchanged.
        assert_eq!(&bodies.il_stream[1..], il.as_slice());
    }

    #[test]
    fn test_small_exception_section() {
        let module = module_with_bodies(vec![MethodBody {
            il: vec![0x00, 0x00, 0x00, 0x2A],
            max_stack: 1,
            exception_regions: vec![ExceptionRegion {
                kind: ExceptionRegionKind::Finally,
                try_offset: 0,
                try_length: 2,
                handler_offset: 2,
                handler_length: 1,
            }],
            ..MethodBody::default()
        }]);
        let (bodies, _) = serialize(&module);

        let flags = u16::from_le_bytes([bodies.il_stream[0], bodies.il_stream[1]]);
        assert_eq!(flags & FAT_HEADER_MORE_SECTS, FAT_HEADER_MORE_SECTS);
        // Header (12) + IL (4) lands on a 4-byte boundary, the section starts right after.
        let section = &bodies.il_stream[16..];
        assert_eq!(section[0], EH_SECTION_SMALL);
        assert_eq!(section[1], 16); // one clause: 12 + 4
    }

    #[test]
    fn test_fat_exception_section_when_lengths_overflow() {
        let module = module_with_bodies(vec![MethodBody {
            il: vec![0x00; 0x400],
            max_stack: 1,
            exception_regions: vec![ExceptionRegion {
                kind: ExceptionRegionKind::Finally,
                try_offset: 0,
                try_length: 0x300,
                handler_offset: 0x300,
                handler_length: 0x100,
            }],
            ..MethodBody::default()
        }]);
        let (bodies, _) = serialize(&module);
        let section = &bodies.il_stream[12 + 0x400..];
        assert_eq!(section[0], EH_SECTION_FAT);
        // 24 * 1 + 4 bytes of section data.
        assert_eq!(section[1], 28);
    }

    #[test]
    fn test_truncated_il_is_rejected() {
        let module = module_with_bodies(vec![MethodBody {
            il: vec![0x72, 0x01], // ldstr missing most of its operand
            max_stack: 1,
            ..MethodBody::default()
        }]);
        let mut indices = ModuleIndices::default();
        walker::walk(&module, &mut indices).expect("walk should succeed");
        let mut user_strings = UserStringsBuilder::new();
        let result = serialize_method_bodies(&module, &mut indices, &mut user_strings);
        assert!(result.is_err());
    }
}
