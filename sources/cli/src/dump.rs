use std::io::Write;

use anyhow::Result;
use bytes::{Buf, Bytes};
use interpreter::bytecode::{decode_instruction, mnemonic};
use parse::{
    attributes::{Attributes, CodeAttribute, KnownAttribute},
    classfile::{ClassFile, Resolvable},
    pool::{ConstantEntry, ConstantPool},
};

/// Longest string constant printed in full.
const STRING_CAPACITY: usize = 64;

pub fn dump_class(class_file: &ClassFile, out: &mut impl Write) -> Result<()> {
    let pool = &class_file.constant_pool;

    writeln!(
        out,
        "class {} (version {}.{})",
        class_file.name()?,
        class_file.meta_data.major_version,
        class_file.meta_data.minor_version
    )?;
    writeln!(out, "  flags: {}", class_file.access_flags.names().join(" "))?;
    writeln!(
        out,
        "  super: {}",
        class_file
            .super_class_name()?
            .unwrap_or_else(|| "(none)".to_string())
    )?;
    writeln!(
        out,
        "  {} constants, {} interfaces, {} fields, {} methods, {} attributes",
        pool.count(),
        class_file.interfaces.len(),
        class_file.fields.len(),
        class_file.methods.len(),
        class_file.attributes.len()
    )?;

    writeln!(out, "constant pool:")?;
    for (index, entry) in pool.indexed() {
        if matches!(entry, ConstantEntry::Reserved) {
            continue;
        }

        writeln!(
            out,
            "  #{:<4} {:<18} {}",
            index,
            entry.kind_name(),
            describe_constant(&entry)?
        )?;
    }

    writeln!(out, "interfaces:")?;
    for name in class_file.interface_names()? {
        writeln!(out, "  {}", name)?;
    }

    writeln!(out, "fields:")?;
    for field in class_file.fields.iter() {
        writeln!(
            out,
            "  [{}] {} {} (offset {})",
            field.flags.names().join(" "),
            field.try_name()?,
            field.try_descriptor()?,
            field.offset
        )?;
        dump_attributes(&field.attributes, pool, 4, out)?;
    }

    writeln!(out, "methods:")?;
    for method in class_file.methods.iter() {
        writeln!(
            out,
            "  [{}] {}{}",
            method.flags.names().join(" "),
            method.try_name()?,
            method.try_descriptor()?
        )?;
        dump_attributes(&method.attributes, pool, 4, out)?;
    }

    writeln!(out, "attributes:")?;
    dump_attributes(&class_file.attributes, pool, 2, out)?;

    Ok(())
}

fn describe_constant(entry: &ConstantEntry) -> Result<String> {
    Ok(match entry {
        ConstantEntry::Class(class) => class.try_name()?,
        ConstantEntry::Field(member) => join_parts(member.try_parts()?),
        ConstantEntry::Method(member) => join_parts(member.try_parts()?),
        ConstantEntry::InterfaceMethod(member) => join_parts(member.try_parts()?),
        ConstantEntry::String(string) => {
            format!("{:?}", string.string.try_resolve()?.to_ascii(STRING_CAPACITY))
        }
        ConstantEntry::Integer(int) => int.value().to_string(),
        ConstantEntry::Float(float) => format!("{:?}", float.value()),
        ConstantEntry::Long(long) => long.value().to_string(),
        ConstantEntry::Double(double) => format!("{:?}", double.value()),
        ConstantEntry::NameAndType(nat) => format!("{}:{}", nat.try_name()?, nat.try_descriptor()?),
        ConstantEntry::Utf8(utf8) => utf8.to_ascii(STRING_CAPACITY),
        ConstantEntry::MethodHandle(handle) => {
            format!("kind {} #{}", handle.reference_kind, handle.reference_index)
        }
        ConstantEntry::MethodType(ty) => ty.descriptor.try_resolve()?.to_ascii(STRING_CAPACITY),
        ConstantEntry::InvokeDynamic(indy) => {
            let nat = indy.name_and_type.try_resolve()?;
            format!(
                "bootstrap #{} {}:{}",
                indy.bootstrap_method_index,
                nat.try_name()?,
                nat.try_descriptor()?
            )
        }
        ConstantEntry::Reserved => String::new(),
    })
}

fn join_parts((class, name, descriptor): (String, String, String)) -> String {
    format!("{}.{}:{}", class, name, descriptor)
}

fn dump_attributes(
    attributes: &Attributes,
    pool: &ConstantPool,
    indent: usize,
    out: &mut impl Write,
) -> Result<()> {
    let pad = " ".repeat(indent);

    for attribute in attributes.iter() {
        let name = attribute.try_name()?;
        writeln!(out, "{}{} ({} bytes)", pad, name, attribute.data.len())?;

        if name == CodeAttribute::id() {
            let code = CodeAttribute::decode(attribute.data.clone(), pool)?;
            writeln!(
                out,
                "{}  max stack {}, max locals {}, {} exception handlers",
                pad,
                code.max_stack,
                code.max_locals,
                code.exception_table.len()
            )?;

            for line in disassemble(&code.code) {
                writeln!(out, "{}  {}", pad, line)?;
            }

            dump_attributes(&code.attributes, pool, indent + 2, out)?;
        }
    }

    Ok(())
}

/// One line per instruction. Decoding stops at the first byte that is not an instruction.
pub fn disassemble(code: &Bytes) -> Vec<String> {
    let mut lines = vec![];
    let mut pc = 0;

    while pc < code.len() {
        let mut bytes = code.slice(pc..);
        let before = bytes.remaining();

        match decode_instruction(&mut bytes, pc) {
            Ok(instruction) => {
                lines.push(format!(
                    "{:>5}: {:<16} {:?}",
                    pc,
                    mnemonic(code[pc]),
                    instruction
                ));
                pc += before - bytes.remaining();
            }
            Err(err) => {
                lines.push(format!("{:>5}: <{}>", pc, err));
                break;
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_disassembles_with_offsets() {
        // bipush 42; istore_1; iload_1; ireturn
        let code = Bytes::from_static(&[0x10, 42, 0x3c, 0x1b, 0xac]);
        let lines = disassemble(&code);

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("    0: bipush"));
        assert!(lines[1].starts_with("    2: istore_1"));
        assert!(lines[3].starts_with("    4: ireturn"));
    }

    #[test]
    fn it_stops_at_undecodable_bytes() {
        let code = Bytes::from_static(&[0x00, 0xfe, 0x00]);
        let lines = disassemble(&code);

        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("unknown instruction"));
    }
}
