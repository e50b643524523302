//! Assembles class files in memory, valid or deliberately broken, so tests need no compiler.

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELD: u8 = 9;
const TAG_METHOD: u8 = 10;
const TAG_NAME_AND_TYPE: u8 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Utf8(String),
    Class(String),
    String(String),
    Integer(i32),
    Long(i64),
    NameAndType(u16, u16),
    Field(u16, u16),
    Method(u16, u16),
}

struct Member {
    flags: u16,
    name: u16,
    descriptor: u16,
    attributes: Vec<u8>,
    attribute_count: u16,
}

impl Member {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.name.to_be_bytes());
        out.extend_from_slice(&self.descriptor.to_be_bytes());
        out.extend_from_slice(&self.attribute_count.to_be_bytes());
        out.extend_from_slice(&self.attributes);
    }
}

pub struct ClassBuilder {
    pub name: String,

    magic: u32,
    major: u16,
    minor: u16,
    pool: Vec<u8>,
    next_index: u16,
    pool_count: Option<u16>,
    known: HashMap<Key, u16>,

    flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    trailing: Vec<u8>,
}

impl ClassBuilder {
    /// A public class extending `java/lang/Object`, targeting version 52.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut builder = Self {
            name: name.clone(),
            magic: 0xCAFE_BABE,
            major: 52,
            minor: 0,
            pool: vec![],
            next_index: 1,
            pool_count: None,
            known: HashMap::new(),
            flags: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            trailing: vec![],
        };

        builder.this_class = builder.class(&name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    /// Override the declared constant pool count.
    pub fn pool_count(mut self, count: u16) -> Self {
        self.pool_count = Some(count);
        self
    }

    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing.extend_from_slice(bytes);
        self
    }

    pub fn super_class(&mut self, name: &str) -> &mut Self {
        self.super_class = self.class(name);
        self
    }

    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn push_entry(&mut self, key: Option<Key>, bytes: &[u8], wide: bool) -> u16 {
        if let Some(index) = key.as_ref().and_then(|k| self.known.get(k)) {
            return *index;
        }

        let index = self.next_index;
        self.pool.extend_from_slice(bytes);
        self.next_index += if wide { 2 } else { 1 };

        if let Some(key) = key {
            self.known.insert(key, index);
        }

        index
    }

    /// Append an entry exactly as given, without deduplication.
    pub fn raw_entry(&mut self, bytes: &[u8]) -> u16 {
        self.push_entry(None, bytes, false)
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        let mut bytes = vec![TAG_UTF8];
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());

        self.push_entry(Some(Key::Utf8(value.to_string())), &bytes, false)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut bytes = vec![TAG_CLASS];
        bytes.extend_from_slice(&name_index.to_be_bytes());

        self.push_entry(Some(Key::Class(name.to_string())), &bytes, false)
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let mut bytes = vec![TAG_STRING];
        bytes.extend_from_slice(&utf8.to_be_bytes());

        self.push_entry(Some(Key::String(value.to_string())), &bytes, false)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut bytes = vec![TAG_INTEGER];
        bytes.extend_from_slice(&value.to_be_bytes());

        self.push_entry(Some(Key::Integer(value)), &bytes, false)
    }

    pub fn float(&mut self, value: f32) -> u16 {
        let mut bytes = vec![TAG_FLOAT];
        bytes.extend_from_slice(&value.to_bits().to_be_bytes());

        self.push_entry(None, &bytes, false)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut bytes = vec![TAG_LONG];
        bytes.extend_from_slice(&value.to_be_bytes());

        self.push_entry(Some(Key::Long(value)), &bytes, true)
    }

    pub fn double(&mut self, value: f64) -> u16 {
        let mut bytes = vec![TAG_DOUBLE];
        bytes.extend_from_slice(&value.to_bits().to_be_bytes());

        self.push_entry(None, &bytes, true)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);

        let mut bytes = vec![TAG_NAME_AND_TYPE];
        bytes.extend_from_slice(&name.to_be_bytes());
        bytes.extend_from_slice(&descriptor.to_be_bytes());

        self.push_entry(Some(Key::NameAndType(name, descriptor)), &bytes, false)
    }

    fn member_ref(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);

        let mut bytes = vec![tag];
        bytes.extend_from_slice(&class.to_be_bytes());
        bytes.extend_from_slice(&name_and_type.to_be_bytes());

        let key = if tag == TAG_FIELD {
            Key::Field(class, name_and_type)
        } else {
            Key::Method(class, name_and_type)
        };

        self.push_entry(Some(key), &bytes, false)
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(TAG_FIELD, class, name, descriptor)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(TAG_METHOD, class, name, descriptor)
    }

    pub fn field(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let member = Member {
            flags,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            attributes: vec![],
            attribute_count: 0,
        };

        self.fields.push(member);
        self
    }

    /// A field with a `ConstantValue` attribute pointing at `constant`.
    pub fn constant_field(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        constant: u16,
    ) -> &mut Self {
        let attribute_name = self.utf8("ConstantValue");

        let mut attributes = vec![];
        attributes.extend_from_slice(&attribute_name.to_be_bytes());
        attributes.extend_from_slice(&2u32.to_be_bytes());
        attributes.extend_from_slice(&constant.to_be_bytes());

        let member = Member {
            flags,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            attributes,
            attribute_count: 1,
        };

        self.fields.push(member);
        self
    }

    pub fn method(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) -> &mut Self {
        let attribute_name = self.utf8("Code");

        let mut body = vec![];
        body.extend_from_slice(&max_stack.to_be_bytes());
        body.extend_from_slice(&max_locals.to_be_bytes());
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(code);
        // no exception table, no nested attributes
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());

        let mut attributes = vec![];
        attributes.extend_from_slice(&attribute_name.to_be_bytes());
        attributes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        attributes.extend_from_slice(&body);

        let member = Member {
            flags,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            attributes,
            attribute_count: 1,
        };

        self.methods.push(member);
        self
    }

    /// A method with no code, such as a native one.
    pub fn bodiless_method(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let member = Member {
            flags,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            attributes: vec![],
            attribute_count: 0,
        };

        self.methods.push(member);
        self
    }

    /// `public static void main(String[])` with the given body.
    pub fn main(&mut self, max_stack: u16, max_locals: u16, code: &[u8]) -> &mut Self {
        self.method(
            ACC_PUBLIC | ACC_STATIC,
            "main",
            "([Ljava/lang/String;)V",
            max_stack,
            max_locals.max(1),
            code,
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&self.magic.to_be_bytes());
        out.extend_from_slice(&self.minor.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());

        let count = self.pool_count.unwrap_or(self.next_index);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&self.pool);

        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for field in &self.fields {
            field.encode(&mut out);
        }

        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            method.encode(&mut out);
        }

        // no class attributes
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.trailing);
        out
    }
}

/// Bytecode assembler. Branch offsets are written by the caller.
#[derive(Default)]
pub struct Code {
    bytes: Vec<u8>,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pc(&self) -> usize {
        self.bytes.len()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    pub fn u1(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    pub fn u2(mut self, value: u16) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i2(mut self, value: i16) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i4(mut self, value: i32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Zero bytes up to the next multiple of four, as switch instructions require.
    pub fn align(mut self) -> Self {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
