use std::ops::RangeInclusive;

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Major versions 45 (JDK 1.0.2) through 52 (Java 8).
pub const SUPPORTED_MAJOR_VERSIONS: RangeInclusive<u16> = 45..=52;

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELD: u8 = 9;
pub const TAG_METHOD: u8 = 10;
pub const TAG_INTERFACE_METHOD: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;

pub const CLASS_INITIALISER: &str = "<clinit>";
pub const INSTANCE_INITIALISER: &str = "<init>";
