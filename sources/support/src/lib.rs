pub mod bytes_ext;
pub mod descriptor;
pub mod identifier;
pub mod numeric;
pub mod types;
pub mod utf8;
