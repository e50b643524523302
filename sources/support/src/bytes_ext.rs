//! Checked big-endian reads over any [`Buf`].
//!
//! The plain `Buf::get_*` family panics on a short buffer. Every reader here checks
//! `remaining()` first, so a failed read consumes nothing and the caller's byte
//! counter (`initial_len - remaining()`) only reflects bytes that were actually read.

use anyhow::{anyhow, Result};
use bytes::Buf;
use paste::paste;

macro_rules! safe_get {
    ($($ty: ident),*) => {
        paste! {
            $(
                fn [<safe_get_ $ty>](&mut self) -> Result<$ty> {
                    let needed = std::mem::size_of::<$ty>();
                    if self.remaining() < needed {
                        return Err(anyhow!(
                            "buffer too short for {}: needed {} bytes, had {}",
                            stringify!($ty),
                            needed,
                            self.remaining()
                        ));
                    }

                    Ok(self.[<get_ $ty>]())
                }
            )*
        }
    };
}

pub trait SafeBuf: Buf {
    safe_get!(u8, u16, u32, u64, i8, i16, i32, i64);

    /// Read exactly `len` bytes into an owned buffer.
    fn safe_get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(anyhow!(
                "buffer too short for {} bytes, had {}",
                len,
                self.remaining()
            ));
        }

        let mut out = vec![0; len];
        self.copy_to_slice(&mut out);
        Ok(out)
    }

    fn try_skip(&mut self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(anyhow!("cannot skip {} bytes, had {}", len, self.remaining()));
        }

        self.advance(len);
        Ok(())
    }
}

impl<T: Buf> SafeBuf for T {}
