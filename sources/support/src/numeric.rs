//! IEEE 754 reconstruction from the big-endian bit patterns stored in the constant pool.
//!
//! These rebuild the value from sign, exponent and mantissa arithmetically instead of
//! reinterpreting the bits, so the result does not depend on the host float layout.

/// `x * 2^exp`, exact whenever the result is representable.
pub fn ldexp(mut x: f64, mut exp: i32) -> f64 {
    // 2^1023 and 2^-1022 are the extreme normal powers of two
    let two_pow = |n: i32| 2.0_f64.powi(n);

    while exp > 1023 {
        x *= two_pow(1023);
        exp -= 1023;

        if x.is_infinite() {
            return x;
        }
    }

    while exp < -1022 {
        x *= two_pow(-1022);
        exp += 1022;

        if x == 0.0 {
            return x;
        }
    }

    x * two_pow(exp)
}

pub fn float_from_bits(bits: u32) -> f32 {
    let negative = bits >> 31 != 0;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let fraction = bits & 0x7F_FFFF;

    if exponent == 0xFF {
        return match (fraction, negative) {
            (0, false) => f32::INFINITY,
            (0, true) => f32::NEG_INFINITY,
            _ => f32::NAN,
        };
    }

    let mantissa = if exponent == 0 {
        // denormal: no implicit bit, exponent fixed at -126
        fraction << 1
    } else {
        fraction | 0x80_0000
    };

    // mantissa < 2^24, so the product is exact in f64 and exactly representable in f32
    let magnitude = ldexp(mantissa as f64, exponent - 150) as f32;

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

pub fn double_from_bits(bits: u64) -> f64 {
    let negative = bits >> 63 != 0;
    let exponent = ((bits >> 52) & 0x7FF) as i32;
    let fraction = bits & 0xF_FFFF_FFFF_FFFF;

    if exponent == 0x7FF {
        return match (fraction, negative) {
            (0, false) => f64::INFINITY,
            (0, true) => f64::NEG_INFINITY,
            _ => f64::NAN,
        };
    }

    let mantissa = if exponent == 0 {
        fraction << 1
    } else {
        fraction | 0x10_0000_0000_0000
    };

    let magnitude = ldexp(mantissa as f64, exponent - 1075);

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Join the two 32 bit halves a category 2 value is split into.
pub fn join_halves(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

pub fn split_halves(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_float_specials() {
        assert_eq!(float_from_bits(0x7F80_0000), f32::INFINITY);
        assert_eq!(float_from_bits(0xFF80_0000), f32::NEG_INFINITY);
        assert!(float_from_bits(0x7FC0_0000).is_nan());
        assert!(float_from_bits(0xFF80_0001).is_nan());
        assert_eq!(float_from_bits(0x3F80_0000), 1.0);
    }

    #[test]
    fn it_matches_native_float_layout() {
        for bits in [
            0x0000_0000_u32,
            0x8000_0000,
            0x0000_0001,
            0x807F_FFFF,
            0x0080_0000,
            0x4049_0FDB,
            0xC2F6_E979,
            0x7F7F_FFFF,
        ] {
            let ours = float_from_bits(bits);
            assert_eq!(ours.to_bits(), f32::from_bits(bits).to_bits(), "{bits:#x}");
        }
    }

    #[test]
    fn it_matches_native_double_layout() {
        for bits in [
            0x0000_0000_0000_0000_u64,
            0x8000_0000_0000_0000,
            0x0000_0000_0000_0001,
            0x000F_FFFF_FFFF_FFFF,
            0x0010_0000_0000_0000,
            0x3FF0_0000_0000_0000,
            0x4009_21FB_5444_2D18,
            0xC05E_DD2F_1A9F_BE77,
            0x7FEF_FFFF_FFFF_FFFF,
        ] {
            let ours = double_from_bits(bits);
            assert_eq!(ours.to_bits(), f64::from_bits(bits).to_bits(), "{bits:#x}");
        }

        assert_eq!(double_from_bits(0x7FF0_0000_0000_0000), f64::INFINITY);
        assert_eq!(double_from_bits(0xFFF0_0000_0000_0000), f64::NEG_INFINITY);
        assert!(double_from_bits(0x7FF8_0000_0000_0000).is_nan());
    }

    #[test]
    fn it_splits_and_joins_halves() {
        let value = 0x1234_5678_9ABC_DEF0_u64;
        let (hi, lo) = split_halves(value);
        assert_eq!((hi, lo), (0x1234_5678, 0x9ABC_DEF0));
        assert_eq!(join_halves(hi, lo), value);
    }
}
