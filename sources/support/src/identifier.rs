use crate::{descriptor, utf8};

/// Java identifier grammar over modified UTF-8 bytes.
///
/// The first character must be a letter, `_` or `$`; later ones may also be digits. In
/// class mode `/` separates package segments, so it can neither start nor end one. A
/// name that starts with `[` is an array class and is checked as a field descriptor
/// instead.
pub fn is_valid_java_identifier(bytes: &[u8], class_mode: bool) -> bool {
    if bytes.is_empty() {
        return false;
    }

    if bytes[0] == b'[' {
        return descriptor::read_field_descriptor(bytes, true) == Some(bytes.len());
    }

    let mut segment_start = true;

    for ch in utf8::chars(bytes) {
        let Ok(ch) = ch else {
            return false;
        };

        let Some(ch) = char::from_u32(ch) else {
            // lone surrogate halves are not letters
            return false;
        };

        let accepted = ch.is_alphabetic()
            || ch == '_'
            || ch == '$'
            || (ch.is_ascii_digit() && !segment_start)
            || (ch == '/' && class_mode && !segment_start);

        if !accepted {
            return false;
        }

        segment_start = ch == '/';
    }

    // a trailing `/` leaves an empty last segment
    !segment_start
}

/// Method names additionally allow the two special initialiser names.
pub fn is_valid_method_name(bytes: &[u8]) -> bool {
    if utf8::eq_ascii(bytes, "<init>") || utf8::eq_ascii(bytes, "<clinit>") {
        return true;
    }

    is_valid_java_identifier(bytes, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_plain_identifiers() {
        for name in ["myVar", "_x1", "$cache", "caf\u{e9}"] {
            let bytes = utf8::encode(name);
            assert!(is_valid_java_identifier(&bytes, false), "{name}");
        }
    }

    #[test]
    fn it_rejects_malformed_identifiers() {
        for name in ["1abc", "", "a-b", "a b", "x;"] {
            assert!(!is_valid_java_identifier(name.as_bytes(), false), "{name}");
        }
    }

    #[test]
    fn it_only_allows_slashes_in_class_mode() {
        assert!(is_valid_java_identifier(b"java/lang/String", true));
        assert!(!is_valid_java_identifier(b"java/lang/String", false));
        assert!(!is_valid_java_identifier(b"/java", true));
        assert!(!is_valid_java_identifier(b"java//lang", true));
        assert!(!is_valid_java_identifier(b"java/1lang", true));
        assert!(!is_valid_java_identifier(b"java/", true));
        assert!(!is_valid_java_identifier(b"java/lang/", true));
    }

    #[test]
    fn it_checks_array_names_as_descriptors() {
        assert!(is_valid_java_identifier(b"[Ljava/lang/Object;", true));
        assert!(is_valid_java_identifier(b"[[I", false));
        assert!(!is_valid_java_identifier(b"[Q", true));
        assert!(!is_valid_java_identifier(b"[I;", true));
    }

    #[test]
    fn it_accepts_initialiser_method_names() {
        assert!(is_valid_method_name(b"<init>"));
        assert!(is_valid_method_name(b"<clinit>"));
        assert!(is_valid_method_name(b"main"));
        assert!(!is_valid_method_name(b"<main>"));
        assert!(!is_valid_method_name(b"java/lang"));
    }
}
