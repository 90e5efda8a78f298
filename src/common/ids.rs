//! Short content fingerprints for log lines.

/// 32-bit FNV-1a over the concatenated `parts`, as 8 lowercase hex digits.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let hash = parts
        .into_iter()
        .flatten()
        .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(*b)).wrapping_mul(0x0100_0193));
    format!("{hash:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_fnv1a_reference() {
        assert_eq!(fingerprint(std::iter::empty()), "811c9dc5");
        assert_eq!(fingerprint([b"a".as_slice()]), "e40c292c");
        assert_eq!(fingerprint([b"a".as_slice(), b"b".as_slice()]), fingerprint([b"ab".as_slice()]));
    }
}
