/// Placeholder written over every byte that is not printable ASCII.
pub const PLACEHOLDER: char = ' ';

/// Turn raw field bytes into a string safe for delimited output.
/// Bytes below 0x20 or above 0x7E become a space, so the length is preserved.
pub fn sanitize(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                PLACEHOLDER
            }
        })
        .collect()
}
