//! Code page 437 filename codec.
//!
//! ZIP filenames travel in IBM code page 437 (the original PC OEM set).
//! ASCII passes through unchanged; the upper half maps through a fixed
//! 128-entry table. Names containing characters outside the code page
//! cannot be written to an archive.

/// Characters for bytes 0x80-0xFF of code page 437.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

/// Encode a name to code page 437 bytes, or `None` if any character has no
/// mapping (control characters included).
pub fn encode(name: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(name.len());
    for ch in name.chars() {
        if ('\u{20}'..'\u{7F}').contains(&ch) {
            out.push(ch as u8);
        } else if let Some(idx) = CP437_HIGH.iter().position(|&c| c == ch) {
            out.push(0x80 + idx as u8);
        } else {
            return None;
        }
    }
    Some(out)
}

/// Decode code page 437 bytes into a string. Every byte has a mapping.
pub fn decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                char::from(b)
            } else {
                CP437_HIGH[usize::from(b - 0x80)]
            }
        })
        .collect()
}
