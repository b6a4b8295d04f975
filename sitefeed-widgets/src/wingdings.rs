//! The "wingdings" obfuscation: letters become symbols, everything else is left alone.

/// Symbols for `a` through `z`, applied to either case.
const GLYPHS: [char; 26] = [
    '✈', '✌', '☯', '✡', '☮', '☢', '☣', '☤', '☥', '☦', '☧', '☨', '☩', '☪', '☫', '☬', '☭', '☮',
    '☯', '☸', '☹', '☺', '☻', '☼', '☽', '☾',
];

pub fn to_wingdings(text: &str) -> String {
    text.chars().map(glyph).collect()
}

fn glyph(c: char) -> char {
    if c.is_ascii_alphabetic() {
        GLYPHS[usize::from(c.to_ascii_lowercase() as u8 - b'a')]
    } else {
        c
    }
}
