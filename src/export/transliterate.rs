/// Reduces text to characters the built-in PDF fonts can draw: Latin-1 is
/// kept, everything else is transliterated with `deunicode` or dropped.
/// Line breaks are normalised to `\n` and tabs become four spaces.
pub fn to_latin1(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\n' | '\r' => out.push('\n'),
            '\t' => out.push_str("    "),
            c if c.is_control() => {}
            c if (c as u32) <= 0xFF => out.push(c),
            c => {
                if let Some(ascii) = deunicode::deunicode_char(c) {
                    out.push_str(ascii);
                }
            }
        }
    }

    out
}
