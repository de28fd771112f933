//! Balanced-parenthesis scanning shared by the rewrite passes.
//!
//! `CONVERT(...)` and `CHECK(...)` bodies nest parentheses freely, which a
//! regex cannot delimit; these scanners walk forward tracking depth from a
//! known opening paren.

/// Byte index of the `)` matching the `(` that ends just before `after_open`,
/// or `None` when the text runs out first.
pub(crate) fn find_closing(text: &str, after_open: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text[after_open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(after_open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scan a call argument list starting just after its opening paren. Returns
/// the byte offsets of the top-level commas and of the closing paren.
pub(crate) fn scan_call(text: &str, after_open: usize) -> Option<(Vec<usize>, usize)> {
    let mut depth = 1usize;
    let mut commas = Vec::new();
    for (i, c) in text[after_open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((commas, after_open + i));
                }
            }
            ',' if depth == 1 => commas.push(after_open + i),
            _ => {}
        }
    }
    None
}
