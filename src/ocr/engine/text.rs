pub(super) fn join_inline(left: &str, right: &str) -> String {
    if needs_space(left, right) {
        format!("{} {}", left.trim_end(), right.trim_start())
    } else {
        format!("{}{}", left.trim_end(), right.trim_start())
    }
}

/// Latin words get a space between them; CJK runs are joined directly.
pub(super) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            (a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric())
                || (a.is_ascii_alphabetic() && b.is_alphabetic())
                || (a.is_alphabetic() && b.is_ascii_alphabetic())
        }
        _ => false,
    }
}
