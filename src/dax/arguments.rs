use super::token::Token;

/// Splits the inner text of an argument list on top-level commas.
///
/// Nesting is tracked on parentheses only. Unbalanced input is not rejected
/// here: callers check the overall call shape before splitting.
pub fn split_arguments(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut arguments = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                arguments.push(inner[start..idx].trim().to_string());
                start = idx + ch.len_utf8();
            }
            _ => (),
        }
    }
    arguments.push(inner[start..].trim().to_string());
    arguments
}

/// Token-stream counterpart of [`split_arguments`]. Empty groups are kept so
/// that positions stay meaningful.
pub fn split_token_groups(inner: &[Token]) -> Vec<&[Token]> {
    if inner.is_empty() {
        return Vec::new();
    }

    let mut groups = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (idx, token) in inner.iter().enumerate() {
        match token {
            Token::OpenParen => depth += 1,
            Token::CloseParen => depth -= 1,
            Token::Comma if depth == 0 => {
                groups.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => (),
        }
    }
    groups.push(&inner[start..]);
    groups
}

/// Index of the parenthesis closing the one at `open`, if the stream closes it.
pub fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::OpenParen => depth += 1,
            Token::CloseParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => (),
        }
    }
    None
}
