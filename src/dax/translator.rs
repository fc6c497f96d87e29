use super::arguments::{matching_paren, split_token_groups};
use super::signature::{lookup, FunctionRole, TIME_SHIFT_FUNCTION};
use super::token::{render, tokenize, Token};
use crate::metric_view::{DimensionDescriptor, WindowDescriptor};
use log::{debug, warn};
use regex::Regex;
use std::sync::LazyLock;

/// `DATEADD(Table[Column], offset, UNIT)` as rendered by [`render`].
static TIME_SHIFT_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^DATEADD\s*\(\s*(\w+)\s*\[([^\[\]]+)\]\s*,\s*(-?\d+)\s*,\s*(\w+)\s*\)$")
        .expect("time shift pattern is valid")
});

const TIME_SHIFT_UNITS: &[&str] = &["DAY", "MONTH", "QUARTER", "YEAR"];

const SEMIADDITIVE_LAST: &str = "last";

const DIMENSION_TYPE: &str = "int";

/// Window and dimension derived from a time-shift argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeShift {
    Absent,
    Derived {
        dimension: DimensionDescriptor,
        window: WindowDescriptor,
    },
    /// A time shift was present but could not be read; the measure itself is
    /// still translated, only without a window.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub expression: String,
    pub supported: bool,
    pub tokens: Vec<Token>,
    pub time_shift: TimeShift,
}

impl Translation {
    fn unsupported(tokens: Vec<Token>) -> Self {
        Self {
            expression: String::new(),
            supported: false,
            tokens,
            time_shift: TimeShift::Absent,
        }
    }

    pub fn dimension(&self) -> Option<&DimensionDescriptor> {
        match &self.time_shift {
            TimeShift::Derived { dimension, .. } => Some(dimension),
            _ => None,
        }
    }

    pub fn window(&self) -> Option<&WindowDescriptor> {
        match &self.time_shift {
            TimeShift::Derived { window, .. } => Some(window),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.time_shift, TimeShift::Unavailable { .. })
    }
}

/// Translates the first recognised call in `expression`.
///
/// Anything after that call is ignored: one outer aggregation per measure.
pub fn translate(expression: &str) -> Translation {
    let tokens = tokenize(expression);

    let call = tokens.iter().enumerate().find_map(|(idx, token)| {
        let name = token.identifier()?;
        if tokens.get(idx + 1) != Some(&Token::OpenParen) {
            return None;
        }
        match lookup(name)?.role {
            FunctionRole::TimeShift => None,
            role => Some((idx + 1, role)),
        }
    });

    match call {
        Some((open, FunctionRole::Wrapper)) => translate_wrapper(tokens, open),
        Some((open, FunctionRole::Mapped(operator))) => translate_call(tokens, open, operator),
        _ => {
            debug!("No translatable call in {:?}", expression);
            Translation::unsupported(tokens)
        }
    }
}

/// Tokens between the parenthesis at `open` and its match, or the end of the
/// stream when it is never closed.
fn call_inner(tokens: &[Token], open: usize) -> &[Token] {
    let close = matching_paren(tokens, open).unwrap_or(tokens.len());
    &tokens[open + 1..close]
}

fn translate_wrapper(tokens: Vec<Token>, open: usize) -> Translation {
    let mut expression = None;
    let mut time_shift = TimeShift::Absent;

    for group in split_token_groups(call_inner(&tokens, open)) {
        let Some(signature) = group.first().and_then(Token::identifier).and_then(lookup) else {
            continue;
        };
        match signature.role {
            // a later aggregation replaces an earlier one
            FunctionRole::Mapped(operator) => {
                if group.get(1) != Some(&Token::OpenParen) {
                    continue;
                }
                if let Some(column) = first_column(&group[1..]) {
                    expression = Some(format!("{}({})", operator, column));
                }
            }
            FunctionRole::TimeShift if time_shift == TimeShift::Absent => {
                time_shift = derive_time_shift(group);
                if let TimeShift::Unavailable { reason } = &time_shift {
                    warn!("{} ignored, window unavailable: {}", TIME_SHIFT_FUNCTION, reason);
                }
            }
            _ => (),
        }
    }

    match expression {
        Some(expression) => Translation {
            expression,
            supported: true,
            tokens,
            time_shift,
        },
        None => Translation::unsupported(tokens),
    }
}

fn translate_call(tokens: Vec<Token>, open: usize, operator: &str) -> Translation {
    let operands: Option<Vec<String>> = split_token_groups(call_inner(&tokens, open))
        .into_iter()
        .map(column_reference)
        .collect();

    match operands {
        Some(operands) => Translation {
            expression: format!("{}({})", operator, operands.join(", ")),
            supported: true,
            tokens,
            time_shift: TimeShift::Absent,
        },
        None => {
            debug!("{} has arguments that are not column references", operator);
            Translation::unsupported(tokens)
        }
    }
}

/// Column of a `Table[Column]` argument; `None` for any other argument
/// shape, a bare `[Column]` included.
fn column_reference(group: &[Token]) -> Option<String> {
    match group {
        [Token::Identifier(_), Token::OpenBracket, column, Token::CloseBracket]
            if column.is_word() =>
        {
            Some(column.to_string())
        }
        _ => None,
    }
}

/// Column of the first bracketed reference anywhere in `tokens`.
fn first_column(tokens: &[Token]) -> Option<String> {
    tokens
        .windows(3)
        .find_map(|window| match window {
            [Token::OpenBracket, column, Token::CloseBracket] if column.is_word() => {
                Some(column.to_string())
            }
            _ => None,
        })
}

fn derive_time_shift(group: &[Token]) -> TimeShift {
    let text = render(group);
    let unavailable = |reason: String| TimeShift::Unavailable { reason };

    let Some(captures) = TIME_SHIFT_SHAPE.captures(&text) else {
        return unavailable(format!(
            "expected {}(Table[Column], offset, unit), got `{}`",
            TIME_SHIFT_FUNCTION, text
        ));
    };

    let table = &captures[1];
    let column = captures[2].trim();
    let offset: i64 = match captures[3].parse() {
        Ok(offset) => offset,
        Err(e) => return unavailable(format!("offset `{}` is not usable: {}", &captures[3], e)),
    };
    let unit = captures[4].to_uppercase();
    if !TIME_SHIFT_UNITS.contains(&unit.as_str()) {
        return unavailable(format!("unknown interval `{}`", &captures[4]));
    }

    let direction = if offset >= 0 { "leading" } else { "trailing" };
    let dimension_name = format!("{}_Date", table);

    TimeShift::Derived {
        dimension: DimensionDescriptor {
            name: dimension_name.clone(),
            expr: format!("date_trunc('{}', {})", unit, column),
            data_type: DIMENSION_TYPE.to_string(),
        },
        window: WindowDescriptor {
            order: dimension_name,
            range: format!("{} {} {}", direction, offset.unsigned_abs(), unit),
            semiadditive: SEMIADDITIVE_LAST.to_string(),
        },
    }
}
