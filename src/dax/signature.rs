use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Name of the filter-context wrapper whose arguments are translated one by one.
pub const WRAPPER_FUNCTION: &str = "CALCULATE";

/// Name of the time-shift function that yields a window and a date dimension.
pub const TIME_SHIFT_FUNCTION: &str = "DATEADD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRole {
    /// Translates directly to the given metric-view operator.
    Mapped(&'static str),
    Wrapper,
    TimeShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub role: FunctionRole,
    pub min_args: usize,
    /// `None` means unbounded.
    pub max_args: Option<usize>,
}

impl FunctionSignature {
    pub fn target_operator(&self) -> Option<&'static str> {
        match self.role {
            FunctionRole::Mapped(operator) => Some(operator),
            _ => None,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human readable bound, e.g. `exactly 1 argument` or `at least 1 argument`.
    pub fn arity(&self) -> String {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {} {}", max, plural(max)),
            Some(max) => format!("between {} and {} arguments", self.min_args, max),
            None => format!("at least {} {}", self.min_args, plural(self.min_args)),
        }
    }
}

const fn mapped(
    name: &'static str,
    operator: &'static str,
    min_args: usize,
    max_args: Option<usize>,
) -> FunctionSignature {
    FunctionSignature {
        name,
        role: FunctionRole::Mapped(operator),
        min_args,
        max_args,
    }
}

const SIGNATURES: &[FunctionSignature] = &[
    FunctionSignature {
        name: WRAPPER_FUNCTION,
        role: FunctionRole::Wrapper,
        min_args: 1,
        max_args: None,
    },
    FunctionSignature {
        name: TIME_SHIFT_FUNCTION,
        role: FunctionRole::TimeShift,
        min_args: 3,
        max_args: Some(3),
    },
    // aggregations
    mapped("SUM", "sum", 1, Some(1)),
    mapped("AVERAGE", "avg", 1, Some(1)),
    mapped("AVERAGEX", "avg", 2, Some(2)),
    mapped("COUNT", "count", 1, Some(1)),
    mapped("COUNTA", "count", 1, Some(1)),
    mapped("COUNTAX", "count", 2, Some(2)),
    mapped("COUNTROWS", "count", 0, Some(1)),
    mapped("MAX", "max", 1, Some(2)),
    mapped("MIN", "min", 1, Some(2)),
    mapped("STDEV.P", "stddev_pop", 1, Some(1)),
    mapped("STDEV.S", "stddev_samp", 1, Some(1)),
    mapped("VAR.P", "var_pop", 1, Some(1)),
    mapped("VAR.S", "var_samp", 1, Some(1)),
    // logical
    mapped("AND", "and", 2, Some(2)),
    mapped("OR", "or", 2, Some(2)),
    mapped("NOT", "not", 1, Some(1)),
    mapped("IF", "if", 2, Some(3)),
    // text
    mapped("CONCATENATE", "concat", 2, Some(2)),
    mapped("LEFT", "left", 1, Some(2)),
    mapped("RIGHT", "right", 1, Some(2)),
    mapped("LEN", "length", 1, Some(1)),
    mapped("UPPER", "upper", 1, Some(1)),
    mapped("LOWER", "lower", 1, Some(1)),
    mapped("TRIM", "trim", 1, Some(1)),
    mapped("REPLACE", "replace", 4, Some(4)),
    mapped("SUBSTITUTE", "replace", 3, Some(4)),
    // date and time
    mapped("NOW", "now", 0, Some(0)),
    mapped("TODAY", "current_date", 0, Some(0)),
    mapped("YEAR", "year", 1, Some(1)),
    mapped("MONTH", "month", 1, Some(1)),
    mapped("DAY", "day", 1, Some(1)),
    mapped("HOUR", "hour", 1, Some(1)),
    mapped("MINUTE", "minute", 1, Some(1)),
    mapped("SECOND", "second", 1, Some(1)),
    mapped("DATE", "date", 3, Some(3)),
    mapped("DATEDIFF", "datediff", 3, Some(3)),
    // math
    mapped("ABS", "abs", 1, Some(1)),
    mapped("CEILING", "ceil", 1, Some(2)),
    mapped("FLOOR", "floor", 1, Some(2)),
    mapped("ROUND", "round", 1, Some(2)),
    mapped("POWER", "pow", 2, Some(2)),
    mapped("EXP", "exp", 1, Some(1)),
    mapped("LN", "ln", 1, Some(1)),
    mapped("LOG", "log10", 1, Some(2)),
    mapped("SQRT", "sqrt", 1, Some(1)),
    // information
    mapped("ISBLANK", "isnull", 1, Some(1)),
    mapped("ISNUMBER", "isnumeric", 1, Some(1)),
    mapped("ISTEXT", "typeof", 1, Some(1)),
];

static SIGNATURE_TABLE: LazyLock<BTreeMap<&'static str, FunctionSignature>> =
    LazyLock::new(|| SIGNATURES.iter().map(|sig| (sig.name, *sig)).collect());

/// Case-insensitive lookup of a DAX function.
pub fn lookup(name: &str) -> Option<&'static FunctionSignature> {
    SIGNATURE_TABLE.get(name.to_uppercase().as_str())
}

/// All known signatures in name order.
pub fn signatures() -> impl Iterator<Item = &'static FunctionSignature> {
    SIGNATURE_TABLE.values()
}
