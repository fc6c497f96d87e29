use super::arguments::split_arguments;
use super::signature::lookup;
use super::DaxError;
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

static CALL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_.]*)\s*\((.*)\)$").expect("call pattern is valid")
});

static COLUMN_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\[\w+\]$").expect("column pattern is valid"));

pub const DEFAULT_MAX_EXPRESSION_LENGTH: usize = 4096;

/// Structural checks on a DAX call expression against the signature table.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_expression_length: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXPRESSION_LENGTH)
    }
}

impl Validator {
    pub fn new(max_expression_length: usize) -> Self {
        Self {
            max_expression_length,
        }
    }

    pub fn max_expression_length(&self) -> usize {
        self.max_expression_length
    }

    /// Validates `expression`, reporting the first failure found.
    ///
    /// Nested calls are checked recursively without a depth cap; the length
    /// limit is what bounds the work.
    pub fn validate(&self, expression: &str) -> Result<(), DaxError> {
        let length = expression.chars().count();
        if length > self.max_expression_length {
            return Err(DaxError::TooLong {
                length,
                limit: self.max_expression_length,
            });
        }
        validate_call(expression.trim())
    }

    /// `(valid, reason)` pair for display; the reason is empty when valid.
    pub fn check(&self, expression: &str) -> (bool, String) {
        match self.validate(expression) {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }
}

/// Splits `NAME(ARGS)` into its parts when the opening parenthesis is the
/// one closed at the very end.
fn call_parts(expression: &str) -> Option<(&str, &str)> {
    let captures = CALL_SHAPE.captures(expression)?;
    let name = captures.get(1)?.as_str();
    let inner = captures.get(2)?.as_str();

    let mut depth: i32 = 0;
    for ch in inner.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => (),
        }
    }
    (depth == 0).then_some((name, inner))
}

fn validate_call(expression: &str) -> Result<(), DaxError> {
    let (name, inner) =
        call_parts(expression).ok_or_else(|| DaxError::InvalidFormat(expression.to_string()))?;

    let signature =
        lookup(name).ok_or_else(|| DaxError::UnsupportedFunction(name.to_uppercase()))?;

    let arguments = split_arguments(inner);
    if !signature.accepts(arguments.len()) {
        return Err(DaxError::Arity {
            function: signature.name.to_string(),
            expected: signature.arity(),
            found: arguments.len(),
        });
    }
    debug!("{} called with {} argument(s)", signature.name, arguments.len());

    for argument in &arguments {
        if CALL_SHAPE.is_match(argument) {
            validate_call(argument)?;
        } else if argument.contains(['[', ']']) && !COLUMN_REFERENCE.is_match(argument) {
            return Err(DaxError::InvalidColumnReference(argument.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn validator() -> Validator {
        Validator::default()
    }

    #[rstest]
    #[case::simple("SUM(Sales[Amount])")]
    #[case::calculate("CALCULATE(SUM(Sales[Amount]))")]
    #[case::padded("  calculate( sum( Sales[Amount] ) )  ")]
    #[case::time_shift("CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30, DAY))")]
    #[case::no_arguments("TODAY()")]
    #[case::dotted_name("STDEV.P(Sales[Amount])")]
    #[case::literal_arguments("ROUND(SUM(Sales[Amount]), 2)")]
    #[case::deep_nesting("ABS(ABS(ABS(ABS(ABS(ABS(ABS(ABS(Sales[Amount]))))))))")]
    fn test_valid(validator: Validator, #[case] expression: &str) {
        assert_eq!(validator.validate(expression), Ok(()));
        assert_eq!(validator.check(expression), (true, String::new()));
    }

    #[rstest]
    #[case::not_a_call("Sales[Amount]")]
    #[case::trailing_operator("SUM(Sales[Amount]) + 1")]
    #[case::two_calls("SUM(Sales[Amount]) / SUM(Sales[Qty])")]
    #[case::unbalanced("SUM((Sales[Amount])")]
    #[case::empty("")]
    fn test_invalid_format(validator: Validator, #[case] expression: &str) {
        assert!(matches!(
            validator.validate(expression),
            Err(DaxError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_function() {
        let result = validator().validate("RANKX(Sales, Sales[Amount])");
        assert_eq!(result, Err(DaxError::UnsupportedFunction("RANKX".to_string())));
    }

    #[test]
    fn test_nested_unsupported_function() {
        let result = validator().validate("CALCULATE(SUM(Sales[Amount]), FILTER(Sales, Sales[Qty]))");
        assert_eq!(result, Err(DaxError::UnsupportedFunction("FILTER".to_string())));
    }

    #[rstest]
    #[case::too_many("SUM(Sales[Amount], Sales[Qty])", "SUM", 2)]
    #[case::too_few("CALCULATE()", "CALCULATE", 0)]
    #[case::dateadd_short("CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30))", "DATEADD", 2)]
    fn test_arity(
        validator: Validator,
        #[case] expression: &str,
        #[case] function: &str,
        #[case] found: usize,
    ) {
        match validator.validate(expression) {
            Err(DaxError::Arity {
                function: f,
                found: n,
                ..
            }) => {
                assert_eq!(f, function);
                assert_eq!(n, found);
            }
            other => panic!("expected arity error, got {:?}", other),
        }
    }

    #[test]
    fn test_arity_message_names_bound() {
        let (valid, reason) = validator().check("SUM(Sales[Amount], Sales[Qty])");
        assert!(!valid);
        assert_eq!(reason, "SUM expects exactly 1 argument, got 2");
    }

    #[rstest]
    #[case::unterminated("CALCULATE(SUM(Sales[Amount]), Extra[Bad Col)", "Extra[Bad Col")]
    #[case::no_table("SUM([Amount])", "[Amount]")]
    #[case::expression("IF(Sales[Amount] > 10, 1, 0)", "Sales[Amount] > 10")]
    #[case::nested_brackets("SUM(Sales[[Amount]])", "Sales[[Amount]]")]
    fn test_invalid_column_reference(
        validator: Validator,
        #[case] expression: &str,
        #[case] argument: &str,
    ) {
        assert_eq!(
            validator.validate(expression),
            Err(DaxError::InvalidColumnReference(argument.to_string()))
        );
        let (_, reason) = validator.check(expression);
        assert!(reason.contains("invalid column reference"));
    }

    #[test]
    fn test_first_failure_wins() {
        let result = validator().validate("CALCULATE(RANKX(a), SUM(Sales[Amount], x))");
        assert_eq!(result, Err(DaxError::UnsupportedFunction("RANKX".to_string())));
    }

    #[test]
    fn test_length_limit() {
        let validator = Validator::new(16);
        assert!(validator.validate("SUM(Sales[Amount])").is_err());
        assert_eq!(
            validator.validate("SUM(Sales[Amount])"),
            Err(DaxError::TooLong {
                length: 18,
                limit: 16
            })
        );
        assert!(Validator::new(18).validate("SUM(Sales[Amount])").is_ok());
    }

    #[test]
    fn test_depth_is_not_capped() {
        let depth = 200;
        let expression = format!("{}Sales[Amount]{}", "ABS(".repeat(depth), ")".repeat(depth));
        assert!(Validator::new(usize::MAX).validate(&expression).is_ok());
    }
}
