use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Alternatives are tried in order at each position, so a decimal wins over
/// an integer and a signed number wins over a bare minus.
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?[0-9]+\.[0-9]+|-?[0-9]+|[A-Za-z_][A-Za-z0-9_]*|[()\[\],+\-*/]")
        .expect("token pattern is valid")
});

/// Lexical unit of a DAX formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Identifier(String),
    Integer(String),
    Decimal(String),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
}

impl Token {
    fn from_lexeme(lexeme: &str) -> Self {
        match lexeme {
            "(" => Token::OpenParen,
            ")" => Token::CloseParen,
            "[" => Token::OpenBracket,
            "]" => Token::CloseBracket,
            "," => Token::Comma,
            "+" => Token::Plus,
            "-" => Token::Minus,
            "*" => Token::Star,
            "/" => Token::Slash,
            _ if lexeme.contains('.') => Token::Decimal(lexeme.to_string()),
            _ if lexeme.starts_with(|c: char| c == '-' || c.is_ascii_digit()) => {
                Token::Integer(lexeme.to_string())
            }
            _ => Token::Identifier(lexeme.to_string()),
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, Token::Identifier(_))
    }

    /// Identifier or unsigned number, i.e. something that can name a column
    /// inside brackets.
    pub fn is_word(&self) -> bool {
        match self {
            Token::Identifier(_) => true,
            Token::Integer(text) | Token::Decimal(text) => !text.starts_with('-'),
            _ => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(text) | Token::Integer(text) | Token::Decimal(text) => {
                f.write_str(text)
            }
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::OpenBracket => f.write_str("["),
            Token::CloseBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
        }
    }
}

/// Splits a formula into tokens. Characters outside the token grammar,
/// whitespace and quotes included, are dropped.
pub fn tokenize(expression: &str) -> Vec<Token> {
    TOKEN_PATTERN
        .find_iter(expression)
        .map(|m| Token::from_lexeme(m.as_str()))
        .collect()
}

/// Space separated rendering of a token slice.
pub fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
