use super::token::Token;

/// Table names referenced as `Table[Column]`, in first-seen order without
/// duplicates. Purely lexical: nothing checks that the tables exist.
pub fn source_tables(tokens: &[Token]) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for window in tokens.windows(3) {
        if let [Token::Identifier(table), Token::OpenBracket, column] = window {
            if column.is_word() && !tables.contains(table) {
                tables.push(table.clone());
            }
        }
    }
    tables
}
