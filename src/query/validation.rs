//! Syntax guard for live queries.
//!
//! osquery only ever reads, so the console refuses anything that would try to
//! write through the SQLite virtual tables before a campaign is created.

use thiserror::Error;

/// Keywords that make a statement mutating wherever they appear as a token.
pub const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "CREATE", "UPDATE", "DELETE", "DROP", "ALTER", "ATTACH", "DETACH", "REINDEX",
    "VACUUM",
];

/// Only mutating when it opens a statement; `replace(x, y, z)` is a read-only function.
const STATEMENT_LEADING_KEYWORDS: &[&str] = &["REPLACE"];

/// Precondition failures reported by `start()` before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Query text must be present")]
    EmptyQuery,

    #[error("Cannot {keyword} in osquery queries")]
    MutatingStatement { keyword: String },

    #[error("Query contains an unterminated string, identifier or comment")]
    UnterminatedLiteral,

    #[error("You must select at least one target to run a query")]
    NoTargetsSelected,
}

/// Check that `text` is a non-empty, read-only query.
pub fn validate_query(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut statement_start = true;
    let mut saw_word = false;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => i = skip_quoted(&chars, i, c)?,
            '[' => i = skip_quoted(&chars, i, ']')?,
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => i = skip_block_comment(&chars, i)?,
            ';' => {
                statement_start = true;
                i += 1;
            }
            c if is_word_char(c) => {
                let begin = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[begin..i].iter().collect::<String>().to_uppercase();

                if MUTATING_KEYWORDS.contains(&word.as_str())
                    || (statement_start && STATEMENT_LEADING_KEYWORDS.contains(&word.as_str()))
                {
                    return Err(ValidationError::MutatingStatement { keyword: word });
                }

                statement_start = false;
                saw_word = true;
            }
            _ => i += 1,
        }
    }

    if !saw_word {
        return Err(ValidationError::EmptyQuery);
    }

    Ok(())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Returns the index just past the closing delimiter.
fn skip_quoted(chars: &[char], open: usize, close: char) -> Result<usize, ValidationError> {
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == close {
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(ValidationError::UnterminatedLiteral)
}

fn skip_block_comment(chars: &[char], open: usize) -> Result<usize, ValidationError> {
    let mut i = open + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(ValidationError::UnterminatedLiteral)
}
