//! Tokenizer for MySQL `INSERT INTO ... VALUES (...),(...);` dump lines

/// One column value of a dumped row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    /// Quoted string, escapes resolved
    Text(String),
    /// Bare token such as a number
    Literal(String),
}

impl SqlValue {
    /// Textual content, `None` for `NULL`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(text) | SqlValue::Literal(text) => Some(text),
        }
    }
}

/// Failures while reading a dump
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DumpError {
    #[error("unexpected end of statement")]
    UnexpectedEnd,

    #[error("unexpected {found:?} at byte {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("column {column}: {reason}")]
    InvalidValue {
        column: &'static str,
        reason: String,
    },
}

/// Rows of `line` if it inserts into `table`, `None` for any other line
pub fn parse_insert(line: &str, table: &str) -> Option<Result<Vec<Vec<SqlValue>>, DumpError>> {
    let rest = line
        .strip_prefix("INSERT INTO `")?
        .strip_prefix(table)?
        .strip_prefix("` VALUES")?;
    let offset = line.len() - rest.len();
    Some(Cursor::new(rest, offset).rows())
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    // position of `text` inside the full line, for error offsets
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Self { text, pos: 0, base }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn unexpected(&self, found: char) -> DumpError {
        DumpError::Unexpected {
            found,
            offset: self.base + self.pos - found.len_utf8(),
        }
    }

    fn rows(mut self) -> Result<Vec<Vec<SqlValue>>, DumpError> {
        let mut rows = Vec::new();
        loop {
            self.skip_whitespace();
            match self.bump() {
                Some('(') => rows.push(self.tuple()?),
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(DumpError::UnexpectedEnd),
            }
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(';') | None => return Ok(rows),
                Some(c) => return Err(self.unexpected(c)),
            }
        }
    }

    fn tuple(&mut self) -> Result<Vec<SqlValue>, DumpError> {
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            values.push(self.value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(values),
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(DumpError::UnexpectedEnd),
            }
        }
    }

    fn value(&mut self) -> Result<SqlValue, DumpError> {
        match self.peek() {
            Some('\'') => self.quoted(),
            Some(_) => self.literal(),
            None => Err(DumpError::UnexpectedEnd),
        }
    }

    fn quoted(&mut self) -> Result<SqlValue, DumpError> {
        let start = self.base + self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('0') => out.push('\0'),
                    Some('Z') => out.push('\u{1a}'),
                    Some(c) => out.push(c),
                    None => return Err(DumpError::UnterminatedString { offset: start }),
                },
                // a doubled quote is an escaped quote
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    out.push('\'');
                }
                Some('\'') => return Ok(SqlValue::Text(out)),
                Some(c) => out.push(c),
                None => return Err(DumpError::UnterminatedString { offset: start }),
            }
        }
    }

    fn literal(&mut self) -> Result<SqlValue, DumpError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ')' {
                break;
            }
            self.bump();
        }
        let token = self.text[start..self.pos].trim();
        if token.is_empty() {
            return match self.peek() {
                Some(c) => {
                    self.bump();
                    Err(self.unexpected(c))
                }
                None => Err(DumpError::UnexpectedEnd),
            };
        }
        if token.eq_ignore_ascii_case("NULL") {
            Ok(SqlValue::Null)
        } else {
            Ok(SqlValue::Literal(token.to_string()))
        }
    }
}
