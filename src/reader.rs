use crate::error::{SchemeError, SchemeResult};
use crate::store::{sym, ValueStore};
use crate::value::Value;

/// Parses source text into values allocated in a `ValueStore`.
pub struct Reader<'a> {
    input: &'a str,
    pos: usize,
    store: &'a mut ValueStore,
}

/// Unicode White_Space plus the zero-width and formatting characters that
/// are commonly pasted into source by editors.
pub fn is_whitespace(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '\u{180E}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'
        )
}

fn is_delimiter(c: char) -> bool {
    is_whitespace(c) || matches!(c, '(' | ')' | '\'' | '"' | ';')
}

/// How far a piece of source is from being a sequence of complete forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    /// Every paren is matched and no string is left open.
    Complete,
    /// More input is needed: open parens or an unterminated string.
    Incomplete,
    /// A `)` appears with no matching `(`.
    Unbalanced,
}

/// Scan parens, skipping string literals and `;` comments.
pub fn check_balance(input: &str) -> Balance {
    let mut depth: usize = 0;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Balance::Unbalanced;
                }
                depth -= 1;
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Balance::Incomplete;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Balance::Complete
    } else {
        Balance::Incomplete
    }
}

fn validate(input: &str) -> SchemeResult<()> {
    match check_balance(input) {
        Balance::Complete => Ok(()),
        Balance::Incomplete => Err(SchemeError::ReadError(
            "unbalanced input: missing ')' or '\"'".into(),
        )),
        Balance::Unbalanced => Err(SchemeError::ReadError("unexpected ')'".into())),
    }
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, store: &'a mut ValueStore) -> Self {
        Reader {
            input,
            pos: 0,
            store,
        }
    }

    /// Read one expression. Returns None at EOF.
    pub fn read(&mut self) -> SchemeResult<Option<Value>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        self.read_expr().map(Some)
    }

    /// Return current position in input.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_all(&mut self) -> SchemeResult<Vec<Value>> {
        let mut results = Vec::new();
        while let Some(value) = self.read()? {
            results.push(value);
        }
        Ok(results)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.advance();
            } else if c == ';' {
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_expr(&mut self) -> SchemeResult<Value> {
        self.skip_whitespace_and_comments();

        let c = self
            .peek()
            .ok_or_else(|| SchemeError::ReadError("unexpected EOF".into()))?;

        match c {
            '(' => self.read_list(),
            ')' => Err(SchemeError::ReadError("unexpected ')'".into())),
            '\'' => self.read_quote(),
            '"' => self.read_string(),
            _ => self.read_word(),
        }
    }

    /// Read a proper list: (a b c). `()` is Null.
    fn read_list(&mut self) -> SchemeResult<Value> {
        self.advance(); // '('
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(')') => {
                    self.advance();
                    break;
                }
                Some(_) => elements.push(self.read_expr()?),
                None => return Err(SchemeError::ReadError("unterminated list".into())),
            }
        }
        self.store.list(&elements)
    }

    /// 'expr -> (quote expr)
    fn read_quote(&mut self) -> SchemeResult<Value> {
        self.advance(); // '\''
        let expr = self.read_expr()?;
        self.store.list(&[Value::Symbol(sym::QUOTE), expr])
    }

    fn read_string(&mut self) -> SchemeResult<Value> {
        self.advance(); // '"'
        let mut text = String::new();
        loop {
            let c = self
                .advance()
                .ok_or_else(|| SchemeError::ReadError("unterminated string".into()))?;
            match c {
                '"' => break,
                '\\' => {
                    let esc = self
                        .advance()
                        .ok_or_else(|| SchemeError::ReadError("unterminated escape".into()))?;
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c => text.push(c),
            }
        }
        self.store.string(&text)
    }

    /// Read a word: number or symbol.
    fn read_word(&mut self) -> SchemeResult<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.advance();
        }
        let word = &self.input[start..self.pos];
        if word.is_empty() {
            return Err(SchemeError::ReadError("empty word".into()));
        }

        if let Some(number) = self.try_parse_number(word)? {
            return Ok(number);
        }
        self.store.intern(word)
    }

    /// Integers first, then doubles. Returns None if the word is a symbol.
    fn try_parse_number(&mut self, word: &str) -> SchemeResult<Option<Value>> {
        let bytes = word.as_bytes();
        let numeric_start = match bytes[0] {
            b'0'..=b'9' | b'.' => true,
            b'+' | b'-' => bytes.len() > 1 && (bytes[1].is_ascii_digit() || bytes[1] == b'.'),
            _ => false,
        };
        if !numeric_start {
            return Ok(None);
        }

        if let Ok(n) = word.parse::<i64>() {
            return match Value::number(n) {
                Some(value) => Ok(Some(value)),
                None => Err(SchemeError::NumericRange(format!(
                    "integer literal {} out of range",
                    word
                ))),
            };
        }
        if word.trim_start_matches(['+', '-']).bytes().all(|b| b.is_ascii_digit()) {
            return Err(SchemeError::NumericRange(format!(
                "integer literal {} out of range",
                word
            )));
        }
        match word.parse::<f64>() {
            Ok(x) => self.store.double(x).map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// Read a single expression from a string.
pub fn read_str(input: &str, store: &mut ValueStore) -> SchemeResult<Value> {
    validate(input)?;
    let mut reader = Reader::new(input, store);
    reader
        .read()?
        .ok_or_else(|| SchemeError::ReadError("empty input".into()))
}

/// Read all expressions from a string.
pub fn read_all(input: &str, store: &mut ValueStore) -> SchemeResult<Vec<Value>> {
    validate(input)?;
    let mut reader = Reader::new(input, store);
    reader.read_all()
}

/// Read one expression starting at byte offset `pos`.
/// Returns `Ok(Some((value, new_pos)))` or `Ok(None)` if only whitespace/comments remain.
pub fn read_one_at(
    input: &str,
    pos: usize,
    store: &mut ValueStore,
) -> SchemeResult<Option<(Value, usize)>> {
    let rest = input
        .get(pos..)
        .ok_or_else(|| SchemeError::ReadError(format!("offset {} is not a char boundary", pos)))?;
    let mut reader = Reader::new(rest, store);
    match reader.read()? {
        Some(value) => Ok(Some((value, pos + reader.position()))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::value::{FIXNUM_MAX, FIXNUM_MIN};

    fn store() -> ValueStore {
        ValueStore::new(&StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_read_atoms() {
        let mut store = store();
        assert_eq!(read_str("42", &mut store).unwrap(), Value::number(42).unwrap());
        assert_eq!(read_str("-7", &mut store).unwrap(), Value::number(-7).unwrap());
        assert_eq!(read_str("()", &mut store).unwrap(), Value::Null);
        let abc = read_str("abc", &mut store).unwrap();
        assert_eq!(abc, store.intern("abc").unwrap());
        let d = read_str("2.5", &mut store).unwrap();
        assert_eq!(store.double_value(d).unwrap(), 2.5);
    }

    #[test]
    fn test_sign_only_words_are_symbols() {
        let mut store = store();
        let plus = read_str("+", &mut store).unwrap();
        assert_eq!(store.symbol_name(plus).unwrap(), "+");
        let minus = read_str("-", &mut store).unwrap();
        assert_eq!(store.symbol_name(minus).unwrap(), "-");
        let nan = read_str("nan", &mut store).unwrap();
        assert!(nan.is_symbol());
        let odd = read_str("1+", &mut store).unwrap();
        assert!(odd.is_symbol());
    }

    #[test]
    fn test_fixnum_range_bounds() {
        let mut store = store();
        assert_eq!(
            read_str("-1152921504606846976", &mut store).unwrap(),
            Value::number(FIXNUM_MIN).unwrap()
        );
        assert_eq!(
            read_str("1152921504606846975", &mut store).unwrap(),
            Value::number(FIXNUM_MAX).unwrap()
        );
        assert!(matches!(
            read_str("1152921504606846976", &mut store),
            Err(SchemeError::NumericRange(_))
        ));
        assert!(matches!(
            read_str("99999999999999999999999", &mut store),
            Err(SchemeError::NumericRange(_))
        ));
    }

    #[test]
    fn test_read_lists_and_quote() {
        let mut store = store();
        let list = read_str("(a (b) 3)", &mut store).unwrap();
        assert_eq!(store.length(list).unwrap(), 3);
        let inner = store.cadr(list).unwrap();
        assert_eq!(store.length(inner).unwrap(), 1);

        let quoted = read_str("'x", &mut store).unwrap();
        assert_eq!(store.car(quoted).unwrap(), Value::Symbol(sym::QUOTE));
        assert_eq!(store.cadr(quoted).unwrap(), store.intern("x").unwrap());
    }

    #[test]
    fn test_read_string_escapes() {
        let mut store = store();
        let s = read_str(r#""a\"b\\c\nd""#, &mut store).unwrap();
        assert_eq!(store.string_text(s).unwrap(), b"a\"b\\c\nd");
    }

    #[test]
    fn test_unicode_whitespace_and_comments() {
        let mut store = store();
        let forms = read_all("\u{FEFF}a\u{200B}b ; trailing\n\u{3000}c", &mut store).unwrap();
        assert_eq!(forms.len(), 3);
        assert_eq!(store.symbol_name(forms[2]).unwrap(), "c");
    }

    #[test]
    fn test_balance_is_checked_before_reading() {
        let mut store = store();
        assert_eq!(check_balance("(a (b)"), Balance::Incomplete);
        assert_eq!(check_balance("a)"), Balance::Unbalanced);
        assert_eq!(check_balance("(a \")\")"), Balance::Complete);
        assert_eq!(check_balance("(a ; )\n)"), Balance::Complete);
        assert_eq!(check_balance("\"open"), Balance::Incomplete);
        assert!(matches!(read_all("(a", &mut store), Err(SchemeError::ReadError(_))));
        assert!(matches!(read_all(")", &mut store), Err(SchemeError::ReadError(_))));
    }

    #[test]
    fn test_read_one_at_advances() {
        let mut store = store();
        let src = "(define x 1) x  ";
        let (first, pos) = read_one_at(src, 0, &mut store).unwrap().unwrap();
        assert!(first.is_cons());
        let (second, pos) = read_one_at(src, pos, &mut store).unwrap().unwrap();
        assert_eq!(second, store.intern("x").unwrap());
        assert_eq!(read_one_at(src, pos, &mut store).unwrap(), None);
    }
}
