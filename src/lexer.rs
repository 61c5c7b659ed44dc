//! Lexical analysis for Sigil script lines: comment stripping and tokenization.

/// A part of a word: literal text or an interpolation marker.
///
/// Interpolations are only recorded here; the executor resolves them against the
/// environment when the statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Literal text that requires no further processing.
    Literal(String),
    /// `$name` or `${name}`. `braced` remembers the spelling so an unresolved reference
    /// can be written back verbatim.
    Var { name: String, braced: bool },
    /// `'name'` shorthand: the variable's value, or `name` itself when undefined.
    Shorthand(String),
}

/// A whitespace-delimited word of a script line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
    /// True when any part of the word came from a quoted span.
    pub quoted: bool,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Word {
            parts: vec![WordPart::Literal(text.into())],
            quoted: false,
        }
    }

    /// The text of an unquoted, interpolation-free word.
    ///
    /// Keywords, operators and identifiers are only recognized in this form, so a quoted
    /// `"then"` is never mistaken for the keyword.
    pub fn as_bare(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(s)] if !self.quoted => Some(s),
            _ => None,
        }
    }

    pub fn is_bare(&self, keyword: &str) -> bool {
        self.as_bare() == Some(keyword)
    }
}

/// A word together with its byte offset in the (comment-stripped) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub word: Word,
    pub offset: usize,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    UnfinishedQuote { offset: usize },
    /// A closing brace for `${...}` was not found.
    UnfinishedParamSubst { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM<'a> {
    input: &'a str,
    pos: usize,
    state: LexingState,
    current_word: Word,
    word_start: usize,
    quote_start: usize,
    in_word: bool,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line,
            pos: 0,
            state: LexingState::Start,
            current_word: Word::default(),
            word_start: 0,
            quote_start: 0,
            in_word: false,
            buffer: String::new(),
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                return Err(LexingError::UnfinishedQuote {
                    offset: self.quote_start,
                });
            }
            _ => {}
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn begin_word(&mut self, ch: char) {
        if !self.in_word {
            self.in_word = true;
            self.word_start = self.pos - ch.len_utf8();
        }
    }

    fn handle_start(&mut self, ch: char) -> Result<(), LexingError> {
        if ch == ' ' || ch == '\t' {
            return Ok(());
        }
        self.begin_word(ch);
        self.state = LexingState::ReadingWord;
        self.handle_word_char(ch)
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' => {
                self.finish_word(out);
                self.state = LexingState::Start;
                Ok(())
            }
            c => self.handle_word_char(c),
        }
    }

    fn handle_word_char(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => {
                self.quote_start = self.pos - 1;
                self.current_word.quoted = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\'' => {
                self.flush_literal();
                self.quote_start = self.pos - 1;
                self.current_word.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '$' => self.read_substitution()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                let name = std::mem::take(&mut self.buffer);
                self.current_word.parts.push(WordPart::Shorthand(name));
                self.state = LexingState::ReadingWord;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.peek_char() {
                Some(escaped @ ('"' | '\\' | '$')) => {
                    self.read_char();
                    self.buffer.push(escaped);
                }
                _ => self.buffer.push('\\'),
            },
            '$' => self.read_substitution()?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Reads what follows a `$`: `{name}`, a bare name, or nothing (a literal `$`).
    fn read_substitution(&mut self) -> Result<(), LexingError> {
        let dollar = self.pos - 1;
        if self.peek_char() == Some('{') {
            self.read_char();
            let mut name = String::new();
            loop {
                match self.read_char() {
                    Some('}') => break,
                    Some(c) => name.push(c),
                    None => return Err(LexingError::UnfinishedParamSubst { offset: dollar }),
                }
            }
            self.flush_literal();
            self.current_word.parts.push(WordPart::Var { name, braced: true });
            return Ok(());
        }

        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            let valid = if name.is_empty() {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            };
            if !valid {
                break;
            }
            name.push(c);
            self.read_char();
        }

        if name.is_empty() {
            self.buffer.push('$');
        } else {
            self.flush_literal();
            self.current_word
                .parts
                .push(WordPart::Var { name, braced: false });
        }
        Ok(())
    }

    fn flush_literal(&mut self) {
        if !self.buffer.is_empty() {
            self.current_word
                .parts
                .push(WordPart::Literal(std::mem::take(&mut self.buffer)));
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        self.flush_literal();
        if self.in_word {
            let mut word = std::mem::take(&mut self.current_word);
            if word.parts.is_empty() {
                // `""` is an empty argument, not a missing one
                word.parts.push(WordPart::Literal(String::new()));
            }
            out.push(Token {
                word,
                offset: self.word_start,
            });
        }
        self.in_word = false;
    }
}

/// Splits one comment-free line into words.
///
/// Blanks separate words except inside quoted spans. Interpolation markers are kept as
/// [`WordPart`]s for the executor to resolve.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}

/// Removes `&`, `#`, `//` line comments and `/* ... */` block comments from one line.
///
/// `in_block_comment` carries an unterminated block comment over to the next line.
/// Markers inside quoted spans are left alone. Trailing whitespace is trimmed.
pub fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if *in_block_comment {
            if c == '*' && next == Some('/') {
                *in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(q) = quote {
            if c == '\\' && q == '"' && next.is_some() {
                out.push(c);
                out.extend(next);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match (c, next) {
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('/', Some('*')) => {
                *in_block_comment = true;
                i += 2;
                continue;
            }
            ('/', Some('/')) | ('#', _) | ('&', _) => break,
            _ => out.push(c),
        }
        i += 1;
    }

    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<Word> {
        split_into_tokens(line)
            .unwrap()
            .into_iter()
            .map(|t| t.word)
            .collect()
    }

    fn strip(line: &str) -> String {
        let mut in_block = false;
        strip_comments(line, &mut in_block)
    }

    #[test]
    fn test_splits_on_blanks() {
        let w = words("say  hello\tworld");
        assert_eq!(
            w,
            vec![Word::literal("say"), Word::literal("hello"), Word::literal("world")]
        );
    }

    #[test]
    fn test_double_quotes_keep_spaces_and_interpolate() {
        let w = words(r#"say "hi $name and ${other}!""#);
        assert_eq!(w.len(), 2);
        assert!(w[1].quoted);
        assert_eq!(
            w[1].parts,
            vec![
                WordPart::Literal("hi ".to_string()),
                WordPart::Var {
                    name: "name".to_string(),
                    braced: false
                },
                WordPart::Literal(" and ".to_string()),
                WordPart::Var {
                    name: "other".to_string(),
                    braced: true
                },
                WordPart::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_escapes_inside_double_quotes() {
        let w = words(r#"say "a \"b\" \$c C:\dir""#);
        assert_eq!(
            w[1].parts,
            vec![WordPart::Literal(r#"a "b" $c C:\dir"#.to_string())]
        );
    }

    #[test]
    fn test_single_quote_shorthand() {
        let w = words("say 'name'");
        assert_eq!(w[1].parts, vec![WordPart::Shorthand("name".to_string())]);
        assert!(w[1].as_bare().is_none());
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        let w = words("say 5$ $");
        assert_eq!(w[1], Word::literal("5$"));
        assert_eq!(w[2], Word::literal("$"));
    }

    #[test]
    fn test_empty_quotes_make_an_empty_word() {
        let w = words(r#"let x = """#);
        assert_eq!(w.len(), 4);
        assert_eq!(w[3].parts, vec![WordPart::Literal(String::new())]);
        assert!(w[3].quoted);
    }

    #[test]
    fn test_offsets_point_at_word_starts() {
        let line = r#"alia hi say "hello there""#;
        let tokens = split_into_tokens(line).unwrap();
        assert_eq!(&line[tokens[2].offset..], r#"say "hello there""#);
        assert_eq!(&line[tokens[3].offset..], r#""hello there""#);
    }

    #[test]
    fn test_unfinished_quote() {
        assert_eq!(
            split_into_tokens(r#"say "oops"#),
            Err(LexingError::UnfinishedQuote { offset: 4 })
        );
        assert_eq!(
            split_into_tokens("say ${oops"),
            Err(LexingError::UnfinishedParamSubst { offset: 4 })
        );
    }

    #[test]
    fn test_line_comments() {
        assert_eq!(strip("say hi # note"), "say hi");
        assert_eq!(strip("say hi // note"), "say hi");
        assert_eq!(strip("say hi & note"), "say hi");
        assert_eq!(strip("& whole line"), "");
    }

    #[test]
    fn test_comment_markers_inside_quotes_survive() {
        assert_eq!(strip(r#"say "a # b & c // d""#), r#"say "a # b & c // d""#);
        assert_eq!(strip("say '#tag' # gone"), "say '#tag'");
    }

    #[test]
    fn test_block_comments_span_lines() {
        let mut in_block = false;
        assert_eq!(strip_comments("say a /* start", &mut in_block), "say a");
        assert!(in_block);
        assert_eq!(strip_comments("still inside", &mut in_block), "");
        assert_eq!(strip_comments("end */ say b", &mut in_block), " say b");
        assert!(!in_block);
        assert_eq!(strip("say /* inline */ c"), "say  c");
    }
}
