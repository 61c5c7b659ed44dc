//! Statement parser: turns comment-stripped script lines into [`Statement`]s.
//!
//! One statement is produced per logical line. Block constructs (`rpt N` and
//! `if <cond> then` with nothing after `then`) collect the following lines until a
//! matching `endrpt`; the terminator closes whichever block was opened last.

use crate::arith::ArithOp;
use crate::env::is_valid_name;
use crate::lexer::{self, LexingError, Token, Word, WordPart};
use crate::value::CmpOp;
use thiserror::Error;

/// A parsed statement and the (1-based) line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `let [-r] name [=] [expr]`
    Let {
        name: String,
        readonly: bool,
        value: Expr,
    },
    /// `say words...`
    Say(Vec<Word>),
    /// `ask name [prompt...]` or `ask = name`
    Ask { name: String, prompt: Vec<Word> },
    /// `if cond then ... [else ...]`, inline or block form.
    If {
        condition: Condition,
        then: Branch,
        otherwise: Option<Branch>,
    },
    /// `rpt N statement`
    RepeatInline {
        count: RepeatCount,
        body: Box<Statement>,
    },
    /// `rpt N` ... `endrpt`
    RepeatBlock {
        count: RepeatCount,
        body: Vec<Statement>,
    },
    /// Any other glyph invocation.
    Command(CommandCall),
    /// `add|sub|mul|div operands...`
    Arith { op: ArithOp, operands: Vec<Word> },
    /// `try statement [else statement]`
    Try {
        body: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },
    /// `exit [code]`
    Exit(Option<Word>),
    /// `inc path` / `include path`
    Include(Word),
    /// `run path [args...]`
    Run { path: Word, args: Vec<Word> },
    /// `alia`, `alia name`, `alia name template...`
    Alias {
        name: Option<String>,
        template: Option<String>,
    },
    /// `unalia name`
    Unalias(Word),
}

/// Right-hand side of `let`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Empty,
    Words(Vec<Word>),
    Ask(Vec<Word>),
    Arith { op: ArithOp, operands: Vec<Word> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Inline(Box<Statement>),
    Block(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepeatCount {
    Forever,
    /// Evaluated once when the loop is entered.
    Times(Word),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(Word),
    Compare { lhs: Word, op: CmpOp, rhs: Vec<Word> },
    Truthy(Word),
}

/// A glyph invocation: name, argument words and the raw argument text.
///
/// `raw_args` is the source text after the name; alias expansion appends it to the
/// alias template verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub name: Word,
    pub args: Vec<Word>,
    pub raw_args: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind} near `{token}`")]
pub struct SyntaxError {
    pub line: usize,
    pub token: String,
    pub kind: SyntaxErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unterminated `${{`")]
    UnterminatedInterpolation,
    #[error("block is never closed with `endrpt`")]
    UnclosedBlock,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("`if` without `then`")]
    MissingThen,
    #[error("invalid condition")]
    InvalidCondition,
    #[error("invalid variable name")]
    InvalidName,
    #[error("missing operand")]
    MissingOperand,
    #[error("block opener cannot be used inline")]
    BlockNotAllowedInline,
}

/// Renders a word back into script syntax (used for diagnostics and for unresolved
/// interpolations).
pub fn display_word(word: &Word) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Literal(s) => out.push_str(s),
            WordPart::Var { name, braced: true } => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
            WordPart::Var { name, braced: false } => {
                out.push('$');
                out.push_str(name);
            }
            WordPart::Shorthand(name) => {
                out.push('\'');
                out.push_str(name);
                out.push('\'');
            }
        }
    }
    out
}

/// What a single line contributes to the script structure.
enum LineItem {
    Statement(Statement),
    OpenRepeat(RepeatCount),
    OpenIf(Condition),
    Else,
    End,
}

struct LineParser<'a> {
    source: &'a str,
    line: usize,
}

impl<'a> LineParser<'a> {
    fn error(&self, token: &Token, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            line: self.line,
            token: display_word(&token.word),
            kind,
        }
    }

    fn statement(&self, kind: StatementKind) -> LineItem {
        LineItem::Statement(Statement {
            line: self.line,
            kind,
        })
    }

    /// Source text from the start of `tokens[index]` to the end of the line.
    fn raw_from(&self, tokens: &[Token], index: usize) -> String {
        tokens
            .get(index)
            .map(|t| self.source[t.offset..].to_string())
            .unwrap_or_default()
    }

    fn parse(&self, tokens: &[Token]) -> Result<Option<LineItem>, SyntaxError> {
        let Some((first, rest)) = tokens.split_first() else {
            return Ok(None);
        };

        let Some(keyword) = first.word.as_bare() else {
            return Ok(Some(self.command(tokens)));
        };

        let item = match keyword {
            "endrpt" => {
                self.expect_end(rest)?;
                LineItem::End
            }
            "else" => {
                self.expect_end(rest)?;
                LineItem::Else
            }
            "then" => return Err(self.error(first, SyntaxErrorKind::UnexpectedToken)),
            "let" => self.parse_let(first, rest)?,
            "say" => self.statement(StatementKind::Say(words(rest))),
            "ask" => self.parse_ask(first, rest)?,
            "if" => self.parse_if(first, rest)?,
            "rpt" => self.parse_rpt(rest)?,
            "try" => self.parse_try(first, rest)?,
            "exit" => {
                if let Some(extra) = rest.get(1) {
                    return Err(self.error(extra, SyntaxErrorKind::UnexpectedToken));
                }
                self.statement(StatementKind::Exit(rest.first().map(|t| t.word.clone())))
            }
            "inc" | "include" => {
                let path = self.single_operand(first, rest)?;
                self.statement(StatementKind::Include(path))
            }
            "run" => match rest.split_first() {
                Some((path, args)) => self.statement(StatementKind::Run {
                    path: path.word.clone(),
                    args: words(args),
                }),
                None => return Err(self.error(first, SyntaxErrorKind::MissingOperand)),
            },
            "alia" => self.parse_alias(rest)?,
            "unalia" => {
                let name = self.single_operand(first, rest)?;
                self.statement(StatementKind::Unalias(name))
            }
            other => match ArithOp::from_keyword(other) {
                Some(op) => self.statement(StatementKind::Arith {
                    op,
                    operands: words(rest),
                }),
                None => self.command(tokens),
            },
        };
        Ok(Some(item))
    }

    fn command(&self, tokens: &[Token]) -> LineItem {
        self.statement(StatementKind::Command(CommandCall {
            name: tokens[0].word.clone(),
            args: words(&tokens[1..]),
            raw_args: self.raw_from(tokens, 1),
        }))
    }

    fn expect_end(&self, rest: &[Token]) -> Result<(), SyntaxError> {
        match rest.first() {
            Some(extra) => Err(self.error(extra, SyntaxErrorKind::UnexpectedToken)),
            None => Ok(()),
        }
    }

    fn single_operand(&self, keyword: &Token, rest: &[Token]) -> Result<Word, SyntaxError> {
        match rest {
            [only] => Ok(only.word.clone()),
            [] => Err(self.error(keyword, SyntaxErrorKind::MissingOperand)),
            [_, extra, ..] => Err(self.error(extra, SyntaxErrorKind::UnexpectedToken)),
        }
    }

    /// Parses a statement that must fit on the current line (an inline branch or body).
    fn parse_inline(&self, opener: &Token, tokens: &[Token]) -> Result<Statement, SyntaxError> {
        match self.parse(tokens)? {
            Some(LineItem::Statement(statement)) => Ok(statement),
            Some(LineItem::OpenRepeat(_) | LineItem::OpenIf(_)) => {
                Err(self.error(&tokens[0], SyntaxErrorKind::BlockNotAllowedInline))
            }
            Some(LineItem::Else | LineItem::End) => {
                Err(self.error(&tokens[0], SyntaxErrorKind::UnexpectedToken))
            }
            None => Err(self.error(opener, SyntaxErrorKind::MissingOperand)),
        }
    }

    fn parse_let(&self, keyword: &Token, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let (readonly, rest) = match rest.split_first() {
            Some((flag, tail)) if flag.word.is_bare("-r") => (true, tail),
            _ => (false, rest),
        };
        let Some((name_token, rest)) = rest.split_first() else {
            return Err(self.error(keyword, SyntaxErrorKind::MissingOperand));
        };
        let name = match name_token.word.as_bare() {
            Some(name) if is_valid_name(name) => name.to_string(),
            _ => return Err(self.error(name_token, SyntaxErrorKind::InvalidName)),
        };
        let rest = match rest.split_first() {
            Some((eq, tail)) if eq.word.is_bare("=") => tail,
            _ => rest,
        };

        let value = match rest.split_first() {
            None => Expr::Empty,
            Some((head, tail)) if head.word.is_bare("ask") => Expr::Ask(words(tail)),
            Some((head, tail)) => match head.word.as_bare().and_then(ArithOp::from_keyword) {
                Some(op) => Expr::Arith {
                    op,
                    operands: words(tail),
                },
                None => Expr::Words(words(rest)),
            },
        };

        Ok(self.statement(StatementKind::Let {
            name,
            readonly,
            value,
        }))
    }

    fn parse_ask(&self, keyword: &Token, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let (name_token, prompt) = match rest {
            [eq, name, tail @ ..] if eq.word.is_bare("=") => (name, tail),
            [name, tail @ ..] => (name, tail),
            [] => return Err(self.error(keyword, SyntaxErrorKind::MissingOperand)),
        };
        match name_token.word.as_bare() {
            Some(name) if is_valid_name(name) => Ok(self.statement(StatementKind::Ask {
                name: name.to_string(),
                prompt: words(prompt),
            })),
            _ => Err(self.error(name_token, SyntaxErrorKind::InvalidName)),
        }
    }

    fn parse_if(&self, keyword: &Token, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let Some(then_at) = rest.iter().position(|t| t.word.is_bare("then")) else {
            return Err(self.error(keyword, SyntaxErrorKind::MissingThen));
        };
        let condition = self.parse_condition(keyword, &rest[..then_at])?;
        let then_token = &rest[then_at];
        let tail = &rest[then_at + 1..];
        if tail.is_empty() {
            return Ok(LineItem::OpenIf(condition));
        }

        let (then_tokens, else_tokens) = split_else(tail);
        let then = self.parse_inline(then_token, then_tokens)?;
        let otherwise = match else_tokens {
            Some(tokens) => Some(Branch::Inline(Box::new(
                self.parse_inline(then_token, tokens)?,
            ))),
            None => None,
        };
        Ok(self.statement(StatementKind::If {
            condition,
            then: Branch::Inline(Box::new(then)),
            otherwise,
        }))
    }

    fn parse_condition(&self, keyword: &Token, tokens: &[Token]) -> Result<Condition, SyntaxError> {
        match tokens {
            [] => Err(self.error(keyword, SyntaxErrorKind::InvalidCondition)),
            [head, path] if head.word.is_bare("exists") => Ok(Condition::Exists(path.word.clone())),
            [head, ..] if head.word.is_bare("exists") => {
                Err(self.error(head, SyntaxErrorKind::InvalidCondition))
            }
            [only] => Ok(Condition::Truthy(only.word.clone())),
            [lhs, op, rhs @ ..] if !rhs.is_empty() => {
                match op.word.as_bare().and_then(CmpOp::from_token) {
                    Some(op) => Ok(Condition::Compare {
                        lhs: lhs.word.clone(),
                        op,
                        rhs: words(rhs),
                    }),
                    None => Err(self.error(op, SyntaxErrorKind::InvalidCondition)),
                }
            }
            [_, op, ..] => Err(self.error(op, SyntaxErrorKind::InvalidCondition)),
        }
    }

    fn parse_rpt(&self, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let Some((count_token, body)) = rest.split_first() else {
            return Ok(LineItem::OpenRepeat(RepeatCount::Forever));
        };
        let count = match count_token.word.as_bare() {
            Some(text) if is_forever(text) => RepeatCount::Forever,
            _ => RepeatCount::Times(count_token.word.clone()),
        };
        if body.is_empty() {
            return Ok(LineItem::OpenRepeat(count));
        }
        let body = self.parse_inline(count_token, body)?;
        Ok(self.statement(StatementKind::RepeatInline {
            count,
            body: Box::new(body),
        }))
    }

    fn parse_try(&self, keyword: &Token, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let (body_tokens, else_tokens) = split_else(rest);
        let body = self.parse_inline(keyword, body_tokens)?;
        let otherwise = match else_tokens {
            Some(tokens) => Some(Box::new(self.parse_inline(keyword, tokens)?)),
            None => None,
        };
        Ok(self.statement(StatementKind::Try {
            body: Box::new(body),
            otherwise,
        }))
    }

    fn parse_alias(&self, rest: &[Token]) -> Result<LineItem, SyntaxError> {
        let Some((name_token, template)) = rest.split_first() else {
            return Ok(self.statement(StatementKind::Alias {
                name: None,
                template: None,
            }));
        };
        let Some(name) = name_token.word.as_bare() else {
            return Err(self.error(name_token, SyntaxErrorKind::InvalidName));
        };
        let template = (!template.is_empty()).then(|| self.raw_from(rest, 1));
        Ok(self.statement(StatementKind::Alias {
            name: Some(name.to_string()),
            template,
        }))
    }
}

fn words(tokens: &[Token]) -> Vec<Word> {
    tokens.iter().map(|t| t.word.clone()).collect()
}

fn is_forever(text: &str) -> bool {
    matches!(
        text.to_ascii_lowercase().as_str(),
        "inf" | "forever" | "infinite"
    )
}

/// Splits `tokens` at the `else` belonging to the construct being parsed.
///
/// Nested `if`/`try` keywords claim the `else`s that follow them first, so a dangling
/// `else` binds to the nearest opener.
fn split_else(tokens: &[Token]) -> (&[Token], Option<&[Token]>) {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.word.is_bare("if") || token.word.is_bare("try") {
            depth += 1;
        } else if token.word.is_bare("else") {
            if depth == 0 {
                return (&tokens[..i], Some(&tokens[i + 1..]));
            }
            depth -= 1;
        }
    }
    (tokens, None)
}

struct OpenBlock {
    line: usize,
    opener: &'static str,
    kind: OpenKind,
    body: Vec<Statement>,
}

enum OpenKind {
    Repeat(RepeatCount),
    If {
        condition: Condition,
        then: Option<Vec<Statement>>,
    },
}

impl OpenBlock {
    fn close(self) -> Statement {
        let kind = match self.kind {
            OpenKind::Repeat(count) => StatementKind::RepeatBlock {
                count,
                body: self.body,
            },
            OpenKind::If {
                condition,
                then: None,
            } => StatementKind::If {
                condition,
                then: Branch::Block(self.body),
                otherwise: None,
            },
            OpenKind::If {
                condition,
                then: Some(then),
            } => StatementKind::If {
                condition,
                then: Branch::Block(then),
                otherwise: Some(Branch::Block(self.body)),
            },
        };
        Statement {
            line: self.line,
            kind,
        }
    }
}

/// Builds the statement list of a whole script, matching block openers and `endrpt`
/// with a stack.
#[derive(Default)]
struct ScriptBuilder {
    stack: Vec<OpenBlock>,
    statements: Vec<Statement>,
}

impl ScriptBuilder {
    fn push(&mut self, statement: Statement) {
        match self.stack.last_mut() {
            Some(block) => block.body.push(statement),
            None => self.statements.push(statement),
        }
    }

    fn feed(&mut self, item: LineItem, line: usize, token: &Token) -> Result<(), SyntaxError> {
        match item {
            LineItem::Statement(statement) => self.push(statement),
            LineItem::OpenRepeat(count) => self.stack.push(OpenBlock {
                line,
                opener: "rpt",
                kind: OpenKind::Repeat(count),
                body: Vec::new(),
            }),
            LineItem::OpenIf(condition) => self.stack.push(OpenBlock {
                line,
                opener: "if",
                kind: OpenKind::If {
                    condition,
                    then: None,
                },
                body: Vec::new(),
            }),
            LineItem::Else => match self.stack.last_mut() {
                Some(OpenBlock {
                    kind: OpenKind::If { then, .. },
                    body,
                    ..
                }) if then.is_none() => *then = Some(std::mem::take(body)),
                _ => {
                    return Err(SyntaxError {
                        line,
                        token: display_word(&token.word),
                        kind: SyntaxErrorKind::UnexpectedToken,
                    });
                }
            },
            LineItem::End => match self.stack.pop() {
                Some(block) => {
                    let statement = block.close();
                    self.push(statement);
                }
                None => {
                    return Err(SyntaxError {
                        line,
                        token: display_word(&token.word),
                        kind: SyntaxErrorKind::UnexpectedToken,
                    });
                }
            },
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Statement>, SyntaxError> {
        if let Some(block) = self.stack.pop() {
            return Err(SyntaxError {
                line: block.line,
                token: block.opener.to_string(),
                kind: SyntaxErrorKind::UnclosedBlock,
            });
        }
        Ok(self.statements)
    }
}

fn lexing_error(err: LexingError, text: &str, line: usize) -> SyntaxError {
    let (offset, kind) = match err {
        LexingError::UnfinishedQuote { offset } => (offset, SyntaxErrorKind::UnterminatedQuote),
        LexingError::UnfinishedParamSubst { offset } => {
            (offset, SyntaxErrorKind::UnterminatedInterpolation)
        }
    };
    SyntaxError {
        line,
        token: text[offset..].to_string(),
        kind,
    }
}

/// Parses a whole script into statements. Line numbers are 1-based.
pub fn parse_script(source: &str) -> Result<Vec<Statement>, SyntaxError> {
    let mut builder = ScriptBuilder::default();
    let mut in_block_comment = false;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = lexer::strip_comments(raw, &mut in_block_comment);
        if text.trim().is_empty() {
            continue;
        }
        let tokens =
            lexer::split_into_tokens(&text).map_err(|e| lexing_error(e, &text, line))?;
        let parser = LineParser {
            source: &text,
            line,
        };
        if let Some(item) = parser.parse(&tokens)? {
            builder.feed(item, line, &tokens[0])?;
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Word {
        Word::literal(s)
    }

    fn parse_one(source: &str) -> StatementKind {
        let mut statements = parse_script(source).unwrap();
        assert_eq!(statements.len(), 1, "expected a single statement");
        statements.remove(0).kind
    }

    fn parse_err(source: &str) -> SyntaxError {
        parse_script(source).unwrap_err()
    }

    #[test]
    fn test_command_keeps_raw_arguments() {
        match parse_one(r#"mk file "a b.txt" hello   world"#) {
            StatementKind::Command(call) => {
                assert_eq!(call.name, lit("mk"));
                assert_eq!(call.args.len(), 4);
                assert_eq!(call.raw_args, r#"file "a b.txt" hello   world"#);
            }
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_let_forms() {
        assert_eq!(
            parse_one("let -r n = 5"),
            StatementKind::Let {
                name: "n".to_string(),
                readonly: true,
                value: Expr::Words(vec![lit("5")]),
            }
        );
        assert_eq!(
            parse_one("let empty"),
            StatementKind::Let {
                name: "empty".to_string(),
                readonly: false,
                value: Expr::Empty,
            }
        );
        assert_eq!(
            parse_one("let total = add 1 x"),
            StatementKind::Let {
                name: "total".to_string(),
                readonly: false,
                value: Expr::Arith {
                    op: ArithOp::Add,
                    operands: vec![lit("1"), lit("x")],
                },
            }
        );
        assert!(matches!(
            parse_one(r#"let who = ask "Name?""#),
            StatementKind::Let { value: Expr::Ask(_), .. }
        ));
        assert_eq!(parse_err("let 9lives = 1").kind, SyntaxErrorKind::InvalidName);
    }

    #[test]
    fn test_inline_if_with_else() {
        match parse_one(r#"if x == "a" then say yes else say no"#) {
            StatementKind::If {
                condition,
                then: Branch::Inline(then),
                otherwise: Some(Branch::Inline(otherwise)),
            } => {
                assert!(matches!(condition, Condition::Compare { op: CmpOp::Eq, .. }));
                assert_eq!(then.kind, StatementKind::Say(vec![lit("yes")]));
                assert_eq!(otherwise.kind, StatementKind::Say(vec![lit("no")]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dangling_else_binds_to_nearest_if() {
        match parse_one("if a then if b then say x else say y") {
            StatementKind::If {
                then: Branch::Inline(inner),
                otherwise: None,
                ..
            } => assert!(matches!(
                inner.kind,
                StatementKind::If {
                    otherwise: Some(_),
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repeat_block_and_nested_if_block() {
        let source = "\
rpt 3
  if i > 1 then
    say big
  else
    say small
  endrpt
endrpt
say done";
        let statements = parse_script(source).unwrap();
        assert_eq!(statements.len(), 2);
        match &statements[0].kind {
            StatementKind::RepeatBlock { count, body } => {
                assert_eq!(*count, RepeatCount::Times(lit("3")));
                assert_eq!(body.len(), 1);
                assert_eq!(body[0].line, 2);
                match &body[0].kind {
                    StatementKind::If {
                        then: Branch::Block(then),
                        otherwise: Some(Branch::Block(otherwise)),
                        ..
                    } => {
                        assert_eq!(then.len(), 1);
                        assert_eq!(otherwise.len(), 1);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(statements[1].line, 8);
    }

    #[test]
    fn test_repeat_counts() {
        assert!(matches!(
            parse_one("rpt forever say hi"),
            StatementKind::RepeatInline {
                count: RepeatCount::Forever,
                ..
            }
        ));
        assert!(matches!(
            parse_one("rpt $n say hi"),
            StatementKind::RepeatInline {
                count: RepeatCount::Times(_),
                ..
            }
        ));
        assert!(matches!(
            parse_one("rpt\nsay hi\nendrpt"),
            StatementKind::RepeatBlock {
                count: RepeatCount::Forever,
                ..
            }
        ));
    }

    #[test]
    fn test_try_else() {
        match parse_one("try dlt missing.txt else say gone") {
            StatementKind::Try {
                body,
                otherwise: Some(otherwise),
            } => {
                assert!(matches!(body.kind, StatementKind::Command(_)));
                assert_eq!(otherwise.kind, StatementKind::Say(vec![lit("gone")]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_alias_template_is_raw_text() {
        assert_eq!(
            parse_one(r#"alia greet say "hello  there" $name"#),
            StatementKind::Alias {
                name: Some("greet".to_string()),
                template: Some(r#"say "hello  there" $name"#.to_string()),
            }
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let source = "/* header\n still header */\nsay hi # trailing\n& kid comment\n// note";
        let statements = parse_script(source).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].line, 3);
    }

    #[test]
    fn test_syntax_errors_report_line_and_token() {
        let err = parse_err("say ok\nsay \"broken");
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedQuote);
        assert_eq!(err.token, "\"broken");

        let err = parse_err("say ok\nendrpt");
        assert_eq!((err.line, err.kind), (2, SyntaxErrorKind::UnexpectedToken));

        let err = parse_err("say a\nrpt 2\nsay b");
        assert_eq!((err.line, err.kind), (2, SyntaxErrorKind::UnclosedBlock));
        assert_eq!(err.token, "rpt");

        let err = parse_err("then say x");
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedToken);

        assert_eq!(parse_err("if x say y").kind, SyntaxErrorKind::MissingThen);
        assert_eq!(
            parse_err("if x ~ y then say z").kind,
            SyntaxErrorKind::InvalidCondition
        );
        assert_eq!(
            parse_err("if x then rpt 3").kind,
            SyntaxErrorKind::BlockNotAllowedInline
        );
        assert_eq!(parse_err("else").kind, SyntaxErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_error_message_format() {
        let err = parse_err("say a\nendrpt now");
        assert_eq!(err.to_string(), "line 2: unexpected token near `now`");
    }
}
