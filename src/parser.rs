//! Recursive-descent parser turning a line into a [`Command`].
//!
//! Precedence, lowest first: `;` (and `&`, which also ends a block), then
//! `&&`/`||` (same level, left to right), then `|`.

use crate::command::{
    Command, CommandElement, LogicalBlock, LogicalOp, Pipeline, Redirect, SimpleCommand,
};
use crate::error::SyntaxError;
use crate::lexer::{self, Token};

pub fn parse(line: &str) -> Result<Command, SyntaxError> {
    let mut tokens = lexer::tokenize(line)?;
    if tokens.last() == Some(&Token::Semi) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err(SyntaxError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let command = parser.command(Terminator::End)?;
    match parser.peek() {
        None => Ok(command),
        Some(tok) => Err(SyntaxError::Unexpected(tok.describe())),
    }
}

/// True when the line is an unfinished construct that more input could
/// complete (open quote, open group, trailing `|`/`&&`/`||`).
pub fn needs_line_continuation(line: &str) -> bool {
    matches!(parse(line), Err(e) if e.is_incomplete())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Paren,
    Brace,
}

impl Terminator {
    fn opener(self) -> &'static str {
        match self {
            Terminator::End => "",
            Terminator::Paren => "(",
            Terminator::Brace => "{",
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_terminator(&self, end: Terminator) -> bool {
        match (end, self.peek()) {
            (_, None) => true,
            (Terminator::Paren, Some(Token::RParen)) => true,
            (Terminator::Brace, Some(Token::Word(w))) => w == "}",
            _ => false,
        }
    }

    /// A `;`/`&` separated list up to `end`.
    fn command(&mut self, end: Terminator) -> Result<Command, SyntaxError> {
        let mut blocks = Vec::new();

        loop {
            if self.at_terminator(end) {
                break;
            }
            let block = self.logical_block()?;
            let background = block
                .rest
                .last()
                .map(|(_, p)| p.background)
                .unwrap_or(block.first.background);
            blocks.push(block);

            match self.peek() {
                Some(Token::Semi) => {
                    self.next();
                    // Only nested lists may end with `;` (`{ a; }`); the one
                    // trailing `;` of a line was already dropped.
                    if end == Terminator::End && self.at_terminator(end) {
                        return Err(SyntaxError::Unexpected(";".into()));
                    }
                }
                _ if background => {}
                _ => break,
            }
        }

        if end != Terminator::End && self.peek().is_none() {
            return Err(SyntaxError::Unterminated(end.opener()));
        }
        if blocks.is_empty() {
            return Err(match self.peek() {
                Some(tok) => SyntaxError::Unexpected(tok.describe()),
                None => SyntaxError::Empty,
            });
        }
        Ok(Command { blocks })
    }

    fn logical_block(&mut self) -> Result<LogicalBlock, SyntaxError> {
        let first = self.pipeline()?;
        let mut block = LogicalBlock {
            first,
            rest: Vec::new(),
        };
        if block.first.background {
            return Ok(block);
        }

        loop {
            let op = match self.peek() {
                Some(Token::And) => LogicalOp::And,
                Some(Token::Or) => LogicalOp::Or,
                _ => break,
            };
            self.next();
            self.expect_operand(op.as_str())?;
            let pipeline = self.pipeline()?;
            let background = pipeline.background;
            block.rest.push((op, pipeline));
            if background {
                break;
            }
        }
        Ok(block)
    }

    fn pipeline(&mut self) -> Result<Pipeline, SyntaxError> {
        let mut elements = vec![self.element()?];
        while self.peek() == Some(&Token::Pipe) {
            self.next();
            self.expect_operand("|")?;
            elements.push(self.element()?);
        }

        let background = self.peek() == Some(&Token::Amp);
        if background {
            self.next();
            if let Some(CommandElement::Simple(last)) = elements.last_mut() {
                last.background = true;
            }
        }
        Ok(Pipeline {
            elements,
            background,
        })
    }

    /// The token after a binary operator must start a command.
    fn expect_operand(&self, op: &'static str) -> Result<(), SyntaxError> {
        match self.peek() {
            None => Err(SyntaxError::MissingOperand(op)),
            Some(Token::Word(_) | Token::LParen | Token::Redirect(_)) => Ok(()),
            Some(tok) => Err(SyntaxError::Unexpected(tok.describe())),
        }
    }

    fn element(&mut self) -> Result<CommandElement, SyntaxError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.next();
                let inner = self.command(Terminator::Paren)?;
                match self.next() {
                    Some(Token::RParen) => Ok(CommandElement::Subshell(inner)),
                    _ => Err(SyntaxError::Unterminated("(")),
                }
            }
            Some(Token::Word(w)) if w == "{" => {
                self.next();
                let inner = self.command(Terminator::Brace)?;
                match self.next() {
                    Some(Token::Word(w)) if w == "}" => Ok(CommandElement::Group(inner)),
                    _ => Err(SyntaxError::Unterminated("{")),
                }
            }
            _ => self.simple().map(CommandElement::Simple),
        }
    }

    /// Words and redirections may interleave; each redirection decorates the
    /// command it appears in.
    fn simple(&mut self) -> Result<SimpleCommand, SyntaxError> {
        let mut cmd = SimpleCommand::default();

        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    if let Some(Token::Word(word)) = self.next() {
                        cmd.parts.push(word);
                    }
                }
                Some(&Token::Redirect(kind)) => {
                    self.next();
                    let file = if kind.takes_file() {
                        match self.next() {
                            Some(Token::Word(file)) => file,
                            _ => return Err(SyntaxError::MissingRedirectTarget(kind.as_str())),
                        }
                    } else {
                        String::new()
                    };
                    cmd.redirects.push(Redirect { kind, file });
                }
                _ => break,
            }
        }

        if cmd.parts.is_empty() && cmd.redirects.is_empty() {
            return Err(match self.peek() {
                Some(tok) => SyntaxError::Unexpected(tok.describe()),
                None => SyntaxError::Empty,
            });
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RedirectKind;

    fn simple(element: &CommandElement) -> &SimpleCommand {
        match element {
            CommandElement::Simple(s) => s,
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn semicolons_split_blocks() {
        let cmd = parse("echo one; echo two; echo three").unwrap();
        assert_eq!(cmd.blocks.len(), 3);
        assert_eq!(simple(&cmd.blocks[2].first.elements[0]).parts, ["echo", "three"]);
    }

    #[test]
    fn logical_operators_keep_textual_order() {
        let cmd = parse("a && b || c && d").unwrap();
        let block = &cmd.blocks[0];
        let ops: Vec<_> = block.rest.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, [LogicalOp::And, LogicalOp::Or, LogicalOp::And]);
    }

    #[test]
    fn pipes_bind_tighter_than_logical_operators() {
        let cmd = parse("a | b && c | d | e").unwrap();
        let block = &cmd.blocks[0];
        assert_eq!(block.first.elements.len(), 2);
        assert_eq!(block.rest[0].1.elements.len(), 3);
    }

    #[test]
    fn trailing_ampersand_marks_pipeline_background() {
        let cmd = parse("sleep 1 | cat &").unwrap();
        let pipeline = &cmd.blocks[0].first;
        assert!(pipeline.background);
        let last = simple(&pipeline.elements[1]);
        assert!(last.background);
        assert_eq!(last.parts, ["cat"]);
        assert!(!simple(&pipeline.elements[0]).background);
    }

    #[test]
    fn ampersand_ends_the_block() {
        let cmd = parse("sleep 1 & echo next").unwrap();
        assert_eq!(cmd.blocks.len(), 2);
        assert!(cmd.blocks[0].first.background);
        assert!(!cmd.blocks[1].first.background);

        let cmd = parse("sleep 1 &; echo next").unwrap();
        assert_eq!(cmd.blocks.len(), 2);
    }

    #[test]
    fn redirections_interleave_with_arguments() {
        let cmd = parse("sort > out.txt -r < in.txt 2>&1 -u").unwrap();
        let sort = simple(&cmd.blocks[0].first.elements[0]);
        assert_eq!(sort.parts, ["sort", "-r", "-u"]);
        let kinds: Vec<_> = sort.redirects.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            [RedirectKind::Output, RedirectKind::Input, RedirectKind::ErrorToOutput]
        );
        assert_eq!(sort.redirects[0].file, "out.txt");
        assert_eq!(sort.redirects[2].file, "");
    }

    #[test]
    fn subshells_and_groups_nest() {
        let cmd = parse("(cd /tmp; pwd) | cat && { echo a; echo b; }").unwrap();
        let block = &cmd.blocks[0];
        match &block.first.elements[0] {
            CommandElement::Subshell(inner) => assert_eq!(inner.blocks.len(), 2),
            other => panic!("expected subshell, got {:?}", other),
        }
        match &block.rest[0].1.elements[0] {
            CommandElement::Group(inner) => assert_eq!(inner.blocks.len(), 2),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn single_trailing_semicolon_is_allowed() {
        assert_eq!(parse("ls;").unwrap().blocks.len(), 1);
        assert!(matches!(parse("ls;;"), Err(SyntaxError::Unexpected(_))));
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse(""), Err(SyntaxError::Empty));
        assert_eq!(parse("   "), Err(SyntaxError::Empty));
        assert_eq!(parse(" ; "), Err(SyntaxError::Empty));
    }

    #[test]
    fn rejects_missing_operands() {
        assert_eq!(parse("ls |"), Err(SyntaxError::MissingOperand("|")));
        assert_eq!(parse("ls &&"), Err(SyntaxError::MissingOperand("&&")));
        assert_eq!(parse("ls ||"), Err(SyntaxError::MissingOperand("||")));
        assert!(matches!(parse("ls | | wc"), Err(SyntaxError::Unexpected(_))));
        assert!(matches!(parse("&& ls"), Err(SyntaxError::Unexpected(_))));
    }

    #[test]
    fn rejects_missing_redirect_target() {
        assert_eq!(parse("echo hi >"), Err(SyntaxError::MissingRedirectTarget(">")));
        assert_eq!(parse("cat < | wc"), Err(SyntaxError::MissingRedirectTarget("<")));
    }

    #[test]
    fn rejects_unterminated_constructs() {
        assert_eq!(parse("echo 'hi"), Err(SyntaxError::UnterminatedQuote('\'')));
        assert_eq!(parse("(echo hi"), Err(SyntaxError::Unterminated("(")));
        assert_eq!(parse("{ echo hi;"), Err(SyntaxError::Unterminated("{")));
        assert!(needs_line_continuation("echo \"open"));
        assert!(needs_line_continuation("ls |"));
        assert!(!needs_line_continuation("ls"));
    }

    #[test]
    fn format_then_reparse_keeps_structure() {
        let lines = [
            "echo one; echo two; echo three",
            "true && false || echo   fallback",
            "cat<in.txt|sort -r>out.txt 2>>err.log",
            "sleep 1 & echo next",
            "(cd /tmp; pwd) | wc -l",
            "{ echo a; echo b; } > both.txt",
            "echo \"quoted | pipe\" 'single && and' 2>&1",
            "a | b &",
        ];
        for line in lines {
            // Groups take no redirects, so that line is expected to fail.
            let Ok(first) = parse(line) else {
                assert!(line.starts_with('{'), "failed to parse {:?}", line);
                continue;
            };
            let formatted = first.to_string();
            let second = parse(&formatted).unwrap();
            assert_eq!(first, second, "round trip of {:?} via {:?}", line, formatted);
        }
    }
}
