use crate::command::RedirectKind;
use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word exactly as written, quotes and escapes included.
    Word(String),
    Pipe,
    And,
    Or,
    /// `;` or an unquoted newline.
    Semi,
    Amp,
    LParen,
    RParen,
    Redirect(RedirectKind),
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Pipe => "|".into(),
            Token::And => "&&".into(),
            Token::Or => "||".into(),
            Token::Semi => ";".into(),
            Token::Amp => "&".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Redirect(kind) => kind.as_str().into(),
        }
    }
}

/// Split a line into words and operators, respecting single/double quotes
/// and backslash escapes. Redirection operators form their own token class.
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut newline_sep = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let end = closing_quote(&chars, i)?;
                current.extend(&chars[i..=end]);
                i = end + 1;
            }
            '\\' => {
                current.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    current.push(next);
                }
                i += 2;
            }
            ' ' | '\t' | '\r' => {
                flush(&mut current, &mut tokens);
                i += 1;
            }
            '#' if current.is_empty() => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\n' => {
                flush(&mut current, &mut tokens);
                if push_separator(&mut tokens) {
                    newline_sep = Some(tokens.len() - 1);
                }
                i += 1;
            }
            ';' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::Semi);
                i += 1;
            }
            '|' => {
                flush(&mut current, &mut tokens);
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    tokens.push(Token::Pipe);
                    i += 1;
                }
            }
            '&' => {
                flush(&mut current, &mut tokens);
                match chars.get(i + 1) {
                    Some('&') => {
                        tokens.push(Token::And);
                        i += 2;
                    }
                    Some('>') => {
                        tokens.push(Token::Redirect(RedirectKind::Both));
                        i += 2;
                    }
                    _ => {
                        tokens.push(Token::Amp);
                        i += 1;
                    }
                }
            }
            '(' | ')' => {
                flush(&mut current, &mut tokens);
                tokens.push(if c == '(' { Token::LParen } else { Token::RParen });
                i += 1;
            }
            '<' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::Redirect(RedirectKind::Input));
                i += 1;
            }
            '>' => {
                flush(&mut current, &mut tokens);
                let (kind, len) = match chars.get(i + 1) {
                    Some('>') => (RedirectKind::Append, 2),
                    Some('&') => (RedirectKind::BothAlt, 2),
                    _ => (RedirectKind::Output, 1),
                };
                tokens.push(Token::Redirect(kind));
                i += len;
            }
            // `2>` only counts as an operator at the start of a word.
            '2' if current.is_empty() && chars.get(i + 1) == Some(&'>') => {
                let rest: String = chars[i..chars.len().min(i + 4)].iter().collect();
                let (kind, len) = if rest == "2>&1" {
                    (RedirectKind::ErrorToOutput, 4)
                } else if rest.starts_with("2>>") {
                    (RedirectKind::ErrorAppend, 3)
                } else {
                    (RedirectKind::Error, 2)
                };
                tokens.push(Token::Redirect(kind));
                i += len;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    flush(&mut current, &mut tokens);
    if newline_sep.is_some() && newline_sep == tokens.len().checked_sub(1) {
        tokens.pop();
    }
    Ok(tokens)
}

fn closing_quote(chars: &[char], open: usize) -> Result<usize, SyntaxError> {
    let quote = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if quote == '"' => i += 2,
            c if c == quote => return Ok(i),
            _ => i += 1,
        }
    }
    Err(SyntaxError::UnterminatedQuote(quote))
}

fn flush(current: &mut String, tokens: &mut Vec<Token>) {
    if !current.is_empty() {
        tokens.push(Token::Word(std::mem::take(current)));
    }
}

/// Newlines act like `;` but collapse into an existing separator.
fn push_separator(tokens: &mut Vec<Token>) -> bool {
    match tokens.last() {
        None | Some(Token::Semi | Token::Amp | Token::And | Token::Or | Token::Pipe | Token::LParen) => false,
        _ => {
            tokens.push(Token::Semi);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(Token::describe).collect()
    }

    #[test]
    fn splits_operators_without_spaces() {
        let tokens = tokenize("ls|wc -l&&echo ok||echo no;pwd").unwrap();
        assert_eq!(
            words(&tokens),
            ["ls", "|", "wc", "-l", "&&", "echo", "ok", "||", "echo", "no", ";", "pwd"]
        );
    }

    #[test]
    fn redirections_are_their_own_tokens() {
        let tokens = tokenize("cmd <in >out 2>err 2>>log >>all &>both >&alt 2>&1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("cmd".into()),
                Token::Redirect(RedirectKind::Input),
                Token::Word("in".into()),
                Token::Redirect(RedirectKind::Output),
                Token::Word("out".into()),
                Token::Redirect(RedirectKind::Error),
                Token::Word("err".into()),
                Token::Redirect(RedirectKind::ErrorAppend),
                Token::Word("log".into()),
                Token::Redirect(RedirectKind::Append),
                Token::Word("all".into()),
                Token::Redirect(RedirectKind::Both),
                Token::Word("both".into()),
                Token::Redirect(RedirectKind::BothAlt),
                Token::Word("alt".into()),
                Token::Redirect(RedirectKind::ErrorToOutput),
            ]
        );
    }

    #[test]
    fn digit_inside_word_is_not_a_redirect() {
        let tokens = tokenize("echo a2>f").unwrap();
        assert_eq!(words(&tokens), ["echo", "a2", ">", "f"]);
    }

    #[test]
    fn quotes_keep_operators_literal() {
        let tokens = tokenize(r#"echo "a | b" 'c && d' e\;f"#).unwrap();
        assert_eq!(words(&tokens), ["echo", "\"a | b\"", "'c && d'", "e\\;f"]);
    }

    #[test]
    fn unterminated_quote_is_reported() {
        assert_eq!(
            tokenize("echo \"oops"),
            Err(SyntaxError::UnterminatedQuote('"'))
        );
        assert_eq!(tokenize("echo 'x"), Err(SyntaxError::UnterminatedQuote('\'')));
    }

    #[test]
    fn comments_and_newlines() {
        let tokens = tokenize("echo a # trailing\n").unwrap();
        assert_eq!(words(&tokens), ["echo", "a"]);
        let tokens = tokenize("echo a\n\necho b\n").unwrap();
        assert_eq!(words(&tokens), ["echo", "a", ";", "echo", "b"]);
        let tokens = tokenize("echo a # note\necho b").unwrap();
        assert_eq!(words(&tokens), ["echo", "a", ";", "echo", "b"]);
    }
}
