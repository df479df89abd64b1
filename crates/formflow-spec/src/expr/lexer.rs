use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexed {
    pub token: Token,
    pub offset: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        offset,
        message: message.into(),
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Lexed>, ExpressionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'(' => {
                tokens.push(Lexed { token: Token::LParen, offset: start });
                i += 1;
            }
            b')' => {
                tokens.push(Lexed { token: Token::RParen, offset: start });
                i += 1;
            }
            b'[' => {
                tokens.push(Lexed { token: Token::LBracket, offset: start });
                i += 1;
            }
            b']' => {
                tokens.push(Lexed { token: Token::RBracket, offset: start });
                i += 1;
            }
            b'.' => {
                tokens.push(Lexed { token: Token::Dot, offset: start });
                i += 1;
            }
            b',' => {
                tokens.push(Lexed { token: Token::Comma, offset: start });
                i += 1;
            }
            b'+' => {
                tokens.push(Lexed { token: Token::Plus, offset: start });
                i += 1;
            }
            b'-' => {
                tokens.push(Lexed { token: Token::Minus, offset: start });
                i += 1;
            }
            b'*' => {
                tokens.push(Lexed { token: Token::Star, offset: start });
                i += 1;
            }
            b'/' => {
                tokens.push(Lexed { token: Token::Slash, offset: start });
                i += 1;
            }
            b'%' => {
                tokens.push(Lexed { token: Token::Percent, offset: start });
                i += 1;
            }
            b'=' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    tokens.push(Lexed { token: Token::Eq, offset: start });
                    i += 2;
                } else {
                    return Err(syntax(start, "single '=' is not a comparison; use '=='"));
                }
            }
            b'!' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    tokens.push(Lexed { token: Token::Ne, offset: start });
                    i += 2;
                } else {
                    return Err(syntax(start, "'!' must be followed by '='"));
                }
            }
            b'<' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    tokens.push(Lexed { token: Token::Le, offset: start });
                    i += 2;
                } else {
                    tokens.push(Lexed { token: Token::Lt, offset: start });
                    i += 1;
                }
            }
            b'>' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    tokens.push(Lexed { token: Token::Ge, offset: start });
                    i += 2;
                } else {
                    tokens.push(Lexed { token: Token::Gt, offset: start });
                    i += 1;
                }
            }
            b'\'' | b'"' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(syntax(start, "unterminated string literal"));
                    }
                    match bytes[i] {
                        b'\\' if i + 1 < bytes.len() => {
                            let escaped = bytes[i + 1];
                            match escaped {
                                b'\\' | b'\'' | b'"' => text.push(escaped as char),
                                b'n' => text.push('\n'),
                                b't' => text.push('\t'),
                                other => {
                                    return Err(syntax(
                                        i,
                                        format!("unsupported escape '\\{}'", other as char),
                                    ));
                                }
                            }
                            i += 2;
                        }
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => {
                            // Strings are validated UTF-8; copy the full character.
                            let rest = &input[i..];
                            let ch = rest.chars().next().unwrap_or('\u{fffd}');
                            text.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                tokens.push(Lexed { token: Token::Str(text), offset: start });
            }
            b'0'..=b'9' => {
                let mut end = i;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end < bytes.len()
                    && bytes[end] == b'.'
                    && end + 1 < bytes.len()
                    && bytes[end + 1].is_ascii_digit()
                {
                    end += 1;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                }
                let text = &input[i..end];
                let number = text
                    .parse::<f64>()
                    .map_err(|_| syntax(start, format!("invalid number '{text}'")))?;
                tokens.push(Lexed { token: Token::Number(number), offset: start });
                i = end;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let mut end = i;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let word = &input[i..end];
                if word.starts_with("__") {
                    return Err(ExpressionError::Disallowed(format!(
                        "identifier '{word}' is reserved"
                    )));
                }
                let token = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" => Token::Null,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push(Lexed { token, offset: start });
                i = end;
            }
            other => {
                return Err(syntax(
                    start,
                    format!("unexpected character '{}'", other as char),
                ));
            }
        }
    }

    Ok(tokens)
}
