use super::ExpressionError;
use super::lexer::{Lexed, Token};

/// Parsed expression tree. Only the node types listed here exist; the parser
/// fails closed on anything else, so evaluation never sees an unvetted
/// construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Dotted/subscripted access rooted at a context variable.
    Path { segments: Vec<Segment> },
    List(Vec<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` access; the first segment of every path is a `Key` naming the
    /// context root.
    Key(String),
    /// `[expr]` access with a dynamically evaluated index or key.
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

pub(crate) fn parse(tokens: &[Lexed], input_len: usize) -> Result<Expr, ExpressionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len,
    };
    let expr = parser.parse_or()?;
    if let Some(lexed) = parser.peek_lexed() {
        return Err(ExpressionError::Syntax {
            offset: lexed.offset,
            message: "unexpected trailing input".into(),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
    input_len: usize,
}

impl<'a> Parser<'a> {
    fn peek_lexed(&self) -> Option<&'a Lexed> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.peek_lexed().map(|lexed| &lexed.token)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek_lexed()
            .map(|lexed| lexed.offset)
            .unwrap_or(self.input_len)
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::In) => Some(BinaryOp::In),
            Some(Token::Not) => {
                // `x not in y`
                self.pos += 1;
                if !self.eat(&Token::In) {
                    return Err(self.error("expected 'in' after 'not'"));
                }
                let right = self.parse_additive()?;
                return Ok(Expr::Binary {
                    op: BinaryOp::NotIn,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.parse_additive()?;
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.bump() {
                        Some(Token::Ident(name)) => name.clone(),
                        _ => return Err(self.error("expected identifier after '.'")),
                    };
                    expr = self.extend_path(expr, Segment::Key(name))?;
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_or()?;
                    if !self.eat(&Token::RBracket) {
                        return Err(self.error("expected ']'"));
                    }
                    expr = self.extend_path(expr, Segment::Index(Box::new(index)))?;
                }
                Some(Token::LParen) => {
                    return Err(ExpressionError::Disallowed(
                        "function calls are not permitted".into(),
                    ));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn extend_path(&self, expr: Expr, segment: Segment) -> Result<Expr, ExpressionError> {
        match expr {
            Expr::Path { mut segments } => {
                segments.push(segment);
                Ok(Expr::Path { segments })
            }
            _ => Err(ExpressionError::Disallowed(
                "member access is only permitted on context paths".into(),
            )),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.bump() {
            Some(Token::Number(value)) => Ok(Expr::Literal(Literal::Number(*value))),
            Some(Token::Str(text)) => Ok(Expr::Literal(Literal::Str(text.clone()))),
            Some(Token::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Literal::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Path {
                segments: vec![Segment::Key(name.clone())],
            }),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        return Err(self.error("expected ',' or ']' in list"));
                    }
                }
                Ok(Expr::List(items))
            }
            _ => Err(self.error("expected a literal, identifier, or '('")),
        }
    }
}

impl Expr {
    /// Collects the context paths this expression reads, as key-segment
    /// chains. Dynamic subscripts contribute their literal keys when known.
    pub fn referenced_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths(&self, paths: &mut Vec<Vec<String>>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path { segments } => {
                let mut keys = Vec::new();
                for segment in segments {
                    match segment {
                        Segment::Key(key) => keys.push(key.clone()),
                        Segment::Index(index) => {
                            if let Expr::Literal(Literal::Str(key)) = index.as_ref() {
                                keys.push(key.clone());
                            } else {
                                index.collect_paths(paths);
                                break;
                            }
                        }
                    }
                }
                if !keys.is_empty() {
                    paths.push(keys);
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_paths(paths);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_paths(paths),
            Expr::Binary { left, right, .. } => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
        }
    }
}
