//! Recursive-descent parser for the statement language.

use super::ast::{CmpOp, Cond, Data, Expr, Projection, Statement, Target};
use super::lexer::{tokenize, Token};
use crate::error::{CoreError, CoreResult};
use crate::value::{Value, MAX_NESTING_DEPTH};

/// Parses a `;`-separated batch of statements.
///
/// Empty statements (consecutive or trailing semicolons) are skipped.
pub fn parse(text: &str) -> CoreResult<Vec<Statement>> {
    let mut parser = Parser::new(tokenize(text)?);
    let mut statements = Vec::new();
    loop {
        while parser.eat_punct(';') {}
        if parser.at_end() {
            break;
        }
        statements.push(parser.statement()?);
        if !parser.at_end() && !parser.eat_punct(';') {
            return Err(parser.unexpected("`;`"));
        }
    }
    Ok(statements)
}

/// Parses a bare resource such as `foo` or `foo:1`.
pub fn parse_target(resource: &str) -> CoreResult<Target> {
    let mut parser = Parser::new(tokenize(resource)?);
    let target = parser.target()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of resource"));
    }
    Ok(target)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token only if `f` accepts it.
    fn take<T>(&mut self, f: impl FnOnce(&Token) -> Option<T>) -> Option<T> {
        let out = self.peek().and_then(f);
        if out.is_some() {
            self.pos += 1;
        }
        out
    }

    fn unexpected(&self, expected: &str) -> CoreError {
        match self.peek() {
            Some(token) => CoreError::parse(format!("expected {expected}, found {token:?}")),
            None => CoreError::parse(format!("expected {expected}, found end of input")),
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> CoreResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{kw}`")))
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> CoreResult<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{c}`")))
        }
    }

    fn ident(&mut self) -> CoreResult<String> {
        self.take(|t| match t {
            Token::Ident(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| self.unexpected("an identifier"))
    }

    fn op(&mut self, op: &'static str) -> bool {
        self.take(|t| (*t == Token::Op(op)).then_some(())).is_some()
    }

    fn statement(&mut self) -> CoreResult<Statement> {
        let Some(Token::Ident(word)) = self.peek().cloned() else {
            return Err(self.unexpected("a statement"));
        };
        self.pos += 1;
        match word.to_ascii_uppercase().as_str() {
            "CREATE" => {
                let only = self.eat_keyword("ONLY");
                let what = self.target()?;
                let data = self.data()?;
                Ok(Statement::Create { only, what, data })
            }
            "SELECT" => self.select(),
            "UPDATE" => {
                let only = self.eat_keyword("ONLY");
                let what = self.target()?;
                let data = self.data()?;
                let cond = self.cond()?;
                Ok(Statement::Update {
                    only,
                    what,
                    data,
                    cond,
                })
            }
            "DELETE" => {
                self.eat_keyword("FROM");
                let only = self.eat_keyword("ONLY");
                let what = self.target()?;
                let cond = self.cond()?;
                Ok(Statement::Delete { only, what, cond })
            }
            "RETURN" => Ok(Statement::Return(self.expr()?)),
            "DEFINE" => {
                self.expect_keyword("TABLE")?;
                Ok(Statement::DefineTable(self.ident()?))
            }
            "USE" => {
                let mut ns = None;
                let mut db = None;
                loop {
                    if self.eat_keyword("NS") || self.eat_keyword("NAMESPACE") {
                        ns = Some(self.name()?);
                    } else if self.eat_keyword("DB") || self.eat_keyword("DATABASE") {
                        db = Some(self.name()?);
                    } else {
                        break;
                    }
                }
                if ns.is_none() && db.is_none() {
                    return Err(self.unexpected("`NS` or `DB`"));
                }
                Ok(Statement::Use { ns, db })
            }
            other => Err(CoreError::parse(format!("unknown statement `{other}`"))),
        }
    }

    /// Namespace or database name: identifier, integer or string.
    fn name(&mut self) -> CoreResult<String> {
        self.take(|t| match t {
            Token::Ident(s) | Token::Str(s) => Some(s.clone()),
            Token::Int(i) => Some(i.to_string()),
            _ => None,
        })
        .ok_or_else(|| self.unexpected("a name"))
    }

    fn select(&mut self) -> CoreResult<Statement> {
        let projection = if self.eat_punct('*') {
            Projection::All
        } else if self.eat_keyword("VALUE") {
            Projection::Value(self.ident()?)
        } else {
            let mut fields = vec![self.ident()?];
            while self.eat_punct(',') {
                fields.push(self.ident()?);
            }
            Projection::Fields(fields)
        };
        self.expect_keyword("FROM")?;
        let only = self.eat_keyword("ONLY");
        let what = self.target()?;
        let cond = self.cond()?;
        let limit = if self.eat_keyword("LIMIT") {
            self.eat_keyword("BY");
            let n = self.take(|t| match t {
                Token::Int(n) if *n >= 0 => Some(usize::try_from(*n).unwrap_or(usize::MAX)),
                _ => None,
            });
            match n {
                Some(n) => Some(n),
                None => return Err(self.unexpected("a non-negative integer")),
            }
        } else {
            None
        };
        Ok(Statement::Select {
            projection,
            only,
            what,
            cond,
            limit,
        })
    }

    fn target(&mut self) -> CoreResult<Target> {
        let tb = self.ident()?;
        if self.eat_punct(':') {
            Ok(Target::Record(tb, self.id_expr()?))
        } else {
            Ok(Target::Table(tb))
        }
    }

    fn id_expr(&mut self) -> CoreResult<Expr> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::from(n)))
            }
            Some(Token::Ident(s) | Token::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Strand(s)))
            }
            Some(Token::Punct('[' | '{')) => self.expr(),
            Some(Token::Param(name)) => {
                self.pos += 1;
                Ok(Expr::Param(name))
            }
            _ => Err(self.unexpected("a record id")),
        }
    }

    fn data(&mut self) -> CoreResult<Option<Data>> {
        if self.eat_keyword("SET") {
            let mut fields = Vec::new();
            loop {
                let field = self.ident()?;
                if !self.op("=") {
                    return Err(self.unexpected("`=`"));
                }
                fields.push((field, self.expr()?));
                if !self.eat_punct(',') {
                    break;
                }
            }
            Ok(Some(Data::Set(fields)))
        } else if self.eat_keyword("CONTENT") {
            Ok(Some(Data::Content(self.expr()?)))
        } else {
            Ok(None)
        }
    }

    fn cond(&mut self) -> CoreResult<Option<Cond>> {
        if !self.eat_keyword("WHERE") {
            return Ok(None);
        }
        let field = self.ident()?;
        let op = self.take(|t| match t {
            Token::Op("=") => Some(CmpOp::Eq),
            Token::Op("!=") => Some(CmpOp::Ne),
            Token::Op("<") => Some(CmpOp::Lt),
            Token::Op("<=") => Some(CmpOp::Le),
            Token::Op(">") => Some(CmpOp::Gt),
            Token::Op(">=") => Some(CmpOp::Ge),
            _ => None,
        });
        let Some(op) = op else {
            return Err(self.unexpected("a comparison operator"));
        };
        let value = self.expr()?;
        Ok(Some(Cond { field, op, value }))
    }

    fn expr(&mut self) -> CoreResult<Expr> {
        let Some(token) = self.next() else {
            return Err(self.unexpected("an expression"));
        };
        Ok(match token {
            Token::Int(i) => Expr::Literal(Value::from(i)),
            Token::Float(f) => Expr::Literal(Value::from(f)),
            Token::Str(s) => Expr::Literal(Value::Strand(s)),
            Token::Param(p) => Expr::Param(p),
            Token::Duration(d) => Expr::Literal(Value::Duration(d)),
            Token::Datetime(s) => Expr::Literal(Value::Datetime(s)),
            Token::Bytes(b) => Expr::Literal(Value::Bytes(b)),
            Token::Uuid(s) => {
                let uuid = uuid::Uuid::parse_str(&s)
                    .map_err(|e| CoreError::parse(format!("invalid uuid `{s}`: {e}")))?;
                Expr::Literal(Value::Uuid(uuid))
            }
            Token::Punct('[') => self.nested(Self::array)?,
            Token::Punct('{') => self.nested(Self::object)?,
            Token::Ident(word) => match word.to_ascii_uppercase().as_str() {
                "TRUE" => Expr::Literal(Value::Bool(true)),
                "FALSE" => Expr::Literal(Value::Bool(false)),
                "NULL" => Expr::Literal(Value::Null),
                "NONE" => Expr::Literal(Value::None),
                "NAN" => Expr::Literal(Value::from(f64::NAN)),
                "INFINITY" => Expr::Literal(Value::from(f64::INFINITY)),
                _ if self.eat_punct(':') => {
                    self.nested(|p| Ok(Expr::Thing(word, Box::new(p.id_expr()?))))?
                }
                _ => return Err(CoreError::parse(format!("unexpected identifier `{word}`"))),
            },
            other => {
                return Err(CoreError::parse(format!(
                    "expected an expression, found {other:?}"
                )))
            }
        })
    }

    /// Runs `f` one container level deeper.
    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CoreResult<Expr>) -> CoreResult<Expr> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CoreError::parse("nesting too deep"));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Array literal body, after the opening `[`.
    fn array(&mut self) -> CoreResult<Expr> {
        let mut items = Vec::new();
        if !self.eat_punct(']') {
            loop {
                items.push(self.expr()?);
                if self.eat_punct(']') {
                    break;
                }
                self.expect_punct(',')?;
                if self.eat_punct(']') {
                    break;
                }
            }
        }
        Ok(Expr::Array(items))
    }

    /// Object literal body, after the opening `{`.
    fn object(&mut self) -> CoreResult<Expr> {
        let mut fields = Vec::new();
        if !self.eat_punct('}') {
            loop {
                let key = self.take(|t| match t {
                    Token::Ident(s) | Token::Str(s) => Some(s.clone()),
                    Token::Int(i) => Some(i.to_string()),
                    _ => None,
                });
                let Some(key) = key else {
                    return Err(self.unexpected("an object key"));
                };
                self.expect_punct(':')?;
                fields.push((key, self.expr()?));
                if self.eat_punct('}') {
                    break;
                }
                self.expect_punct(',')?;
                if self.eat_punct('}') {
                    break;
                }
            }
        }
        Ok(Expr::Object(fields))
    }
}
