//! Gesture amount formulas.
//!
//! Keys like `scrollAmountFormula` let the user scale gesture output ("l/10")
//! without patching the driver. The strings are parsed once at startup into
//! a tiny arithmetic AST over the variables `l`, `k` and `p`, so no
//! arbitrary code ever gets evaluated.

use std::fmt;

/// Variables available to a formula.
///
/// `l` is the length of the mean relative-move vector in pixels, `k` the
/// pinch scale ratio (d2/d1) and `p` the panel's mean pixels-per-mm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vars {
    pub l: f64,
    pub k: f64,
    pub p: f64,
}

/// An error produced while parsing a formula string.
#[derive(Debug, thiserror::Error)]
pub enum FormulaError {
    #[error("unexpected character '{0}' in formula")]
    UnexpectedChar(char),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("trailing input after formula: '{0}'")]
    TrailingInput(String),
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Var(Var),
    Binary(Op, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum Var {
    L,
    K,
    P,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed arithmetic formula.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse `source` into a formula.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let mut parser = Parser { chars: source.chars().collect(), pos: 0 };
        let expr = parser.expr()?;
        parser.skip_spaces();
        if parser.pos < parser.chars.len() {
            let rest: String = parser.chars[parser.pos..].iter().collect();
            return Err(FormulaError::TrailingInput(rest));
        }
        Ok(Self { source: source.to_owned(), expr })
    }

    /// Evaluate against the given variables. Division by zero yields 0.0 so a
    /// degenerate gesture can never take the daemon down.
    pub fn eval(&self, vars: &Vars) -> f64 {
        eval(&self.expr, vars)
    }

    /// Evaluate and truncate to an integer amount.
    pub fn eval_amount(&self, vars: &Vars) -> i32 {
        self.eval(vars) as i32
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, vars: &Vars) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Var(Var::L) => vars.l,
        Expr::Var(Var::K) => vars.k,
        Expr::Var(Var::P) => vars.p,
        Expr::Neg(e) => -eval(e, vars),
        Expr::Binary(op, a, b) => {
            let (a, b) = (eval(a, vars), eval(b, vars));
            match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => {
                    if b == 0.0 {
                        0.0
                    } else {
                        a / b
                    }
                }
            }
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            self.skip_spaces();
            let op = match self.peek() {
                Some('+') => Op::Add,
                Some('-') => Op::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        loop {
            self.skip_spaces();
            let op = match self.peek() {
                Some('*') => Op::Mul,
                Some('/') => Op::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // factor := number | variable | '(' expr ')' | '-' factor
    fn factor(&mut self) -> Result<Expr, FormulaError> {
        self.skip_spaces();
        match self.bump() {
            Some('(') => {
                let inner = self.expr()?;
                self.skip_spaces();
                match self.bump() {
                    Some(')') => Ok(inner),
                    Some(c) => Err(FormulaError::UnexpectedChar(c)),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some('-') => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some('l') => Ok(Expr::Var(Var::L)),
            Some('k') => Ok(Expr::Var(Var::K)),
            Some('p') => Ok(Expr::Var(Var::P)),
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let mut num = String::new();
                num.push(c);
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                num.parse().map(Expr::Num).map_err(|_| FormulaError::UnexpectedChar(c))
            }
            Some(c) => Err(FormulaError::UnexpectedChar(c)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}
