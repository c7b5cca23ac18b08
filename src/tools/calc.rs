//! Sandboxed arithmetic evaluator behind the `calculate` tool.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expression := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := primary (("^" | "**") unary)?
//! primary    := number | constant | name "(" arguments ")" | "(" expression ")"
//! ```
//!
//! Exponentiation is right-associative and binds tighter than unary minus,
//! so `-2^2` is `-4`. Only the constants and functions listed in this module
//! are reachable; nothing else can be named.

use std::fmt;

use thiserror::Error;

/// Maximum nesting of parentheses, unary operators, exponents and calls.
pub const MAX_DEPTH: usize = 64;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    /// Nothing to evaluate.
    #[error("empty expression")]
    Empty,

    /// A character outside the grammar.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// The character.
        ch: char,
        /// Byte offset in the input.
        pos: usize,
    },

    /// A token in a position the grammar does not allow.
    #[error("unexpected {0}")]
    UnexpectedToken(String),

    /// Input ended in the middle of an expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A numeric literal that does not parse.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// A bare name that is not a known constant.
    #[error("unknown name '{0}'")]
    UnknownName(String),

    /// A call to a function that is not on the allow-list.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of arguments.
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Accepted argument count.
        expected: &'static str,
        /// Supplied argument count.
        got: usize,
    },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Argument outside the function's domain.
    #[error("math domain error in {0}()")]
    Domain(String),

    /// Result too large to represent.
    #[error("math range error in {0}()")]
    Overflow(String),

    /// Nesting exceeds [`MAX_DEPTH`].
    #[error("expression nested too deeply")]
    TooDeep,
}

/// Evaluates `expression`.
///
/// # Errors
///
/// Returns a [`CalcError`] for syntax errors, unknown names, arity and
/// domain errors, division by zero, or excessive nesting.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;

    match parser.peek() {
        Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
        None => Ok(value),
    }
}

/// Formats a result. Integral values print without a fractional part.
#[must_use]
pub fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if value.is_finite() && magnitude != 0.0 && !(1e-5..1e16).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "number {value}"),
            Self::Ident(name) => write!(f, "name '{name}'"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::Percent => f.write_str("'%'"),
            Self::Caret => f.write_str("'^'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b.is_ascii_digit() || b == b'.' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            // Exponent only if digits follow, so "2e" stays a syntax error.
            if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
                let mut j = i + 1;
                if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let text = &input[start..i];
            let value = text
                .parse::<f64>()
                .map_err(|_| CalcError::InvalidNumber(text.to_string()))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(input[start..i].to_string()));
            continue;
        }

        let token = match b {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                i += 1;
                Token::Caret
            }
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'^' => Token::Caret,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            _ => {
                let ch = input[i..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
                return Err(CalcError::UnexpectedChar { ch, pos: i });
            }
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CalcError>,
    ) -> Result<T, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    value = modulo(value, divisor)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.nested(Self::unary).map(|value| -value)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.peek() != Some(&Token::Caret) {
            return Ok(base);
        }
        self.pos += 1;
        let exponent = self.nested(Self::unary)?;
        power(base, exponent)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.nested(Self::expression)?;
                self.expect_close()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.nested(Self::arguments)?;
                    call(&name, &args)
                } else {
                    constant(&name).ok_or(CalcError::UnknownName(name))
                }
            }
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, CalcError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(CalcError::UnexpectedToken(token.to_string())),
                None => return Err(CalcError::UnexpectedEnd),
            }
        }
    }

    fn expect_close(&mut self) -> Result<(), CalcError> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

/// Floored modulo: the result takes the sign of the divisor.
fn modulo(value: f64, divisor: f64) -> Result<f64, CalcError> {
    if divisor == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    let rem = value % divisor;
    if rem != 0.0 && (rem < 0.0) != (divisor < 0.0) {
        Ok(rem + divisor)
    } else {
        Ok(rem)
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, CalcError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    checked("pow", &[base, exponent], base.powf(exponent))
}

fn call(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let value = match name {
        "sqrt" => one(name, args)?.sqrt(),
        "sin" => one(name, args)?.sin(),
        "cos" => one(name, args)?.cos(),
        "tan" => one(name, args)?.tan(),
        "asin" => one(name, args)?.asin(),
        "acos" => one(name, args)?.acos(),
        "atan" => one(name, args)?.atan(),
        "sinh" => one(name, args)?.sinh(),
        "cosh" => one(name, args)?.cosh(),
        "tanh" => one(name, args)?.tanh(),
        "exp" => one(name, args)?.exp(),
        "ln" => one(name, args)?.ln(),
        "log10" => one(name, args)?.log10(),
        "log2" => one(name, args)?.log2(),
        "log" => match args {
            [x] => x.ln(),
            [x, base] => x.ln() / base.ln(),
            _ => return Err(arity(name, "1 or 2", args)),
        },
        "abs" => one(name, args)?.abs(),
        "floor" => one(name, args)?.floor(),
        "ceil" => one(name, args)?.ceil(),
        "trunc" => one(name, args)?.trunc(),
        "round" => match args {
            [x] => x.round_ties_even(),
            [x, digits] => round_to(*x, *digits)?,
            _ => return Err(arity(name, "1 or 2", args)),
        },
        "degrees" => one(name, args)?.to_degrees(),
        "radians" => one(name, args)?.to_radians(),
        "factorial" => factorial(one(name, args)?)?,
        "atan2" => {
            let (y, x) = two(name, args)?;
            y.atan2(x)
        }
        "pow" => {
            let (base, exponent) = two(name, args)?;
            return power(base, exponent);
        }
        "hypot" => {
            let (a, b) = two(name, args)?;
            a.hypot(b)
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", args));
            }
            let pick = if name == "min" { f64::min } else { f64::max };
            args.iter().copied().fold(args[0], pick)
        }
        _ => return Err(CalcError::UnknownFunction(name.to_string())),
    };

    checked(name, args, value)
}

/// Maps NaN and overflow from finite inputs to errors.
fn checked(name: &str, args: &[f64], value: f64) -> Result<f64, CalcError> {
    if value.is_nan() && !args.iter().any(|a| a.is_nan()) {
        return Err(CalcError::Domain(name.to_string()));
    }
    if value.is_infinite() && args.iter().all(|a| a.is_finite()) {
        // log of zero diverges rather than overflows
        if matches!(name, "ln" | "log" | "log10" | "log2") {
            return Err(CalcError::Domain(name.to_string()));
        }
        return Err(CalcError::Overflow(name.to_string()));
    }
    Ok(value)
}

fn one(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    match args {
        [x] => Ok(*x),
        _ => Err(arity(name, "exactly 1", args)),
    }
}

fn two(name: &str, args: &[f64]) -> Result<(f64, f64), CalcError> {
    match args {
        [a, b] => Ok((*a, *b)),
        _ => Err(arity(name, "exactly 2", args)),
    }
}

fn arity(name: &str, expected: &'static str, args: &[f64]) -> CalcError {
    CalcError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    }
}

#[allow(clippy::cast_possible_truncation)] // digits is checked to be a small integer
fn round_to(value: f64, digits: f64) -> Result<f64, CalcError> {
    if digits.fract() != 0.0 || digits.abs() > 300.0 {
        return Err(CalcError::Domain("round".to_string()));
    }
    let factor = 10f64.powi(digits as i32);
    Ok((value * factor).round_ties_even() / factor)
}

fn factorial(n: f64) -> Result<f64, CalcError> {
    if n < 0.0 || n.fract() != 0.0 || n.is_nan() {
        return Err(CalcError::Domain("factorial".to_string()));
    }
    if n > 170.0 {
        return Err(CalcError::Overflow("factorial".to_string()));
    }
    let mut product = 1.0;
    let mut k = 2.0;
    while k <= n {
        product *= k;
        k += 1.0;
    }
    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str) -> f64 {
        evaluate(expression).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn precedence_and_associativity() {
        assert!(approx(eval("2 + 3 * 4"), 14.0));
        assert!(approx(eval("(2 + 3) * 4"), 20.0));
        assert!(approx(eval("10 - 4 - 3"), 3.0));
        assert!(approx(eval("2 ^ 3 ^ 2"), 512.0));
        assert!(approx(eval("2 ** 10"), 1024.0));
        assert!(approx(eval("-2 ^ 2"), -4.0));
        assert!(approx(eval("2 ^ -1"), 0.5));
        assert!(approx(eval("--3"), 3.0));
    }

    #[test]
    fn functions_and_constants() {
        assert!(approx(eval("sqrt(16)"), 4.0));
        assert!(approx(eval("pi * 2"), std::f64::consts::TAU));
        assert!(approx(eval("sin(pi/2)"), 1.0));
        assert!(approx(eval("log(8, 2)"), 3.0));
        assert!(approx(eval("max(1, 7, 3)"), 7.0));
        assert!(approx(eval("min(4, -2)"), -2.0));
        assert!(approx(eval("factorial(5)"), 120.0));
        assert!(approx(eval("hypot(3, 4)"), 5.0));
        assert!(approx(eval("degrees(pi)"), 180.0));
        assert!(approx(eval("round(2.5)"), 2.0));
        assert!(approx(eval("round(3.14159, 2)"), 3.14));
    }

    #[test]
    fn number_literals() {
        assert!(approx(eval("1.5e3"), 1500.0));
        assert!(approx(eval(".5 + 5."), 5.5));
        assert!(approx(eval("2E-2"), 0.02));
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert!(approx(eval("7 % 3"), 1.0));
        assert!(approx(eval("-7 % 3"), 2.0));
        assert!(approx(eval("7 % -3"), -2.0));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("0 ^ -1"), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn domain_and_range_errors() {
        assert_eq!(evaluate("sqrt(-1)"), Err(CalcError::Domain("sqrt".into())));
        assert_eq!(evaluate("ln(0)"), Err(CalcError::Domain("ln".into())));
        assert_eq!(evaluate("factorial(2.5)"), Err(CalcError::Domain("factorial".into())));
        assert_eq!(evaluate("exp(1000)"), Err(CalcError::Overflow("exp".into())));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(evaluate("x + 1"), Err(CalcError::UnknownName("x".into())));
        assert_eq!(
            evaluate("__import__(1)"),
            Err(CalcError::UnknownFunction("__import__".into()))
        );
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(evaluate(""), Err(CalcError::Empty));
        assert_eq!(evaluate("   "), Err(CalcError::Empty));
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert!(matches!(evaluate("1 2"), Err(CalcError::UnexpectedToken(_))));
        assert!(matches!(evaluate("2e"), Err(CalcError::UnexpectedToken(_))));
        assert!(matches!(evaluate("1.2.3"), Err(CalcError::InvalidNumber(_))));
        assert!(matches!(
            evaluate("2 $ 3"),
            Err(CalcError::UnexpectedChar { ch: '$', pos: 2 })
        ));
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(evaluate("sqrt(1, 2)"), Err(CalcError::Arity { got: 2, .. })));
        assert!(matches!(evaluate("atan2(1)"), Err(CalcError::Arity { got: 1, .. })));
        assert!(matches!(evaluate("max()"), Err(CalcError::Arity { got: 0, .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(evaluate(&deep), Err(CalcError::TooDeep));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(approx(eval(&shallow), 1.0));

        assert_eq!(evaluate(&"-".repeat(1000)), Err(CalcError::TooDeep));
    }

    #[test]
    fn formatting() {
        assert_eq!(format_number(14.0), "14");
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(1e20), "1e20");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }
}
