//! Constant evaluator. Expressions here have no row context: they reduce to a
//! scalar given only the builtin functions and any template parameters.

use chrono::Utc;

use crate::error::{ValuesError, ValuesResult};
use crate::value::Scalar;

use super::ast::{BinOp, Expr, UnOp};

const MS_PER_DAY: i64 = 86_400_000;

/// Evaluation context. `now` is captured once per reader so batch replay of a
/// template produces the same values as row-at-a-time evaluation would have.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub now_ms: i64,
}

impl EvalContext {
    pub fn new() -> Self {
        EvalContext { now_ms: Utc::now().timestamp_millis() }
    }

    pub fn fixed(now_ms: i64) -> Self {
        EvalContext { now_ms }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn evaluate(expr: &Expr, params: &[Scalar], ctx: &EvalContext) -> ValuesResult<Scalar> {
    match expr {
        Expr::Literal(s) => Ok(s.clone()),
        Expr::Param(i) => params
            .get(*i)
            .cloned()
            .ok_or_else(|| ValuesError::internal(format!("template parameter {i} not bound"))),
        Expr::Identifier(name) => {
            Err(ValuesError::syntax(format!("unknown identifier '{name}'")))
        }
        Expr::Function { name, args } => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(evaluate(a, params, ctx)?);
            }
            call(name, vals, ctx)
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, params, ctx)?;
            let r = evaluate(right, params, ctx)?;
            binary(*op, l, r)
        }
        Expr::Unary { op, expr } => {
            let v = evaluate(expr, params, ctx)?;
            unary(*op, v)
        }
        Expr::Tuple(items) => {
            let mut vals = Vec::with_capacity(items.len());
            for it in items {
                vals.push(evaluate(it, params, ctx)?);
            }
            Ok(Scalar::Tuple(vals))
        }
        Expr::Array(items) => {
            let mut vals = Vec::with_capacity(items.len());
            for it in items {
                vals.push(evaluate(it, params, ctx)?);
            }
            Ok(Scalar::Array(vals))
        }
    }
}

fn binary(op: BinOp, l: Scalar, r: Scalar) -> ValuesResult<Scalar> {
    use Scalar::*;
    if l.is_null() || r.is_null() {
        return Ok(Null);
    }
    match op {
        BinOp::Concat => match (l, r) {
            (Str(a), Str(b)) => Ok(Str(a + &b)),
            (a, b) => Err(ValuesError::type_mismatch(format!(
                "cannot concatenate {} and {}",
                a.kind_name(),
                b.kind_name()
            ))),
        },
        BinOp::Add | BinOp::Sub => {
            // Date/datetime plus an integer shifts by days/seconds.
            let sign: i64 = if op == BinOp::Sub { -1 } else { 1 };
            match (&l, &r) {
                (Datetime(ms), Int(s)) => {
                    return checked_dt(ms.checked_add(sign * s * 1000));
                }
                (Int(s), Datetime(ms)) if op == BinOp::Add => {
                    return checked_dt(ms.checked_add(s * 1000));
                }
                (Date(d), Int(n)) => {
                    let shifted = (*d as i64) + sign * n;
                    return i32::try_from(shifted)
                        .map(Date)
                        .map_err(|_| ValuesError::overflow("date out of range"));
                }
                (Int(n), Date(d)) if op == BinOp::Add => {
                    let shifted = (*d as i64) + n;
                    return i32::try_from(shifted)
                        .map(Date)
                        .map_err(|_| ValuesError::overflow("date out of range"));
                }
                _ => {}
            }
            numeric(op, l, r)
        }
        BinOp::Mul | BinOp::Div | BinOp::Mod => numeric(op, l, r),
    }
}

fn checked_dt(ms: Option<i64>) -> ValuesResult<Scalar> {
    ms.map(Scalar::Datetime).ok_or_else(|| ValuesError::overflow("datetime out of range"))
}

fn numeric(op: BinOp, l: Scalar, r: Scalar) -> ValuesResult<Scalar> {
    use Scalar::*;
    match (l, r) {
        (Int(a), Int(b)) => match op {
            BinOp::Add => a
                .checked_add(b)
                .map(Int)
                .ok_or_else(|| ValuesError::overflow("integer addition overflow")),
            BinOp::Sub => a
                .checked_sub(b)
                .map(Int)
                .ok_or_else(|| ValuesError::overflow("integer subtraction overflow")),
            BinOp::Mul => a
                .checked_mul(b)
                .map(Int)
                .ok_or_else(|| ValuesError::overflow("integer multiplication overflow")),
            BinOp::Div => {
                if b == 0 {
                    Err(ValuesError::type_mismatch("division by zero"))
                } else {
                    Ok(Float(a as f64 / b as f64))
                }
            }
            BinOp::Mod => {
                if b == 0 {
                    Err(ValuesError::type_mismatch("division by zero"))
                } else {
                    Ok(Int(a % b))
                }
            }
            BinOp::Concat => unreachable!(),
        },
        (a, b) => {
            let (x, y) = match (as_f64(&a), as_f64(&b)) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    return Err(ValuesError::type_mismatch(format!(
                        "cannot apply arithmetic to {} and {}",
                        a.kind_name(),
                        b.kind_name()
                    )))
                }
            };
            match op {
                BinOp::Add => Ok(Float(x + y)),
                BinOp::Sub => Ok(Float(x - y)),
                BinOp::Mul => Ok(Float(x * y)),
                BinOp::Div => {
                    if y == 0.0 {
                        Err(ValuesError::type_mismatch("division by zero"))
                    } else {
                        Ok(Float(x / y))
                    }
                }
                BinOp::Mod => Ok(Float(x % y)),
                BinOp::Concat => unreachable!(),
            }
        }
    }
}

fn as_f64(v: &Scalar) -> Option<f64> {
    match v {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        _ => None,
    }
}

fn unary(op: UnOp, v: Scalar) -> ValuesResult<Scalar> {
    use Scalar::*;
    if v.is_null() {
        return Ok(Null);
    }
    match op {
        UnOp::Plus => match v {
            Int(_) | Float(_) => Ok(v),
            other => Err(ValuesError::type_mismatch(format!(
                "cannot apply unary '+' to {}",
                other.kind_name()
            ))),
        },
        UnOp::Neg => match v {
            Int(i) => i
                .checked_neg()
                .map(Int)
                .ok_or_else(|| ValuesError::overflow("integer negation overflow")),
            Float(f) => Ok(Float(-f)),
            other => Err(ValuesError::type_mismatch(format!(
                "cannot negate {}",
                other.kind_name()
            ))),
        },
    }
}

fn call(name: &str, mut args: Vec<Scalar>, ctx: &EvalContext) -> ValuesResult<Scalar> {
    use Scalar::*;
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "now" => {
            expect_arity(&lower, &args, 0)?;
            Ok(Datetime(ctx.now_ms))
        }
        "today" => {
            expect_arity(&lower, &args, 0)?;
            Ok(Date((ctx.now_ms.div_euclid(MS_PER_DAY)) as i32))
        }
        "abs" => {
            expect_arity(&lower, &args, 1)?;
            match args.remove(0) {
                Null => Ok(Null),
                Int(i) => i
                    .checked_abs()
                    .map(Int)
                    .ok_or_else(|| ValuesError::overflow("abs overflow")),
                Float(f) => Ok(Float(f.abs())),
                other => Err(ValuesError::type_mismatch(format!(
                    "abs expects a number, got {}",
                    other.kind_name()
                ))),
            }
        }
        "length" => {
            expect_arity(&lower, &args, 1)?;
            match args.remove(0) {
                Null => Ok(Null),
                Str(s) => Ok(Int(s.chars().count() as i64)),
                Array(items) => Ok(Int(items.len() as i64)),
                other => Err(ValuesError::type_mismatch(format!(
                    "length expects a string or array, got {}",
                    other.kind_name()
                ))),
            }
        }
        "upper" | "lower" => {
            expect_arity(&lower, &args, 1)?;
            match args.remove(0) {
                Null => Ok(Null),
                Str(s) => Ok(Str(if lower == "upper" {
                    s.to_uppercase()
                } else {
                    s.to_lowercase()
                })),
                other => Err(ValuesError::type_mismatch(format!(
                    "{lower} expects a string, got {}",
                    other.kind_name()
                ))),
            }
        }
        "concat" => {
            let mut out = String::new();
            for a in args {
                match a {
                    Null => return Ok(Null),
                    Str(s) => out.push_str(&s),
                    other => {
                        return Err(ValuesError::type_mismatch(format!(
                            "concat expects strings, got {}",
                            other.kind_name()
                        )))
                    }
                }
            }
            Ok(Str(out))
        }
        "map" => {
            if args.len() % 2 != 0 {
                return Err(ValuesError::type_mismatch(
                    "map expects an even number of arguments",
                ));
            }
            let mut entries = Vec::with_capacity(args.len() / 2);
            let mut it = args.into_iter();
            while let (Some(k), Some(v)) = (it.next(), it.next()) {
                entries.push((k, v));
            }
            Ok(Map(entries))
        }
        _ => Err(ValuesError::syntax(format!("unknown function '{name}'"))),
    }
}

fn expect_arity(name: &str, args: &[Scalar], want: usize) -> ValuesResult<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(ValuesError::type_mismatch(format!(
            "{name} expects {want} argument(s), got {}",
            args.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_expression;
    use crate::lexer::{lex_row, TokenCursor};

    fn eval_src(src: &str, ctx: &EvalContext) -> ValuesResult<Scalar> {
        let toks = lex_row(src.as_bytes(), 0);
        let mut tc = TokenCursor::new(&toks, 0, 64, 1000);
        let e = parse_expression(&mut tc)?;
        evaluate(&e, &[], ctx)
    }

    #[test]
    fn arithmetic() {
        let ctx = EvalContext::fixed(0);
        assert_eq!(eval_src("1 + 2 * 3", &ctx).unwrap(), Scalar::Int(7));
        assert_eq!(eval_src("7 / 2", &ctx).unwrap(), Scalar::Float(3.5));
        assert_eq!(eval_src("7 % 3", &ctx).unwrap(), Scalar::Int(1));
        assert_eq!(eval_src("1.5 + 1", &ctx).unwrap(), Scalar::Float(2.5));
    }

    #[test]
    fn datetime_shift_is_seconds() {
        let ctx = EvalContext::fixed(1_000_000);
        assert_eq!(eval_src("now() + 2", &ctx).unwrap(), Scalar::Datetime(1_002_000));
        assert_eq!(eval_src("now() - 1", &ctx).unwrap(), Scalar::Datetime(999_000));
    }

    #[test]
    fn today_shift_is_days() {
        let ctx = EvalContext::fixed(MS_PER_DAY * 100);
        assert_eq!(eval_src("today() + 3", &ctx).unwrap(), Scalar::Date(103));
    }

    #[test]
    fn null_propagates() {
        let ctx = EvalContext::fixed(0);
        assert_eq!(eval_src("NULL + 1", &ctx).unwrap(), Scalar::Null);
        assert_eq!(eval_src("upper(NULL)", &ctx).unwrap(), Scalar::Null);
    }

    #[test]
    fn strings_and_functions() {
        let ctx = EvalContext::fixed(0);
        assert_eq!(eval_src("'a' || upper('bc')", &ctx).unwrap(), Scalar::Str("aBC".into()));
        assert_eq!(eval_src("length('héllo')", &ctx).unwrap(), Scalar::Int(5));
        assert_eq!(
            eval_src("concat('x', 'y', 'z')", &ctx).unwrap(),
            Scalar::Str("xyz".into())
        );
    }

    #[test]
    fn overflow_is_a_numeric_domain_error() {
        let ctx = EvalContext::fixed(0);
        let err = eval_src("9223372036854775807 + 1", &ctx).unwrap_err();
        assert!(matches!(err, ValuesError::Overflow { .. }));
    }

    #[test]
    fn map_builds_entries() {
        let ctx = EvalContext::fixed(0);
        let v = eval_src("map('k', 1, 'j', 2)", &ctx).unwrap();
        match v {
            Scalar::Map(e) => assert_eq!(e.len(), 2),
            _ => panic!("expected map"),
        }
        assert!(eval_src("map('k')", &ctx).is_err());
    }

    #[test]
    fn params_bind() {
        let e = Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::Param(0)),
            right: Box::new(Expr::Param(1)),
        };
        let ctx = EvalContext::fixed(0);
        let v = evaluate(&e, &[Scalar::Int(2), Scalar::Int(40)], &ctx).unwrap();
        assert_eq!(v, Scalar::Int(42));
    }
}
