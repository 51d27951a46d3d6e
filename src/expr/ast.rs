use crate::value::Scalar;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    /// Bind-point introduced when a template replaces a literal sub-expression.
    Param(usize),
    Identifier(String),
    Function { name: String, args: Vec<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnOp, expr: Box<Expr> },
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Visit literal sub-expressions in source order.
    pub fn walk_literals<'a>(&'a self, f: &mut impl FnMut(&'a Scalar)) {
        match self {
            Expr::Literal(s) => f(s),
            Expr::Param(_) | Expr::Identifier(_) => {}
            Expr::Function { args, .. } => {
                for a in args {
                    a.walk_literals(f);
                }
            }
            Expr::Binary { left, right, .. } => {
                left.walk_literals(f);
                right.walk_literals(f);
            }
            Expr::Unary { expr, .. } => expr.walk_literals(f),
            Expr::Tuple(items) | Expr::Array(items) => {
                for item in items {
                    item.walk_literals(f);
                }
            }
        }
    }

    /// Copy of this expression with literals replaced by `Param` bind-points,
    /// numbered in source order, plus the example literal values.
    pub fn parameterize(&self) -> (Expr, Vec<Scalar>) {
        let mut params = Vec::new();
        let out = self.parameterize_rec(&mut params);
        (out, params)
    }

    fn parameterize_rec(&self, params: &mut Vec<Scalar>) -> Expr {
        match self {
            Expr::Literal(s) => {
                params.push(s.clone());
                Expr::Param(params.len() - 1)
            }
            Expr::Param(i) => Expr::Param(*i),
            Expr::Identifier(name) => Expr::Identifier(name.clone()),
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.parameterize_rec(params)).collect(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.parameterize_rec(params)),
                right: Box::new(right.parameterize_rec(params)),
            },
            Expr::Unary { op, expr } => {
                Expr::Unary { op: *op, expr: Box::new(expr.parameterize_rec(params)) }
            }
            Expr::Tuple(items) => {
                Expr::Tuple(items.iter().map(|e| e.parameterize_rec(params)).collect())
            }
            Expr::Array(items) => {
                Expr::Array(items.iter().map(|e| e.parameterize_rec(params)).collect())
            }
        }
    }
}
