//! Predicate tree and row-level evaluation.

use rowsift_table::Table;

use crate::FilterError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
}

/// A boolean mask over table rows.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskExpr {
    Or(Box<MaskExpr>, Box<MaskExpr>),
    And(Box<MaskExpr>, Box<MaskExpr>),
    Not(Box<MaskExpr>),
    /// `df['col'].str.contains(pattern, ...)`: the pattern is an
    /// alternation of plain substrings, split on `|`.
    Contains {
        column: String,
        alternatives: Vec<String>,
        case_insensitive: bool,
    },
    /// `df['col'] <op> literal`.
    Compare {
        column: String,
        op: CmpOp,
        literal: Literal,
    },
}

fn cell<'a>(table: &Table, row: &'a [String], column: &str) -> Result<&'a str, FilterError> {
    let idx = table
        .column_index(column)
        .ok_or_else(|| FilterError::Eval(format!("unknown column '{column}'")))?;
    Ok(row.get(idx).map(|s| s.as_str()).unwrap_or(""))
}

fn contains_match(cell: &str, alternatives: &[String], case_insensitive: bool) -> bool {
    if case_insensitive {
        let lowered = cell.to_lowercase();
        alternatives
            .iter()
            .any(|alt| lowered.contains(&alt.to_lowercase()))
    } else {
        alternatives.iter().any(|alt| cell.contains(alt.as_str()))
    }
}

fn compare_match(cell: &str, op: CmpOp, literal: &Literal) -> bool {
    match literal {
        Literal::Str(s) => match op {
            CmpOp::Eq => cell == s,
            CmpOp::Ne => cell != s,
            // Ordering against a string literal: lexicographic, as the
            // source engine orders strings.
            CmpOp::Lt => cell < s.as_str(),
            CmpOp::Le => cell <= s.as_str(),
            CmpOp::Gt => cell > s.as_str(),
            CmpOp::Ge => cell >= s.as_str(),
        },
        Literal::Num(n) => match cell.trim().parse::<f64>() {
            Ok(v) => match op {
                CmpOp::Eq => v == *n,
                CmpOp::Ne => v != *n,
                CmpOp::Lt => v < *n,
                CmpOp::Le => v <= *n,
                CmpOp::Gt => v > *n,
                CmpOp::Ge => v >= *n,
            },
            // Unparsable cells never satisfy an ordering or equality;
            // they do satisfy inequality.
            Err(_) => op == CmpOp::Ne,
        },
    }
}

/// Evaluate a mask against one row.
pub fn eval(expr: &MaskExpr, table: &Table, row: &[String]) -> Result<bool, FilterError> {
    match expr {
        MaskExpr::Or(a, b) => Ok(eval(a, table, row)? || eval(b, table, row)?),
        MaskExpr::And(a, b) => Ok(eval(a, table, row)? && eval(b, table, row)?),
        MaskExpr::Not(inner) => Ok(!eval(inner, table, row)?),
        MaskExpr::Contains {
            column,
            alternatives,
            case_insensitive,
        } => Ok(contains_match(
            cell(table, row, column)?,
            alternatives,
            *case_insensitive,
        )),
        MaskExpr::Compare {
            column,
            op,
            literal,
        } => Ok(compare_match(cell(table, row, column)?, *op, literal)),
    }
}
