//! Constrained interpreter for model-generated filter code.
//!
//! The generator promises a single line of the shape
//! `df = df[<boolean mask>]`. That line is never handed to a host
//! execution engine; it is parsed into a closed predicate grammar
//! (column containment/comparison predicates combined with `&`, `|`
//! and `~`) and the resulting tree is evaluated row by row. Anything
//! outside the grammar fails the shape check up front.

use thiserror::Error;

use rowsift_table::Table;

pub mod ast;
pub mod parse;

pub use ast::{CmpOp, Literal, MaskExpr};

/// The exact reassignment prefix generated code must carry.
pub const REQUIRED_PREFIX: &str = "df = df[";

#[derive(Debug, Error)]
pub enum FilterError {
    /// The code does not fit the required shape or grammar. A shape
    /// check, not a safety audit: safety comes from the grammar being
    /// closed, not from this error.
    #[error("generated code failed the shape check: {0}")]
    Shape(String),
    /// The code fit the grammar but failed against this particular
    /// table, e.g. it names a column the table does not have.
    #[error("filter execution failed: {0}")]
    Eval(String),
}

/// Parse a full generated line into a mask expression.
pub fn parse_code(code: &str) -> Result<MaskExpr, FilterError> {
    let code = code.trim();
    if !code.starts_with(REQUIRED_PREFIX) {
        return Err(FilterError::Shape(format!(
            "code must start with `{REQUIRED_PREFIX}`"
        )));
    }
    if !code.ends_with(']') {
        return Err(FilterError::Shape("code must end with `]`".into()));
    }
    let mask = &code[REQUIRED_PREFIX.len()..code.len() - 1];
    parse::parse_mask(mask).map_err(|e| FilterError::Shape(e.to_string()))
}

/// Shape check per the upstream contract: required prefix plus a parse
/// in the predicate grammar. Accepts any line the grammar accepts.
pub fn validate(code: &str) -> bool {
    parse_code(code).is_ok()
}

/// Apply validated code to a table, producing a new table with the
/// rows the mask selects. The input table is untouched; the output is
/// built from copies of the matching rows.
pub fn apply(table: &Table, code: &str) -> Result<Table, FilterError> {
    let mask = parse_code(code)?;
    let mut kept: Vec<Vec<String>> = Vec::new();
    for row in table.rows() {
        if ast::eval(&mask, table, row)? {
            kept.push(row.clone());
        }
    }
    Ok(Table::from_parts(table.columns().to_vec(), kept))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connections() -> Table {
        Table::from_csv_bytes(
            b"Name,Position,Years\n\
              Alice,Software Engineer,3\n\
              Bob,HR Manager,7\n\
              Carol,Talent Acquisition Lead,2\n\
              Dave,Product Manager,5\n\
              Erin,Senior Recruiter,4\n",
        )
        .unwrap()
    }

    #[test]
    fn hr_alternation_matches_case_insensitively() {
        let code = "df = df[df['Position'].str.contains('HR|Talent|Recruiter|People', case=False, na=False)]";
        let out = apply(&connections(), code).unwrap();
        let names: Vec<&str> = out.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Bob", "Carol", "Erin"]);
    }

    #[test]
    fn contains_without_case_kwarg_is_sensitive() {
        let code = "df = df[df['Position'].str.contains('hr')]";
        let out = apply(&connections(), code).unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn and_or_not_combine() {
        let code = "df = df[(df['Position'].str.contains('Manager', case=False, na=False)) & ~(df['Position'].str.contains('HR', case=False, na=False))]";
        let out = apply(&connections(), code).unwrap();
        let names: Vec<&str> = out.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Dave"]);
    }

    #[test]
    fn or_binds_looser_than_and() {
        // a | b & c must parse as a | (b & c).
        let code = "df = df[df['Name'] == 'Alice' | df['Position'].str.contains('Manager', case=False, na=False) & df['Years'] > 6]";
        let out = apply(&connections(), code).unwrap();
        let names: Vec<&str> = out.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn numeric_comparisons() {
        let out = apply(&connections(), "df = df[df['Years'] >= 5]").unwrap();
        let names: Vec<&str> = out.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Bob", "Dave"]);
    }

    #[test]
    fn string_equality_is_exact() {
        let out = apply(&connections(), "df = df[df['Name'] == 'Bob']").unwrap();
        assert_eq!(out.row_count(), 1);
        let out = apply(&connections(), "df = df[df['Name'] == 'bob']").unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn empty_pattern_matches_every_row() {
        let code = "df = df[df['Name'].str.contains('', case=False, na=False)]";
        let out = apply(&connections(), code).unwrap();
        assert_eq!(out.row_count(), connections().row_count());
    }

    #[test]
    fn apply_never_mutates_its_input() {
        let table = connections();
        let retained = table.clone();
        let _ = apply(&table, "df = df[df['Years'] > 100]").unwrap();
        assert_eq!(table, retained);
    }

    #[test]
    fn unknown_column_is_an_eval_error() {
        let err = apply(&connections(), "df = df[df['Missing'] == 'x']").unwrap_err();
        assert!(matches!(err, FilterError::Eval(_)));
    }

    #[test]
    fn missing_prefix_fails_shape_check() {
        assert!(!validate("filtered = df[df['Name'] == 'Bob']"));
        assert!(!validate("import os"));
    }

    #[test]
    fn arbitrary_host_code_fails_shape_check() {
        // Fits the prefix but not the grammar.
        assert!(!validate("df = df[__import__('os').system('true')]"));
        assert!(!validate("df = df[df.apply(lambda r: True, axis=1)]"));
    }

    #[test]
    fn trailing_junk_fails_shape_check() {
        assert!(!validate("df = df[df['Name'] == 'Bob']; print(1)"));
    }

    #[test]
    fn valid_shapes_pass_the_check() {
        assert!(validate("df = df[df['Name'] == 'Bob']"));
        assert!(validate(
            "df = df[df['Position'].str.contains('HR|Talent', case=False, na=False, regex=True)]"
        ));
        assert!(validate("df = df[(df['A'] > 1) & (df['B'] <= -2.5) | ~(df['C'] != 'x')]"));
    }

    #[test]
    fn ordering_against_unparsable_cells_never_matches() {
        let out = apply(&connections(), "df = df[df['Name'] > 3]").unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn numeric_inequality_holds_for_unparsable_cells() {
        let out = apply(&connections(), "df = df[df['Name'] != 3]").unwrap();
        assert_eq!(out.row_count(), connections().row_count());
    }
}
