//! Clause combinators built on [`Fragment::List`].

use super::{Fragment, FragmentList};

/// Join `clauses` with `literal`.
///
/// Clauses that render nothing are skipped. No clauses gives `fallback`, a
/// single clause is returned as is, and two or more are wrapped in
/// parentheses when `add_parens` is set.
#[must_use]
pub fn join(literal: &str, add_parens: bool, fallback: &str, clauses: Vec<Fragment>) -> Fragment {
    let mut clauses: Vec<Fragment> = clauses.into_iter().filter(|c| !c.is_empty()).collect();
    match clauses.len() {
        0 => Fragment::raw(fallback),
        1 => clauses.remove(0),
        _ => Fragment::List(FragmentList {
            separator: literal.to_string(),
            items: clauses,
            parenthesized: add_parens,
        }),
    }
}

/// `(a AND b)`; `1=1` when there is nothing to filter on.
#[must_use]
pub fn and(clauses: Vec<Fragment>) -> Fragment {
    join(" AND ", true, "1=1", clauses)
}

/// `(a OR b)`; `1=0` when there are no alternatives.
#[must_use]
pub fn or(clauses: Vec<Fragment>) -> Fragment {
    join(" OR ", true, "1=0", clauses)
}

/// Comma-separated list without parentheses.
#[must_use]
pub fn csv(items: Vec<Fragment>) -> Fragment {
    join(", ", false, "", items)
}

/// `prefix a, b, c`, or nothing when `items` is empty, e.g. an optional
/// `ORDER BY` clause.
#[must_use]
pub fn csv_with_prefix(prefix: &str, items: Vec<Fragment>) -> Fragment {
    let body = csv(items);
    if body.is_empty() {
        return Fragment::raw("");
    }
    Fragment::concat(vec![Fragment::raw(format!("{prefix} ")), body])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_falls_back() {
        assert_eq!(and(vec![]), Fragment::raw("1=1"));
        assert_eq!(or(vec![Fragment::raw("  ")]), Fragment::raw("1=0"));
    }

    #[test]
    fn single_clause_is_not_wrapped() {
        let clause = Fragment::raw("a = 1");
        assert_eq!(and(vec![clause.clone()]), clause);
    }

    #[test]
    fn empty_csv_with_prefix_renders_nothing() {
        assert!(csv_with_prefix("ORDER BY", vec![]).is_empty());
    }
}
