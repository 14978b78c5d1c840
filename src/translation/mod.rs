use std::borrow::Cow;
use std::collections::BTreeMap;

mod scanner;

use scanner::{Placeholder, scan_placeholders};

/// Placeholder style a backend expects at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

/// Number the positional placeholders in `sql` for the target backend.
///
/// Bare `?` placeholders are numbered left to right; explicit `?N` keep their
/// number and only change prefix. Placeholders inside literals, comments and
/// dollar-quoted blocks are left alone. Returns a borrowed `Cow` when no
/// changes are needed.
///
/// ```rust
/// use reactive_query_loader::translation::{PlaceholderStyle, number_placeholders};
///
/// let sql = number_placeholders("select * from t where a = ? and b = '?'", PlaceholderStyle::Postgres);
/// assert_eq!(sql, "select * from t where a = $1 and b = '?'");
/// ```
#[must_use]
pub fn number_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    let prefix = match target {
        PlaceholderStyle::Postgres => "$",
        PlaceholderStyle::Sqlite => "?",
    };
    let mut out = String::new();
    let mut last = 0;
    let mut next = 1usize;
    let mut changed = false;

    for placeholder in scan_placeholders(sql) {
        let Placeholder::Positional { start, end, number } = placeholder else {
            continue;
        };
        let numbered = match number {
            Some(digits) => {
                if target == PlaceholderStyle::Sqlite {
                    continue;
                }
                format!("{prefix}{digits}")
            }
            None => {
                let n = next;
                next += 1;
                format!("{prefix}{n}")
            }
        };
        out.push_str(&sql[last..start]);
        out.push_str(&numbered);
        last = end;
        changed = true;
    }

    if changed {
        out.push_str(&sql[last..]);
        Cow::Owned(out)
    } else {
        Cow::Borrowed(sql)
    }
}

/// SQL with `:name` placeholders rewritten to `?`, plus where each one went.
///
/// Slot locations are 0-based offsets among all placeholders of the
/// statement, in textual order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSql {
    pub sql: String,
    pub ordinal_locations: Vec<usize>,
    pub named_locations: BTreeMap<String, Vec<usize>>,
}

impl ParsedSql {
    /// Total number of placeholders in the rewritten SQL.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.ordinal_locations.len() + self.named_locations.values().map(Vec::len).sum::<usize>()
    }
}

/// Rewrite named parameters to positional ones, recording their locations.
///
/// ```rust
/// use reactive_query_loader::translation::parse_named_parameters;
///
/// let parsed = parse_named_parameters("select * from t where a = :id or b = ? or c = :id");
/// assert_eq!(parsed.sql, "select * from t where a = ? or b = ? or c = ?");
/// assert_eq!(parsed.ordinal_locations, vec![1]);
/// assert_eq!(parsed.named_locations["id"], vec![0, 2]);
/// ```
#[must_use]
pub fn parse_named_parameters(sql: &str) -> ParsedSql {
    let mut parsed = ParsedSql::default();
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;

    for (slot, placeholder) in scan_placeholders(sql).into_iter().enumerate() {
        match placeholder {
            Placeholder::Positional { start, end, .. } => {
                out.push_str(&sql[last..start]);
                out.push('?');
                last = end;
                parsed.ordinal_locations.push(slot);
            }
            Placeholder::Named { start, end, name } => {
                out.push_str(&sql[last..start]);
                out.push('?');
                last = end;
                parsed
                    .named_locations
                    .entry(name.to_string())
                    .or_default()
                    .push(slot);
            }
        }
    }
    out.push_str(&sql[last..]);
    parsed.sql = out;
    parsed
}
