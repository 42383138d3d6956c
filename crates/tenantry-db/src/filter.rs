//! WHERE-clause builder for soft-deletable tables.
//!
//! Every read of `user` or `resource` rows goes through [`RowFilter`].
//! [`RowFilter::live`] always starts with `deleted = false`, so a query
//! cannot forget it by omission; the only way to see deleted rows is to
//! ask for [`RowFilter::including_deleted`] explicitly.

#[derive(Debug, Clone)]
pub struct RowFilter {
    clauses: Vec<&'static str>,
}

impl RowFilter {
    /// Rows that have not been soft-deleted.
    pub fn live() -> Self {
        Self {
            clauses: vec!["deleted = false"],
        }
    }

    /// All rows, deleted or not. Only for uniqueness checks.
    pub fn including_deleted() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Add a condition. Values must be passed as bound parameters.
    pub fn and(mut self, clause: &'static str) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn and_if(self, cond: bool, clause: &'static str) -> Self {
        if cond { self.and(clause) } else { self }
    }

    /// The clause with a leading space, or an empty string.
    pub fn to_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}
