//! Row shapes returned by raw key-value SQL queries.

use diesel::QueryableByName;
use diesel::sql_types::{BigInt, Bool, Text};

/// Single stored value.
#[derive(Debug, QueryableByName)]
pub(super) struct ValueRow {
    #[diesel(sql_type = Text)]
    pub value: String,
}

/// Single boolean query result.
#[derive(Debug, QueryableByName)]
pub(super) struct FlagRow {
    #[diesel(sql_type = Bool)]
    pub flag: bool,
}

/// Counter value after an increment.
#[derive(Debug, QueryableByName)]
pub(super) struct CounterRow {
    #[diesel(sql_type = BigInt)]
    pub counter: i64,
}
