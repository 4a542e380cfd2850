use chrono::{DateTime, Utc};

/// Builder for scanning held reservations whose expiry has passed.
///
/// Results are ordered by `expires_at` ascending, ties broken by
/// reservation ID, and capped at `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredQuery {
    /// Reservations with `expires_at <= now` qualify.
    pub now: DateTime<Utc>,

    /// Maximum number of reservations to return.
    pub limit: usize,
}

impl ExpiredQuery {
    /// Default page size for a single scan.
    pub const DEFAULT_LIMIT: usize = 100;

    /// Creates a query for reservations expired as of `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Caps the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn sql_limit(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_limit() {
        let now = Utc::now();
        let query = ExpiredQuery::at(now).limit(25);
        assert_eq!(query.now, now);
        assert_eq!(query.limit, 25);
        assert_eq!(ExpiredQuery::at(now).limit, ExpiredQuery::DEFAULT_LIMIT);
    }

    #[test]
    fn sql_limit_saturates() {
        let query = ExpiredQuery::at(Utc::now()).limit(usize::MAX);
        assert_eq!(query.sql_limit(), i64::MAX);
    }
}
