use crate::db::connection::DbConnection;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Handles waiting in the pool.
    pub idle: usize,
    /// Handles currently checked out.
    pub in_use: usize,
    /// Handles ever created for this database, seed included.
    pub created: usize,
}

/// Idle connection handles for one open database (no IO, no locks).
///
/// Released handles go to the front so the most recently used one is reused first.
#[derive(Debug)]
pub struct ConnectionPool {
    template: DbConnection,
    idle: VecDeque<DbConnection>,
    created: usize,
}

impl ConnectionPool {
    /// A pool holding only the seed connection.
    pub fn seeded(seed: DbConnection) -> Self {
        let template = seed.clone_unconnected();
        let mut idle = VecDeque::with_capacity(4);
        idle.push_back(seed);
        Self {
            template,
            idle,
            created: 1,
        }
    }

    /// Pops the most recently released handle, or clones a new one from the seed.
    pub fn take_or_clone(&mut self) -> DbConnection {
        if let Some(conn) = self.idle.pop_front() {
            return conn;
        }
        self.created += 1;
        self.template.clone_unconnected()
    }

    pub fn put_back(&mut self, conn: DbConnection) {
        self.idle.push_front(conn);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = DbConnection> + '_ {
        self.idle.drain(..)
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn created(&self) -> usize {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;

    fn seed() -> DbConnection {
        DbConnection::new(
            SqliteConnectOptions::new().filename("unused.sqlite"),
            "studydb",
        )
    }

    #[test]
    fn seed_is_handed_out_first() {
        let seed = seed();
        let seed_id = seed.id();
        let mut pool = ConnectionPool::seeded(seed);

        assert_eq!(pool.take_or_clone().id(), seed_id);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn empty_pool_clones_new_handles() {
        let mut pool = ConnectionPool::seeded(seed());
        let first = pool.take_or_clone();
        let second = pool.take_or_clone();

        assert_ne!(first.id(), second.id());
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn released_handle_is_reused_first() {
        let mut pool = ConnectionPool::seeded(seed());
        let first = pool.take_or_clone();
        let second = pool.take_or_clone();
        let first_id = first.id();

        pool.put_back(second);
        pool.put_back(first);

        assert_eq!(pool.take_or_clone().id(), first_id);
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn drain_empties_the_pool() {
        let mut pool = ConnectionPool::seeded(seed());
        let extra = pool.take_or_clone();
        pool.put_back(extra);

        assert_eq!(pool.drain().count(), 1);
        assert_eq!(pool.idle_len(), 0);
    }
}
