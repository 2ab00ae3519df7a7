//! Shared helpers for tests that need a populated ledger store.

#![allow(missing_docs)]

use rusqlite::Connection;

use crate::{
    db::initialize,
    user::{UserId, create_user},
};

/// An in-memory database with every table created.
pub(crate) fn get_test_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("could not open in-memory database");
    initialize(&connection).expect("could not initialize test database");
    connection
}

/// Insert a user with zeroed balances and return their ID.
pub(crate) fn insert_user(connection: &Connection) -> UserId {
    create_user(connection).expect("could not create test user").id
}
