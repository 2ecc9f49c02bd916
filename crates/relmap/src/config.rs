//! Connection configuration. Values are passed explicitly to
//! constructors; there is no process-wide mutable state.

/// Default query timeout in seconds; zero disables the timeout.
pub const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 120;

/// Default number of entities per batch insert.
pub const DEFAULT_BATCH_SIZE: usize = 100;

///
/// User
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    pub username: String,
}

impl User {
    #[must_use]
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
        }
    }
}

///
/// ConnectionConfig
///

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub user: User,
    pub default_query_timeout_seconds: u64,
    pub default_batch_size: usize,
    pub client_type: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user: User::new("local"),
            default_query_timeout_seconds: DEFAULT_QUERY_TIMEOUT_SECONDS,
            default_batch_size: DEFAULT_BATCH_SIZE,
            client_type: "relmap".to_string(),
        }
    }
}
