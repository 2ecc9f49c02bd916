use crate::{
    connection::{ConnectionError, EntityConnection},
    error::Error,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

///
/// ConnectionFactory
///

pub trait ConnectionFactory {
    type Connection: EntityConnection;

    fn create(&self) -> Result<Self::Connection, Error>;
}

///
/// ConnectionProvider
///
/// Lock-guarded holder of a single connection. Before lending the
/// connection out it is liveness-probed; a failed probe discards it and a
/// fresh connection is created through the factory.
///

pub struct ConnectionProvider<F: ConnectionFactory> {
    factory: F,
    connection: Mutex<Option<F::Connection>>,
}

impl<F: ConnectionFactory> ConnectionProvider<F> {
    #[must_use]
    pub const fn new(factory: F) -> Self {
        Self {
            factory,
            connection: Mutex::new(None),
        }
    }

    /// Run `op` against a live connection, connecting or reconnecting
    /// first when needed.
    pub fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut F::Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let live = guard.as_mut().is_some_and(EntityConnection::probe);
        if !live {
            if guard.is_some() {
                warn!("connection failed liveness probe, reconnecting");
            }
            *guard = Some(self.factory.create()?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(ConnectionError::Closed.into());
        };

        op(connection)
    }

    /// Drop the held connection; the next use reconnects.
    pub fn disconnect(&self) {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut connection) = guard.take() {
            connection.close();
        }
    }
}

type BoxedFactory = Arc<dyn Fn() -> Result<Box<dyn EntityConnection>, Error> + Send + Sync>;

///
/// ConnectionFactories
///
/// Registration table from connection-type string to factory. Nothing is
/// registered implicitly.
///

#[derive(Default)]
pub struct ConnectionFactories {
    factories: HashMap<String, BoxedFactory>,
}

impl ConnectionFactories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_type: &str, factory: BoxedFactory) {
        self.factories.insert(connection_type.to_string(), factory);
    }

    pub fn create(&self, connection_type: &str) -> Result<Box<dyn EntityConnection>, Error> {
        let factory = self.factories.get(connection_type).ok_or_else(|| {
            ConnectionError::UnknownConnectionType {
                connection_type: connection_type.to_string(),
            }
        })?;

        factory()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::connection::LocalEntityConnection;
    use crate::query::Count;
    use crate::test_fixtures::test_domain;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        created: AtomicUsize,
    }

    impl ConnectionFactory for CountingFactory {
        type Connection = LocalEntityConnection;

        fn create(&self) -> Result<Self::Connection, Error> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(LocalEntityConnection::new(
                test_domain(),
                ConnectionConfig::default(),
            ))
        }
    }

    #[test]
    fn provider_reuses_a_live_connection() {
        let provider = ConnectionProvider::new(CountingFactory {
            created: AtomicUsize::new(0),
        });

        provider
            .with_connection(|conn| conn.count(Count::all(&"department".into())))
            .unwrap();
        provider
            .with_connection(|conn| conn.count(Count::all(&"department".into())))
            .unwrap();

        assert_eq!(provider.factory.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn provider_reconnects_after_a_failed_probe() {
        let provider = ConnectionProvider::new(CountingFactory {
            created: AtomicUsize::new(0),
        });

        provider
            .with_connection(|conn| {
                conn.close();
                Ok(())
            })
            .unwrap();
        provider
            .with_connection(|conn| conn.count(Count::all(&"department".into())))
            .unwrap();

        assert_eq!(provider.factory.created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn provider_reconnects_after_disconnect() {
        let provider = ConnectionProvider::new(CountingFactory {
            created: AtomicUsize::new(0),
        });

        provider.with_connection(|_| Ok(())).unwrap();
        provider.disconnect();
        provider.with_connection(|_| Ok(())).unwrap();

        assert_eq!(provider.factory.created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factories_reject_unknown_connection_types() {
        let mut factories = ConnectionFactories::new();
        factories.register(
            "local",
            Arc::new(|| {
                Ok(Box::new(LocalEntityConnection::new(
                    test_domain(),
                    ConnectionConfig::default(),
                )) as Box<dyn EntityConnection>)
            }),
        );

        assert!(factories.create("local").is_ok());
        assert!(matches!(
            factories.create("remote"),
            Err(Error::Connection(ConnectionError::UnknownConnectionType { .. }))
        ));
    }
}
