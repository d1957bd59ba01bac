//! Live-resource placeholders.
//!
//! A value that wraps a live external resource (a DB connection, a socket)
//! cannot be meaningfully copied across a process boundary. `Reconnector<T>`
//! models the source framework's "reconnector" as a tagged variant: on the
//! sending side it is replaced by a `Placeholder` carrying enough metadata to
//! rebuild the resource later; on the receiving side, host code walks the
//! graph and calls `T::from_placeholder` to rehydrate it. There is no
//! runtime type registry here - registration is the `Reconnectable` impl
//! itself, resolved at compile time, per the "no hidden reflection" design
//! note.

use serde::{Deserialize, Serialize};

/// A type whose live form can be reduced to a transferable placeholder and
/// rebuilt from one given some authorization/context value.
pub trait Reconnectable: Sized {
    /// Byte-transferable stand-in for the live value.
    type Placeholder: Clone + Serialize + for<'de> Deserialize<'de>;
    /// Context needed to rebuild the live value (credentials, a connection
    /// pool handle, ...). Not transferred - supplied locally by the host
    /// calling `reconnect_all`.
    type Auth;

    fn to_placeholder(&self) -> Self::Placeholder;
    fn from_placeholder(placeholder: &Self::Placeholder, auth: &Self::Auth) -> Self;
}

/// A live value or a placeholder standing in for it.
///
/// Only the `Placeholder` variant is ever actually serialized - encoding a
/// `Live` value first reduces it via `Reconnectable::to_placeholder`.
#[derive(Debug, Clone)]
pub enum Reconnector<T: Reconnectable> {
    Live(T),
    Placeholder(T::Placeholder),
}

impl<T: Reconnectable> Reconnector<T> {
    pub fn live(value: T) -> Self {
        Reconnector::Live(value)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Reconnector::Live(_))
    }

    /// Reduce to the placeholder form, consuming the live value if present.
    pub fn into_placeholder(self) -> T::Placeholder {
        match self {
            Reconnector::Live(value) => value.to_placeholder(),
            Reconnector::Placeholder(p) => p,
        }
    }

    /// Rehydrate a placeholder into a live value. No-op if already live.
    pub fn reconnect(self, auth: &T::Auth) -> Self {
        match self {
            Reconnector::Live(value) => Reconnector::Live(value),
            Reconnector::Placeholder(p) => {
                let value = T::from_placeholder(&p, auth);
                Reconnector::Live(value)
            }
        }
    }
}

impl<T: Reconnectable> Serialize for Reconnector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Reconnector::Live(value) => value.to_placeholder().serialize(serializer),
            Reconnector::Placeholder(p) => p.serialize(serializer),
        }
    }
}

impl<'de, T: Reconnectable> Deserialize<'de> for Reconnector<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let placeholder = T::Placeholder::deserialize(deserializer)?;
        Ok(Reconnector::Placeholder(placeholder))
    }
}

/// Implemented by aggregate root types that may contain `Reconnector<T>`
/// fields (possibly nested). `reconnect_all` walks the structure and
/// replaces every placeholder it finds, in place, with per-variant dispatch -
/// a plain tree walk, not reflection.
pub trait Reconnect {
    type Auth;

    fn reconnect_all(&mut self, auth: &Self::Auth);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone)]
    struct DbConnection {
        dsn: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct DbConnectionPlaceholder {
        dsn: String,
    }

    impl Reconnectable for DbConnection {
        type Placeholder = DbConnectionPlaceholder;
        type Auth = String;

        fn to_placeholder(&self) -> Self::Placeholder {
            DbConnectionPlaceholder {
                dsn: self.dsn.clone(),
            }
        }

        fn from_placeholder(placeholder: &Self::Placeholder, auth: &Self::Auth) -> Self {
            DbConnection {
                dsn: format!("{}?auth={}", placeholder.dsn, auth),
            }
        }
    }

    struct Aggregate {
        conn: Reconnector<DbConnection>,
    }

    impl Reconnect for Aggregate {
        type Auth = String;
        fn reconnect_all(&mut self, auth: &Self::Auth) {
            let taken = std::mem::replace(
                &mut self.conn,
                Reconnector::Placeholder(DbConnectionPlaceholder {
                    dsn: String::new(),
                }),
            );
            self.conn = taken.reconnect(auth);
        }
    }

    #[test]
    fn encode_reduces_live_to_placeholder() {
        let live = Reconnector::live(DbConnection {
            dsn: "postgres://host/db".to_string(),
        });
        let bytes = crate::envelope::encode(&live).unwrap();
        let decoded: Reconnector<DbConnection> = crate::envelope::decode(&bytes).unwrap();
        assert!(!decoded.is_live());
        match decoded {
            Reconnector::Placeholder(p) => assert_eq!(p.dsn, "postgres://host/db"),
            Reconnector::Live(_) => panic!("expected placeholder after decode"),
        }
    }

    #[test]
    fn reconnect_all_rehydrates_placeholders() {
        let mut agg = Aggregate {
            conn: Reconnector::Placeholder(DbConnectionPlaceholder {
                dsn: "postgres://host/db".to_string(),
            }),
        };
        agg.reconnect_all(&"token123".to_string());
        match agg.conn {
            Reconnector::Live(conn) => assert_eq!(conn.dsn, "postgres://host/db?auth=token123"),
            Reconnector::Placeholder(_) => panic!("expected live connection after reconnect"),
        }
    }

    #[test]
    fn reconnecting_an_already_live_value_is_a_no_op() {
        let live = Reconnector::Live(DbConnection {
            dsn: "already-live".to_string(),
        });
        let still_live = live.reconnect(&"unused".to_string());
        match still_live {
            Reconnector::Live(conn) => assert_eq!(conn.dsn, "already-live"),
            Reconnector::Placeholder(_) => panic!("should stay live"),
        }
    }
}
