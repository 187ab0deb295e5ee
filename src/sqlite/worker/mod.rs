mod channel;
mod connection;
mod dispatcher;
mod manager;

pub(crate) use connection::SqliteConnection;
