//! Postgres Protocol Core
//!
//! A sans-socket state machine for the postgres frontend/backend protocol
//! (version 3.0): message framing, session dispatch, result assembly, and
//! parameter binding. Socket io, TLS, and pooling live outside, behind the
//! [`Transport`] trait.
//!
//! # Examples
//!
//! ```no_run
//! use postern::{Encode, Session, StartupConfig};
//!
//! # struct Sock;
//! # impl postern::Transport for Sock {
//! #     fn write(&mut self, _bytes: bytes::Bytes) { /* hand to the event loop */ }
//! #     fn is_closing(&self) -> bool { false }
//! #     fn close(&mut self) { }
//! # }
//! # async fn app(sock: Sock) -> postern::Result<()> {
//! let mut session = Session::new();
//! session.connection_made(sock);
//!
//! // the event loop fills `session.get_buffer()` with inbound bytes and
//! // reports them with `session.buffer_updated(n)`
//!
//! session.startup(StartupConfig::new("postgres"))?.await?;
//!
//! let results = session.execute("SELECT $1::int", &[42.encode()])?.await?;
//! assert_eq!(results[0].tag, "SELECT 1");
//! # Ok(())
//! # }
//! ```

mod common;
mod ext;

// Protocol
pub mod postgres;

// Codec
mod value;
mod encode;
pub mod row;

// Session
mod reader;
mod transport;
mod session;

mod error;


pub use encode::{Encode, Encoded};
pub use row::{FieldDescription, QueryResult};
pub use value::Value;

pub use session::{Operation, Session, StartupConfig, TransactionStatus};
pub use transport::Transport;

pub use postgres::{ProtocolError, ServerError};
pub use error::{ConnectionClosed, Error, ErrorKind, Result, UsageError};
