//! Postgres session protocol machine.
//!
//! A [`Session`] sits between two drivers:
//!
//! - the transport fills the region returned by [`get_buffer`][Session::get_buffer]
//!   and reports progress with [`buffer_updated`][Session::buffer_updated],
//! - the caller issues [`startup`][Session::startup] and
//!   [`execute`][Session::execute] and awaits the returned [`Operation`].
//!
//! At most one operation is in flight per session; `ReadyForQuery` ends
//! every operation and completes the pending [`Operation`].
use bytes::BytesMut;
use std::{
    borrow::Cow,
    collections::BTreeMap,
    mem,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::oneshot;

use crate::{
    common::verbose,
    encode::Encoded,
    error::{ConnectionClosed, Error, Result},
    ext::BodyExt,
    postgres::{Oid, ProtocolError, ServerError, frontend},
    reader::FrameReader,
    row::{FieldDescription, QueryResult},
    transport::Transport,
    value::Value,
};

/// Connection phase.
///
/// ```text
/// Init -> AwaitingAuth -> Ready <-> AwaitingResult
/// ```
///
/// with `Closed` absorbing on protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    AwaitingAuth,
    Ready,
    AwaitingResult,
    Closed,
}

/// Transaction status from the latest `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// `I`, idle: not in a transaction block.
    Idle,
    /// `T`, in a transaction block.
    InTransaction,
    /// `E`, in a failed transaction block
    /// (queries will be rejected until block is ended).
    Failed,
}

impl TransactionStatus {
    fn from_status(status: u8) -> Option<TransactionStatus> {
        match status {
            b'I' => Some(Self::Idle),
            b'T' => Some(Self::InTransaction),
            b'E' => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Config for postgres startup phase.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
pub struct StartupConfig<'a> {
    user: Cow<'a, str>,
    database: Option<Cow<'a, str>>,
    application_name: Option<Cow<'a, str>>,
    password: Option<Cow<'a, str>>,
}

impl<'a> StartupConfig<'a> {
    /// Create new config, the database user name is required.
    pub fn new(user: impl Into<Cow<'a, str>>) -> Self {
        Self {
            user: user.into(),
            database: None,
            application_name: None,
            password: None,
        }
    }

    /// The database user name to connect as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The database to connect to. Defaults to the user name.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// The database to connect to. Defaults to the user name.
    pub fn set_database(&mut self, database: impl Into<Cow<'a, str>>) {
        self.database = Some(database.into());
    }

    /// A name for the application, reported in `pg_stat_activity`.
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    /// A name for the application, reported in `pg_stat_activity`.
    pub fn set_application_name(&mut self, application_name: impl Into<Cow<'a, str>>) {
        self.application_name = Some(application_name.into());
    }

    /// Authentication password, retained for authentication methods that ask for it.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Authentication password, retained for authentication methods that ask for it.
    pub fn set_password(&mut self, password: impl Into<Cow<'a, str>>) {
        self.password = Some(password.into());
    }
}

/// The sender half of the single in-flight operation.
enum Pending {
    Startup(oneshot::Sender<Result<()>>),
    Execute(oneshot::Sender<Result<Vec<QueryResult>>>),
}

pin_project_lite::pin_project! {
    /// Future for a single in-flight operation.
    ///
    /// Completed when the session processes the `ReadyForQuery` that ends
    /// the operation, or immediately on a protocol error. Dropping it
    /// leaves the connection in an indeterminate state; close it.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    #[derive(Debug)]
    pub struct Operation<T> {
        #[pin]
        rx: oneshot::Receiver<Result<T>>,
    }
}

impl<T> Future for Operation<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(output) => Poll::Ready(output),
            Err(_) => Poll::Ready(Err(ConnectionClosed.into())),
        }
    }
}

/// A single postgres session.
///
/// Owns the inbound frame reader and all protocol state; the transport is
/// an external collaborator handed in with
/// [`connection_made`][Session::connection_made].
pub struct Session<T> {
    frames: FrameReader,
    core: Core<T>,
}

struct Core<T> {
    transport: Option<T>,
    phase: Phase,
    pending: Option<Pending>,
    /// First significant error of the current operation, see [`Core::record_error`].
    error: Option<Error>,

    transaction_status: Option<TransactionStatus>,
    backend_process_id: Option<i32>,
    backend_secret_key: Option<i32>,
    status_parameters: BTreeMap<String, String>,
    uses_utf8: bool,
    uses_iso: bool,

    user: Option<String>,
    #[allow(unused, reason = "retained for authentication methods that ask for it")]
    password: Option<String>,

    results: Vec<QueryResult>,
    row_fields: Option<Vec<FieldDescription>>,
    row_oids: Vec<Oid>,
    row_data: Option<Vec<Vec<Value>>>,

    write_buf: BytesMut,
}

impl<T> Session<T> {
    pub fn new() -> Session<T> {
        Session {
            frames: FrameReader::new(),
            core: Core {
                transport: None,
                phase: Phase::Init,
                pending: None,
                error: None,
                transaction_status: None,
                backend_process_id: None,
                backend_secret_key: None,
                status_parameters: BTreeMap::new(),
                uses_utf8: false,
                uses_iso: false,
                user: None,
                password: None,
                results: Vec::new(),
                row_fields: None,
                row_oids: Vec::new(),
                row_data: None,
                write_buf: BytesMut::new(),
            },
        }
    }

    /// Transaction status from the latest `ReadyForQuery`.
    ///
    /// `None` before the first one arrives.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.core.transaction_status
    }

    /// The process ID of this backend, from `BackendKeyData`.
    ///
    /// Saved to be able to issue cancel requests later.
    pub fn backend_process_id(&self) -> Option<i32> {
        self.core.backend_process_id
    }

    /// The secret key of this backend, from `BackendKeyData`.
    pub fn backend_secret_key(&self) -> Option<i32> {
        self.core.backend_secret_key
    }

    /// Run-time parameters reported by the backend.
    pub fn status_parameters(&self) -> &BTreeMap<String, String> {
        &self.core.status_parameters
    }

    /// Run-time parameter value by name.
    pub fn status_parameter(&self, name: &str) -> Option<&str> {
        self.core.status_parameters.get(name).map(String::as_str)
    }

    /// Whether the backend reported `client_encoding` as `UTF8`.
    ///
    /// Data rows are refused until it did.
    pub fn uses_utf8(&self) -> bool {
        self.core.uses_utf8
    }

    /// Whether the backend reported a `DateStyle` starting with `ISO`.
    pub fn uses_iso(&self) -> bool {
        self.core.uses_iso
    }

    /// The user name this session started up as.
    pub fn user(&self) -> Option<&str> {
        self.core.user.as_deref()
    }

    /// Whether a protocol error tore this session down.
    pub fn is_closed(&self) -> bool {
        self.core.phase == Phase::Closed
    }
}

impl<T> Default for Session<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Session<T> {
    /// Record the transport this session writes to.
    pub fn connection_made(&mut self, transport: T) {
        self.core.transport = Some(transport);
    }

    /// The region for the transport to write inbound bytes into.
    pub fn get_buffer(&mut self) -> &mut [u8] {
        self.frames.get_buffer()
    }

    /// `n` bytes were written into the last
    /// [`get_buffer`][Session::get_buffer] region; process every message
    /// that completed.
    pub fn buffer_updated(&mut self, n: usize) {
        if self.core.phase == Phase::Closed {
            return;
        }
        self.frames.fill(n);
        loop {
            match self.frames.next_frame() {
                Ok(Some((msgtype, body))) => self.core.on_message(msgtype, body),
                Ok(None) => break,
                Err(err) => {
                    self.core.fail(err.into());
                    return;
                }
            }
            if self.core.phase == Phase::Closed {
                return;
            }
        }
        self.frames.compact();
    }

    /// Send the startup message.
    ///
    /// The returned operation resolves on the first `ReadyForQuery`.
    pub fn startup(&mut self, config: StartupConfig<'_>) -> Result<Operation<()>> {
        self.core.startup(config)
    }

    /// Execute a query, optionally with parameters.
    ///
    /// Without parameters this is a one-shot simple query; with parameters
    /// a full Parse, Bind, Describe, Execute, Flush, Sync sequence is sent
    /// as one contiguous write. The returned operation resolves with one
    /// [`QueryResult`] per SQL statement.
    pub fn execute(&mut self, sql: &str, params: &[Encoded]) -> Result<Operation<Vec<QueryResult>>> {
        self.core.execute(sql, params)
    }
}

impl<T: Transport> Core<T> {
    fn startup(&mut self, config: StartupConfig<'_>) -> Result<Operation<()>> {
        if self.transport.is_none() {
            return Err(Error::usage("no transport, call connection_made first"));
        }
        if self.phase != Phase::Init {
            return Err(Error::usage("startup already sent"));
        }

        verbose!("startup as {:?}", config.user());

        self.user = Some(config.user().to_owned());
        self.password = config.password().map(str::to_owned);

        frontend::Startup {
            user: config.user(),
            database: config.database(),
            application_name: config.application_name(),
        }
        .write(&mut self.write_buf);
        self.flush();

        let (tx, rx) = oneshot::channel();
        self.pending = Some(Pending::Startup(tx));
        self.phase = Phase::AwaitingAuth;
        Ok(Operation { rx })
    }

    fn execute(&mut self, sql: &str, params: &[Encoded]) -> Result<Operation<Vec<QueryResult>>> {
        if self.transport.is_none() {
            return Err(Error::usage("no transport, call connection_made first"));
        }
        match self.phase {
            Phase::Ready => {}
            Phase::Init | Phase::AwaitingAuth => {
                return Err(Error::usage("startup has not completed"));
            }
            Phase::AwaitingResult => {
                return Err(Error::usage("another operation is in flight"));
            }
            Phase::Closed => return Err(Error::usage("connection closed")),
        }
        if params.len() > i16::MAX as usize {
            return Err(Error::usage("too many parameters, maximum is 32767"));
        }

        verbose!("execute {sql:?} with {} parameters", params.len());

        if params.is_empty() {
            frontend::write(frontend::Query { sql }, &mut self.write_buf);
        } else {
            frontend::write(frontend::Parse { stmt_name: "", sql, params }, &mut self.write_buf);
            frontend::write(frontend::Bind { portal_name: "", stmt_name: "", params }, &mut self.write_buf);
            frontend::write(frontend::Describe { kind: b'P', name: "" }, &mut self.write_buf);
            frontend::write(frontend::Execute { portal_name: "", max_row: 0 }, &mut self.write_buf);
            frontend::write(frontend::Flush, &mut self.write_buf);
            frontend::write(frontend::Sync, &mut self.write_buf);
        }
        self.flush();

        let (tx, rx) = oneshot::channel();
        self.pending = Some(Pending::Execute(tx));
        self.phase = Phase::AwaitingResult;
        Ok(Operation { rx })
    }

    /// Hand the buffered outbound messages to the transport as one write.
    fn flush(&mut self) {
        let bytes = self.write_buf.split().freeze();
        if let Some(transport) = &mut self.transport {
            transport.write(bytes);
        }
    }

    fn on_message(&mut self, msgtype: u8, body: &[u8]) {
        verbose!("recv {:?}", msgtype as char);
        let result = match msgtype {
            b'R' => self.on_authentication(body),
            b'K' => self.on_backend_key_data(body),
            b'S' => self.on_parameter_status(body),
            b'T' => self.on_row_description(body),
            b'D' => self.on_data_row(body),
            b'C' => self.on_command_complete(body),
            b'I' => self.on_empty_query_response(msgtype, body),
            b'Z' => self.on_ready_for_query(msgtype, body),
            // ParseComplete, BindComplete, NoData
            b'1' | b'2' | b'n' => Self::expect_empty(msgtype, body),
            // NoticeResponse
            b'N' => Ok(()),
            b'E' => self.on_error_response(body),
            _ => Err(ProtocolError::unknown(msgtype).into()),
        };
        if let Err(err) = result {
            self.fail(err);
        }
    }

    /// Body begins with a 4-byte specifier; only `AuthenticationOk` passes.
    ///
    /// Other methods negotiate here; replacing this handler (and using the
    /// retained password) is the seam for them.
    fn on_authentication(&mut self, mut body: &[u8]) -> Result<()> {
        match body.read_i32()? {
            0 => {}
            method => return Err(ProtocolError::unknown_auth(method).into()),
        }
        if !body.is_empty() {
            return Err(ProtocolError::trailing(b'R').into());
        }
        Ok(())
    }

    fn on_backend_key_data(&mut self, mut body: &[u8]) -> Result<()> {
        if body.len() != 8 {
            return Err(ProtocolError::invalid_length(b'K', 8, body.len()).into());
        }
        self.backend_process_id = Some(body.read_i32()?);
        self.backend_secret_key = Some(body.read_i32()?);
        Ok(())
    }

    fn on_parameter_status(&mut self, mut body: &[u8]) -> Result<()> {
        let name = body.read_nul_str()?;
        let value = body.read_nul_str()?;
        if !body.is_empty() {
            return Err(ProtocolError::trailing(b'S').into());
        }

        if name == "client_encoding" {
            self.uses_utf8 = value == "UTF8";
        } else if name == "DateStyle" {
            self.uses_iso = value.starts_with("ISO");
        }

        self.status_parameters.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn on_row_description(&mut self, mut body: &[u8]) -> Result<()> {
        if self.error.is_some() {
            // the operation already failed
            return Ok(());
        }

        let nfields = body.read_i16()?;
        if nfields < 0 {
            return Err(ProtocolError::NegativeFieldCount { found: nfields }.into());
        }
        let nfields = nfields as usize;

        let mut fields = Vec::with_capacity(nfields);
        let mut oids = Vec::with_capacity(nfields);

        for _ in 0..nfields {
            let field_name = body.read_nul_str()?.to_owned();
            let table_oid = body.read_u32()?;
            let col_num = body.read_i16()?;
            let type_oid = body.read_u32()?;
            let field_size = body.read_i16()?;
            let type_mod = body.read_i32()?;
            let format = body.read_i16()?;

            oids.push(type_oid);
            fields.push(FieldDescription {
                field_name,
                type_oid,
                field_size,
                type_mod,
                format,
                table_oid,
                col_num,
            });
        }
        if !body.is_empty() {
            return Err(ProtocolError::trailing(b'T').into());
        }

        self.row_oids = oids;
        self.row_fields = Some(fields);
        self.row_data = Some(Vec::new());
        Ok(())
    }

    fn on_data_row(&mut self, mut body: &[u8]) -> Result<()> {
        if self.error.is_some() {
            // the operation already failed
            return Ok(());
        }
        if !self.uses_utf8 {
            return Err(ProtocolError::invalid_state("client_encoding is not UTF8").into());
        }
        if self.row_data.is_none() {
            return Err(ProtocolError::invalid_state("data row without row description").into());
        }

        let nfields = body.read_i16()?;
        if nfields < 0 {
            return Err(ProtocolError::NegativeFieldCount { found: nfields }.into());
        }
        let nfields = nfields as usize;
        if nfields != self.row_oids.len() {
            return Err(ProtocolError::FieldCountMismatch {
                expect: self.row_oids.len(),
                found: nfields,
            }
            .into());
        }

        let mut row = Vec::with_capacity(nfields);
        for i in 0..nfields {
            let size = body.read_i32()?;
            let value = match size {
                -1 => Value::Null,
                _ => {
                    let size = usize::try_from(size)
                        .map_err(|_| ProtocolError::InvalidValueSize { found: size })?;
                    let raw = body.read_slice(size)?;
                    Value::decode(self.row_oids[i], raw)?
                }
            };
            row.push(value);
        }
        if !body.is_empty() {
            return Err(ProtocolError::trailing(b'D').into());
        }

        if let Some(rows) = &mut self.row_data {
            rows.push(row);
        }
        Ok(())
    }

    fn on_command_complete(&mut self, mut body: &[u8]) -> Result<()> {
        let tag = body.read_nul_str()?.to_owned();
        self.push_result(tag);
        Ok(())
    }

    /// Substitutes for `CommandComplete` when the query string was empty.
    fn on_empty_query_response(&mut self, msgtype: u8, body: &[u8]) -> Result<()> {
        Self::expect_empty(msgtype, body)?;
        self.push_result(String::new());
        Ok(())
    }

    /// Seal the in-flight statement into a result.
    fn push_result(&mut self, tag: String) {
        self.row_oids.clear();
        self.results.push(QueryResult {
            fields: self.row_fields.take(),
            data: self.row_data.take(),
            tag,
        });
    }

    fn on_ready_for_query(&mut self, msgtype: u8, body: &[u8]) -> Result<()> {
        if body.len() != 1 {
            return Err(ProtocolError::invalid_length(msgtype, 1, body.len()).into());
        }
        let Some(status) = TransactionStatus::from_status(body[0]) else {
            return Err(ProtocolError::InvalidTransactionStatus { found: body[0] }.into());
        };
        self.transaction_status = Some(status);
        self.clear_statement_state();

        if self.error.is_some() {
            self.results.clear();
            self.reject_pending();
        } else {
            let results = mem::take(&mut self.results);
            // completing is a no-op when the operation is already done
            match self.pending.take() {
                Some(Pending::Startup(tx)) => {
                    let _ = tx.send(Ok(()));
                }
                Some(Pending::Execute(tx)) => {
                    let _ = tx.send(Ok(results));
                }
                None => {}
            }
        }
        self.phase = Phase::Ready;
        Ok(())
    }

    fn on_error_response(&mut self, body: &[u8]) -> Result<()> {
        let err = ServerError::parse(body)?;
        self.record_error(err.into());
        Ok(())
    }

    fn expect_empty(msgtype: u8, body: &[u8]) -> Result<()> {
        match body.is_empty() {
            true => Ok(()),
            false => Err(ProtocolError::invalid_length(msgtype, 0, body.len()).into()),
        }
    }

    /// Record an operation error, keeping the more significant of two.
    ///
    /// A recorded protocol error is never replaced, and a recorded server
    /// error is not replaced by a protocol error it may have caused.
    fn record_error(&mut self, err: Error) {
        match &self.error {
            Some(prev) if prev.is_protocol() => {}
            Some(prev) if !prev.is_protocol() && err.is_protocol() => {}
            _ => self.error = Some(err),
        }
    }

    /// A protocol error: record it, reject the pending operation now, and
    /// tear the connection down. There is no `ReadyForQuery` to wait for
    /// once the byte stream is corrupt.
    fn fail(&mut self, err: Error) {
        #[cfg(feature = "log")]
        log::error!("closing connection: {err}");

        self.record_error(err);
        self.clear_statement_state();
        self.results.clear();
        self.reject_pending();

        if let Some(transport) = &mut self.transport {
            if !transport.is_closing() {
                transport.close();
            }
        }
        self.phase = Phase::Closed;
    }

    /// Reject the pending operation with the recorded error.
    fn reject_pending(&mut self) {
        let Some(err) = self.error.take() else { return };
        match self.pending.take() {
            Some(Pending::Startup(tx)) => {
                let _ = tx.send(Err(err));
            }
            Some(Pending::Execute(tx)) => {
                let _ = tx.send(Err(err));
            }
            None => {}
        }
    }

    fn clear_statement_state(&mut self) {
        self.row_fields = None;
        self.row_oids.clear();
        self.row_data = None;
    }
}
