//! The operation table and the call adapter over it.
//!
//! The managed runtime invokes native operations by table index
//! with a small array of tagged arguments, or message-shaped with
//! the operation name in front. [`call`] checks the index and
//! arity, pins buffer arguments, runs the operation, and projects
//! any failure into a [`Failure`] the runtime can raise from.
//! Nothing in this module panics on caller mistakes; a bad call
//! comes back as a `Failure` reply.

use tracing::{debug, instrument, warn};

use crate::{
    bridge::Bridge,
    buffer::PinnedBuf,
    error::{Error, ErrorKind, Failure, InvalidArg},
    host::{BufToken, BufferHost},
    registry::Handle,
};

/// A tagged argument or return value crossing the dispatch
/// boundary.
///
/// Byte arguments arrive as `Buf` tokens and stay pinned for the
/// duration of the call; byte results go back as owned `Bytes`
/// the runtime copies into managed memory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// No value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer, including wire-encoded handles.
    Int(i64),
    /// A token for a buffer owned by the managed runtime.
    Buf(BufToken),
    /// Bytes owned by this side of the boundary.
    Bytes(Vec<u8>),
    /// A string, used for the leading operation name of a
    /// message-shaped call.
    Str(String),
}

impl Value {
    const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "a boolean",
            Self::Int(_) => "an integer",
            Self::Buf(_) => "a buffer",
            Self::Bytes(_) => "owned bytes",
            Self::Str(_) => "a string",
        }
    }
}

/// The outcome of a dispatched call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    /// The operation completed and produced `Value`.
    Value(Value),
    /// The operation failed; the runtime should raise from the
    /// failure's kind and message.
    Failure(Failure),
}

type Handler = fn(&Bridge, &dyn BufferHost, &[Value]) -> Result<Value, Error>;

/// One entry in the operation table.
pub struct OpDef {
    /// The operation's stable name.
    pub name: &'static str,
    /// How many arguments the operation takes.
    pub arity: usize,
    handler: Handler,
}

/// The operation table.
///
/// Indexes and names are both wire contract: entries are only ever
/// appended, and each name keeps the spelling the protocol shipped
/// with, `getRandomValues` included.
#[rustfmt::skip]
pub static OPS: &[OpDef] = &[
    OpDef { name: "digest_create", arity: 1, handler: digest_create },
    OpDef { name: "digest_write", arity: 2, handler: digest_write },
    OpDef { name: "digest_result", arity: 1, handler: digest_result },
    OpDef { name: "digest_destroy", arity: 1, handler: digest_destroy },
    OpDef { name: "hmac_create", arity: 2, handler: hmac_create },
    OpDef { name: "hmac_write", arity: 2, handler: hmac_write },
    OpDef { name: "hmac_result", arity: 1, handler: hmac_result },
    OpDef { name: "hmac_destroy", arity: 1, handler: hmac_destroy },
    OpDef { name: "sign_create", arity: 2, handler: sign_create },
    OpDef { name: "sign_write", arity: 2, handler: sign_write },
    OpDef { name: "sign_result", arity: 1, handler: sign_result },
    OpDef { name: "sign_destroy", arity: 1, handler: sign_destroy },
    OpDef { name: "verify_create", arity: 2, handler: verify_create },
    OpDef { name: "verify_write", arity: 2, handler: verify_write },
    OpDef { name: "verify_result", arity: 2, handler: verify_result },
    OpDef { name: "verify_destroy", arity: 1, handler: verify_destroy },
    OpDef { name: "import_public_key", arity: 2, handler: import_public_key },
    OpDef { name: "import_private_key", arity: 2, handler: import_private_key },
    OpDef { name: "key_destroy", arity: 1, handler: key_destroy },
    OpDef { name: "getRandomValues", arity: 1, handler: get_random_values },
    OpDef { name: "compare", arity: 2, handler: compare },
];

/// Finds the table index for an operation name.
pub fn resolve(name: &str) -> Option<usize> {
    OPS.iter().position(|op| op.name == name)
}

/// Runs the operation at `index` with `args`.
#[instrument(skip_all, fields(op = OPS.get(index).map_or("?", |op| op.name)))]
pub fn call(bridge: &Bridge, host: &dyn BufferHost, index: usize, args: &[Value]) -> Reply {
    let Some(op) = OPS.get(index) else {
        warn!(index, "call to unknown operation index");
        return Reply::Failure(Failure::new(
            ErrorKind::Argument,
            format!("unknown operation index {index}"),
        ));
    };
    if args.len() != op.arity {
        return Reply::Failure(Failure::new(
            ErrorKind::Argument,
            format!(
                "{} takes {} arguments, got {}",
                op.name,
                op.arity,
                args.len()
            ),
        ));
    }
    match (op.handler)(bridge, host, args) {
        Ok(value) => Reply::Value(value),
        Err(err) => {
            debug!(%err, "operation failed");
            Reply::Failure(Failure::project(&err))
        }
    }
}

/// [`call`], resolving the operation by name first.
pub fn call_by_name(bridge: &Bridge, host: &dyn BufferHost, name: &str, args: &[Value]) -> Reply {
    match resolve(name) {
        Some(index) => call(bridge, host, index, args),
        None => Reply::Failure(Failure::new(
            ErrorKind::Argument,
            format!("unknown operation `{name}`"),
        )),
    }
}

/// Runs a message-shaped call: the leading element names the
/// operation, the rest are its arguments.
pub fn call_message(bridge: &Bridge, host: &dyn BufferHost, message: &[Value]) -> Reply {
    match message.split_first() {
        Some((Value::Str(name), args)) => call_by_name(bridge, host, name, args),
        Some((other, _)) => Reply::Failure(Failure::new(
            ErrorKind::Argument,
            format!(
                "message must lead with an operation name, got {}",
                other.kind_name()
            ),
        )),
        None => Reply::Failure(Failure::new(ErrorKind::Argument, "empty message")),
    }
}

fn arg_error(name: &'static str, want: &'static str, got: Option<&Value>) -> Error {
    let got = got.map_or("nothing", Value::kind_name);
    InvalidArg::new(name, format!("expected {want}, got {got}")).into()
}

fn int_arg(args: &[Value], index: usize, name: &'static str) -> Result<i64, Error> {
    match args.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        other => Err(arg_error(name, "an integer", other)),
    }
}

fn handle_arg(args: &[Value], index: usize, name: &'static str) -> Result<Handle, Error> {
    Ok(Handle::from_wire(int_arg(args, index, name)?))
}

fn buf_arg<'h>(
    host: &'h dyn BufferHost,
    args: &[Value],
    index: usize,
    name: &'static str,
) -> Result<PinnedBuf<'h, dyn BufferHost + 'h>, Error> {
    match args.get(index) {
        Some(Value::Buf(token)) => Ok(PinnedBuf::acquire(host, *token)?),
        other => Err(arg_error(name, "a buffer", other)),
    }
}

fn handle_value(handle: Handle) -> Value {
    Value::Int(handle.to_wire())
}

fn digest_create(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let alg = int_arg(args, 0, "algorithm")?;
    Ok(handle_value(bridge.digest_create(alg)?))
}

fn digest_write(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "digest")?;
    let data = buf_arg(host, args, 1, "data")?;
    bridge.digest_update(handle, data.bytes())?;
    Ok(Value::Null)
}

fn digest_result(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "digest")?;
    Ok(Value::Bytes(bridge.digest_finalize(handle)?))
}

fn digest_destroy(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    bridge.digest_destroy(handle_arg(args, 0, "digest")?)?;
    Ok(Value::Null)
}

fn hmac_create(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let alg = int_arg(args, 0, "algorithm")?;
    let key = buf_arg(host, args, 1, "key")?;
    Ok(handle_value(bridge.hmac_create(alg, key.bytes())?))
}

fn hmac_write(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "hmac")?;
    let data = buf_arg(host, args, 1, "data")?;
    bridge.hmac_update(handle, data.bytes())?;
    Ok(Value::Null)
}

fn hmac_result(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "hmac")?;
    Ok(Value::Bytes(bridge.hmac_finalize(handle)?))
}

fn hmac_destroy(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    bridge.hmac_destroy(handle_arg(args, 0, "hmac")?)?;
    Ok(Value::Null)
}

fn sign_create(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let alg = int_arg(args, 0, "algorithm")?;
    let key = handle_arg(args, 1, "key")?;
    Ok(handle_value(bridge.sign_create(alg, key)?))
}

fn sign_write(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "signer")?;
    let data = buf_arg(host, args, 1, "data")?;
    bridge.sign_update(handle, data.bytes())?;
    Ok(Value::Null)
}

fn sign_result(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "signer")?;
    Ok(Value::Bytes(bridge.sign_finalize(handle)?))
}

fn sign_destroy(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    bridge.sign_destroy(handle_arg(args, 0, "signer")?)?;
    Ok(Value::Null)
}

fn verify_create(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let alg = int_arg(args, 0, "algorithm")?;
    let key = handle_arg(args, 1, "key")?;
    Ok(handle_value(bridge.verify_create(alg, key)?))
}

fn verify_write(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "verifier")?;
    let data = buf_arg(host, args, 1, "data")?;
    bridge.verify_update(handle, data.bytes())?;
    Ok(Value::Null)
}

fn verify_result(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let handle = handle_arg(args, 0, "verifier")?;
    let signature = buf_arg(host, args, 1, "signature")?;
    Ok(Value::Bool(
        bridge.verify_finalize(handle, signature.bytes())?,
    ))
}

fn verify_destroy(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    bridge.verify_destroy(handle_arg(args, 0, "verifier")?)?;
    Ok(Value::Null)
}

fn import_public_key(
    bridge: &Bridge,
    host: &dyn BufferHost,
    args: &[Value],
) -> Result<Value, Error> {
    let der = buf_arg(host, args, 0, "der")?;
    let family = int_arg(args, 1, "family")?;
    Ok(handle_value(bridge.import_public_key(der.bytes(), family)?))
}

fn import_private_key(
    bridge: &Bridge,
    host: &dyn BufferHost,
    args: &[Value],
) -> Result<Value, Error> {
    let der = buf_arg(host, args, 0, "der")?;
    let family = int_arg(args, 1, "family")?;
    Ok(handle_value(bridge.import_private_key(der.bytes(), family)?))
}

fn key_destroy(bridge: &Bridge, _host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    bridge.key_destroy(handle_arg(args, 0, "key")?)?;
    Ok(Value::Null)
}

fn get_random_values(
    bridge: &Bridge,
    host: &dyn BufferHost,
    args: &[Value],
) -> Result<Value, Error> {
    let mut out = buf_arg(host, args, 0, "destination")?;
    bridge.fill_random(out.bytes_mut())?;
    Ok(Value::Null)
}

fn compare(bridge: &Bridge, host: &dyn BufferHost, args: &[Value]) -> Result<Value, Error> {
    let a = buf_arg(host, args, 0, "a")?;
    let b = buf_arg(host, args, 1, "b")?;
    Ok(Value::Bool(bridge.constant_time_eq(a.bytes(), b.bytes())))
}
