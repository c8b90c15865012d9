//! Parsearch provide an engine for parallel tree search. Applications
//! define a model, a node payload with `process` and `branch` routines,
//! and a solution type; the engine enumerates the implied search tree,
//! either serially or across a master/hub/worker hierarchy of
//! participants that balance work among themselves, share incumbents
//! and detect global termination.
//!
//! Each participant owns a single scheduler loop and all coordination
//! is message passing, refer to [comm] module. Work moves between
//! participants as whole sub-trees, refer to [subtree] module. The
//! quality of a node or a solution is a `f64` where smaller is better.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(InvalidInput, msg: "bad argument");
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path));
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path), "read failed");
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location.
pub enum Error {
    Fatal(String, String),
    FailConvert(String, String),
    IOError(String, String),
    FailCbor(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    InvalidInput(String, String),
    BufferOverrun(String, String),
    UnknownType(String, String),
    InvariantViolation(String, String),
    IndexExhausted(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            BufferOverrun(p, msg) => write!(f, "{} BufferOverrun: {}", p, msg),
            UnknownType(p, msg) => write!(f, "{} UnknownType: {}", p, msg),
            InvariantViolation(p, msg) => {
                write!(f, "{} InvariantViolation: {}", p, msg)
            }
            IndexExhausted(p, msg) => write!(f, "{} IndexExhausted: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

pub mod broker;
pub mod buf;
pub mod comm;
pub mod knap;
pub mod knowledge;
pub mod msg;
pub mod node;
pub mod params;
pub mod pool;
pub mod stats;
pub mod strategy;
pub mod subtree;

pub use crate::buf::Encoded;
pub use crate::knowledge::{Knowledge, KnowledgeType, Registry};
pub use crate::node::{NodeData, NodeStatus, TreeNode};
pub use crate::params::Params;
pub use crate::stats::ExitStatus;
pub use crate::strategy::SearchStrategy;
pub use crate::subtree::SubTree;

/// Worst possible quality, every real quality compares better.
pub const OBJ_MAX: f64 = 1.0e75;

/// Tolerance below which two quality values are treated as equal.
pub const QUALITY_TOL: f64 = 1.0e-9;

/// Compare two quality values as a total order, smaller is better.
#[inline]
pub fn cmp_quality(a: f64, b: f64) -> std::cmp::Ordering {
    a.total_cmp(&b)
}
