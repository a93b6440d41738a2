use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

pub type DemefitResult<T> = Result<T, DemefitError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidConfig,
    InvalidParameter,
    NetworkShape,
    InfeasibleNetwork,
    EmptyTable,
    Parse,
    Engine,
    ThreadPool,
    Io,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

#[derive(Debug)]
pub enum DemefitError {
    /// A builder was given an impossible knob value.
    InvalidConfig {
        message: ErrString,
    },
    /// A parameter value or vector violates its bounds.
    InvalidParameter {
        message: ErrString,
    },
    /// Construction-time structural error in the population network:
    /// multiple roots, more than two parents or children, a time mismatch
    /// along an edge, or a cycle among constrained parameters.
    NetworkShape {
        message: ErrString,
    },
    /// The network failed its runtime feasibility check.
    InfeasibleNetwork {
        message: ErrString,
    },
    /// A pattern table carries no informative mass.
    EmptyTable,
    /// A constraint formula could not be parsed.
    Parse {
        message: ErrString,
    },
    Engine {
        message: ErrString,
    },
    ThreadPool {
        message: ErrString,
    },
    Io {
        source: std::io::Error,
    },

    Context {
        context: ErrorContext,
        source: Box<DemefitError>,
    },
}

impl DemefitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Self::NetworkShape { .. } => ErrorCode::NetworkShape,
            Self::InfeasibleNetwork { .. } => ErrorCode::InfeasibleNetwork,
            Self::EmptyTable => ErrorCode::EmptyTable,
            Self::Parse { .. } => ErrorCode::Parse,
            Self::Engine { .. } => ErrorCode::Engine,
            Self::ThreadPool { .. } => ErrorCode::ThreadPool,
            Self::Io { .. } => ErrorCode::Io,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        DemefitError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
        }
    }
}

impl Display for DemefitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => write!(f, "Invalid configuration: {}", message),
            Self::InvalidParameter { message } => write!(f, "Invalid parameter: {}", message),
            Self::NetworkShape { message } => write!(f, "Network shape error: {}", message),
            Self::InfeasibleNetwork { message } => write!(f, "Infeasible network: {}", message),
            Self::EmptyTable => write!(f, "Pattern table has no informative mass"),
            Self::Parse { message } => write!(f, "Parse error: {}", message),
            Self::Engine { message } => write!(f, "Engine error: {}", message),
            Self::ThreadPool { message } => write!(f, "Thread pool error: {}", message),
            Self::Io { source } => write!(f, "I/O error: {}", source),
            Self::Context {
                context, source, ..
            } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for DemefitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DemefitError {
    fn from(source: std::io::Error) -> Self {
        DemefitError::Io { source }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}

impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorContext {}

// Ergonomic Result extensions (context)
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> DemefitResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> DemefitResult<T>;
}

impl<T, E: Into<DemefitError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> DemefitResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> DemefitResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

// Macros: err, bail, ensure
#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! demefit_err {
    (EmptyTable) => {
        $crate::__private::must_use($crate::DemefitError::EmptyTable)
    };
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::DemefitError::$variant {
            message: format!($fmt, $($arg),*).into(),
        })
    };
}

#[macro_export]
macro_rules! demefit_bail {
    ($($tt:tt)+) => { return Err($crate::demefit_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::demefit_bail!($($tt)+); }
    };
}
