use thiserror::Error;

use crate::ast::SourceLocation;

/// Severity of a reported [`Diagnostic`]. Warnings never abort assembly;
/// errors are collected and returned together once a pass finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single reported problem, tagged with where it happened and how bad it
/// is. Passes accumulate these in a `Vec<Diagnostic>` rather than aborting
/// on the first one, so a single run can report every undefined symbol
/// instead of just the first.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<SourceLocation>,
    pub error: AssemblyError,
}

impl Diagnostic {
    pub fn error(location: SourceLocation, error: AssemblyError) -> Self {
        Self {
            severity: Severity::Error,
            location: Some(location),
            error,
        }
    }

    pub fn warning(location: SourceLocation, error: AssemblyError) -> Self {
        Self {
            severity: Severity::Warning,
            location: Some(location),
            error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.location {
            Some(loc) => write!(f, "{tag}: {} at {loc}", self.error),
            None => write!(f, "{tag}: {}", self.error),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("syntax error: {0}")]
    ParseError(String),

    #[error("structural error: {reason}")]
    StructuralError { reason: String },

    #[error("symbol '{name}' is already defined")]
    DuplicateDefinition { name: String },

    #[error("symbol '{name}' is not defined")]
    UndefinedSymbol { name: String },

    #[error("no anonymous label found in the '{direction}' direction")]
    CannotFindAnonymousLabel { direction: String },

    #[error("'{name}' is a reserved word and cannot be used as a label or macro parameter")]
    ReservedWord { name: String },

    #[error("macro '{name}' expects {expected} argument(s), got {actual}")]
    MacroArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid default value for parameter '{parameter}' of macro '{macro_name}': {reason}")]
    InvalidParameterDefault {
        macro_name: String,
        parameter: String,
        reason: String,
    },

    #[error("macro expansion limit ({limit}) exceeded while expanding '{name}'")]
    ExpansionLimit { name: String, limit: usize },

    #[error("branch target out of range: offset {offset} does not fit in {bits} bits")]
    BranchOutOfRange { offset: i64, bits: u8 },

    #[error("assertion failed: {message}")]
    AssertionFailed { message: String },

    #[error("directive '.{directive}' misused: {reason}")]
    DirectiveMisuse { directive: String, reason: String },

    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },

    #[error("instruction '{mnemonic}' is not valid on architecture {architecture} with the given operands")]
    ArchitectureConflict {
        mnemonic: String,
        architecture: String,
    },

    #[error("include cycle detected: {path} is already being included")]
    IncludeCycle { path: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    UserError(String),

    #[error("{0}")]
    UserWarning(String),
}

impl From<pest::error::Error<crate::parser::Rule>> for AssemblyError {
    fn from(value: pest::error::Error<crate::parser::Rule>) -> Self {
        AssemblyError::ParseError(value.to_string())
    }
}
