use crate::wire::WireError;
use scvm_codec::CodecError;
use scvm_fee::FeeError;
use scvm_state::StateError;
use scvm_types::TypesError;
use thiserror::Error;

/// Wire prefix marking an error the script may not trap.
pub const UNCATCHABLE_PREFIX: &str = "uncatchable: ";
/// Wire prefix marking an error that aborts the whole transaction.
pub const SYSTEM_PREFIX: &str = "syserror: ";
pub const TIMEOUT_MESSAGE: &str = "contract timeout during vm execution";

/// Errors produced while executing contracts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    /// Returned to the script, which may trap it with a protected call.
    #[error("{0}")]
    Catchable(String),

    #[error("{0}")]
    Uncatchable(String),

    #[error("{0}")]
    System(String),

    #[error("contract timeout during vm execution")]
    Timeout,

    /// Embedded database failure during recovery.
    #[error("{0}")]
    DbSystem(String),

    #[error("not enough gas")]
    NotEnoughGas,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("creator not matched")]
    CreatorNotMatch,

    #[error("not allowed recipient")]
    TxNotAllowedRecipient,

    #[error("fee delegation is not allowed")]
    NotAllowedFeeDelegation,

    #[error("exceeded the maximum call depth({0})")]
    ExceededCallDepth(i32),

    #[error("failed to start vm: {0}")]
    VmStart(String),
}

impl VmError {
    pub fn catchable(msg: impl Into<String>) -> Self {
        VmError::Catchable(msg.into())
    }

    pub fn uncatchable(msg: impl Into<String>) -> Self {
        VmError::Uncatchable(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        VmError::System(msg.into())
    }

    /// True for errors that abort the transaction regardless of traps.
    pub fn is_system(&self) -> bool {
        matches!(self, VmError::System(_) | VmError::DbSystem(_) | VmError::VmStart(_))
    }

    pub fn is_uncatchable(&self) -> bool {
        matches!(self, VmError::Uncatchable(_) | VmError::Timeout) || self.is_system()
    }

    /// Text sent to a worker in a reply frame.
    pub fn to_wire(&self) -> String {
        match self {
            VmError::Timeout => format!("{}{}", UNCATCHABLE_PREFIX, TIMEOUT_MESSAGE),
            VmError::Uncatchable(m) => format!("{}{}", UNCATCHABLE_PREFIX, m),
            VmError::System(_) | VmError::DbSystem(_) | VmError::VmStart(_) => {
                format!("{}{}", SYSTEM_PREFIX, self)
            }
            other => other.to_string(),
        }
    }

    /// Parses an error string reported by a worker.
    pub fn from_wire(msg: &str) -> Self {
        if let Some(rest) = msg.strip_prefix(SYSTEM_PREFIX) {
            return VmError::System(rest.to_string());
        }
        if let Some(rest) = msg.strip_prefix(UNCATCHABLE_PREFIX) {
            if rest == TIMEOUT_MESSAGE {
                return VmError::Timeout;
            }
            return VmError::Uncatchable(rest.to_string());
        }
        VmError::Catchable(msg.to_string())
    }

    /// Rewrites the message while keeping the error kind.
    ///
    /// Typed transaction errors become catchable with the rewritten text;
    /// timeouts pass through untouched.
    pub fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            VmError::Timeout => VmError::Timeout,
            VmError::Uncatchable(m) => VmError::Uncatchable(f(m)),
            VmError::System(m) => VmError::System(f(m)),
            VmError::DbSystem(m) => VmError::DbSystem(f(m)),
            other => VmError::Catchable(f(other.to_string())),
        }
    }

    pub fn wrap(self, prefix: &str) -> Self {
        self.map_message(|m| format!("{}{}", prefix, m))
    }
}

impl From<WireError> for VmError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Timeout => VmError::Timeout,
            other => VmError::System(other.to_string()),
        }
    }
}

impl From<StateError> for VmError {
    fn from(e: StateError) -> Self {
        VmError::Catchable(e.to_string())
    }
}

impl From<FeeError> for VmError {
    fn from(e: FeeError) -> Self {
        VmError::Catchable(e.to_string())
    }
}

impl From<CodecError> for VmError {
    fn from(e: CodecError) -> Self {
        VmError::Catchable(e.to_string())
    }
}

impl From<TypesError> for VmError {
    fn from(e: TypesError) -> Self {
        VmError::Catchable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_prefixes() {
        assert_eq!(VmError::uncatchable("boom").to_wire(), "uncatchable: boom");
        assert_eq!(VmError::system("disk").to_wire(), "syserror: disk");
        assert_eq!(VmError::DbSystem("db".into()).to_wire(), "syserror: db");
        assert_eq!(VmError::catchable("plain").to_wire(), "plain");
        assert_eq!(
            VmError::Timeout.to_wire(),
            "uncatchable: contract timeout during vm execution"
        );
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(VmError::from_wire("syserror: x"), VmError::system("x"));
        assert_eq!(VmError::from_wire("uncatchable: y"), VmError::uncatchable("y"));
        assert_eq!(VmError::from_wire(&VmError::Timeout.to_wire()), VmError::Timeout);
        assert_eq!(VmError::from_wire("z"), VmError::catchable("z"));
    }

    #[test]
    fn test_wrap_keeps_kind() {
        let e = VmError::uncatchable("inner").wrap("[Contract.Call] call err: ");
        assert_eq!(e, VmError::uncatchable("[Contract.Call] call err: inner"));
        assert_eq!(VmError::Timeout.wrap("x"), VmError::Timeout);
        assert_eq!(
            VmError::ExceededCallDepth(20).wrap("call err: "),
            VmError::catchable("call err: exceeded the maximum call depth(20)")
        );
        assert!(VmError::DbSystem("d".into()).wrap("p").is_system());
    }

    #[test]
    fn test_wire_error_conversion() {
        assert_eq!(VmError::from(WireError::Timeout), VmError::Timeout);
        assert!(VmError::from(WireError::Closed).is_system());
    }
}
