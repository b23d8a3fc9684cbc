//! Script errors.

use thiserror::Error;

/// Any violation of Script rules. Every variant aborts the current
/// execution and fails the containing verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// A push or length field ran past the end of the program.
    #[error("attempted to read past the end of the script")]
    UnexpectedEnd,

    /// A program exceeded the 10,000 byte limit.
    #[error("script is larger than 10,000 bytes")]
    ScriptTooLarge,

    /// A pushed element exceeded 520 bytes.
    #[error("push of data element larger than 520 bytes")]
    ElementTooLarge,

    /// Main plus alt stack exceeded 1000 elements.
    #[error("stack size exceeded 1000 elements")]
    StackSizeExceeded,

    /// An operation needed more stack elements than were present.
    #[error("attempted {0} on a stack with too few elements")]
    StackUnderflow(&'static str),

    /// More than 201 counted operations.
    #[error("more operations than the 201 allowed")]
    TooManyOperations,

    /// A disabled opcode appeared anywhere in the program.
    #[error("script included disabled opcode {0}")]
    DisabledOpcode(&'static str),

    /// `OP_VERIF` / `OP_VERNOTIF` appeared anywhere in the program.
    #[error("script included OP_VERIF or OP_VERNOTIF")]
    InvalidConditional,

    /// An executed reserved or unassigned opcode.
    #[error("script used reserved opcode {0}")]
    ReservedOpcode(&'static str),

    /// `OP_ELSE` with no open conditional.
    #[error("OP_ELSE without OP_IF")]
    UnexpectedElse,

    /// `OP_ENDIF` with no open conditional.
    #[error("OP_ENDIF without OP_IF")]
    UnexpectedEndIf,

    /// End of script with an open conditional.
    #[error("OP_IF/OP_NOTIF without OP_ENDIF")]
    UnterminatedConditional,

    /// A numeric operand longer than 4 bytes.
    #[error("Script attempted to use an integer larger than 4 bytes")]
    NumberTooLarge,

    /// `OP_VERIFY` popped a false value.
    #[error("OP_VERIFY failed")]
    VerifyFailed,

    /// `OP_RETURN` was executed.
    #[error("script called OP_RETURN")]
    Return,

    /// `OP_EQUALVERIFY` compared unequal elements.
    #[error("OP_EQUALVERIFY: non-equal data")]
    EqualVerifyFailed,

    /// `OP_NUMEQUALVERIFY` compared unequal numbers.
    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerifyFailed,

    /// `OP_CHECKSIGVERIFY` saw an invalid signature.
    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerifyFailed,

    /// `OP_CHECKMULTISIGVERIFY` saw an invalid signature set.
    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerifyFailed,

    /// Multisig public-key count outside `0..=20`.
    #[error("OP_CHECKMULTISIG pubkey count out of range")]
    PubKeyCountOutOfRange,

    /// Multisig signature count outside `0..=n`.
    #[error("OP_CHECKMULTISIG signature count out of range")]
    SigCountOutOfRange,

    /// A signature-checking opcode ran without a transaction context.
    #[error("signature check requires a transaction context")]
    MissingTransactionContext,

    /// The stack was empty when a final value was required.
    #[error("stack empty at end of script execution")]
    EmptyStack,

    /// The final stack value was not true.
    #[error("Script resulted in a non-true stack")]
    NonTrueStack,

    /// A P2SH unlocking script contained non-push operations.
    #[error("attempted to spend a P2SH output with a script that contained script ops")]
    P2shScriptSigNotPushOnly,
}

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
