use strum::EnumString;

use crate::value::ValueType;

/// The closed set of IPPcode23 opcodes.
///
/// Using an enum (rather than matching on raw strings at dispatch time)
/// makes the pre-dispatch "opcode recognized" check and the handler match
/// exhaustive at compile time. `EnumString` gives us the XML-loading-time
/// parse (`"ADD".parse::<Opcode>()`) for free, case-sensitive, matching the
/// source interpreter's dispatch-table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Opcode {
    Move,
    Createframe,
    Pushframe,
    Popframe,
    Defvar,
    Call,
    Return,
    Pushs,
    Pops,
    Add,
    Sub,
    Mul,
    Idiv,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Not,
    Int2char,
    Stri2int,
    Read,
    Write,
    Concat,
    Strlen,
    Getchar,
    Setchar,
    Type,
    Label,
    Jump,
    Jumpifeq,
    Jumpifneq,
    Exit,
    Dprint,
    Break,
}

impl Opcode {
    /// Declared arity for the pre-dispatch arity check.
    pub fn arity(self) -> usize {
        match self {
            Self::Createframe | Self::Pushframe | Self::Popframe | Self::Return | Self::Break => 0,
            Self::Defvar
            | Self::Call
            | Self::Pushs
            | Self::Pops
            | Self::Write
            | Self::Label
            | Self::Jump
            | Self::Exit
            | Self::Dprint => 1,
            Self::Read | Self::Move | Self::Not | Self::Int2char | Self::Strlen | Self::Type => 2,
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Idiv
            | Self::Lt
            | Self::Gt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Stri2int
            | Self::Concat
            | Self::Getchar
            | Self::Setchar
            | Self::Jumpifeq
            | Self::Jumpifneq => 3,
        }
    }
}

/// One argument as carried by a decoded `Instruction`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Variable { frame: String, name: String },
    Literal { type_tag: String, text: String },
    Label(String),
    TypeTag(ValueType),
}

/// One decoded operation: opcode plus its ordered argument list.
///
/// `opcode` is `None` when the XML named an opcode outside the closed
/// set. The loader does not reject that program: "opcode recognized" is a
/// pre-dispatch check the Engine performs only when it actually fetches
/// the instruction (spec semantics: a bad opcode on a never-executed
/// branch must not fail a run that never reaches it).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub order: u64,
    pub opcode: Option<Opcode>,
    pub raw_opcode: String,
    pub args: Vec<Argument>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn opcode_names_parse_upper_case_only() {
        assert_eq!(Opcode::from_str("ADD").unwrap(), Opcode::Add);
        assert!(Opcode::from_str("add").is_err());
        assert!(Opcode::from_str("NOPE").is_err());
    }

    #[test]
    fn arities_match_the_spec_table() {
        assert_eq!(Opcode::Break.arity(), 0);
        assert_eq!(Opcode::Defvar.arity(), 1);
        assert_eq!(Opcode::Move.arity(), 2);
        assert_eq!(Opcode::Type.arity(), 2);
        assert_eq!(Opcode::Strlen.arity(), 2);
        assert_eq!(Opcode::Not.arity(), 2);
        assert_eq!(Opcode::Int2char.arity(), 2);
        assert_eq!(Opcode::Read.arity(), 2);
        assert_eq!(Opcode::Add.arity(), 3);
    }
}
