//! The fetch/decode/execute loop: a dispatch table keyed by opcode over
//! `Instruction`, `Program`, frames, and stacks.
//!
//! The main loop increments the instruction pointer past each fetched
//! instruction *before* executing it, so `CALL` saves a return index that
//! already points at the next instruction, and jump handlers can freely
//! overwrite the pointer without the loop clobbering it afterwards.

use crate::{
    error::Error,
    frame::{FrameKind, FrameStore},
    instruction::{Argument, Opcode},
    io::{InputPort, OutputPort},
    program::Program,
    stack::Stack,
    value::{Value, ValueType},
};

/// Engine lifecycle: `Ready` before the first fetch, `Running` between
/// instructions, `Halted` once execution has stopped for any reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Running,
    Halted,
}

pub struct Engine<'a> {
    program: Program,
    frames: FrameStore,
    data_stack: Stack<Value>,
    call_stack: Stack<usize>,
    ip: usize,
    state: State,
    instructions_executed: u64,
    stdin: &'a mut dyn InputPort,
    stdout: &'a mut dyn OutputPort,
    stderr: &'a mut dyn OutputPort,
}

/// Either a resolved value or a pass-through token (for `Label`/`TypeTag`
/// arguments, which the dispatcher never tries to turn into a `Value`).
enum Operand {
    Value(Value),
    Label(String),
    TypeTag(ValueType),
}

impl Operand {
    fn into_value(self) -> Result<Value, Error> {
        match self {
            Operand::Value(v) => Ok(v),
            Operand::Label(_) => Err(Error::OperandType("expected a value, found a label".to_owned())),
            Operand::TypeTag(_) => Err(Error::OperandType("expected a value, found a type name".to_owned())),
        }
    }

    fn into_label(self) -> Result<String, Error> {
        match self {
            Operand::Label(name) => Ok(name),
            _ => Err(Error::Internal("expected a label operand".to_owned())),
        }
    }
}

impl<'a> Engine<'a> {
    pub fn new(
        program: Program,
        stdin: &'a mut dyn InputPort,
        stdout: &'a mut dyn OutputPort,
        stderr: &'a mut dyn OutputPort,
    ) -> Self {
        Self {
            program,
            frames: FrameStore::new(),
            data_stack: Stack::new(),
            call_stack: Stack::new(),
            ip: 0,
            state: State::Ready,
            instructions_executed: 0,
            stdin,
            stdout,
            stderr,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs to completion. Returns the exit code on a normal end or
    /// `EXIT`, or the fault that stopped execution.
    pub fn run(&mut self) -> Result<u8, Error> {
        loop {
            match self.step()? {
                Some(code) => return Ok(code),
                None => continue,
            }
        }
    }

    /// Executes one instruction. `Ok(Some(code))` means the engine has
    /// halted with that exit code; `Ok(None)` means keep stepping.
    fn step(&mut self) -> Result<Option<u8>, Error> {
        if self.state == State::Ready {
            self.state = State::Running;
        }
        debug_assert_eq!(self.state, State::Running);

        let Some(instruction) = self.program.at(self.ip) else {
            self.state = State::Halted;
            return Ok(Some(0));
        };
        self.ip += 1;
        let instruction = instruction.clone();
        log::trace!("dispatch order={} opcode={:?} ip={}", instruction.order, instruction.opcode, self.ip - 1);

        let Some(opcode) = instruction.opcode else {
            return Err(Error::Semantic(format!("unrecognized opcode {:?}", instruction.raw_opcode)));
        };
        if instruction.args.len() != opcode.arity() {
            return Err(Error::Semantic(format!(
                "{opcode:?} expects {} argument(s), found {}",
                opcode.arity(),
                instruction.args.len()
            )));
        }

        if let Some(exit_code) = self.execute(instruction.order, opcode, &instruction.args)? {
            self.state = State::Halted;
            return Ok(Some(exit_code));
        }
        self.instructions_executed += 1;
        Ok(None)
    }

    /// Resolves one argument to an `Operand`. `allow_uninitialized` is set
    /// for the destination position of assigning opcodes, which may read
    /// as `Uninitialized` without that being an error.
    fn resolve(&self, arg: &Argument, allow_uninitialized: bool) -> Result<Operand, Error> {
        match arg {
            Argument::Variable { frame, name } => {
                let kind = FrameKind::from_prefix(frame)
                    .ok_or_else(|| Error::Semantic(format!("unknown frame prefix {frame}")))?;
                let value = self.frames.get(kind, name)?;
                if matches!(value, Value::Uninitialized) && !allow_uninitialized {
                    return Err(Error::MissingValue(format!("{frame}@{name} has no value")));
                }
                Ok(Operand::Value(value.clone()))
            }
            Argument::Literal { type_tag, text } => Ok(Operand::Value(Value::from_literal(type_tag, text)?)),
            Argument::Label(name) => Ok(Operand::Label(name.clone())),
            Argument::TypeTag(t) => Ok(Operand::TypeTag(*t)),
        }
    }

    fn resolve_value(&self, arg: &Argument) -> Result<Value, Error> {
        self.resolve(arg, false)?.into_value()
    }

    fn var_ref(arg: &Argument) -> Result<(FrameKind, &str), Error> {
        match arg {
            Argument::Variable { frame, name } => {
                let kind = FrameKind::from_prefix(frame)
                    .ok_or_else(|| Error::Semantic(format!("unknown frame prefix {frame}")))?;
                Ok((kind, name.as_str()))
            }
            _ => Err(Error::Semantic("expected a variable argument".to_owned())),
        }
    }

    fn assign(&mut self, dest: &Argument, value: Value) -> Result<(), Error> {
        let (kind, name) = Self::var_ref(dest)?;
        let current = self.frames.get(kind, name)?;
        if let (Some(current_type), Some(new_type)) = (current.value_type(), value.value_type()) {
            if current_type != new_type {
                return Err(Error::OperandType(format!(
                    "cannot assign {} to variable already holding {}",
                    value.type_name(),
                    current.type_name()
                )));
            }
        }
        self.frames.set(kind, name, value)
    }

    /// Faults early with `OperandType` if `dest` already holds a concrete
    /// value of a type other than `expected`, without computing anything.
    /// Lets a handler check its destination before a fallible computation
    /// (e.g. `IDIV`'s zero check), so a wrong-typed destination wins over
    /// an operand fault, matching the source's `math_ops`.
    fn check_assignable(&self, dest: &Argument, expected: ValueType) -> Result<(), Error> {
        let (kind, name) = Self::var_ref(dest)?;
        let current = self.frames.get(kind, name)?;
        match current.value_type() {
            Some(current_type) if current_type != expected => Err(Error::OperandType(format!(
                "cannot assign {expected:?} to variable already holding {}",
                current.type_name()
            ))),
            _ => Ok(()),
        }
    }

    /// Executes one fully arity-checked instruction. Returns `Some(code)`
    /// when the instruction halts the engine (normal end is handled by
    /// `step`, not here; this only covers `EXIT`).
    fn execute(&mut self, order: u64, opcode: Opcode, args: &[Argument]) -> Result<Option<u8>, Error> {
        match opcode {
            Opcode::Label => {}

            Opcode::Createframe => self.frames.create_temporary(),
            Opcode::Pushframe => self.frames.push_temporary_as_local()?,
            Opcode::Popframe => self.frames.pop_local_to_temporary()?,
            Opcode::Defvar => {
                let (kind, name) = Self::var_ref(&args[0])?;
                self.frames.define(kind, name)?;
            }

            Opcode::Move => {
                let value = self.resolve_value(&args[1])?;
                self.assign_initializing(&args[0], value)?;
            }

            Opcode::Call => {
                let target = self.resolve(&args[0], true)?.into_label()?;
                let return_ip = self.ip;
                let index = self
                    .program
                    .lookup_label(&target)
                    .ok_or_else(|| Error::Semantic(format!("unknown label {target}")))?;
                self.call_stack.push(return_ip);
                self.ip = index;
            }
            Opcode::Return => {
                let return_ip = self
                    .call_stack
                    .pop()
                    .ok_or_else(|| Error::MissingValue("call stack is empty".to_owned()))?;
                self.ip = return_ip;
            }

            Opcode::Pushs => {
                let value = self.resolve_value(&args[0])?;
                self.data_stack.push(value);
            }
            Opcode::Pops => {
                let value = self
                    .data_stack
                    .pop()
                    .ok_or_else(|| Error::MissingValue("data stack is empty".to_owned()))?;
                self.assign_initializing(&args[0], value)?;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Idiv => self.arithmetic(opcode, args)?,
            Opcode::Lt | Opcode::Gt => self.order_compare(opcode, args)?,
            Opcode::Eq => {
                let result = self.values_equal(&args[1], &args[2])?;
                self.assign_initializing(&args[0], Value::Bool(result))?;
            }
            Opcode::And | Opcode::Or => self.logical(opcode, args)?,
            Opcode::Not => {
                let operand = self.resolve_value(&args[1])?;
                let b = expect_bool(&operand)?;
                self.assign_initializing(&args[0], Value::Bool(!b))?;
            }

            Opcode::Int2char => {
                let code = expect_int(&self.resolve_value(&args[1])?)?;
                let ch = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| Error::StringError(format!("{code} is not a valid code point")))?;
                self.assign_initializing(&args[0], Value::Str(ch.to_string()))?;
            }
            Opcode::Stri2int => {
                let s = expect_str(&self.resolve_value(&args[1])?)?;
                let index = expect_int(&self.resolve_value(&args[2])?)?;
                let ch = char_at(&s, index)?;
                self.assign_initializing(&args[0], Value::Int(ch as i64))?;
            }
            Opcode::Getchar => {
                let s = expect_str(&self.resolve_value(&args[1])?)?;
                let index = expect_int(&self.resolve_value(&args[2])?)?;
                let ch = char_at(&s, index)?;
                self.assign_initializing(&args[0], Value::Str(ch.to_string()))?;
            }
            Opcode::Setchar => {
                let index = expect_int(&self.resolve_value(&args[1])?)?;
                let repl = expect_str(&self.resolve_value(&args[2])?)?;
                let first = repl
                    .chars()
                    .next()
                    .ok_or_else(|| Error::StringError("SETCHAR replacement string is empty".to_owned()))?;
                let (kind, name) = Self::var_ref(&args[0])?;
                let current = expect_str(self.frames.get(kind, name)?)?;
                let mut chars: Vec<char> = current.chars().collect();
                let idx = usize::try_from(index).map_err(|_| Error::StringError(format!("index {index} out of range")))?;
                let slot = chars
                    .get_mut(idx)
                    .ok_or_else(|| Error::StringError(format!("index {index} out of range")))?;
                *slot = first;
                self.frames.set(kind, name, Value::Str(chars.into_iter().collect()))?;
            }
            Opcode::Concat => {
                let a = expect_str(&self.resolve_value(&args[1])?)?;
                let b = expect_str(&self.resolve_value(&args[2])?)?;
                self.assign_initializing(&args[0], Value::Str(a + &b))?;
            }
            Opcode::Strlen => {
                let s = expect_str(&self.resolve_value(&args[1])?)?;
                self.assign_initializing(&args[0], Value::Int(s.chars().count() as i64))?;
            }
            Opcode::Type => {
                let (kind, name) = Self::var_ref(&args[1])
                    .map(|(kind, name)| (Some(kind), Some(name)))
                    .unwrap_or((None, None));
                let text = if let (Some(kind), Some(name)) = (kind, name) {
                    self.frames.get(kind, name)?.type_name().to_owned()
                } else {
                    self.resolve_value(&args[1])?.type_name().to_owned()
                };
                self.assign_initializing(&args[0], Value::Str(text))?;
            }

            Opcode::Read => {
                let type_tag = match &args[1] {
                    Argument::TypeTag(t) => *t,
                    _ => return Err(Error::Semantic("READ's second argument must be a type name".to_owned())),
                };
                let value = match self.stdin.read_line() {
                    Some(line) => parse_read_value(type_tag, &line),
                    None => Value::Nil,
                };
                self.assign_initializing(&args[0], value)?;
            }
            Opcode::Write => {
                let value = self.resolve_value(&args[0])?;
                self.stdout
                    .write_str(&value.to_string())
                    .map_err(|e| Error::Internal(format!("stdout write failed: {e}")))?;
            }
            Opcode::Dprint => {
                let value = self.resolve_value(&args[0])?;
                self.stderr
                    .write_str(&value.to_string())
                    .map_err(|e| Error::Internal(format!("stderr write failed: {e}")))?;
            }

            Opcode::Jump => {
                let target = self.resolve(&args[0], true)?.into_label()?;
                self.ip = self
                    .program
                    .lookup_label(&target)
                    .ok_or_else(|| Error::Semantic(format!("unknown label {target}")))?;
            }
            Opcode::Jumpifeq | Opcode::Jumpifneq => {
                let target = self.resolve(&args[0], true)?.into_label()?;
                let equal = self.values_equal(&args[1], &args[2])?;
                let take = if opcode == Opcode::Jumpifeq { equal } else { !equal };
                if take {
                    self.ip = self
                        .program
                        .lookup_label(&target)
                        .ok_or_else(|| Error::Semantic(format!("unknown label {target}")))?;
                }
            }

            Opcode::Exit => {
                let code = expect_int(&self.resolve_value(&args[0])?)?;
                if !(0..=49).contains(&code) {
                    return Err(Error::OperandValue(format!("EXIT code {code} out of range [0, 49]")));
                }
                return Ok(Some(code as u8));
            }

            Opcode::Break => self.emit_break(order, opcode)?,
        }
        Ok(None)
    }

    /// `MOVE`/`POPS`/arithmetic-style destinations: any type is accepted
    /// when the destination is still `Uninitialized`; otherwise its
    /// current type must match the new value's type.
    fn assign_initializing(&mut self, dest: &Argument, value: Value) -> Result<(), Error> {
        self.assign(dest, value)
    }

    fn arithmetic(&mut self, opcode: Opcode, args: &[Argument]) -> Result<(), Error> {
        let a = expect_int(&self.resolve_value(&args[1])?)?;
        let b = expect_int(&self.resolve_value(&args[2])?)?;
        // Checked before IDIV's own zero check, matching the source's
        // math_ops: a destination of the wrong sticky type faults even
        // when the operands would also fault (e.g. IDIV by zero).
        self.check_assignable(&args[0], ValueType::Int)?;
        // Overflow policy is unspecified by the source; this implementation
        // wraps, matching two's-complement hardware semantics rather than
        // panicking or saturating.
        let result = match opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Idiv => {
                if b == 0 {
                    return Err(Error::OperandValue("IDIV by zero".to_owned()));
                }
                a.wrapping_div(b)
            }
            _ => unreachable!("arithmetic() only called for ADD/SUB/MUL/IDIV"),
        };
        self.assign_initializing(&args[0], Value::Int(result))
    }

    fn order_compare(&mut self, opcode: Opcode, args: &[Argument]) -> Result<(), Error> {
        let a = self.resolve_value(&args[1])?;
        let b = self.resolve_value(&args[2])?;
        let (ta, tb) = (
            a.value_type().ok_or_else(|| Error::OperandType("operand has no type".to_owned()))?,
            b.value_type().ok_or_else(|| Error::OperandType("operand has no type".to_owned()))?,
        );
        if ta != tb || ta == ValueType::Nil {
            return Err(Error::OperandType(format!("cannot compare {} with {}", a.type_name(), b.type_name())));
        }
        let ordering = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
            _ => return Err(Error::OperandType("unsupported comparison types".to_owned())),
        };
        let result = match opcode {
            Opcode::Lt => ordering.is_lt(),
            Opcode::Gt => ordering.is_gt(),
            _ => unreachable!("order_compare() only called for LT/GT"),
        };
        self.assign_initializing(&args[0], Value::Bool(result))
    }

    fn values_equal(&self, lhs: &Argument, rhs: &Argument) -> Result<bool, Error> {
        let a = self.resolve_value(lhs)?;
        let b = self.resolve_value(rhs)?;
        match (&a, &b) {
            (Value::Nil, Value::Nil) => Ok(true),
            (Value::Nil, _) | (_, Value::Nil) => Ok(false),
            (Value::Int(x), Value::Int(y)) => Ok(x == y),
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            (Value::Str(x), Value::Str(y)) => Ok(x == y),
            _ => Err(Error::OperandType(format!("cannot compare {} with {}", a.type_name(), b.type_name()))),
        }
    }

    fn logical(&mut self, opcode: Opcode, args: &[Argument]) -> Result<(), Error> {
        let a = expect_bool(&self.resolve_value(&args[1])?)?;
        let b = expect_bool(&self.resolve_value(&args[2])?)?;
        let result = match opcode {
            Opcode::And => a && b,
            Opcode::Or => a || b,
            _ => unreachable!("logical() only called for AND/OR"),
        };
        self.assign_initializing(&args[0], Value::Bool(result))
    }

    fn emit_break(&mut self, order: u64, opcode: Opcode) -> Result<(), Error> {
        let mut report = String::new();
        report.push_str(&format!("\nPosition at order [{order}] {opcode:?}\n"));
        report.push_str(&format!("Global Frame: {}\n", self.frames.global()));
        match self.frames.temporary() {
            Some(frame) => report.push_str(&format!("Temporary Frame: {frame}\n")),
            None => report.push_str("Temporary Frame: absent\n"),
        }
        report.push_str("Local frame stack: [");
        for (i, frame) in self.frames.locals().iter().enumerate() {
            if i > 0 {
                report.push_str(", ");
            }
            report.push_str(&frame.to_string());
        }
        // BREAK counts itself as already performed, matching the source's
        // `break_()`, which reports the current position plus one.
        report.push_str(&format!("]\nPerformed instructions: {}\n", self.instructions_executed + 1));
        self.stderr
            .write_str(&report)
            .map_err(|e| Error::Internal(format!("stderr write failed: {e}")))
    }
}

fn expect_int(value: &Value) -> Result<i64, Error> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(Error::OperandType(format!("expected int, found {}", other.type_name()))),
    }
}

fn expect_str(value: &Value) -> Result<String, Error> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(Error::OperandType(format!("expected string, found {}", other.type_name()))),
    }
}

fn expect_bool(value: &Value) -> Result<bool, Error> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(Error::OperandType(format!("expected bool, found {}", other.type_name()))),
    }
}

fn char_at(s: &str, index: i64) -> Result<char, Error> {
    let idx = usize::try_from(index).map_err(|_| Error::StringError(format!("index {index} out of range")))?;
    s.chars().nth(idx).ok_or_else(|| Error::StringError(format!("index {index} out of range")))
}

fn parse_read_value(type_tag: ValueType, line: &str) -> Value {
    match type_tag {
        ValueType::Int => line.trim().parse::<i64>().map(Value::Int).unwrap_or(Value::Nil),
        ValueType::Str => Value::Str(line.to_owned()),
        ValueType::Bool => match line.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Nil,
        },
        ValueType::Nil => Value::Nil,
    }
}
