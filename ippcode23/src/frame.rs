use ahash::AHashMap;

use crate::{error::Error, value::Value};

/// Which of the three frame kinds a variable reference targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Global,
    Temporary,
    Local,
}

impl FrameKind {
    /// Parses a variable-reference prefix (`GF@`, `LF@`, `TF@`).
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "GF" => Some(Self::Global),
            "TF" => Some(Self::Temporary),
            "LF" => Some(Self::Local),
            _ => None,
        }
    }
}

/// A named mapping from identifier to `Value`. Insertion order is
/// irrelevant (spec), so this is a thin wrapper over a hash map rather
/// than an order-preserving one.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    bindings: AHashMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    fn define(&mut self, name: &str) -> Result<(), Error> {
        if self.bindings.contains_key(name) {
            return Err(Error::Semantic(format!("variable {name} already defined in this frame")));
        }
        self.bindings.insert(name.to_owned(), Value::Uninitialized);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&Value, Error> {
        self.bindings
            .get(name)
            .ok_or_else(|| Error::UndefinedVariable(format!("undefined variable {name}")))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        let slot = self
            .bindings
            .get_mut(name)
            .ok_or_else(|| Error::UndefinedVariable(format!("undefined variable {name}")))?;
        *slot = value;
        Ok(())
    }
}

/// Holds the Global frame (always present), the Temporary frame (with an
/// explicit absent/present state), and the Local frame stack.
///
/// Modeling the temporary frame as `Option<Frame>` rather than a nullable
/// map forces every access site through `ensure_frame_exists`, which is
/// what cleanly maps absence to `Error::FrameMissing`.
#[derive(Debug, Default)]
pub struct FrameStore {
    global: Frame,
    temporary: Option<Frame>,
    locals: Vec<Frame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self {
            global: Frame::new(),
            temporary: None,
            locals: Vec::new(),
        }
    }

    fn frame_mut(&mut self, kind: FrameKind) -> Result<&mut Frame, Error> {
        match kind {
            FrameKind::Global => Ok(&mut self.global),
            FrameKind::Temporary => self
                .temporary
                .as_mut()
                .ok_or_else(|| Error::FrameMissing("temporary frame does not exist".to_owned())),
            FrameKind::Local => self
                .locals
                .last_mut()
                .ok_or_else(|| Error::FrameMissing("local frame stack is empty".to_owned())),
        }
    }

    fn frame(&self, kind: FrameKind) -> Result<&Frame, Error> {
        match kind {
            FrameKind::Global => Ok(&self.global),
            FrameKind::Temporary => self
                .temporary
                .as_ref()
                .ok_or_else(|| Error::FrameMissing("temporary frame does not exist".to_owned())),
            FrameKind::Local => self
                .locals
                .last()
                .ok_or_else(|| Error::FrameMissing("local frame stack is empty".to_owned())),
        }
    }

    pub fn define(&mut self, kind: FrameKind, name: &str) -> Result<(), Error> {
        self.frame_mut(kind)?.define(name)
    }

    pub fn get(&self, kind: FrameKind, name: &str) -> Result<&Value, Error> {
        self.frame(kind)?.get(name)
    }

    pub fn set(&mut self, kind: FrameKind, name: &str, value: Value) -> Result<(), Error> {
        self.frame_mut(kind)?.set(name, value)
    }

    pub fn create_temporary(&mut self) {
        self.temporary = Some(Frame::new());
    }

    pub fn push_temporary_as_local(&mut self) -> Result<(), Error> {
        let frame = self
            .temporary
            .take()
            .ok_or_else(|| Error::FrameMissing("temporary frame does not exist".to_owned()))?;
        self.locals.push(frame);
        Ok(())
    }

    pub fn pop_local_to_temporary(&mut self) -> Result<(), Error> {
        let frame = self
            .locals
            .pop()
            .ok_or_else(|| Error::FrameMissing("local frame stack is empty".to_owned()))?;
        self.temporary = Some(frame);
        Ok(())
    }

    pub fn local_depth(&self) -> usize {
        self.locals.len()
    }

    pub fn global(&self) -> &Frame {
        &self.global
    }

    pub fn temporary(&self) -> Option<&Frame> {
        self.temporary.as_ref()
    }

    pub fn locals(&self) -> &[Frame] {
        &self.locals
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self.bindings.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{")?;
        for (i, (name, value)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value:?}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn second_defvar_for_same_binding_is_a_semantic_error() {
        let mut store = FrameStore::new();
        store.define(FrameKind::Global, "x").unwrap();
        let err = store.define(FrameKind::Global, "x").unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }

    #[test]
    fn createframe_pushframe_popframe_restores_empty_temporary() {
        let mut store = FrameStore::new();
        let starting_depth = store.local_depth();
        store.create_temporary();
        store.push_temporary_as_local().unwrap();
        store.pop_local_to_temporary().unwrap();
        assert_eq!(store.local_depth(), starting_depth);
        assert!(store.temporary().is_some());
    }

    #[test]
    fn pushframe_without_createframe_is_frame_missing() {
        let mut store = FrameStore::new();
        assert!(matches!(store.push_temporary_as_local(), Err(Error::FrameMissing(_))));
    }

    #[test]
    fn reading_undefined_variable_fails() {
        let store = FrameStore::new();
        assert!(matches!(store.get(FrameKind::Global, "nope"), Err(Error::UndefinedVariable(_))));
    }
}
