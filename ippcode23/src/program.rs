use ahash::AHashMap;

use crate::{
    error::Error,
    instruction::{Instruction, Opcode},
};

/// An ordered, indexable sequence of instructions plus a label → index map.
///
/// Labels and jumps target *indices into this sorted sequence*, never the
/// raw `order` attribute from the source document: the map is built once,
/// here, so `JUMP` can do a plain indexed lookup at run time.
#[derive(Debug)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: AHashMap<String, usize>,
}

impl Program {
    /// Builds a `Program` from instructions already sorted by ascending,
    /// unique `order` (the loader is responsible for that ordering).
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self, Error> {
        let mut labels = AHashMap::new();
        for (index, instruction) in instructions.iter().enumerate() {
            if instruction.opcode == Some(Opcode::Label) {
                let name = match instruction.args.first() {
                    Some(crate::instruction::Argument::Label(name)) => name.clone(),
                    _ => return Err(Error::Internal("LABEL instruction without a label argument".to_owned())),
                };
                if labels.insert(name.clone(), index).is_some() {
                    return Err(Error::Semantic(format!("duplicate label {name}")));
                }
            }
        }
        Ok(Self { instructions, labels })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn lookup_label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }
}
