#![doc = include_str!("../../README.md")]

mod engine;
mod error;
mod frame;
mod instruction;
mod io;
mod program;
mod stack;
mod value;
mod xml_loader;

pub use crate::{
    engine::{Engine, State},
    error::Error,
    frame::{Frame, FrameKind, FrameStore},
    instruction::{Argument, Instruction, Opcode},
    io::{CollectingOutputPort, InputPort, OutputPort, StdinPort, StreamOutputPort, VecInputPort},
    program::Program,
    stack::Stack,
    value::{Value, ValueType},
    xml_loader::load as load_program,
};
