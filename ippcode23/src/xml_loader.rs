//! Parses the XML serialization of an IPPcode23 program into a `Program`.
//!
//! Well-formedness failures (bad UTF-8, unbalanced tags, ...) are reported
//! by `roxmltree` itself and surfaced as `Error::XmlMalformed`. Everything
//! else — wrong root tag, missing/duplicate `order`, unknown argument
//! type, and so on — is a shape violation this module checks by hand and
//! surfaces as `Error::XmlStructure`.

use std::str::FromStr;

use roxmltree::Node;

use crate::{
    error::Error,
    instruction::{Argument, Instruction, Opcode},
    program::Program,
    value::{Value, ValueType},
};

const EXPECTED_LANGUAGE: &str = "IPPcode23";

pub fn load(source: &str) -> Result<Program, Error> {
    let document = roxmltree::Document::parse(source)?;
    let root = document.root_element();

    if root.tag_name().name() != "program" {
        return Err(Error::XmlStructure(format!(
            "root element must be <program>, found <{}>",
            root.tag_name().name()
        )));
    }
    let language = root
        .attribute("language")
        .ok_or_else(|| Error::XmlMalformed("<program> is missing the required 'language' attribute".to_owned()))?;
    if language != EXPECTED_LANGUAGE {
        return Err(Error::XmlStructure(format!(
            "<program> language must be {EXPECTED_LANGUAGE:?}, found {language:?}"
        )));
    }

    let mut entries = Vec::new();
    let mut seen_orders = std::collections::HashSet::new();
    for child in root.children().filter(Node::is_element) {
        if child.tag_name().name() != "instruction" {
            return Err(Error::XmlStructure(format!(
                "expected <instruction>, found <{}>",
                child.tag_name().name()
            )));
        }
        if child.attributes().count() != 2 {
            return Err(Error::XmlStructure(format!(
                "<instruction> must have exactly 'order' and 'opcode' attributes, found {}",
                child.attributes().count()
            )));
        }
        let order = parse_order(&child)?;
        if !seen_orders.insert(order) {
            return Err(Error::XmlStructure(format!("duplicate instruction order {order}")));
        }
        let opcode_text = child
            .attribute("opcode")
            .ok_or_else(|| Error::XmlStructure("<instruction> is missing the 'opcode' attribute".to_owned()))?;
        if opcode_text.is_empty() {
            return Err(Error::XmlStructure("<instruction> opcode must not be empty".to_owned()));
        }
        // An opcode outside the closed set is a semantic error the Engine
        // raises only if it dispatches this instruction, not a document
        // shape violation the loader rejects eagerly — see `Instruction`.
        let opcode = Opcode::from_str(opcode_text).ok();
        let args = parse_args(&child)?;
        entries.push((
            order,
            Instruction {
                order,
                opcode,
                raw_opcode: opcode_text.to_owned(),
                args,
            },
        ));
    }

    entries.sort_by_key(|(order, _)| *order);
    let instructions = entries.into_iter().map(|(_, instr)| instr).collect();
    Program::from_instructions(instructions)
}

fn parse_order(instruction: &Node) -> Result<u64, Error> {
    let text = instruction
        .attribute("order")
        .ok_or_else(|| Error::XmlStructure("<instruction> is missing the 'order' attribute".to_owned()))?;
    let order: i64 = text
        .parse()
        .map_err(|_| Error::XmlStructure(format!("order {text:?} is not an integer")))?;
    if order <= 0 {
        return Err(Error::XmlStructure(format!("order must be positive, found {order}")));
    }
    Ok(order as u64)
}

/// Argument element tags come in two conventions: positional (`arg1`,
/// `arg2`, `arg3`, already in document order) or the historical
/// descending-count variant. Either way, the trailing digit in the tag
/// name — not document order — determines the final position.
fn parse_args(instruction: &Node) -> Result<Vec<Argument>, Error> {
    let mut by_position: Vec<Option<Argument>> = vec![None, None, None];
    for child in instruction.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        let digit = tag
            .chars()
            .last()
            .filter(|c| c.is_ascii_digit())
            .ok_or_else(|| Error::XmlStructure(format!("unexpected argument element <{tag}>")))?;
        let position = digit.to_digit(10).expect("ascii digit") as usize;
        if !(1..=3).contains(&position) {
            return Err(Error::XmlStructure(format!("argument position out of range in <{tag}>")));
        }
        if by_position[position - 1].is_some() {
            return Err(Error::XmlStructure(format!("duplicate argument at position {position}")));
        }
        by_position[position - 1] = Some(parse_argument(&child)?);
    }

    let mut args = Vec::new();
    for slot in by_position {
        match slot {
            Some(arg) => args.push(arg),
            None => break,
        }
    }
    Ok(args)
}

fn parse_argument(element: &Node) -> Result<Argument, Error> {
    let type_tag = element
        .attribute("type")
        .ok_or_else(|| Error::XmlStructure("argument element is missing the 'type' attribute".to_owned()))?;
    let raw_text = element.text().unwrap_or("").trim();

    match type_tag {
        "var" => {
            let (prefix, name) = raw_text
                .split_once('@')
                .ok_or_else(|| Error::XmlStructure(format!("invalid variable reference {raw_text:?}")))?;
            Ok(Argument::Variable {
                frame: prefix.to_owned(),
                name: name.to_owned(),
            })
        }
        "label" => Ok(Argument::Label(raw_text.to_owned())),
        "type" => {
            let value_type = match raw_text {
                "int" => ValueType::Int,
                "string" => ValueType::Str,
                "bool" => ValueType::Bool,
                "nil" => ValueType::Nil,
                other => return Err(Error::XmlStructure(format!("unknown type name {other:?}"))),
            };
            Ok(Argument::TypeTag(value_type))
        }
        "string" => Ok(Argument::Literal {
            type_tag: "string".to_owned(),
            text: Value::decode_string_escapes(raw_text),
        }),
        "int" | "bool" | "nil" => Ok(Argument::Literal {
            type_tag: type_tag.to_owned(),
            text: raw_text.to_owned(),
        }),
        other => Err(Error::XmlStructure(format!("unknown argument type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn hello_world_xml() -> &'static str {
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <program language="IPPcode23">
            <instruction order="1" opcode="DEFVAR">
                <arg1 type="var">GF@m</arg1>
            </instruction>
            <instruction order="2" opcode="MOVE">
                <arg1 type="var">GF@m</arg1>
                <arg2 type="string">hi</arg2>
            </instruction>
            <instruction order="3" opcode="WRITE">
                <arg1 type="var">GF@m</arg1>
            </instruction>
        </program>"#
    }

    #[test]
    fn loads_a_well_formed_program_in_ascending_order() {
        let program = load(hello_world_xml()).unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program.at(0).unwrap().opcode, Some(Opcode::Defvar));
        assert_eq!(program.at(2).unwrap().opcode, Some(Opcode::Write));
    }

    #[test]
    fn reorders_out_of_document_order_instructions_by_order_attribute() {
        let xml = r#"<program language="IPPcode23">
            <instruction order="2" opcode="BREAK"></instruction>
            <instruction order="1" opcode="BREAK"></instruction>
        </program>"#;
        let program = load(xml).unwrap();
        assert_eq!(program.instructions()[0].order, 1);
        assert_eq!(program.instructions()[1].order, 2);
    }

    #[test]
    fn reversed_argument_tags_are_reordered_to_position() {
        let xml = r#"<program language="IPPcode23">
            <instruction order="1" opcode="MOVE">
                <arg2 type="string">x</arg2>
                <arg1 type="var">GF@m</arg1>
            </instruction>
        </program>"#;
        let program = load(xml).unwrap();
        let args = &program.at(0).unwrap().args;
        assert_eq!(args[0], Argument::Variable { frame: "GF".to_owned(), name: "m".to_owned() });
        assert_eq!(args[1], Argument::Literal { type_tag: "string".to_owned(), text: "x".to_owned() });
    }

    #[test]
    fn wrong_language_is_xml_structure_error() {
        let xml = r#"<program language="Python"></program>"#;
        assert!(matches!(load(xml), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn missing_language_is_xml_malformed_error() {
        let xml = r#"<program></program>"#;
        assert!(matches!(load(xml), Err(Error::XmlMalformed(_))));
    }

    #[test]
    fn unknown_opcode_loads_fine_but_leaves_opcode_unresolved() {
        // Recognizing the opcode is a dispatch-time concern (see
        // `engine::tests::unrecognized_opcode_is_a_semantic_error`), not a
        // document-shape one: the loader must not reject this program.
        let xml = r#"<program language="IPPcode23">
            <instruction order="1" opcode="NOPE"></instruction>
        </program>"#;
        let program = load(xml).unwrap();
        assert_eq!(program.at(0).unwrap().opcode, None);
    }

    #[test]
    fn empty_opcode_is_xml_structure_error() {
        let xml = r#"<program language="IPPcode23">
            <instruction order="1" opcode=""></instruction>
        </program>"#;
        assert!(matches!(load(xml), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn extra_instruction_attribute_is_xml_structure_error() {
        let xml = r#"<program language="IPPcode23">
            <instruction order="1" opcode="BREAK" extra="x"></instruction>
        </program>"#;
        assert!(matches!(load(xml), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn duplicate_order_is_xml_structure_error() {
        let xml = r#"<program language="IPPcode23">
            <instruction order="1" opcode="BREAK"></instruction>
            <instruction order="1" opcode="BREAK"></instruction>
        </program>"#;
        assert!(matches!(load(xml), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn not_well_formed_xml_is_xml_malformed_error() {
        let xml = r#"<program language="IPPcode23">"#;
        assert!(matches!(load(xml), Err(Error::XmlMalformed(_))));
    }
}
