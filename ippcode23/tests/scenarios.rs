use ippcode23::{CollectingOutputPort, Engine, VecInputPort, load_program};
use pretty_assertions::assert_eq;

fn run(xml: &str) -> (String, Result<u8, ippcode23::Error>) {
    let program = load_program(xml).expect("program should load");
    let mut stdin = VecInputPort::new(Vec::<String>::new());
    let mut stdout = CollectingOutputPort::new();
    let mut stderr = CollectingOutputPort::new();
    let mut engine = Engine::new(program, &mut stdin, &mut stdout, &mut stderr);
    let result = engine.run();
    (stdout.output().to_owned(), result)
}

#[test]
fn s1_hello() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@m</arg1></instruction>
        <instruction order="2" opcode="MOVE"><arg1 type="var">GF@m</arg1><arg2 type="string">hi</arg2></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@m</arg1></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "hi");
    assert_eq!(result.unwrap(), 0);
}

#[test]
fn s2_sum() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="ADD"><arg1 type="var">GF@r</arg1><arg2 type="int">2</arg2><arg3 type="int">40</arg3></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="var">GF@r</arg1></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "42");
    assert_eq!(result.unwrap(), 0);
}

#[test]
fn s3_loop() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@i</arg1></instruction>
        <instruction order="2" opcode="MOVE"><arg1 type="var">GF@i</arg1><arg2 type="int">3</arg2></instruction>
        <instruction order="3" opcode="DEFVAR"><arg1 type="var">GF@done</arg1></instruction>
        <instruction order="4" opcode="LABEL"><arg1 type="label">top</arg1></instruction>
        <instruction order="5" opcode="EQ"><arg1 type="var">GF@done</arg1><arg2 type="var">GF@i</arg2><arg3 type="int">0</arg3></instruction>
        <instruction order="6" opcode="JUMPIFEQ"><arg1 type="label">end</arg1><arg2 type="var">GF@done</arg2><arg3 type="bool">true</arg3></instruction>
        <instruction order="7" opcode="WRITE"><arg1 type="var">GF@i</arg1></instruction>
        <instruction order="8" opcode="WRITE"><arg1 type="string"> </arg1></instruction>
        <instruction order="9" opcode="SUB"><arg1 type="var">GF@i</arg1><arg2 type="var">GF@i</arg2><arg3 type="int">1</arg3></instruction>
        <instruction order="10" opcode="JUMP"><arg1 type="label">top</arg1></instruction>
        <instruction order="11" opcode="LABEL"><arg1 type="label">end</arg1></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "3 2 1 ");
    assert_eq!(result.unwrap(), 0);
}

#[test]
fn s4_call_return() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="CALL"><arg1 type="label">sub</arg1></instruction>
        <instruction order="2" opcode="CALL"><arg1 type="label">sub</arg1></instruction>
        <instruction order="3" opcode="WRITE"><arg1 type="string">.</arg1></instruction>
        <instruction order="4" opcode="JUMP"><arg1 type="label">end</arg1></instruction>
        <instruction order="5" opcode="LABEL"><arg1 type="label">sub</arg1></instruction>
        <instruction order="6" opcode="WRITE"><arg1 type="string">X</arg1></instruction>
        <instruction order="7" opcode="RETURN"></instruction>
        <instruction order="8" opcode="LABEL"><arg1 type="label">end</arg1></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "XX.");
    assert_eq!(result.unwrap(), 0);
}

#[test]
fn s5_div_by_zero() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
        <instruction order="2" opcode="IDIV"><arg1 type="var">GF@r</arg1><arg2 type="int">1</arg2><arg3 type="int">0</arg3></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "");
    assert_eq!(result.unwrap_err().exit_code(), 57);
}

#[test]
fn s6_undefined_variable() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="WRITE"><arg1 type="var">GF@nope</arg1></instruction>
    </program>"#;
    let (stdout, result) = run(xml);
    assert_eq!(stdout, "");
    assert_eq!(result.unwrap_err().exit_code(), 54);
}

#[test]
fn s7_bad_frame() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="PUSHFRAME"></instruction>
    </program>"#;
    let (_, result) = run(xml);
    assert_eq!(result.unwrap_err().exit_code(), 55);
}

#[test]
fn s8_duplicate_label_fails_at_load_time() {
    let xml = r#"<program language="IPPcode23">
        <instruction order="1" opcode="LABEL"><arg1 type="label">L</arg1></instruction>
        <instruction order="2" opcode="LABEL"><arg1 type="label">L</arg1></instruction>
    </program>"#;
    let err = load_program(xml).unwrap_err();
    assert_eq!(err.exit_code(), 52);
}
