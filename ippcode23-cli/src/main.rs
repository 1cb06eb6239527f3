use std::{
    env, fs,
    io::{self, BufReader, Read},
    process::ExitCode,
};

use ippcode23::{Engine, StdinPort, StreamOutputPort, load_program};

const USAGE: &str = "\
Usage: ippcode23 --source=FILE [--input=FILE]
       ippcode23 --input=FILE [--source=FILE]
       ippcode23 --help | --version

An interpreter for the IPPcode23 XML intermediate representation.

  --source=PATH  XML source file (defaults to stdin if --input is given)
  --input=PATH   file supplying the program's runtime input (defaults to stdin)
  --help         print this message and exit
  --version      print the version and exit
";

const BAD_INVOCATION: u8 = 10;
const INPUT_OPEN_FAILED: u8 = 11;

struct Args {
    source: Option<String>,
    input: Option<String>,
}

enum ParsedArgs {
    Run(Args),
    Help,
    Version,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<ParsedArgs, String> {
    let mut source = None;
    let mut input = None;
    for arg in raw {
        if arg == "--help" {
            return Ok(ParsedArgs::Help);
        } else if arg == "--version" {
            return Ok(ParsedArgs::Version);
        } else if let Some(path) = arg.strip_prefix("--source=") {
            if source.replace(path.to_owned()).is_some() {
                return Err("--source given more than once".to_owned());
            }
        } else if let Some(path) = arg.strip_prefix("--input=") {
            if input.replace(path.to_owned()).is_some() {
                return Err("--input given more than once".to_owned());
            }
        } else {
            return Err(format!("unrecognized argument {arg:?}"));
        }
    }
    if source.is_none() && input.is_none() {
        return Err("at least one of --source/--input is required".to_owned());
    }
    Ok(ParsedArgs::Run(Args { source, input }))
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match parse_args(args.into_iter()) {
        Ok(ParsedArgs::Help) => {
            print!("{USAGE}");
            ExitCode::SUCCESS
        }
        Ok(ParsedArgs::Version) => {
            println!("ippcode23 {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Ok(ParsedArgs::Run(args)) => run(args),
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            ExitCode::from(BAD_INVOCATION)
        }
    }
}

fn run(args: Args) -> ExitCode {
    let source = match read_source(args.source.as_deref()) {
        Ok(source) => source,
        Err(code) => return ExitCode::from(code),
    };

    let program = match load_program(&source) {
        Ok(program) => program,
        Err(err) => {
            log::error!("{err}");
            eprintln!("{err}");
            return ExitCode::from(err.exit_code());
        }
    };

    let mut stdout = StreamOutputPort::new(io::stdout());
    let mut stderr = StreamOutputPort::new(io::stderr());

    match args.input.as_deref() {
        Some(path) => {
            let file = match fs::File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("error: cannot open input file {path}: {err}");
                    return ExitCode::from(INPUT_OPEN_FAILED);
                }
            };
            let mut input = StdinPort::new(BufReader::new(file));
            let mut engine = Engine::new(program, &mut input, &mut stdout, &mut stderr);
            dispatch(&mut engine)
        }
        None => {
            let stdin = io::stdin();
            let mut input = StdinPort::new(stdin.lock());
            let mut engine = Engine::new(program, &mut input, &mut stdout, &mut stderr);
            dispatch(&mut engine)
        }
    }
}

fn dispatch(engine: &mut Engine<'_>) -> ExitCode {
    match engine.run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            log::error!("{err}");
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn read_source(path: Option<&str>) -> Result<String, u8> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|err| {
            eprintln!("error: cannot open source file {path}: {err}");
            INPUT_OPEN_FAILED
        }),
        None => {
            let mut buf = String::new();
            io::stdin().lock().read_to_string(&mut buf).map_err(|err| {
                eprintln!("error: cannot read source from stdin: {err}");
                INPUT_OPEN_FAILED
            })?;
            Ok(buf)
        }
    }
}
