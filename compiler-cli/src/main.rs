//! `mirc` reads a MidIR compilation unit in JSON form and either emits x86-64
//! assembly for it or interprets it.
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

use failure::{Error, Fail, ResultExt};
use lowering::Options;
use mir::CompilationUnit;
use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::exit,
};
use structopt::StructOpt;
use termcolor::{ColorChoice, StandardStream};
use utils::OutputSpecification;

/// Division and spill code need scratch registers beyond the operands.
const MIN_REGISTERS: usize = 3;

#[derive(Debug, Fail)]
pub enum CliError {
    #[fail(display = "cannot read input file {:?}", path)]
    ReadInput { path: PathBuf },
    #[fail(display = "input is not a MidIR compilation unit")]
    ParseInput,
    #[fail(display = "cannot write output to {:?}", output)]
    WriteOutput { output: OutputSpecification },
    #[fail(
        display = "register allocation needs at least {} registers, but only {} were given",
        min, given
    )]
    TooFewRegisters { min: usize, given: usize },
    #[fail(display = "at most {} registers are available, but {} were requested", max, given)]
    TooManyRegisters { max: usize, given: usize },
    #[fail(display = "code generation failed")]
    Backend,
    #[fail(display = "program execution failed")]
    Interpretation,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "mirc")]
pub struct CliCommand {
    /// Print the generated assembly. This is the default action.
    #[structopt(long = "emit-asm", conflicts_with_all = &["interpret", "interpret-mir"])]
    emit_asm: bool,
    /// Compile, then run the generated assembly and print its output.
    #[structopt(long = "interpret", conflicts_with = "interpret-mir")]
    interpret: bool,
    /// Run the MidIR directly and print its output.
    #[structopt(long = "interpret-mir")]
    interpret_mir: bool,
    /// Keep comments, fall-through jumps and unreferenced labels.
    #[structopt(long = "keep-comments")]
    keep_comments: bool,
    /// Verify the register allocator's worklist invariants after every step.
    #[structopt(long = "check-invariants")]
    check_invariants: bool,
    /// Keep every temporary on the stack instead of coloring it.
    #[structopt(long = "naive-allocation")]
    naive_allocation: bool,
    /// Only use the first N allocatable registers.
    #[structopt(long = "registers", value_name = "N")]
    registers: Option<usize>,
    /// Where to write the result. Defaults to stdout.
    #[structopt(
        short = "o",
        long = "output",
        default_value = "-",
        parse(from_str = OutputSpecification::from_arg)
    )]
    output: OutputSpecification,
    /// JSON MidIR compilation unit, or `-` for stdin.
    #[structopt(name = "FILE", parse(from_os_str))]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    EmitAsm,
    Interpret,
    InterpretMir,
}

impl CliCommand {
    fn action(&self) -> Action {
        match (self.emit_asm, self.interpret, self.interpret_mir) {
            (_, true, _) => Action::Interpret,
            (_, _, true) => Action::InterpretMir,
            (true, ..) | (false, false, false) => Action::EmitAsm,
        }
    }

    fn options(&self) -> Result<Options, CliError> {
        let mut options = Options {
            remove_comments: !self.keep_comments,
            check_invariants: self.check_invariants,
            naive_allocation: self.naive_allocation,
            ..Options::default()
        };
        if let Some(count) = self.registers {
            let max = options.available_registers.len();
            if count < MIN_REGISTERS {
                return Err(CliError::TooFewRegisters {
                    min: MIN_REGISTERS,
                    given: count,
                });
            }
            if count > max {
                return Err(CliError::TooManyRegisters { max, given: count });
            }
            options = options.with_register_count(count);
        }
        Ok(options)
    }
}

fn main() {
    env_logger::init();
    let cmd = CliCommand::from_args();

    if let Err(msg) = do_main(&cmd) {
        exit_with_error(&msg);
    }
}

fn do_main(cmd: &CliCommand) -> Result<(), Error> {
    let options = cmd.options()?;
    let source = read_input(&cmd.input).context(CliError::ReadInput {
        path: cmd.input.clone(),
    })?;
    let unit: CompilationUnit = serde_json::from_str(&source).context(CliError::ParseInput)?;
    log::info!(
        "read {} functions and {} global strings",
        unit.functions.len(),
        unit.global_variables.len()
    );

    let text = match cmd.action() {
        Action::InterpretMir => {
            interpreter::interpret_mir(&unit).context(CliError::Interpretation)?
        }
        action => {
            let program = lowering::run_backend(&unit, &options).context(CliError::Backend)?;
            if action == Action::Interpret {
                interpreter::interpret_assembly(&program).context(CliError::Interpretation)?
            } else {
                program.to_string()
            }
        }
    };

    write_output(&cmd.output, &text).context(CliError::WriteOutput {
        output: cmd.output.clone(),
    })?;
    Ok(())
}

fn read_input(path: &Path) -> io::Result<String> {
    let mut source = String::new();
    if path.as_os_str() == "-" {
        io::stdin().read_to_string(&mut source)?;
    } else {
        File::open(path)?.read_to_string(&mut source)?;
    }
    Ok(source)
}

fn write_output(output: &OutputSpecification, text: &str) -> io::Result<()> {
    let mut writer = output.create()?;
    writer.write_all(text.as_bytes())?;
    writer.flush()
}

fn exit_with_error(err: &Error) -> ! {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    if utils::print_error(&mut stderr, err).is_err() {
        eprintln!("error: {}", err);
    }
    exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> CliCommand {
        CliCommand::from_iter_safe(std::iter::once("mirc").chain(args.iter().cloned())).unwrap()
    }

    #[test]
    fn default_options_work() {
        let cmd = command(&["unit.json"]);
        assert_eq!(Action::EmitAsm, cmd.action());
        assert_eq!(OutputSpecification::Stdout, cmd.output);
        let options = cmd.options().unwrap();
        assert!(options.remove_comments);
        assert!(!options.naive_allocation);
        assert_eq!(14, options.available_registers.len());
    }

    #[test]
    fn register_count_is_checked() {
        let options = command(&["--registers", "5", "--keep-comments", "-"])
            .options()
            .unwrap();
        assert_eq!(5, options.available_registers.len());
        assert!(!options.remove_comments);
        utils::assert_matches!(
            command(&["--registers", "2", "-"]).options(),
            Err(CliError::TooFewRegisters { min: 3, given: 2 })
        );
        utils::assert_matches!(
            command(&["--registers", "15", "-"]).options(),
            Err(CliError::TooManyRegisters { max: 14, given: 15 })
        );
    }

    #[test]
    fn actions_are_exclusive() {
        assert_eq!(Action::InterpretMir, command(&["--interpret-mir", "-"]).action());
        let args = ["mirc", "--interpret", "--interpret-mir", "-"];
        assert!(CliCommand::from_iter_safe(&args).is_err());
    }
}
