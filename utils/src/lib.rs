pub mod color;

use crate::color::ColorOutput;
use failure::Error;
use std::{
    io::{self, Write},
    path::PathBuf,
};
use termcolor::{Color, WriteColor};

#[macro_export]
macro_rules! assert_matches {
    ($expression: expr, $( $pattern: pat )|*) => {{
        if cfg!(debug_assertions) {
            match $expression {
                $( $pattern )|* => (),
                expression => panic!(
                    r#"assertion failed: `(if let pattern = expression), {}:{}:{}`
pattern: `{}`,
expression: `{:?}`"#,
                    file!(),
                    line!(),
                    column!(),
                    stringify!($( $pattern )|*),
                    expression
                ),
            }
        }
    }};
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpecification {
    Stdout,
    File(PathBuf),
}

impl OutputSpecification {
    /// `-` means stdout, everything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "-" => OutputSpecification::Stdout,
            path => OutputSpecification::File(PathBuf::from(path)),
        }
    }

    pub fn create(&self) -> io::Result<Box<dyn io::Write>> {
        match self {
            OutputSpecification::Stdout => Ok(Box::new(io::stdout())),
            OutputSpecification::File(path) => Ok(Box::new(std::fs::File::create(path)?)),
        }
    }
}

/// Print error objects in a format intended for end users
pub fn print_error(writer: &mut dyn WriteColor, err: &Error) -> Result<(), Error> {
    {
        let mut output = ColorOutput::styled(writer, Color::Red, true);
        write!(output.writer(), "error")?;
    }
    writeln!(writer, ": {}", err.as_fail())?;
    for cause in err.iter_causes() {
        writeln!(writer, "caused by: {}", cause)?;
    }
    Ok(())
}
