//! Colored terminal output that always resets the terminal style.
//!
//! A [`ColorOutput`] borrows the raw writer and resets its colors and font
//! style when dropped. Create one per colored section and drop it before
//! writing uncolored text again.
use termcolor::{Color, ColorSpec, WriteColor};

pub struct ColorOutput<'a> {
    writer: &'a mut dyn WriteColor,
    spec: ColorSpec,
}

impl<'a> ColorOutput<'a> {
    pub fn new(writer: &'a mut dyn WriteColor) -> Self {
        writer.reset().ok();

        Self {
            writer,
            spec: ColorSpec::new(),
        }
    }

    /// Shorthand for `new` followed by `set_color` and `set_bold`.
    pub fn styled(writer: &'a mut dyn WriteColor, color: Color, bold: bool) -> Self {
        let mut output = Self::new(writer);
        output.set_color(Some(color));
        output.set_bold(bold);
        output
    }

    // Coloring failures are ignored: the text still gets written.
    pub fn set_color(&mut self, color: Option<Color>) {
        self.spec.set_fg(color);
        self.writer.set_color(&self.spec).ok();
    }

    pub fn set_bold(&mut self, yes: bool) {
        self.spec.set_bold(yes);
        self.writer.set_color(&self.spec).ok();
    }

    pub fn writer(&mut self) -> &mut dyn WriteColor {
        self.writer
    }
}

impl<'a> Drop for ColorOutput<'a> {
    fn drop(&mut self) {
        self.writer.reset().ok();
    }
}
