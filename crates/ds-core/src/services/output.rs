/// How a line should be presented. Renderers decide what each tone looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Heading,
    Info,
    Success,
    Warning,
    Error,
    Dim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledLine {
    pub tone: Tone,
    pub text: String,
}

impl StyledLine {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

/// Destination for user-facing output.
pub trait OutputSink {
    fn write_line(&self, line: StyledLine);
}

impl dyn OutputSink + '_ {
    pub fn plain(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Plain, text));
    }

    pub fn heading(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Heading, text));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Info, text));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Success, text));
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Warning, text));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Error, text));
    }

    pub fn dim(&self, text: impl Into<String>) {
        self.write_line(StyledLine::new(Tone::Dim, text));
    }

    /// Write each line of a multi-line block with the same tone.
    pub fn block(&self, tone: Tone, text: &str) {
        for line in text.lines() {
            self.write_line(StyledLine::new(tone, line));
        }
    }
}

/// Gate for irreversible operations.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> bool;
}
