use std::io::IsTerminal;

use crossterm::style::Stylize;

use ds_core::services::output::{Confirmer, OutputSink, StyledLine, Tone};

/// Writes styled lines to the terminal. Errors go to stderr.
pub struct ConsoleSink {
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Color only when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }
}

impl OutputSink for ConsoleSink {
    fn write_line(&self, line: StyledLine) {
        let text = format_line(&line, self.color);
        match line.tone {
            Tone::Error => eprintln!("{text}"),
            _ => println!("{text}"),
        }
    }
}

pub fn format_line(line: &StyledLine, color: bool) -> String {
    let text = match line.tone {
        Tone::Heading => format!("\n═══ {} ═══\n", line.text),
        _ => line.text.clone(),
    };
    if !color {
        return text;
    }
    match line.tone {
        Tone::Plain => text,
        Tone::Heading => text.cyan().bold().to_string(),
        Tone::Info => text.cyan().to_string(),
        Tone::Success => text.green().to_string(),
        Tone::Warning => text.yellow().to_string(),
        Tone::Error => text.red().to_string(),
        Tone::Dim => text.dim().to_string(),
    }
}

/// Confirmation through an interactive prompt. `--yes` answers for the user;
/// without a terminal the answer is no.
pub struct PromptConfirmer {
    assume_yes: bool,
}

impl PromptConfirmer {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirmer for PromptConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            tracing::info!(prompt, "confirmed by --yes");
            return true;
        }
        match dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::debug!(error = %e, "confirmation prompt unavailable");
                false
            }
        }
    }
}
