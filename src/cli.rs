use anyhow::Result;
use console::{measure_text_width, Alignment, Term};

/// Width of the right-aligned prefix column, including the trailing space
pub const PREFIX_LEN: u16 = 10;

#[macro_export]
macro_rules! msg {
    ($prefix:expr, $($arg:tt)+) => {
        $crate::WRITER.writeln($prefix, &format!($($arg)+)).ok();
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        if $crate::VERBOSE.load(std::sync::atomic::Ordering::Relaxed) {
            $crate::WRITER
                .writeln(&console::style("DEBUG").dim().to_string(), &format!($($arg)+))
                .ok();
        }
    };
}

#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        $crate::msg!(&console::style("SUCCESS").green().bold().to_string(), $($arg)+);
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::msg!(&console::style("INFO").blue().bold().to_string(), $($arg)+);
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::msg!(&console::style("WARNING").yellow().bold().to_string(), $($arg)+);
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::msg!(&console::style("ERROR").red().bold().to_string(), $($arg)+);
    };
}

#[macro_export]
macro_rules! due_to {
    ($($arg:tt)+) => {
        $crate::msg!(&console::style("DUE TO").yellow().bold().to_string(), $($arg)+);
    };
}

/// Right-align `prefix` into the prefix column.
pub fn gen_prefix(prefix: &str) -> String {
    let column = console::pad_str(prefix, (PREFIX_LEN - 1) as usize, Alignment::Right, None);
    format!("{} ", column)
}

pub struct Writer {
    term: Term,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            term: Term::stdout(),
        }
    }

    /// Room left for a message after the prefix column
    pub fn get_max_len(&self) -> u16 {
        let (_, cols) = self.term.size_checked().unwrap_or((25, 80));
        cols.saturating_sub(PREFIX_LEN).max(20)
    }

    pub fn writeln(&self, prefix: &str, msg: &str) -> Result<()> {
        self.term.write_line(&format!("{}{}", gen_prefix(prefix), msg))?;
        Ok(())
    }

    /// Print words packed into as few lines as the terminal allows, prefix on the first one
    pub fn write_chunks<S: AsRef<str>>(&self, prefix: &str, chunks: &[S]) -> Result<()> {
        let lines = wrap_chunks(chunks, self.get_max_len() as usize);
        for (i, line) in lines.iter().enumerate() {
            self.writeln(if i == 0 { prefix } else { "" }, line)?;
        }
        Ok(())
    }
}

fn wrap_chunks<S: AsRef<str>>(chunks: &[S], max_len: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for chunk in chunks {
        let chunk = chunk.as_ref();
        if !line.is_empty() && measure_text_width(&line) + 1 + measure_text_width(chunk) > max_len {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(chunk);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
