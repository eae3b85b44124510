//! Line-oriented operator prompts.

use std::io::{self, BufRead, Write};

/// Where the flow gets its answers from.
pub trait Prompt: Send {
  /// Offer `options` and return the index of the one picked.
  fn choose(&mut self, label: &str, options: &[&str]) -> io::Result<usize>;

  /// Ask for one line of free text.
  fn ask(&mut self, label: &str) -> io::Result<String>;
}

// ─── Terminal ────────────────────────────────────────────────────────────────

/// Reads answers from stdin.
///
/// Reads block, so they run under [`tokio::task::block_in_place`] to keep the
/// background sync task moving.
pub struct TerminalPrompt;

impl TerminalPrompt {
  fn read_line(label: &str) -> io::Result<String> {
    tokio::task::block_in_place(|| {
      let mut stdout = io::stdout();
      write!(stdout, "{label}: ")?;
      stdout.flush()?;

      let mut line = String::new();
      if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
      }
      Ok(line.trim_end_matches(['\n', '\r']).to_string())
    })
  }
}

impl Prompt for TerminalPrompt {
  fn choose(&mut self, label: &str, options: &[&str]) -> io::Result<usize> {
    loop {
      for (i, option) in options.iter().enumerate() {
        println!("  {}) {option}", i + 1);
      }
      let answer = Self::read_line(label)?;
      if let Some(index) = pick(&answer, options) {
        return Ok(index);
      }
      println!("Please pick 1-{} or type an option.", options.len());
    }
  }

  fn ask(&mut self, label: &str) -> io::Result<String> { Self::read_line(label) }
}

/// Accepts a 1-based number or an option's text, case-insensitively.
fn pick(answer: &str, options: &[&str]) -> Option<usize> {
  let answer = answer.trim();
  if let Ok(n) = answer.parse::<usize>() {
    return (1..=options.len()).contains(&n).then(|| n - 1);
  }
  options.iter().position(|o| o.eq_ignore_ascii_case(answer))
}

// ─── Scripted ────────────────────────────────────────────────────────────────

/// Replays canned answers in order.
#[cfg(test)]
pub struct ScriptedPrompt {
  answers: std::collections::VecDeque<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
  pub fn new<I, A>(answers: I) -> Self
  where
    I: IntoIterator<Item = A>,
    A: Into<String>,
  {
    Self { answers: answers.into_iter().map(Into::into).collect() }
  }

  fn next(&mut self, label: &str) -> io::Result<String> {
    self.answers.pop_front().ok_or_else(|| {
      io::Error::new(io::ErrorKind::UnexpectedEof, format!("no answer left for {label:?}"))
    })
  }
}

#[cfg(test)]
impl Prompt for ScriptedPrompt {
  fn choose(&mut self, label: &str, options: &[&str]) -> io::Result<usize> {
    let answer = self.next(label)?;
    pick(&answer, options).ok_or_else(|| {
      io::Error::new(io::ErrorKind::InvalidInput, format!("{answer:?} is not one of {options:?}"))
    })
  }

  fn ask(&mut self, label: &str) -> io::Result<String> { self.next(label) }
}
