//! Operator prompts
//!
//! The few decisions the data cannot settle (which test round, which summary
//! run) are asked of an operator. A prompt is a single blocking question; a
//! blank answer is `None` and the caller treats it as "no match".

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Answers disambiguation questions
pub trait Operator {
    /// Ask one question, `None` for a blank or unavailable answer
    fn ask(&mut self, prompt: &str) -> Option<String>;
}

/// Operator reading answers line by line
///
/// Defaults to the process stdin and stdout.
pub struct StdinOperator<R = io::StdinLock<'static>, W = io::Stdout> {
    reader: R,
    writer: W,
}

impl StdinOperator {
    /// Operator on the process stdin/stdout
    pub fn new() -> Self {
        StdinOperator {
            reader: io::stdin().lock(),
            writer: io::stdout(),
        }
    }
}

impl Default for StdinOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead, W: Write> StdinOperator<R, W> {
    /// Operator on arbitrary streams
    pub fn with_io(reader: R, writer: W) -> Self {
        StdinOperator { reader, writer }
    }
}

impl<R: BufRead, W: Write> Operator for StdinOperator<R, W> {
    fn ask(&mut self, prompt: &str) -> Option<String> {
        // a failed prompt write still lets the operator answer
        let _ = write!(self.writer, "{} ", prompt);
        let _ = self.writer.flush();

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let answer = line.trim();
                if answer.is_empty() {
                    None
                } else {
                    Some(answer.to_string())
                }
            }
        }
    }
}

/// Operator replaying a fixed list of answers
///
/// Records every prompt it was asked. Once the answers run out, every
/// further question gets `None`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<Option<String>>,
    prompts: Vec<String>,
}

impl ScriptedOperator {
    /// Operator answering in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedOperator {
            answers: answers
                .into_iter()
                .map(|a| {
                    let a = a.into();
                    if a.trim().is_empty() {
                        None
                    } else {
                        Some(a)
                    }
                })
                .collect(),
            prompts: Vec::new(),
        }
    }

    /// Operator that never answers
    pub fn silent() -> Self {
        Self::default()
    }

    /// Prompts asked so far
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front().flatten()
    }
}
