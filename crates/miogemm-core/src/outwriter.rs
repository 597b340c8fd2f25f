//! Structured output writer routing tagged messages to terminal and file.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MiogError};

/// Output channel tag attached to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutPart {
    /// Main narrative of a find run.
    Mai,
    /// One-line-per-candidate tracker.
    Tra,
    /// Kernel dependency information.
    Dep,
    /// Accuracy check results.
    Acc,
    /// Warnings.
    Wrn,
    /// Cache hits and writes.
    Cch,
    /// Multi-bench summaries.
    Ben,
}

impl OutPart {
    /// All channels in declaration order.
    pub const ALL: [OutPart; 7] = [
        OutPart::Mai,
        OutPart::Tra,
        OutPart::Dep,
        OutPart::Acc,
        OutPart::Wrn,
        OutPart::Cch,
        OutPart::Ben,
    ];

    /// Stable channel name.
    pub fn as_str(self) -> &'static str {
        match self {
            OutPart::Mai => "MAI",
            OutPart::Tra => "TRA",
            OutPart::Dep => "DEP",
            OutPart::Acc => "ACC",
            OutPart::Wrn => "WRN",
            OutPart::Cch => "CCH",
            OutPart::Ben => "BEN",
        }
    }
}

/// Verbosity mode selecting which channels reach which sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ver {
    /// Nothing anywhere.
    Silent,
    /// Narrative and accuracy to terminal.
    Terminal,
    /// Terminal plus kernel dependencies.
    TermWithDeps,
    /// Terminal routing mirrored to file.
    Split,
    /// Narrative and accuracy to file only.
    ToFile,
    /// Tracker and warnings to terminal.
    Track,
    /// Tracker to terminal; narrative, accuracy and cache notes to file.
    Strack,
    /// Tracker, warnings and accuracy to terminal.
    Accuracy,
    /// Multi-bench summaries to terminal.
    MultiBench,
}

impl Ver {
    /// All modes in declaration order.
    pub const ALL: [Ver; 9] = [
        Ver::Silent,
        Ver::Terminal,
        Ver::TermWithDeps,
        Ver::Split,
        Ver::ToFile,
        Ver::Track,
        Ver::Strack,
        Ver::Accuracy,
        Ver::MultiBench,
    ];

    /// Stable mode name, as accepted by the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Ver::Silent => "SILENT",
            Ver::Terminal => "TERMINAL",
            Ver::TermWithDeps => "TERMWITHDEPS",
            Ver::Split => "SPLIT",
            Ver::ToFile => "TOFILE",
            Ver::Track => "TRACK",
            Ver::Strack => "STRACK",
            Ver::Accuracy => "ACCURACY",
            Ver::MultiBench => "MULTIBENCH",
        }
    }

    /// Parses a mode name (case-insensitive).
    pub fn from_str_name(s: &str) -> Result<Self, MiogError> {
        let upper = s.to_ascii_uppercase();
        Ver::ALL
            .into_iter()
            .find(|v| v.as_str() == upper)
            .ok_or_else(|| {
                MiogError::UserInput(
                    ErrorInfo::new("verbosity-parse", "unknown verbosity mode")
                        .with_context("input", s.to_string()),
                )
            })
    }

    /// Whether this mode routes the given channel to the terminal.
    pub fn to_terminal(self, part: OutPart) -> bool {
        match self {
            Ver::Silent | Ver::ToFile => false,
            Ver::Terminal | Ver::Split => matches!(part, OutPart::Mai | OutPart::Acc),
            Ver::TermWithDeps => matches!(part, OutPart::Mai | OutPart::Dep | OutPart::Acc),
            Ver::Track => matches!(part, OutPart::Tra | OutPart::Wrn),
            Ver::Strack => matches!(part, OutPart::Tra),
            Ver::Accuracy => matches!(part, OutPart::Tra | OutPart::Acc | OutPart::Wrn),
            Ver::MultiBench => matches!(part, OutPart::Ben),
        }
    }

    /// Whether this mode routes the given channel to the log file.
    pub fn to_file(self, part: OutPart) -> bool {
        match self {
            Ver::Split | Ver::ToFile => matches!(part, OutPart::Mai | OutPart::Acc),
            Ver::Strack => matches!(part, OutPart::Mai | OutPart::Acc | OutPart::Cch),
            _ => false,
        }
    }

    /// Whether this mode cannot operate without a log file path.
    pub fn file_required(self) -> bool {
        matches!(self, Ver::Split | Ver::ToFile | Ver::Strack)
    }
}

/// Routes tagged messages to terminal, file, or both per the verbosity mode.
#[derive(Debug)]
pub struct Writer {
    ver: Ver,
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl Writer {
    /// Opens a writer, creating the log file when the mode requires one.
    pub fn new(ver: Ver, path: Option<PathBuf>) -> Result<Self, MiogError> {
        if ver.file_required() && path.is_none() {
            return Err(MiogError::UserInput(
                ErrorInfo::new(
                    "writer-no-file",
                    format!("verbosity {} requires an output file path", ver.as_str()),
                )
                .with_hint("pass --output or choose a terminal-only verbosity"),
            ));
        }
        let file = match &path {
            Some(p) => Some(BufWriter::new(File::create(p)?)),
            None => None,
        };
        Ok(Self { ver, file, path })
    }

    /// A writer that drops everything.
    pub fn silent() -> Self {
        Self {
            ver: Ver::Silent,
            file: None,
            path: None,
        }
    }

    /// The active verbosity mode.
    pub fn verbosity(&self) -> Ver {
        self.ver
    }

    /// Path of the log file, if one is open.
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Writes one message on the given channel.
    pub fn write(&mut self, part: OutPart, message: &str) {
        if self.ver.to_terminal(part) {
            println!("{message}");
        }
        if self.ver.to_file(part) {
            if let Some(file) = self.file.as_mut() {
                // Log-file write failures are not worth aborting a search.
                let _ = writeln!(file, "{message}");
            }
        }
    }

    /// Flushes the file sink.
    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}
