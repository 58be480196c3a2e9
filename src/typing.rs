//! Keystroke coalescing: typed runs, backspace bursts and paste text
//!
//! Timestamps are milliseconds from any monotonic clock the host uses; only
//! differences between them matter.

use crate::config::TimingConfig;
use crate::coordinates::{GridPos, Mu};
use crate::reflow::WrapMove;

const TAB_WIDTH: usize = 4;
const SPACES: &str = "    ";

/// A contiguous burst of freshly typed characters on one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedRun {
    pub page: usize,
    pub row: Mu,
    pub start_col: i32,
    pub len: usize,
    pub last_ms: u64,
}

impl TypedRun {
    /// Column right after the last character of the run
    pub fn end_col(&self) -> i32 {
        self.start_col + self.len as i32
    }

    fn ends_at(&self, pos: GridPos) -> bool {
        self.page == pos.page && self.row == pos.row && self.end_col() == pos.col
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackspaceBurst {
    pub count: usize,
    pub last_ms: u64,
}

/// Coalescing state between keystrokes
#[derive(Debug, Clone)]
pub struct TypingState {
    timing: TimingConfig,
    run: Option<TypedRun>,
    burst: Option<BackspaceBurst>,
}

impl TypingState {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            run: None,
            burst: None,
        }
    }

    pub fn run(&self) -> Option<&TypedRun> {
        self.run.as_ref()
    }

    pub fn burst(&self) -> Option<&BackspaceBurst> {
        self.burst.as_ref()
    }

    /// Forget everything; any caret jump or line break is a discontinuity
    pub fn interrupt(&mut self) {
        self.run = None;
        self.burst = None;
    }

    /// A character was struck at `at`
    pub fn record_typed(&mut self, at: GridPos, now_ms: u64) {
        let window = self.timing.typed_run_ms;
        match self.run.as_mut() {
            Some(run) if run.ends_at(at) && now_ms.saturating_sub(run.last_ms) <= window => {
                run.len += 1;
                run.last_ms = now_ms;
            }
            _ => {
                self.run = Some(TypedRun {
                    page: at.page,
                    row: at.row,
                    start_col: at.col,
                    len: 1,
                    last_ms: now_ms,
                });
            }
        }
        self.burst = None;
    }

    /// Follow the run when a word-wrap carries it onto the next line
    pub fn rebase(&mut self, wrap: &WrapMove) {
        if let Some(run) = self.run.as_mut() {
            let start = wrap.relocate(GridPos::new(run.page, run.row, run.start_col));
            run.page = start.page;
            run.row = start.row;
            run.start_col = start.col;
        }
    }

    /// A blank was typed: the word just typed is over
    pub fn record_space(&mut self) {
        self.run = None;
        self.burst = None;
    }

    /// The cell at `at` just lost its top layer to a backspace
    pub fn record_backspace(&mut self, at: GridPos, now_ms: u64) {
        self.burst = Some(match self.burst {
            Some(burst) if now_ms.saturating_sub(burst.last_ms) <= self.timing.backspace_burst_ms => BackspaceBurst {
                count: burst.count + 1,
                last_ms: now_ms,
            },
            _ => BackspaceBurst {
                count: 1,
                last_ms: now_ms,
            },
        });

        let after = GridPos::new(at.page, at.row, at.col + 1);
        self.run = match self.run {
            Some(mut run) if run.len > 1 && run.ends_at(after) => {
                run.len -= 1;
                Some(run)
            }
            _ => None,
        };
    }

    /// Whether backspaces are still coming in as one burst
    pub fn in_burst(&self, now_ms: u64) -> bool {
        self.burst
            .is_some_and(|burst| now_ms.saturating_sub(burst.last_ms) <= self.timing.backspace_burst_ms)
    }

    /// The typed run a paste at `caret` should replace, if any.
    ///
    /// A paste right after typing replaces the word just typed, unless the
    /// user has just been correcting with backspace.
    pub fn paste_replacement(&self, caret: GridPos, now_ms: u64) -> Option<TypedRun> {
        if self.in_burst(now_ms) {
            return None;
        }
        let run = self.run?;
        let fresh = now_ms.saturating_sub(run.last_ms) <= self.timing.paste_replace_ms;
        (fresh && run.len > 0 && run.ends_at(caret)).then_some(run)
    }
}

/// Expand tabs to the next 4-column stop, starting `start_col` columns past
/// the left bound. Carriage returns and other control characters are dropped.
pub fn expand_tabs(text: &str, start_col: usize) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 8);
    let mut column = start_col;

    for ch in text.chars() {
        if ch == '\t' {
            let spaces_needed = TAB_WIDTH - (column % TAB_WIDTH);
            result.push_str(&SPACES[..spaces_needed]);
            column += spaces_needed;
        } else if ch == '\n' {
            result.push(ch);
            column = 0;
        } else if !ch.is_control() {
            result.push(ch);
            column += 1;
        }
    }
    result
}

/// Split pasted text into lines on `\n`
pub fn paste_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for pos in memchr::memchr_iter(b'\n', text.as_bytes()) {
        lines.push(&text[start..pos]);
        start = pos + 1;
    }
    lines.push(&text[start..]);
    lines
}
