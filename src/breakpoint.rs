//! Source breakpoints: storage, conditions, hit counts and log messages.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::error;

use crate::runtime::{EvalMode, FrameRef, RuntimeFacade};
use crate::source::Source;

/// Expression that must be truthy for the breakpoint to be triggered.
#[derive(Debug, Clone)]
pub struct Condition {
    expression: String,
}

impl Condition {
    pub fn new(expression: impl Into<String>) -> Self {
        Condition {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate the condition in the given frame. An evaluation failure
    /// counts as the condition being false.
    pub fn test(&self, runtime: &dyn RuntimeFacade, frame: FrameRef) -> bool {
        match runtime.evaluate(frame, &self.expression, EvalMode::Expression) {
            Ok(result) => is_truthy(&result.value),
            Err(diagnostic) => {
                error!(
                    "breakpoint condition ({}) failed: {}",
                    self.expression, diagnostic
                );
                false
            }
        }
    }
}

/// The runtime renders values for display; recognize its spellings of
/// "nothing" rather than asking it to evaluate `bool(...)` a second time.
fn is_truthy(value: &str) -> bool {
    !matches!(
        value,
        "" | "false" | "False" | "none" | "None" | "null" | "nil" | "0" | "0.0"
    )
}

/// Hit count expression that must hold for the breakpoint to be triggered.
///
/// Has the format `[<operator>]<count>`, where `<count>` is a positive
/// integer literal and `<operator>` is one of `==` `>` `>=` `<` `<=` `%`,
/// defaulting to `==` if unspecified.
///
/// Examples:
///     5: break on the 5th hit
///     ==5: ditto
///     >5: break on every hit after the 5th
///     >=5: break on the 5th hit and thereafter
///     %5: break on every 5th hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitCondition {
    op: HitOp,
    count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Mod,
}

impl HitCondition {
    /// Returns true if the breakpoint should be triggered on the given hit
    /// count.
    pub fn test(&self, hits: u64) -> bool {
        match self.op {
            HitOp::Eq => hits == self.count,
            HitOp::Gt => hits > self.count,
            HitOp::Ge => hits >= self.count,
            HitOp::Lt => hits < self.count,
            HitOp::Le => hits <= self.count,
            HitOp::Mod => self.count != 0 && hits % self.count == 0,
        }
    }
}

impl FromStr for HitCondition {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (op, rest) = if let Some(rest) = text.strip_prefix("==") {
            (HitOp::Eq, rest)
        } else if let Some(rest) = text.strip_prefix(">=") {
            (HitOp::Ge, rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (HitOp::Le, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (HitOp::Gt, rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (HitOp::Lt, rest)
        } else if let Some(rest) = text.strip_prefix('%') {
            (HitOp::Mod, rest)
        } else {
            (HitOp::Eq, text)
        };
        let count = rest
            .trim()
            .parse()
            .map_err(|_| format!("invalid hit condition: {:?}", text))?;
        Ok(HitCondition { op, count })
    }
}

/// A message with spliced expressions, logged when the breakpoint triggers
/// instead of stopping execution. Expressions go inside curly braces;
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct LogMessage {
    template: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Expr(String),
}

impl LogMessage {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut expr = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => expr.push(c),
                            None => {
                                return Err(format!(
                                    "unterminated expression in log message: {:?}",
                                    template
                                ))
                            }
                        }
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Expr(expr));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(LogMessage {
            template: template.to_string(),
            segments,
        })
    }

    /// The spliced expressions, for compile checking at set time.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Expr(expr) => Some(expr.as_str()),
            _ => None,
        })
    }

    /// Format the message in the given frame. If any splice fails to
    /// evaluate, the raw template is logged verbatim.
    pub fn format(&self, runtime: &dyn RuntimeFacade, frame: FrameRef) -> String {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Expr(expr) => {
                    match runtime.evaluate(frame, expr, EvalMode::Expression) {
                        Ok(result) => output.push_str(&result.value),
                        Err(diagnostic) => {
                            error!(
                                "formatting breakpoint log message {:?} failed: {}",
                                self.template, diagnostic
                            );
                            return self.template.clone();
                        }
                    }
                }
            }
        }
        output
    }
}

/// Outcome of evaluating one breakpoint against the current line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triggered {
    /// Conditions rejected the hit; keep running.
    No,
    /// Triggered with a log message: emit it, don't stop.
    Log(String),
    /// Triggered: stop.
    Stop,
}

/// A breakpoint set by the client in a source file.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: i32,
    pub source: Source,
    pub line: u32,
    pub is_enabled: bool,
    pub condition: Option<Condition>,
    pub hit_condition: Option<HitCondition>,
    pub log_message: Option<LogMessage>,
    /// Number of times this breakpoint has been hit.
    pub hit_count: u64,
    /// False when a condition or log expression failed to compile. The
    /// breakpoint stays stored but never triggers.
    pub verified: bool,
    /// Explanation reported to the client when unverified.
    pub message: Option<String>,
}

impl Breakpoint {
    /// Determine whether this breakpoint is triggered by the current line in
    /// the given frame, and update its hit count.
    ///
    /// The hit count advances on every matching line event, even when the
    /// hit condition or condition later rejects the hit.
    pub fn is_triggered(
        &mut self,
        runtime: &dyn RuntimeFacade,
        frame: FrameRef,
        source: &Source,
        line: u32,
    ) -> Triggered {
        if !self.is_enabled || self.line != line || self.source != *source {
            return Triggered::No;
        }

        self.hit_count += 1;

        // A breakpoint whose condition or log expression failed to compile
        // stays stored (and counted) but never triggers.
        if !self.verified {
            return Triggered::No;
        }

        // Check hit_condition first since it is cheaper than condition.
        if let Some(hit_condition) = &self.hit_condition {
            if !hit_condition.test(self.hit_count) {
                return Triggered::No;
            }
        }
        if let Some(condition) = &self.condition {
            if !condition.test(runtime, frame) {
                return Triggered::No;
            }
        }

        match &self.log_message {
            Some(log_message) => Triggered::Log(log_message.format(runtime, frame)),
            None => Triggered::Stop,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Breakpoint({}, {}:{})", self.id, self.source, self.line)
    }
}

/// All breakpoints, indexed for the hot-path lookup by source and line.
///
/// `setBreakpoints` semantics: the set for one source is always replaced as
/// a whole, so the active set observable by the tracer is exactly the set
/// returned by the latest response for that source.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    at: HashMap<Source, HashMap<u32, Vec<Breakpoint>>>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace every breakpoint for `source`.
    pub fn replace(&mut self, source: &Source, breakpoints: Vec<Breakpoint>) {
        if breakpoints.is_empty() {
            self.at.remove(source);
            return;
        }
        let mut by_line: HashMap<u32, Vec<Breakpoint>> = HashMap::new();
        for breakpoint in breakpoints {
            by_line.entry(breakpoint.line).or_default().push(breakpoint);
        }
        self.at.insert(source.clone(), by_line);
    }

    /// The breakpoints at the given location, mutable so the tracer can
    /// advance hit counts.
    pub fn at_mut(&mut self, source: &Source, line: u32) -> &mut [Breakpoint] {
        self.at
            .get_mut(source)
            .and_then(|by_line| by_line.get_mut(&line))
            .map(|breakpoints| breakpoints.as_mut_slice())
            .unwrap_or(&mut [])
    }

    pub fn has_any_at(&self, source: &Source, line: u32) -> bool {
        self.at
            .get(source)
            .and_then(|by_line| by_line.get(&line))
            .map_or(false, |breakpoints| !breakpoints.is_empty())
    }

    /// Remove breakpoints for one source, or all of them.
    pub fn clear(&mut self, source: Option<&Source>) {
        match source {
            Some(source) => {
                self.at.remove(source);
            }
            None => self.at.clear(),
        }
    }

    /// Enable or disable a breakpoint by id. Returns false if the id is
    /// unknown.
    pub fn enable(&mut self, id: i32, is_enabled: bool) -> bool {
        for by_line in self.at.values_mut() {
            for breakpoints in by_line.values_mut() {
                for breakpoint in breakpoints.iter_mut() {
                    if breakpoint.id == id {
                        breakpoint.is_enabled = is_enabled;
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.at.is_empty()
    }
}
