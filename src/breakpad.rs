//! Breakpad module parses the text output of `minidump_stackwalk`: the system
//! header and the stack of the crashed thread.
use crate::signature::RuleSet;
use crate::stacktrace::Frame;

use log::debug;
use regex::Regex;
use std::fmt;

lazy_static::lazy_static! {
    static ref RE_OS: Regex = Regex::new(r"^Operating system: (.*)").unwrap();
    static ref RE_CPU_TYPE: Regex = Regex::new(r"^CPU: (.*)").unwrap();
    static ref RE_CPU_COUNT: Regex = Regex::new(r"^\s+(\d+)\sCPU").unwrap();
    static ref RE_CRASH_REASON: Regex = Regex::new(r"^Crash reason:\s+(.*)").unwrap();
    static ref RE_CRASH_ADDRESS: Regex = Regex::new(r"^Crash address:\s+(.*)").unwrap();
    static ref RE_THREAD_CRASH: Regex = Regex::new(r"^Thread (\d+) [(]crashed[)]").unwrap();
    // 3  libxul.so!nsEditor::InstallEventListeners() [nsEditor.cpp : 375 + 0x67]
    static ref RE_FRAME_SOURCE: Regex = Regex::new(
        r"^\s*(\d+)\s+([^!]+)!(.*) [\[](.*) : (\d+) \+ 0x[0-9a-fA-F]+[\]]"
    ).unwrap();
    // 3  libxul.so!nsEditor::InstallEventListeners()
    static ref RE_FRAME_MODULE: Regex = Regex::new(r"^\s*(\d+)\s+([^!]+)!(.*)").unwrap();
    // 10  libpthread-2.5.so + 0xa9c4
    static ref RE_FRAME_LIBRARY: Regex = Regex::new(
        r"^\s*(\d+)\s+([^+]+)\s\+\s(0x[0-9a-fA-F]+)"
    ).unwrap();
    // 4  0xdeadbeef
    static ref RE_FRAME_ADDRESS: Regex = Regex::new(r"^\s*(\d+)\s+(0x[0-9a-fA-F]+)").unwrap();
    static ref RE_REGISTER: Regex = Regex::new(r"\s+([a-zA-Z0-9]+)\s=\s(0x[0-9a-fA-F]+)").unwrap();
    static ref RE_FOUND_BY: Regex = Regex::new(r"^\s+Found by:").unwrap();
}

/// State of the report parser: what the next line is expected to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    Init,
    ExpectOSVersion,
    ExpectCpuType,
    ExpectCpuFamilyOrCount,
    ExpectCpuFamily,
    ExpectCpuCount,
    ExpectCrashReasonBlank,
    ExpectCrashReason,
    ExpectCrashAddress,
    ExpectThreadCrashBlank,
    ExpectThreadCrash,
    ExpectFrameStart,
    ExpectFrameRegisters,
    Complete,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Header fields and frames of the crashed thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedReport {
    pub operating_system: String,
    pub operating_system_version: String,
    pub cpu_type: String,
    pub cpu_family: String,
    pub cpu_count: String,
    pub crash_reason: String,
    pub crash_address: String,
    pub crashing_thread: String,
    pub frames: Vec<Frame>,
    /// Parse trace: one message per consumed line plus every anomaly.
    pub messages: Vec<String>,
}

impl ParsedReport {
    /// Frame signatures in stack order.
    pub fn frame_signatures(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| frame.frame_signature.clone())
            .collect()
    }

    fn unexpected(&mut self, state: ParseState, line: &str) {
        debug!("Unexpected line in state {state}: {line}");
        self.messages
            .push(format!("error state: {state}, unexpected: '{line}'"));
    }
}

/// Match a frame header line against the frame syntaxes, most specific first.
fn parse_frame_start(line: &str, rules: &RuleSet) -> Option<Frame> {
    let number = |caps: &regex::Captures| caps[1].parse::<u32>().unwrap_or(u32::MAX);
    if let Some(caps) = RE_FRAME_SOURCE.captures(line) {
        return Some(Frame::module(
            number(&caps),
            &caps[2],
            &caps[3],
            Some((&caps[4], &caps[5])),
            rules,
        ));
    }
    if let Some(caps) = RE_FRAME_MODULE.captures(line) {
        return Some(Frame::module(number(&caps), &caps[2], &caps[3], None, rules));
    }
    if let Some(caps) = RE_FRAME_LIBRARY.captures(line) {
        return Some(Frame::library(number(&caps), &caps[2], &caps[3]));
    }
    RE_FRAME_ADDRESS
        .captures(line)
        .map(|caps| Frame::address(number(&caps), &caps[2]))
}

/// Parse a `minidump_stackwalk` report.
///
/// Parsing never fails: lines that do not fit the current state are recorded
/// in `messages` and skipped. Only the crashed thread is read; parsing stops
/// at the blank line that ends its stack.
///
/// # Arguments
///
/// * `text` - report text
///
/// * `rules` - rules used to derive frame signatures
///
/// # Return value
///
/// Parsed header and frames
pub fn parse_report(text: &str, rules: &RuleSet) -> ParsedReport {
    let mut report = ParsedReport::default();
    let mut state = ParseState::Init;
    let mut lines = text.lines().peekable();

    while let Some(&line) = lines.peek() {
        report
            .messages
            .push(format!("state: {state}, line: '{line}'"));
        let blank = line.trim().is_empty();
        let mut consume = true;
        match state {
            ParseState::Init => {
                if let Some(caps) = RE_OS.captures(line) {
                    report.operating_system = caps[1].trim().to_string();
                    state = ParseState::ExpectOSVersion;
                } else if !blank {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectOSVersion => {
                report.operating_system_version = line.trim().to_string();
                state = ParseState::ExpectCpuType;
            }
            ParseState::ExpectCpuType => {
                if let Some(caps) = RE_CPU_TYPE.captures(line) {
                    report.cpu_type = caps[1].trim().to_string();
                    state = ParseState::ExpectCpuFamilyOrCount;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectCpuFamilyOrCount => {
                // The same line is examined again in the next state.
                consume = false;
                state = if RE_CPU_COUNT.is_match(line) {
                    ParseState::ExpectCpuCount
                } else {
                    ParseState::ExpectCpuFamily
                };
            }
            ParseState::ExpectCpuFamily => {
                report.cpu_family = line.trim().to_string();
                state = ParseState::ExpectCpuCount;
            }
            ParseState::ExpectCpuCount => {
                if let Some(caps) = RE_CPU_COUNT.captures(line) {
                    report.cpu_count = caps[1].to_string();
                    state = ParseState::ExpectCrashReasonBlank;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectCrashReasonBlank => {
                if blank {
                    state = ParseState::ExpectCrashReason;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectCrashReason => {
                if let Some(caps) = RE_CRASH_REASON.captures(line) {
                    report.crash_reason = caps[1].trim().to_string();
                    state = ParseState::ExpectCrashAddress;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectCrashAddress => {
                if let Some(caps) = RE_CRASH_ADDRESS.captures(line) {
                    report.crash_address = caps[1].trim().to_string();
                    state = ParseState::ExpectThreadCrashBlank;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectThreadCrashBlank => {
                if blank {
                    state = ParseState::ExpectThreadCrash;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectThreadCrash => {
                if let Some(caps) = RE_THREAD_CRASH.captures(line) {
                    report.crashing_thread = caps[1].to_string();
                    state = ParseState::ExpectFrameStart;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectFrameStart => {
                if let Some(frame) = parse_frame_start(line, rules) {
                    report.frames.push(frame);
                    state = ParseState::ExpectFrameRegisters;
                } else if blank {
                    state = ParseState::Complete;
                } else {
                    report.unexpected(state, line);
                }
            }
            ParseState::ExpectFrameRegisters => {
                let mut found = false;
                if let Some(frame) = report.frames.last_mut() {
                    for caps in RE_REGISTER.captures_iter(line) {
                        frame
                            .registers
                            .insert(caps[1].to_string(), caps[2].to_string());
                        found = true;
                    }
                }
                if !found {
                    if RE_FOUND_BY.is_match(line) {
                        state = ParseState::ExpectFrameStart;
                    } else {
                        report.unexpected(state, line);
                    }
                }
            }
            ParseState::Complete => break,
        }
        if consume {
            lines.next();
        }
        if state == ParseState::Complete {
            break;
        }
    }

    if state != ParseState::Complete {
        debug!("Report ended in state {state}");
        report
            .messages
            .push(format!("end of report in state: {state}"));
    }
    report
}

/// Extract crash reports from a test log.
///
/// Every report starts at an `Operating system:` line and ends right before
/// the next one (or at the end of the log).
///
/// # Arguments
///
/// * `stream` - log text
///
/// # Return value
///
/// Texts of the found reports, empty if there are none
pub fn extract_reports(stream: &str) -> Vec<String> {
    let lines: Vec<&str> = stream.lines().collect();
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| RE_OS.is_match(line))
        .map(|(idx, _)| idx)
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &first)| {
            let last = starts.get(i + 1).copied().unwrap_or(lines.len());
            lines[first..last].join("\n")
        })
        .collect()
}
