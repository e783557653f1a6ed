//! Provides API's for reducing frame signatures to a Socorro-style crash
//! signature and for signature deduplication.
use crate::constants::{
    IRRELEVANT_SIGNATURE_REGEXES, MAX_SIGNATURE_LIST_LEN, NO_SIGNATURE,
    PAIRED_MINIDUMP_SIGNATURE, PREFIX_SIGNATURE_REGEXES, RPC_CHANNEL_SENTINEL,
    SIGNATURES_WITH_LINE_NUMBERS_REGEXES, SIGNATURE_SENTINELS,
};
use crate::error::*;

use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write;
use std::fs;
use std::path::Path;

lazy_static::lazy_static! {
    /// Rule set built from the default tables.
    static ref DEFAULT_RULES: RuleSet = RuleSet::builder()
        .build()
        .expect("default signature rules must compile");
}

/// Frame signature that marks the start of the interesting part of a stack.
#[derive(Clone, Debug)]
pub enum Sentinel {
    /// Sentinel that always applies.
    Plain(String),
    /// Sentinel that applies only when `condition` holds for the whole
    /// signature list.
    Conditional {
        /// Frame signature to look for.
        signature: String,
        /// Predicate over the complete signature list.
        condition: fn(&[String]) -> bool,
    },
}

impl Sentinel {
    /// Frame signature of the sentinel.
    pub fn signature(&self) -> &str {
        match self {
            Sentinel::Plain(signature) => signature,
            Sentinel::Conditional { signature, .. } => signature,
        }
    }

    /// Check whether the sentinel applies to the signature list.
    pub fn applies(&self, signatures: &[String]) -> bool {
        match self {
            Sentinel::Plain(_) => true,
            Sentinel::Conditional { condition, .. } => condition(signatures),
        }
    }
}

/// RPC channel frames are not a crash entry point when the stack belongs to a
/// paired minidump written for a hung plugin.
fn not_paired_minidump(signatures: &[String]) -> bool {
    !signatures
        .iter()
        .any(|signature| signature.contains(PAIRED_MINIDUMP_SIGNATURE))
}

/// Compile patterns into a single regex anchored at the start of the input.
fn compile(patterns: &[String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let rstring = patterns.iter().fold(String::new(), |mut output, s| {
        let _ = write!(output, "({s})|");
        output
    });
    let regex = Regex::new(&format!("^(?:{})", &rstring[0..rstring.len() - 1]))?;
    Ok(Some(regex))
}

/// Section of a rules file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Irrelevant,
    Prefix,
    Sentinels,
}

/// Accumulates patterns and sentinels for a `RuleSet`.
#[derive(Clone, Debug, Default)]
pub struct RuleSetBuilder {
    irrelevant: Vec<String>,
    prefix: Vec<String>,
    line_numbers: Vec<String>,
    sentinels: Vec<Sentinel>,
}

impl RuleSetBuilder {
    /// Add an irrelevant frame pattern.
    pub fn irrelevant(mut self, pattern: &str) -> Self {
        self.irrelevant.push(pattern.to_string());
        self
    }

    /// Add a prefix frame pattern.
    pub fn prefix(mut self, pattern: &str) -> Self {
        self.prefix.push(pattern.to_string());
        self
    }

    /// Add a pattern for functions that keep their line number.
    pub fn line_number(mut self, pattern: &str) -> Self {
        self.line_numbers.push(pattern.to_string());
        self
    }

    /// Add a sentinel.
    pub fn sentinel(mut self, sentinel: Sentinel) -> Self {
        self.sentinels.push(sentinel);
        self
    }

    /// Append rules from the text of a rules file.
    ///
    /// The text is split into sections by `IRRELEVANT`, `PREFIX` and
    /// `SENTINELS` header lines. Every other non-empty line that does not
    /// start with `#` is a regular expression (or a sentinel signature for
    /// the `SENTINELS` section).
    ///
    /// # Arguments
    ///
    /// * `text` - rules file content
    pub fn rules(mut self, text: &str) -> Result<Self> {
        let mut section = None;
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line {
                "IRRELEVANT" => section = Some(Section::Irrelevant),
                "PREFIX" => section = Some(Section::Prefix),
                "SENTINELS" => section = Some(Section::Sentinels),
                _ => match section {
                    Some(Section::Irrelevant) => self.irrelevant.push(line.to_string()),
                    Some(Section::Prefix) => self.prefix.push(line.to_string()),
                    Some(Section::Sentinels) => {
                        self.sentinels.push(Sentinel::Plain(line.to_string()))
                    }
                    None => {
                        return Err(Error::Rules(format!(
                            "line {}: rule outside of IRRELEVANT, PREFIX or SENTINELS section",
                            idx + 1
                        )));
                    }
                },
            }
        }
        if section.is_none() {
            return Err(Error::Rules(
                "rules do not contain IRRELEVANT, PREFIX or SENTINELS section".to_string(),
            ));
        }
        Ok(self)
    }

    /// Compile the rule set.
    pub fn build(self) -> Result<RuleSet> {
        Ok(RuleSet {
            irrelevant: compile(&self.irrelevant)?,
            prefix: compile(&self.prefix)?,
            line_numbers: compile(&self.line_numbers)?,
            sentinels: self.sentinels,
        })
    }
}

/// Compiled, immutable rules for signature generation.
#[derive(Clone, Debug)]
pub struct RuleSet {
    irrelevant: Option<Regex>,
    prefix: Option<Regex>,
    line_numbers: Option<Regex>,
    sentinels: Vec<Sentinel>,
}

impl RuleSet {
    /// Rules built from the default tables, shared by all threads.
    pub fn default_rules() -> &'static RuleSet {
        &DEFAULT_RULES
    }

    /// Builder pre-filled with the default tables.
    pub fn builder() -> RuleSetBuilder {
        let to_vec = |patterns: &[&str]| -> Vec<String> {
            patterns.iter().map(|x| x.to_string()).collect()
        };
        let mut sentinels = SIGNATURE_SENTINELS
            .iter()
            .map(|x| Sentinel::Plain(x.to_string()))
            .collect::<Vec<_>>();
        sentinels.insert(
            1,
            Sentinel::Conditional {
                signature: RPC_CHANNEL_SENTINEL.to_string(),
                condition: not_paired_minidump,
            },
        );
        RuleSetBuilder {
            irrelevant: to_vec(IRRELEVANT_SIGNATURE_REGEXES),
            prefix: to_vec(PREFIX_SIGNATURE_REGEXES),
            line_numbers: to_vec(SIGNATURES_WITH_LINE_NUMBERS_REGEXES),
            sentinels,
        }
    }

    /// Default rules extended by a rules file.
    ///
    /// # Arguments
    ///
    /// * `path` - path to the rules file
    pub fn from_file(path: &Path) -> Result<RuleSet> {
        let text = fs::read_to_string(path)?;
        Self::builder()
            .rules(&text)
            .map_err(|err| Error::Rules(format!("{}: {err}", path.display())))?
            .build()
    }

    /// Check whether a frame signature is noise.
    pub fn is_irrelevant(&self, signature: &str) -> bool {
        self.irrelevant
            .as_ref()
            .map_or(false, |re| re.is_match(signature))
    }

    /// Check whether a frame signature must be coupled with the next frame.
    pub fn is_prefix(&self, signature: &str) -> bool {
        self.prefix
            .as_ref()
            .map_or(false, |re| re.is_match(signature))
    }

    /// Check whether a function keeps its line number in the signature.
    pub fn keeps_line_number(&self, function: &str) -> bool {
        self.line_numbers
            .as_ref()
            .map_or(false, |re| re.is_match(function))
    }

    /// Position of the earliest applicable sentinel in the signature list.
    fn sentinel_position(&self, signatures: &[String]) -> Option<usize> {
        self.sentinels
            .iter()
            .filter(|sentinel| sentinel.applies(signatures))
            .filter_map(|sentinel| signatures.iter().position(|x| x == sentinel.signature()))
            .min()
    }

    /// Reduce frame signatures to a signature list.
    ///
    /// # Arguments
    ///
    /// * `signatures` - frame signatures of the crashed thread, innermost first
    ///
    /// # Return value
    ///
    /// Socorro signature followed by at most four relevant frame signatures
    /// from below the reduced window. Never empty.
    pub fn reduce(&self, signatures: &[String]) -> Vec<String> {
        let start = self.sentinel_position(signatures).unwrap_or(0);
        if start > 0 {
            debug!("Sentinel {} drops {start} leading frames", signatures[start]);
        }
        let signatures = &signatures[start..];

        let mut reduced: Vec<&str> = Vec::new();
        let mut ignored = 0;
        let mut prefix_found = false;
        for signature in signatures {
            if self.is_irrelevant(signature) {
                // Noise after a prefix frame is part of the coupled frame.
                if prefix_found {
                    reduced.push(signature);
                } else {
                    ignored += 1;
                }
                continue;
            }
            reduced.push(signature);
            if !self.is_prefix(signature) {
                break;
            }
            prefix_found = true;
        }

        let socorro = reduced.join(" | ");
        let mut list = vec![if socorro.is_empty() {
            NO_SIGNATURE.to_string()
        } else {
            socorro
        }];
        list.extend(
            signatures
                .iter()
                .skip(reduced.len() + ignored)
                .filter(|signature| !self.is_irrelevant(signature))
                .take(MAX_SIGNATURE_LIST_LEN - 1)
                .cloned(),
        );
        list
    }
}

/// Reduce frame signatures with the default rules.
///
/// # Arguments
///
/// * `signatures` - frame signatures of the crashed thread, innermost first
pub fn signature_list(signatures: &[String]) -> Vec<String> {
    RuleSet::default_rules().reduce(signatures)
}

/// Deduplicate crash signatures
///
/// # Arguments
///
/// * `signatures` - slice of socorro signatures
///
/// # Return value
///
/// A vector of the same length as `signatures`.
/// Vec\[i\] is false, if signature i is a duplicate of an earlier element.
pub fn dedup_signatures(signatures: &[String]) -> Vec<bool> {
    let mut seen = HashSet::new();
    signatures
        .iter()
        .map(|signature| seen.insert(signature.as_str()))
        .collect()
}
