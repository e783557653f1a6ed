//! Stack frame types and frame signature normalization.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::signature::RuleSet;

lazy_static::lazy_static! {
    // Spaces in front of a pointer, reference or comma.
    static ref FIXUP_SPACE: Regex = Regex::new(r" +([*&,])").unwrap();
    // Integer template argument: Foo<42>, Bar<T, 1u>.
    static ref FIXUP_INTEGER: Regex = Regex::new(r"(<|, )(\d+)[uUlL]?(\W)").unwrap();
}

/// Kind-specific part of a stack frame.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "frame_type")]
pub enum FrameKind {
    /// Symbolicated frame: `module!function [file : line + 0xoff]`.
    Module {
        module: String,
        function: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        linenumber: Option<String>,
    },
    /// Library and offset: `libfoo.so + 0x1234`.
    Library { library: String, offset: String },
    /// Bare address: `0xdeadbeef`.
    Address { address: String },
}

/// One frame of the crashed thread.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame number as printed in the report.
    pub frame_number: u32,
    #[serde(flatten)]
    pub kind: FrameKind,
    /// Normalized signature, the only field used for reduction.
    pub frame_signature: String,
    /// Register values attached to the frame.
    #[serde(default)]
    pub registers: BTreeMap<String, String>,
}

impl Frame {
    /// Create a symbolicated frame and derive its signature.
    ///
    /// # Arguments
    ///
    /// * `frame_number` - frame number from the report
    ///
    /// * `module` - module name
    ///
    /// * `function` - function name with arguments
    ///
    /// * `source` - optional file name and line number
    ///
    /// * `rules` - rules that decide which functions keep their line number
    pub fn module(
        frame_number: u32,
        module: &str,
        function: &str,
        source: Option<(&str, &str)>,
        rules: &RuleSet,
    ) -> Self {
        let signature = match source {
            Some((_, line)) if rules.keeps_line_number(function) => {
                format!("{function}:{line}")
            }
            _ => function.to_string(),
        };
        Frame {
            frame_number,
            kind: FrameKind::Module {
                module: module.to_string(),
                function: function.to_string(),
                filename: source.map(|(file, _)| file.to_string()),
                linenumber: source.map(|(_, line)| line.to_string()),
            },
            frame_signature: normalize_signature(&signature),
            registers: BTreeMap::new(),
        }
    }

    /// Create a library frame: signature is `library@offset`.
    pub fn library(frame_number: u32, library: &str, offset: &str) -> Self {
        Frame {
            frame_number,
            kind: FrameKind::Library {
                library: library.to_string(),
                offset: offset.to_string(),
            },
            frame_signature: format!("{library}@{offset}"),
            registers: BTreeMap::new(),
        }
    }

    /// Create a bare address frame: signature is `@address`.
    pub fn address(frame_number: u32, address: &str) -> Self {
        Frame {
            frame_number,
            kind: FrameKind::Address {
                address: address.to_string(),
            },
            frame_signature: format!("@{address}"),
            registers: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            FrameKind::Module {
                module,
                function,
                filename: Some(file),
                linenumber: Some(line),
            } => write!(
                f,
                "{:2}  {module}!{function} [{file} : {line}]",
                self.frame_number
            ),
            FrameKind::Module {
                module, function, ..
            } => write!(f, "{:2}  {module}!{function}", self.frame_number),
            FrameKind::Library { library, offset } => {
                write!(f, "{:2}  {library} + {offset}", self.frame_number)
            }
            FrameKind::Address { address } => write!(f, "{:2}  {address}", self.frame_number),
        }
    }
}

/// Normalize a C++ function signature so that frames from different builds
/// compare equal.
///
/// Removes spaces before `*`, `&` and `,`, puts exactly one space after each
/// comma and replaces integer template arguments with `int`.
///
/// # Arguments
///
/// * `signature` - function signature
///
/// # Return value
///
/// Normalized signature
pub fn normalize_signature(signature: &str) -> String {
    let signature = FIXUP_SPACE.replace_all(signature, "$1");

    let mut spaced = String::with_capacity(signature.len() + 8);
    let mut chars = signature.chars().peekable();
    while let Some(c) = chars.next() {
        spaced.push(c);
        if c == ',' && chars.peek() != Some(&' ') {
            spaced.push(' ');
        }
    }

    // Adjacent arguments share the ", " separator, so one pass is not enough.
    let mut normalized = spaced;
    while let Cow::Owned(next) = FIXUP_INTEGER.replace_all(&normalized, "${1}int${3}") {
        normalized = next;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_signature() {
        let tests = [
            ("Foo<42>::Bar()", "Foo<int>::Bar()"),
            ("Foo<42, 1u>", "Foo<int, int>"),
            ("Foo<7L,3>::Baz(int)", "Foo<int, int>::Baz(int)"),
            ("nsAString_internal::Assign(nsAString_internal const &)", "nsAString_internal::Assign(nsAString_internal const&)"),
            ("f(char *, int  *)", "f(char*, int*)"),
            ("T  &", "T&"),
            ("a   ,b", "a, b"),
            ("f(a,b)", "f(a, b)"),
            ("f(a ,b)", "f(a, b)"),
            ("nsTArray<unsigned int>::Length()", "nsTArray<unsigned int>::Length()"),
            ("Foo<42", "Foo<42"),
            ("Vec<3x>", "Vec<3x>"),
            ("", ""),
        ];
        for (input, expected) in tests {
            assert_eq!(normalize_signature(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_normalize_signature_idempotent() {
        let tests = [
            "Foo<42, 1u>",
            "a,,b",
            "g(char * , int &,long)",
            "js::HashMap<int,3,7UL>::lookup(JSObject *)",
            "Foo<1, 2, 3, 4>::Bar<5>()",
            "f(char *, int  *)",
            "a  ,b",
            "T  &",
            "Foo<1  ,2 ,  3>",
        ];
        for input in tests {
            let once = normalize_signature(input);
            assert_eq!(normalize_signature(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_module_frame_signature() {
        let rules = RuleSet::default_rules();
        let frame = Frame::module(
            3,
            "libxul.so",
            "nsEditor::InstallEventListeners()",
            Some(("nsEditor.cpp", "375")),
            rules,
        );
        assert_eq!(frame.frame_signature, "nsEditor::InstallEventListeners()");

        let frame = Frame::module(
            0,
            "libmozjs.so",
            "js_Interpret",
            Some(("jsinterp.cpp", "3178")),
            rules,
        );
        assert_eq!(frame.frame_signature, "js_Interpret:3178");

        let frame = Frame::module(0, "libmozjs.so", "js_Interpret", None, rules);
        assert_eq!(frame.frame_signature, "js_Interpret");

        let frame = Frame::module(1, "xul.dll", "Foo<12>::Bar(int *,char)", None, rules);
        assert_eq!(frame.frame_signature, "Foo<int>::Bar(int*, char)");
        assert_eq!(
            frame.kind,
            FrameKind::Module {
                module: "xul.dll".to_string(),
                function: "Foo<12>::Bar(int *,char)".to_string(),
                filename: None,
                linenumber: None,
            }
        );
    }

    #[test]
    fn test_library_and_address_frames() {
        let frame = Frame::library(10, "libpthread-2.5.so", "0xa9c4");
        assert_eq!(frame.frame_signature, "libpthread-2.5.so@0xa9c4");
        assert_eq!(frame.to_string(), "10  libpthread-2.5.so + 0xa9c4");

        let frame = Frame::address(2, "0xdeadbeef");
        assert_eq!(frame.frame_signature, "@0xdeadbeef");
        assert_eq!(frame.to_string(), " 2  0xdeadbeef");
    }
}
