use crate::breakpad;
use crate::signature::RuleSet;
use crate::stacktrace::Frame;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed crash report with its crash signature.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct CrashReport {
    /// Operating system name.
    #[serde(default)]
    pub operating_system: String,
    /// Operating system version line.
    #[serde(default)]
    pub operating_system_version: String,
    /// CPU architecture (x86, amd64, ppc...).
    #[serde(default)]
    pub cpu_type: String,
    /// CPU vendor, family, model and stepping, if reported.
    #[serde(default)]
    pub cpu_family: String,
    #[serde(default)]
    pub cpu_count: String,
    /// Signal or exception name.
    #[serde(default)]
    pub crash_reason: String,
    #[serde(default)]
    pub crash_address: String,
    /// Number of the crashed thread.
    #[serde(default)]
    pub crashing_thread: String,
    /// Frames of the crashed thread.
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Parse trace.
    #[serde(default)]
    pub messages: Vec<String>,
    /// Socorro signature followed by up to four more frame signatures.
    #[serde(default)]
    pub signature_list: Vec<String>,
}

impl CrashReport {
    /// Parse a `minidump_stackwalk` report and compute its signature with the
    /// default rules.
    ///
    /// # Arguments
    ///
    /// * `text` - report text
    pub fn from_breakpad(text: &str) -> Self {
        Self::from_breakpad_with_rules(text, RuleSet::default_rules())
    }

    /// Parse a `minidump_stackwalk` report and compute its signature.
    ///
    /// # Arguments
    ///
    /// * `text` - report text
    ///
    /// * `rules` - signature rules
    pub fn from_breakpad_with_rules(text: &str, rules: &RuleSet) -> Self {
        let parsed = breakpad::parse_report(text, rules);
        let signature_list = rules.reduce(&parsed.frame_signatures());
        CrashReport {
            operating_system: parsed.operating_system,
            operating_system_version: parsed.operating_system_version,
            cpu_type: parsed.cpu_type,
            cpu_family: parsed.cpu_family,
            cpu_count: parsed.cpu_count,
            crash_reason: parsed.crash_reason,
            crash_address: parsed.crash_address,
            crashing_thread: parsed.crashing_thread,
            frames: parsed.frames,
            messages: parsed.messages,
            signature_list,
        }
    }

    /// Socorro signature of the crash.
    pub fn signature(&self) -> &str {
        self.signature_list
            .first()
            .map_or(crate::constants::NO_SIGNATURE, String::as_str)
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut report = String::new();

        if !self.operating_system.is_empty() {
            report += &format!(
                "Operating system: {} {}\n",
                self.operating_system, self.operating_system_version
            );
        }
        if !self.cpu_type.is_empty() {
            report += &format!("CPU: {}", self.cpu_type);
            if !self.cpu_family.is_empty() {
                report += &format!(" ({})", self.cpu_family);
            }
            if !self.cpu_count.is_empty() {
                report += &format!(", {} CPU", self.cpu_count);
            }
            report += "\n";
        }
        if !self.crash_reason.is_empty() {
            report += &format!("Crash reason: {}\n", self.crash_reason);
        }
        if !self.crash_address.is_empty() {
            report += &format!("Crash address: {}\n", self.crash_address);
        }
        if !self.crashing_thread.is_empty() {
            report += &format!("Crashed thread: {}\n", self.crashing_thread);
        }

        report += &format!("Signature: {}\n", self.signature());
        for (idx, signature) in self.signature_list.iter().enumerate().skip(1) {
            report += &format!("    {idx}. {signature}\n");
        }

        if !self.frames.is_empty() {
            report += "\n===Stacktrace===\n";
            for frame in &self.frames {
                report += &format!("{frame}\n");
            }
        }

        write!(f, "{}", report.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacktrace::FrameKind;

    fn purecall_report() -> String {
        [
            "Operating system: Windows NT",
            "                  6.1.7600 ",
            "CPU: x86",
            "     GenuineIntel family 6 model 15 stepping 11",
            "     2 CPUs",
            "",
            "Crash reason:  EXCEPTION_ACCESS_VIOLATION_READ",
            "Crash address: 0x0",
            "",
            "Thread 0 (crashed)",
            " 0  0x1c",
            "    eip = 0x0000001c   esp = 0x0012ebb0",
            "    Found by: given as instruction pointer in context",
            " 1  mozcrt19.dll + 0x1e8a",
            "    Found by: stack scanning",
            " 2  mozcrt19.dll!_purecall [purevirt.c : 56 + 0x5]",
            "    Found by: stack scanning",
            " 3  xul.dll!JS_Assert [jsutil.cpp : 77 + 0x0]",
            "    Found by: call frame info",
            " 4  libxul.so!Foo::Bar() [file.cpp : 1 + 0x1]",
            "    Found by: call frame info",
            " 5  xul.dll!nsAppShell::Run() [nsAppShell.cpp : 190 + 0x6]",
            "    Found by: call frame info",
            "",
        ]
        .join("\n")
    }

    #[test]
    fn test_purecall_signature() {
        let report = CrashReport::from_breakpad(&purecall_report());
        assert_eq!(report.frames.len(), 6);
        assert_eq!(report.operating_system_version, "6.1.7600");
        assert_eq!(
            report.signature_list,
            vec!["_purecall | JS_Assert | Foo::Bar()", "nsAppShell::Run()"]
        );
        assert_eq!(report.signature(), "_purecall | JS_Assert | Foo::Bar()");
    }

    #[test]
    fn test_empty_report() {
        let report = CrashReport::from_breakpad("");
        assert!(report.frames.is_empty());
        assert_eq!(report.signature_list, vec!["(no signature)"]);
        assert!(!report.messages.is_empty());
    }

    #[test]
    fn test_no_frames() {
        let tests = [
            "not a crash report at all",
            "Operating system: Linux\n 0.0.0\nCPU: x86\n     1 CPU\n\nCrash reason:  SIGSEGV\n",
            "\n\n\n",
            "Thread 0 (crashed)\n 0  libxul.so!Foo::Bar()\n",
        ];
        for text in tests {
            let report = CrashReport::from_breakpad(text);
            assert!(report.frames.is_empty(), "input: {text:?}");
            assert_eq!(report.signature_list, vec!["(no signature)"]);
        }
    }

    #[test]
    fn test_module_frame_with_source() {
        let text = [
            "Operating system: Linux",
            "                  0.0.0 Linux 2.6.31",
            "CPU: x86",
            "     1 CPU",
            "",
            "Crash reason:  SIGSEGV",
            "Crash address: 0x0",
            "",
            "Thread 0 (crashed)",
            " 3  libxul.so!nsEditor::InstallEventListeners() [nsEditor.cpp : 375 + 0x67]",
            "    Found by: call frame info",
            "10  libpthread-2.5.so + 0xa9c4",
            "    Found by: stack scanning",
            "",
        ]
        .join("\n");
        let report = CrashReport::from_breakpad(&text);
        assert_eq!(
            report.frames[0].kind,
            FrameKind::Module {
                module: "libxul.so".to_string(),
                function: "nsEditor::InstallEventListeners()".to_string(),
                filename: Some("nsEditor.cpp".to_string()),
                linenumber: Some("375".to_string()),
            }
        );
        assert_eq!(
            report.frames[0].frame_signature,
            "nsEditor::InstallEventListeners()"
        );
        assert_eq!(report.frames[1].frame_signature, "libpthread-2.5.so@0xa9c4");
        // System library frames never make it into the signature list.
        assert_eq!(
            report.signature_list,
            vec!["nsEditor::InstallEventListeners()"]
        );
    }

    #[test]
    fn test_total_on_odd_input() {
        let tests = [
            "\u{0}\u{1}\u{2}",
            "Operating system: \nCPU: \n",
            "Thread 99999999999 (crashed)",
            "Operating system: X\nv\nCPU: y\n 1 CPU\n\nCrash reason:  a\nCrash address: \n\nThread 0 (crashed)\n 99999999999  0x1\n",
            "Operating system: X\nv\nCPU: y\n 1 CPU\n\nCrash reason:  a\nCrash address: \n\nThread 0 (crashed)\n 0  m!\n",
            "\r\n\r\n",
        ];
        for text in tests {
            let report = CrashReport::from_breakpad(text);
            assert!(!report.signature_list.is_empty(), "input: {text:?}");
            assert!(report.signature_list.len() <= 5, "input: {text:?}");
            assert!(!report.messages.is_empty(), "input: {text:?}");
        }
    }

    #[test]
    fn test_total_on_generated_input() {
        let fragments = [
            "Operating system: Linux",
            "                  0.0.0 Linux 2.6.31",
            "CPU: x86",
            "     GenuineIntel family 6 model 15 stepping 11",
            "     2 CPUs",
            "",
            "   ",
            "Crash reason:  SIGSEGV",
            "Crash address: 0x0",
            "Thread 0 (crashed)",
            " 0  0x1c",
            " 1  mozcrt19.dll + 0x1e8a",
            " 2  mozcrt19.dll!_purecall [purevirt.c : 56 + 0x5]",
            " 3  xul.dll!JS_Assert [jsutil.cpp : 77 + 0x0]",
            " 4  libc.so.6!malloc",
            " 5  libxul.so!Foo<42, 1u>::Bar(int *,char)",
            " 6  xul.dll!mozilla::ipc::RPCChannel::Call()",
            " 7  libxul.so!nsAppShell::Run() [nsAppShell.cpp : 190 + 0x6]",
            " 8  libpthread-2.5.so + 0xa9c4",
            "    eip = 0x0000001c   esp = 0x0012ebb0",
            "    Found by: stack scanning",
            "garbage line !! + 0x",
        ];

        // Linear congruential generator, fixed seed.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: usize| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((seed >> 33) as usize) % bound
        };

        for _ in 0..2000 {
            let count = next(40);
            let text = (0..count)
                .map(|_| fragments[next(fragments.len())])
                .collect::<Vec<_>>()
                .join("\n");
            let report = CrashReport::from_breakpad(&text);
            assert!(!report.signature_list.is_empty(), "input: {text:?}");
            assert!(report.signature_list.len() <= 5, "input: {text:?}");
            assert!(!report.messages.is_empty(), "input: {text:?}");
        }
    }

    #[test]
    fn test_serialize_keys() {
        let report = CrashReport::from_breakpad(&purecall_report());
        let value = serde_json::to_value(&report).unwrap();
        for key in [
            "operating_system",
            "operating_system_version",
            "cpu_type",
            "cpu_family",
            "cpu_count",
            "crash_reason",
            "crash_address",
            "crashing_thread",
            "frames",
            "messages",
            "signature_list",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["frames"][0]["frame_type"], "Address");
        assert_eq!(value["frames"][0]["registers"]["eip"], "0x0000001c");
        assert_eq!(value["frames"][2]["frame_type"], "Module");
        assert_eq!(value["frames"][2]["filename"], "purevirt.c");
        assert_eq!(value["frames"][1]["library"], "mozcrt19.dll");
    }

    #[test]
    fn test_display() {
        let report = CrashReport::from_breakpad(&purecall_report());
        let text = report.to_string();
        assert!(text.starts_with("Operating system: Windows NT 6.1.7600\n"));
        assert!(text.contains("CPU: x86 (GenuineIntel family 6 model 15 stepping 11), 2 CPU\n"));
        assert!(text.contains("Signature: _purecall | JS_Assert | Foo::Bar()\n    1. nsAppShell::Run()\n"));
        assert!(text.contains(" 2  mozcrt19.dll!_purecall [purevirt.c : 56]"));
        assert!(text.ends_with(" 5  xul.dll!nsAppShell::Run() [nsAppShell.cpp : 190]"));
    }
}
