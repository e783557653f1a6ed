//! Default rule tables for crash signature generation.
//!
//! Every pattern is matched against a frame signature from its first
//! character on (the match is anchored at the start but not at the end), so
//! `libc-2\.5\.so@0x.*` covers any offset inside that library.

/// Regular expressions for frame signatures that carry no information about
/// the crash site (raw addresses, OS wait primitives, exception plumbing).
pub const IRRELEVANT_SIGNATURE_REGEXES: &[&str] = &[
    // Unsymbolicated addresses.
    r"@0x[0-9a-fA-F]{2,}",
    r"@0x[1-9a-fA-F]",
    // Exception plumbing.
    r"RaiseException",
    r"_CxxThrowException",
    r"_NSRaiseError",
    r"___TERMINATING_DUE_TO_UNCAUGHT_EXCEPTION___",
    r"google_breakpad::ExceptionHandler::HandleInvalidParameter.*",
    r"mozilla::ipc::RPCChannel::Call\(IPC::Message\*, IPC::Message\*\)",
    // Wait primitives.
    r"KiFastSystemCallRet",
    r"(Nt|Zw)?WaitForSingleObject(Ex)?",
    r"(Nt|Zw)?WaitForMultipleObjects(Ex)?",
    r"WaitForSingleObjectExImplementation",
    r"WaitForMultipleObjectsExImplementation",
    r"RealMsgWaitFor.*",
    // System libraries without symbols.
    r"mozcrt19\.dll@0x.*",
    r"ntdll\.dll@0x.*",
    r"kernel32\.dll@0x.*",
    r"user32\.dll@0x.*",
    r"linux-gate\.so@0x.*",
    r"libc\.so@.*",
    r"libc-2\.5\.so@.*",
    r"libpthread-2\.5\.so@.*",
    r"libSystem\.B\.dylib@0x.*",
];

/// Regular expressions for frame signatures that are never the interesting
/// crash site on their own and are always reported together with the next
/// frame (allocator internals, string primitives, smart pointers).
pub const PREFIX_SIGNATURE_REGEXES: &[&str] = &[
    r"@0x0",
    // String and memory primitives.
    r"strchr",
    r"strstr",
    r"strlen",
    r"PL_strlen",
    r"strcmp",
    r"strncmp",
    r"wcslen",
    r"memcpy",
    r"memmove",
    r"memcmp",
    r"memset",
    // Allocators.
    r"malloc",
    r"calloc",
    r"realloc",
    r"free",
    r"arena_.*",
    r"je_.*",
    r"moz_xmalloc",
    r"moz_xrealloc",
    r"moz_xcalloc",
    r"mozalloc_handle_oom",
    r"NS_ABORT_OOM.*",
    r"js_NewGCThing",
    r"js_GetGCThingTraceKind",
    // Assertions and aborts.
    r"_purecall",
    r".*abort",
    r"JS_Assert",
    r"NS_DebugBreak.*",
    r"nsObjCExceptionLogAbort(.*?)",
    r"objc_msgSend",
    // Atomics and locks.
    r"PR_AtomicIncrement",
    r"PR_AtomicDecrement",
    r"PR_AtomicAdd",
    r"PR_Lock",
    r"PR_Unlock",
    r"RtlpWaitOnCriticalSection",
    r"RtlEnterCriticalSection",
    r"EnterCriticalSection",
    // Reference counting and smart pointers.
    r"NS_Log.*",
    r"nsCOMPtr_base::assign_from_qi",
    r"nsCOMPtr<.*>::~nsCOMPtr\(\)",
    r"nsRefPtr<.*>::~nsRefPtr\(\)",
    r"nsCycleCollectingAutoRefCnt::decr\(nsISupports\*\)",
    // Containers.
    r"nsTArray_base<.*",
    r"nsTArray<.*",
];

/// Regular expressions for functions whose signature keeps the source line.
pub const SIGNATURES_WITH_LINE_NUMBERS_REGEXES: &[&str] = &[r"js_Interpret"];

/// Frame signatures that unambiguously mark the start of the interesting part
/// of a stack.
pub const SIGNATURE_SENTINELS: &[&str] = &[
    "_purecall",
    "Java_org_mozilla_gecko_GeckoAppShell_reportJavaCrash",
    "google_breakpad::ExceptionHandler::HandleInvalidParameter(wchar_t const*, wchar_t const*, wchar_t const*, unsigned int, unsigned int)",
];

/// Sentinel that only counts when the stack was not produced by a deliberate
/// paired minidump (see `PAIRED_MINIDUMP_SIGNATURE`).
pub const RPC_CHANNEL_SENTINEL: &str =
    "mozilla::ipc::RPCChannel::Call(IPC::Message*, IPC::Message*)";

/// Signature of the function that writes paired minidumps for hung plugins.
pub const PAIRED_MINIDUMP_SIGNATURE: &str =
    "CrashReporter::CreatePairedMinidumps(void*, unsigned long, nsAString_internal*, nsILocalFile**, nsILocalFile**)";

/// Socorro signature used when no frame survives reduction.
pub const NO_SIGNATURE: &str = "(no signature)";

/// Maximum length of a signature list (the socorro signature included).
pub const MAX_SIGNATURE_LIST_LEN: usize = 5;
