//! Runtime console shim and entry composition.
//!
//! The shim is an ES module evaluated before any user code. It re-routes the
//! console methods through the stdout tag protocol and turns uncaught errors
//! and unhandled rejections into error-tagged lines. The entry runs as ESM,
//! so the shim also installs a global `require` for CommonJS-style snippets.

use crate::protocol::{LogMethod, LINE_MARKER_PREFIX, LINE_MARKER_SUFFIX, TAG_SEPARATOR};

/// File the shim is written to, next to the entry file.
pub const SHIM_FILE_NAME: &str = "__tsplay_shim.mjs";

/// JavaScript source of the console shim.
///
/// `format` from `node:util` flattens the arguments the same way Node's own
/// console does. A flattened message containing newlines is split so every
/// physical line is tagged on its own; a leading line marker is repeated on
/// each of them.
pub fn runtime_shim() -> String {
    let marker_re = format!(
        "^{}\\d+{}$",
        regex_escape(LINE_MARKER_PREFIX),
        regex_escape(LINE_MARKER_SUFFIX)
    );

    format!(
        r#"import {{ createRequire }} from "node:module";
import {{ format }} from "node:util";

if (typeof globalThis.require === "undefined") {{
    globalThis.require = createRequire(import.meta.url);
}}

const __tsplayWrite = console.log.bind(console);
const __tsplayMarker = /{marker_re}/;

function __tsplayEmit(tag, args) {{
    let marker = "";
    if (args.length > 0 && typeof args[0] === "string" && __tsplayMarker.test(args[0])) {{
        marker = args[0] + "{sep}";
        args = args.slice(1);
    }}
    const msg = format(...args);
    for (const line of msg.split("\n")) {{
        __tsplayWrite(tag + "{sep}" + marker + line);
    }}
}}

console.log = (...args) => __tsplayEmit("{log}", args);
console.debug = (...args) => __tsplayEmit("{log}", args);
console.info = (...args) => __tsplayEmit("{info}", args);
console.warn = (...args) => __tsplayEmit("{warn}", args);
console.error = (...args) => __tsplayEmit("{error}", args);

process.on("uncaughtException", (err) => {{
    __tsplayEmit("{error}", ["Uncaught Exception:", err]);
    process.exit(1);
}});

process.on("unhandledRejection", (reason) => {{
    __tsplayEmit("{error}", ["Unhandled Rejection:", reason]);
}});
"#,
        marker_re = marker_re,
        sep = TAG_SEPARATOR,
        log = LogMethod::Log.tag(),
        info = LogMethod::Info.tag(),
        warn = LogMethod::Warn.tag(),
        error = LogMethod::Error.tag(),
    )
}

/// Prepend the shim import to compiled user code.
pub fn compose_entry(compiled: &str) -> String {
    format!("import \"./{}\";\n{}", SHIM_FILE_NAME, compiled)
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if "\\^$.|?*+()[]{}/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
