//! TypeScript to JavaScript lowering using SWC.
//!
//! Runs the resolver and TypeScript strip passes and emits ES module
//! JavaScript that Node can execute directly as `.mjs`. No bundling and no
//! type checking: type errors are the editor's business, only syntax errors
//! stop a run.

use swc_common::{sync::Lrc, FileName, Mark, SourceMap, Spanned, GLOBALS};
use swc_ecma_ast::{EsVersion, Pass, Program};
use swc_ecma_codegen::{text_writer::JsWriter, Config, Emitter};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_transforms_base::resolver;
use swc_ecma_transforms_typescript::strip;

/// Errors from the compile step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    /// Source did not parse; message carries line, excerpt and caret
    #[error("{message}")]
    Parse { line: usize, message: String },
    #[error("Emit error: {0}")]
    Emit(String),
    #[error("UTF-8 error: {0}")]
    Utf8(String),
}

/// Transpile TypeScript source to JavaScript.
pub fn transpile(ts_code: &str) -> Result<String, TranspileError> {
    GLOBALS.set(&Default::default(), || transpile_inner(ts_code))
}

fn transpile_inner(ts_code: &str) -> Result<String, TranspileError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom("input.ts".into())),
        ts_code.to_string(),
    );
    let file_start = fm.start_pos.0 as usize;

    let syntax = Syntax::Typescript(TsSyntax {
        tsx: false,
        decorators: true,
        ..Default::default()
    });

    let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| format_parse_error(ts_code, file_start, e))?;

    if let Some(err) = parser.take_errors().into_iter().next() {
        return Err(format_parse_error(ts_code, file_start, err));
    }

    let unresolved_mark = Mark::new();
    let top_level_mark = Mark::new();
    let mut program = Program::Module(module);

    // Resolver first so strip can tell type-only imports from value imports
    let mut resolve = resolver(unresolved_mark, top_level_mark, true);
    resolve.process(&mut program);

    let mut pass = strip(unresolved_mark, top_level_mark);
    pass.process(&mut program);

    let module = match program {
        Program::Module(m) => m,
        Program::Script(_) => return Err(TranspileError::Emit("expected module".to_string())),
    };

    let mut buf = vec![];
    {
        let mut emitter = Emitter {
            cfg: Config::default(),
            cm: cm.clone(),
            comments: None,
            wr: JsWriter::new(cm.clone(), "\n", &mut buf, None),
        };

        emitter
            .emit_module(&module)
            .map_err(|e| TranspileError::Emit(format!("{:?}", e)))?;
    }

    String::from_utf8(buf).map_err(|e| TranspileError::Utf8(e.to_string()))
}

// ============================================================================
// ERROR FORMATTING
// ============================================================================

/// Build a parse error with code context and a human-readable description
fn format_parse_error(
    source: &str,
    file_start: usize,
    err: swc_ecma_parser::error::Error,
) -> TranspileError {
    // Span offsets do not count a leading BOM
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    let span = err.span();
    let lo = (span.lo.0 as usize).saturating_sub(file_start).min(source.len());

    let mut line_num = 1;
    let mut line_start = 0;
    for (i, c) in source.char_indices() {
        if i >= lo {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }
    let col = source[line_start..lo].chars().count();

    let line_content: &str = source[line_start..].lines().next().unwrap_or("");
    let caret = format!("{}^", " ".repeat(col));

    let err_msg = format!("{:?}", err);
    let readable_msg = extract_readable_error(&err_msg);

    TranspileError::Parse {
        line: line_num,
        message: format!(
            "Parse error at line {}:\n  {}\n  {}\n{}",
            line_num, line_content, caret, readable_msg
        ),
    }
}

/// Extract a human-readable message from SWC error debug output
fn extract_readable_error(err_debug: &str) -> String {
    const KNOWN: [(&str, &str); 10] = [
        ("TS1109", "Expression expected"),
        (
            "TS1005",
            "Expected token (likely missing semicolon, comma, or bracket)",
        ),
        ("TS1002", "Unterminated string literal"),
        ("TS1003", "Identifier expected"),
        ("TS1128", "Declaration or statement expected"),
        ("TS1136", "Property assignment expected"),
        ("TS1160", "Tagged template expressions not allowed here"),
        ("TS2304", "Cannot find name"),
        ("TS1161", "Unterminated regular expression literal"),
        (
            "Eof",
            "Unexpected end of file (likely missing closing bracket or quote)",
        ),
    ];

    if let Some((_, msg)) = KNOWN.iter().find(|(code, _)| err_debug.contains(code)) {
        return msg.to_string();
    }

    if let Some(msg_start) = err_debug.find("message:") {
        let rest = &err_debug[msg_start + 8..];
        if let Some(end) = rest.find([',', '}']) {
            return rest[..end].trim().trim_matches('"').to_string();
        }
    }

    "Syntax error".to_string()
}
