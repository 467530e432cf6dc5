//! Line-marker annotation of console calls.
//!
//! Every `console.<log|info|warn|error|debug>(arg, ...)` call receives an extra
//! leading string argument `"[LINE_MARKER:<N>]"`, where `N` is the 1-based line
//! the call expression starts on. The rewrite is a raw string splice keyed off
//! AST offsets, so the surrounding source keeps its exact formatting and every
//! unrelated token stays on its original line.
//!
//! Annotation is best-effort: input that does not parse is returned unchanged,
//! the compile step reports the syntax error on its own.

use swc_common::{sync::Lrc, BytePos, FileName, SourceMap, Spanned, GLOBALS};
use swc_ecma_ast::{CallExpr, Callee, EsVersion, Expr, MemberProp};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_visit::{Visit, VisitWith};

use crate::protocol::line_marker;

/// Dropped by the source map when it leads the file.
const BOM: char = '\u{FEFF}';

/// Console methods whose call sites are annotated.
pub const CONSOLE_METHODS: [&str; 5] = ["log", "info", "warn", "error", "debug"];

/// Result of annotating a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Source with markers spliced in
    pub code: String,
    /// Source lines that received a marker, in source order
    pub markers: Vec<u32>,
}

/// A pending splice into the original text.
#[derive(Debug, Clone, Copy)]
struct Insertion {
    /// Byte offset of the first argument in the original source
    offset: usize,
    /// 1-based line of the call expression
    line: u32,
}

/// Walks the tree collecting one insertion per matching call site.
struct ConsoleCallCollector<'a> {
    cm: &'a SourceMap,
    file_start: BytePos,
    /// Bytes the source map dropped from the front (a UTF-8 BOM)
    skipped: usize,
    insertions: Vec<Insertion>,
}

impl Visit for ConsoleCallCollector<'_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if is_console_call(call) {
            if let Some(first) = call.args.first() {
                let arg_start = match first.spread {
                    Some(spread) => spread.lo,
                    None => first.expr.span_lo(),
                };
                let line = self.cm.lookup_char_pos(call.span.lo).line;
                self.insertions.push(Insertion {
                    offset: (arg_start.0 - self.file_start.0) as usize + self.skipped,
                    line: line as u32,
                });
            }
        }

        // Arguments may themselves contain console calls
        call.visit_children_with(self);
    }
}

/// `console.<method>(...)` with a plain identifier object and a known method name.
fn is_console_call(call: &CallExpr) -> bool {
    let Callee::Expr(callee) = &call.callee else {
        return false;
    };
    let Expr::Member(member) = &**callee else {
        return false;
    };
    let Expr::Ident(obj) = &*member.obj else {
        return false;
    };
    let MemberProp::Ident(prop) = &member.prop else {
        return false;
    };

    &*obj.sym == "console" && CONSOLE_METHODS.contains(&&*prop.sym)
}

/// Inject line markers into console calls. Returns `source` unchanged if it
/// does not parse.
pub fn annotate(source: &str) -> String {
    annotate_with_report(source).code
}

/// Like [`annotate`], also reporting which lines were marked.
pub fn annotate_with_report(source: &str) -> Annotation {
    GLOBALS.set(&Default::default(), || annotate_inner(source))
}

fn annotate_inner(source: &str) -> Annotation {
    let unchanged = || Annotation {
        code: source.to_string(),
        markers: Vec::new(),
    };

    if source.is_empty() {
        return unchanged();
    }

    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom("input.ts".into())),
        source.to_string(),
    );

    let syntax = Syntax::Typescript(TsSyntax {
        tsx: false,
        decorators: true,
        ..Default::default()
    });
    let lexer = Lexer::new(syntax, EsVersion::EsNext, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let program = match parser.parse_program() {
        Ok(program) => program,
        Err(err) => {
            tracing::debug!(error = ?err.kind(), "annotate: parse failed, leaving source untouched");
            return unchanged();
        }
    };
    let recovered = parser.take_errors();
    if !recovered.is_empty() {
        tracing::debug!(
            errors = recovered.len(),
            "annotate: recovered parse errors, leaving source untouched"
        );
        return unchanged();
    }

    let mut collector = ConsoleCallCollector {
        cm: &cm,
        file_start: fm.start_pos,
        skipped: if source.starts_with(BOM) { BOM.len_utf8() } else { 0 },
        insertions: Vec::new(),
    };
    program.visit_with(&mut collector);

    let mut insertions = collector.insertions;
    let mut markers: Vec<u32> = insertions.iter().map(|i| i.line).collect();
    markers.sort_unstable();

    // Highest offset first: lower offsets stay valid while splicing
    insertions.sort_by(|a, b| b.offset.cmp(&a.offset));

    let mut code = source.to_string();
    for insertion in &insertions {
        if insertion.offset > code.len() || !code.is_char_boundary(insertion.offset) {
            continue;
        }
        let text = format!("\"{}\", ", line_marker(insertion.line));
        code.insert_str(insertion.offset, &text);
    }

    Annotation { code, markers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_line_log() {
        let out = annotate("console.log('test');");
        assert_eq!(out, "console.log(\"[LINE_MARKER:1]\", 'test');");
    }

    #[test]
    fn test_lines_follow_source() {
        let input = "\nconsole.log('Hello');\nconst x = 5;\nconsole.info('Value:', x);\n";
        let out = annotate(input);
        assert!(
            out.contains("console.log(\"[LINE_MARKER:2]\", 'Hello');"),
            "Got: {}",
            out
        );
        assert!(
            out.contains("console.info(\"[LINE_MARKER:4]\", 'Value:', x);"),
            "Got: {}",
            out
        );
    }

    #[test]
    fn test_every_console_method() {
        let input = "console.error(\"e\");\nconsole.warn(\"w\");\nconsole.debug(\"d\");";
        let report = annotate_with_report(input);
        assert_eq!(report.markers, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_arguments_untouched() {
        let input = "console.log();\nconsole.error();";
        assert_eq!(annotate(input), input);
    }

    #[test]
    fn test_other_receivers_untouched() {
        let input = "logger.log(1);\nconsole.table([1]);\nconsole?.log(2);\nconsole['log'](3);";
        assert_eq!(annotate(input), input);
    }

    #[test]
    fn test_nested_calls_get_own_markers() {
        let input = "console.log(\n  console.log(1)\n);";
        let out = annotate(input);
        assert_eq!(
            out,
            "console.log(\n  \"[LINE_MARKER:1]\", console.log(\"[LINE_MARKER:2]\", 1)\n);"
        );
    }

    #[test]
    fn test_same_line_nested() {
        let out = annotate("console.log(console.log(1))");
        assert_eq!(
            out,
            "console.log(\"[LINE_MARKER:1]\", console.log(\"[LINE_MARKER:1]\", 1))"
        );
    }

    #[test]
    fn test_multiline_call_reports_call_line() {
        let input = "console.log(\n  'a',\n  'b'\n);";
        let out = annotate(input);
        assert!(out.contains("\"[LINE_MARKER:1]\", 'a'"), "Got: {}", out);
    }

    #[test]
    fn test_spread_argument() {
        let out = annotate("console.log(...xs);");
        assert_eq!(out, "console.log(\"[LINE_MARKER:1]\", ...xs);");
    }

    #[test]
    fn test_typescript_syntax_is_accepted() {
        let input = "const n: number = 1;\nfunction f<T>(x: T): T { console.log(x); return x; }";
        let report = annotate_with_report(input);
        assert_eq!(report.markers, vec![2]);
        assert!(report.code.contains("const n: number = 1;"));
    }

    #[test]
    fn test_preserves_other_code_and_line_count() {
        let input = "const x = 5;\nconsole.log(x);\nconst y = x + 1;";
        let out = annotate(input);
        assert!(out.contains("const x = 5"));
        assert!(out.contains("const y = x + 1"));
        assert_eq!(out.lines().count(), input.lines().count());
    }

    #[test]
    fn test_non_ascii_offsets() {
        let input = "const s = 'héllo wörld';\nconsole.log(s, '✓');";
        let out = annotate(input);
        assert_eq!(
            out,
            "const s = 'héllo wörld';\nconsole.log(\"[LINE_MARKER:2]\", s, '✓');"
        );
    }

    #[test]
    fn test_byte_order_mark_keeps_offsets() {
        let out = annotate("\u{FEFF}console.log('x');\nconsole.warn(1);");
        assert_eq!(
            out,
            "\u{FEFF}console.log(\"[LINE_MARKER:1]\", 'x');\nconsole.warn(\"[LINE_MARKER:2]\", 1);"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(annotate(""), "");
    }

    #[test]
    fn test_invalid_source_untouched() {
        let input = "console.log('open\nconst = ;";
        assert_eq!(annotate(input), input);
        let input = "function (";
        assert_eq!(annotate(input), input);
    }

    proptest! {
        #[test]
        fn prop_never_panics(source in "[a-z(){};.,'\" \n0-9]{0,60}") {
            let _ = annotate(&source);
        }

        #[test]
        fn prop_marks_each_call_on_its_line(
            prefix_lines in 0usize..6,
            method in prop::sample::select(CONSOLE_METHODS.to_vec()),
            arg in "[a-z]{1,8}",
        ) {
            let source = format!("{}console.{}('{}');", "\n".repeat(prefix_lines), method, arg);
            let out = annotate(&source);
            let expected = format!(
                "console.{}(\"[LINE_MARKER:{}]\", '{}');",
                method,
                prefix_lines + 1,
                arg
            );
            prop_assert!(out.ends_with(&expected), "Got: {}", out);
        }

        #[test]
        fn prop_zero_argument_calls_unchanged(
            methods in prop::collection::vec(prop::sample::select(CONSOLE_METHODS.to_vec()), 0..5),
        ) {
            let source: String = methods
                .iter()
                .map(|m| format!("console.{}();\n", m))
                .collect();
            prop_assert_eq!(annotate(&source), source);
        }
    }
}
