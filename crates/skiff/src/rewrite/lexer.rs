//! ES module lexing.
//!
//! Parses a served module and reports every rewritable import specifier
//! with its byte span, plus any `import.meta.hot.accept(...)` declarations.
//! Dynamic imports whose argument is not a string literal are counted but
//! left alone; the rewriter logs and skips them.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, CallExpression, ExportAllDeclaration,
    ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::error::ServerError;

/// Where a specifier appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from "x"`, `export ... from "x"`, `export * from "x"`
    Static,
    /// `import("x")` with a string-literal argument
    DynamicLiteral,
}

/// One rewritable specifier. `start..end` is the byte span of the literal's
/// contents, quotes excluded, in the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub start: usize,
    pub end: usize,
    pub specifier: String,
    pub kind: ImportKind,
}

/// One dependency named in an `accept` call, with the span of its literal
/// (quotes excluded) so the rewriter can replace it with the resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotAcceptDep {
    pub start: usize,
    pub end: usize,
    pub specifier: String,
}

/// Aggregated `import.meta.hot.accept` declarations for one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotAccept {
    /// `accept()` or `accept(cb)`: the module swaps itself.
    pub self_accepting: bool,
    /// `accept('./dep', cb)` / `accept(['./a', './b'], cb)`: raw dep
    /// specifiers, unresolved.
    pub deps: Vec<HotAcceptDep>,
}

/// Lexer output for one module body.
#[derive(Debug, Default)]
pub struct LexedModule {
    pub imports: Vec<ImportRef>,
    pub hot_accept: Option<HotAccept>,
    /// Dynamic imports with non-literal arguments, left untouched.
    pub dynamic_skipped: usize,
}

/// Lex a module body. `public_path` picks the dialect (ts/tsx/jsx by
/// extension, plain module otherwise) and labels parse failures.
pub fn lex_module(public_path: &str, source: &str) -> Result<LexedModule, ServerError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(public_path)).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser panicked".to_string());
        return Err(ServerError::Parse {
            path: public_path.to_string(),
            message,
        });
    }

    let mut visitor = ImportVisitor::default();
    visitor.visit_program(&ret.program);
    Ok(visitor.lexed)
}

fn source_type_for(public_path: &str) -> SourceType {
    let ext = public_path.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" => SourceType::ts(),
        "tsx" => SourceType::tsx(),
        "jsx" => SourceType::jsx(),
        _ => SourceType::mjs(),
    }
}

#[derive(Default)]
struct ImportVisitor {
    lexed: LexedModule,
}

impl ImportVisitor {
    fn push_literal(&mut self, start: u32, end: u32, value: &str, kind: ImportKind) {
        // Spans cover the literal including quotes.
        self.lexed.imports.push(ImportRef {
            start: start as usize + 1,
            end: end as usize - 1,
            specifier: value.to_string(),
            kind,
        });
    }

    fn record_accept(&mut self, call: &CallExpression<'_>) {
        let accept = self.lexed.hot_accept.get_or_insert_with(HotAccept::default);
        match call.arguments.first() {
            None => accept.self_accepting = true,
            Some(Argument::StringLiteral(lit)) => accept.deps.push(accept_dep(lit)),
            Some(Argument::ArrayExpression(array)) => {
                for element in &array.elements {
                    if let ArrayExpressionElement::StringLiteral(lit) = element {
                        accept.deps.push(accept_dep(lit));
                    }
                }
            }
            // accept(cb)
            Some(_) => accept.self_accepting = true,
        }
    }
}

fn accept_dep(lit: &oxc_ast::ast::StringLiteral<'_>) -> HotAcceptDep {
    HotAcceptDep {
        start: lit.span.start as usize + 1,
        end: lit.span.end as usize - 1,
        specifier: lit.value.to_string(),
    }
}

/// Is this callee `import.meta.hot.accept`?
fn is_hot_accept(callee: &Expression<'_>) -> bool {
    let Expression::StaticMemberExpression(accept) = callee else {
        return false;
    };
    if accept.property.name != "accept" {
        return false;
    }
    let Expression::StaticMemberExpression(hot) = &accept.object else {
        return false;
    };
    if hot.property.name != "hot" {
        return false;
    }
    matches!(
        &hot.object,
        Expression::MetaProperty(meta)
            if meta.meta.name == "import" && meta.property.name == "meta"
    )
}

impl<'a> Visit<'a> for ImportVisitor {
    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        let lit = &it.source;
        self.push_literal(lit.span.start, lit.span.end, &lit.value, ImportKind::Static);
        walk::walk_import_declaration(self, it);
    }

    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        if let Some(lit) = &it.source {
            self.push_literal(lit.span.start, lit.span.end, &lit.value, ImportKind::Static);
        }
        walk::walk_export_named_declaration(self, it);
    }

    fn visit_export_all_declaration(&mut self, it: &ExportAllDeclaration<'a>) {
        let lit = &it.source;
        self.push_literal(lit.span.start, lit.span.end, &lit.value, ImportKind::Static);
        walk::walk_export_all_declaration(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        match &it.source {
            Expression::StringLiteral(lit) => {
                self.push_literal(
                    lit.span.start,
                    lit.span.end,
                    &lit.value,
                    ImportKind::DynamicLiteral,
                );
            }
            _ => self.lexed.dynamic_skipped += 1,
        }
        walk::walk_import_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if is_hot_accept(&it.callee) {
            self.record_accept(it);
        }
        walk::walk_call_expression(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifiers(source: &str) -> Vec<(String, ImportKind)> {
        lex_module("/test.js", source)
            .unwrap()
            .imports
            .into_iter()
            .map(|i| (i.specifier, i.kind))
            .collect()
    }

    #[test]
    fn test_static_imports() {
        let found = specifiers(
            r#"import a from "vue";
import { b } from './b';
export { c } from "./c";
export * from "./d";
import "./side-effect";"#,
        );
        assert_eq!(
            found,
            vec![
                ("vue".to_string(), ImportKind::Static),
                ("./b".to_string(), ImportKind::Static),
                ("./c".to_string(), ImportKind::Static),
                ("./d".to_string(), ImportKind::Static),
                ("./side-effect".to_string(), ImportKind::Static),
            ]
        );
    }

    #[test]
    fn test_spans_exclude_quotes() {
        let source = r#"import a from "vue";"#;
        let lexed = lex_module("/test.js", source).unwrap();
        let import = &lexed.imports[0];
        assert_eq!(&source[import.start..import.end], "vue");
    }

    #[test]
    fn test_dynamic_import_literal_and_expression() {
        let lexed = lex_module(
            "/test.js",
            r#"const a = import("./lazy"); const b = import(someVar);"#,
        )
        .unwrap();
        assert_eq!(lexed.imports.len(), 1);
        assert_eq!(lexed.imports[0].specifier, "./lazy");
        assert_eq!(lexed.imports[0].kind, ImportKind::DynamicLiteral);
        assert_eq!(lexed.dynamic_skipped, 1);
    }

    #[test]
    fn test_self_accept() {
        let lexed = lex_module(
            "/test.js",
            "if (import.meta.hot) { import.meta.hot.accept() }",
        )
        .unwrap();
        let accept = lexed.hot_accept.unwrap();
        assert!(accept.self_accepting);
        assert!(accept.deps.is_empty());
    }

    #[test]
    fn test_accept_with_callback_is_self_accepting() {
        let lexed = lex_module(
            "/test.js",
            "import.meta.hot.accept((mod) => { console.log(mod) })",
        )
        .unwrap();
        assert!(lexed.hot_accept.unwrap().self_accepting);
    }

    #[test]
    fn test_accept_deps() {
        let source = r#"import.meta.hot.accept('./a', () => {});
import.meta.hot.accept(['./b', "./c"], () => {});"#;
        let lexed = lex_module("/test.js", source).unwrap();
        let accept = lexed.hot_accept.unwrap();
        assert!(!accept.self_accepting);
        let specs: Vec<&str> = accept.deps.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./a", "./b", "./c"]);
        // Spans point at the literal contents.
        for dep in &accept.deps {
            assert_eq!(&source[dep.start..dep.end], dep.specifier);
        }
    }

    #[test]
    fn test_typescript_dialect() {
        let lexed = lex_module(
            "/src/main.ts",
            r#"import type { T } from "./types"; const x: number = 1;"#,
        )
        .unwrap();
        assert_eq!(lexed.imports.len(), 1);
    }

    #[test]
    fn test_parse_failure_is_error() {
        let err = lex_module("/broken.js", "import from from from").unwrap_err();
        assert!(matches!(err, ServerError::Parse { .. }));
    }

    #[test]
    fn test_no_accept_when_only_guard_present() {
        let lexed = lex_module("/test.js", "if (import.meta.hot) { }").unwrap();
        assert!(lexed.hot_accept.is_none());
    }
}
