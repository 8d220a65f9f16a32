//! # Filter-Spec Parser
//!
//! Lexes and parses a line-oriented filter specification into a
//! [`FilterTable`](crate::filter::FilterTable). Handles `FILTER` blocks,
//! thresholds, merits, entry points, arguments, dependencies, and blob-size
//! hints (spec §4.1).
//!
//! The parser is single-pass and re-entrant: all state lives in the local
//! [`ParseContext`], so multiple specs may be parsed concurrently.

use crate::error::EngineError;
use crate::filter::{Filter, FilterTable, OutputKind, MAX_DEPS, MAX_FUNC, MAX_NAME};

/// Parse context threaded through the scanner. Replaces the reference
/// implementation's module-level config pointer (spec §9 "Global parser
/// state") with an explicit, stack-local value.
struct ParseContext {
    table: FilterTable,
    current: Option<Filter>,
    line_no: usize,
}

impl ParseContext {
    fn new() -> Self {
        ParseContext {
            table: FilterTable::new(),
            current: None,
            line_no: 0,
        }
    }

    fn fatal(&self, message: impl Into<String>) -> EngineError {
        EngineError::InvalidSpec {
            line: self.line_no,
            message: message.into(),
        }
    }

    fn close_current(&mut self) {
        if let Some(filter) = self.current.take() {
            self.table.push(filter);
        }
    }

    fn require_current(&mut self) -> Result<&mut Filter, EngineError> {
        if self.current.is_none() {
            return Err(self.fatal("directive used before any FILTER declaration"));
        }
        Ok(self.current.as_mut().expect("checked above"))
    }
}

/// Parse a filter specification from source text.
///
/// Strips `#` comments to end of line, ignores blank lines, and fails fast
/// on the first unrecognized directive or malformed argument.
pub fn parse_spec(source: &str) -> Result<FilterTable, EngineError> {
    let mut ctx = ParseContext::new();

    for raw_line in source.lines() {
        ctx.line_no += 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        parse_directive(&mut ctx, line)?;
    }
    ctx.close_current();

    validate_dependencies(&ctx.table)?;
    Ok(ctx.table)
}

/// Strip a `#` comment running to end of line. Comments never occur inside
/// an `ARG` token in this grammar, so no string-literal tracking is needed.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_directive(ctx: &mut ParseContext, line: &str) -> Result<(), EngineError> {
    let mut tokens = line.split_whitespace();
    let directive = tokens.next().expect("line is non-empty after trim");
    let rest: Vec<&str> = tokens.collect();

    match directive {
        "FILTER" => {
            ctx.close_current();
            let name = require_one_arg(ctx, "FILTER", &rest)?;
            if name.len() > MAX_NAME {
                return Err(ctx.fatal(format!("filter name '{name}' exceeds MAX_NAME")));
            }
            ctx.current = Some(FilterTable::new_filter_record(name));
        }
        "THRESHOLD" => {
            let value = require_one_int(ctx, "THRESHOLD", &rest)?;
            ctx.require_current()?.threshold = value;
        }
        "THRESHHOLD" => {
            return Err(ctx.fatal(
                "unrecognized directive 'THRESHHOLD' - did you mean 'THRESHOLD'? (rename it)",
            ));
        }
        "MERIT" => {
            let value = require_one_int(ctx, "MERIT", &rest)?;
            ctx.require_current()?.merit = value;
        }
        "EVAL_FUNCTION" => {
            let name = require_one_arg(ctx, "EVAL_FUNCTION", &rest)?;
            check_func_len(ctx, name)?;
            ctx.require_current()?.entry_points.eval = Some(name.to_string());
        }
        "INIT_FUNCTION" => {
            let name = require_one_arg(ctx, "INIT_FUNCTION", &rest)?;
            check_func_len(ctx, name)?;
            ctx.require_current()?.entry_points.init = Some(name.to_string());
        }
        "FINI_FUNCTION" => {
            let name = require_one_arg(ctx, "FINI_FUNCTION", &rest)?;
            check_func_len(ctx, name)?;
            ctx.require_current()?.entry_points.fini = Some(name.to_string());
        }
        "ARG" => {
            let token = require_one_arg(ctx, "ARG", &rest)?;
            ctx.require_current()?.args.push(token.to_string());
        }
        "REQUIRES" => {
            let name = require_one_arg(ctx, "REQUIRES", &rest)?;
            let filter = ctx.require_current()?;
            if filter.requires.len() >= MAX_DEPS {
                return Err(ctx.fatal(format!(
                    "filter '{}' exceeds MAX_DEPS ({MAX_DEPS})",
                    filter.name
                )));
            }
            filter.requires.push(name.to_string());
        }
        "IN_OBJECT" => {
            let size = require_one_u64(ctx, "IN_OBJECT", &rest)?;
            ctx.require_current()?.in_object_size = Some(size);
        }
        "OUT_OBJECT" => {
            if rest.len() != 2 {
                return Err(ctx.fatal("OUT_OBJECT requires exactly two arguments: KIND SIZE"));
            }
            let kind = parse_output_kind(ctx, rest[0])?;
            let size: u64 = rest[1]
                .parse()
                .map_err(|_| ctx.fatal(format!("OUT_OBJECT size '{}' is not an integer", rest[1])))?;
            ctx.require_current()?.out_object = Some((kind, size));
        }
        other => {
            return Err(ctx.fatal(format!("unknown directive '{other}'")));
        }
    }
    Ok(())
}

fn parse_output_kind(ctx: &ParseContext, token: &str) -> Result<OutputKind, EngineError> {
    match token {
        "UNMODIFIED" => Ok(OutputKind::Unmodified),
        "NEW" => Ok(OutputKind::New),
        "CLONE" => Ok(OutputKind::Clone),
        "COPY_ATTR" => Ok(OutputKind::CopyAttr),
        other => Err(ctx.fatal(format!("unknown OUT_OBJECT kind '{other}'"))),
    }
}

fn require_one_arg<'a>(
    ctx: &ParseContext,
    directive: &str,
    rest: &[&'a str],
) -> Result<&'a str, EngineError> {
    match rest {
        [single] => Ok(single),
        [] => Err(ctx.fatal(format!("{directive} requires an argument"))),
        _ => Err(ctx.fatal(format!("{directive} takes exactly one argument"))),
    }
}

fn require_one_int(ctx: &ParseContext, directive: &str, rest: &[&str]) -> Result<i32, EngineError> {
    let token = require_one_arg(ctx, directive, rest)?;
    token
        .parse()
        .map_err(|_| ctx.fatal(format!("{directive} expects an integer, got '{token}'")))
}

fn require_one_u64(ctx: &ParseContext, directive: &str, rest: &[&str]) -> Result<u64, EngineError> {
    let token = require_one_arg(ctx, directive, rest)?;
    token
        .parse()
        .map_err(|_| ctx.fatal(format!("{directive} expects a non-negative integer, got '{token}'")))
}

fn check_func_len(ctx: &ParseContext, name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_FUNC {
        return Err(ctx.fatal(format!("function name '{name}' exceeds MAX_FUNC")));
    }
    Ok(())
}

/// Verify every `REQUIRES` name resolves to a declared filter (spec §3).
/// Cycle detection happens later, in `PartialOrder::closure`.
fn validate_dependencies(table: &FilterTable) -> Result<(), EngineError> {
    for filter in table.iter() {
        for dep in &filter.requires {
            if table.id_of(dep).is_none() {
                return Err(EngineError::MissingDependency {
                    filter: filter.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Render a `FilterTable` back to spec text. Used by the round-trip test in
/// spec §8 ("Parsing then pretty-printing then re-parsing a spec yields an
/// equivalent FilterTable").
pub fn pretty_print(table: &FilterTable) -> String {
    let mut out = String::new();
    for filter in table.iter() {
        out.push_str(&format!("FILTER {}\n", filter.name));
        out.push_str(&format!("THRESHOLD {}\n", filter.threshold));
        if filter.merit != 0 {
            out.push_str(&format!("MERIT {}\n", filter.merit));
        }
        if let Some(init) = &filter.entry_points.init {
            out.push_str(&format!("INIT_FUNCTION {init}\n"));
        }
        if let Some(eval) = &filter.entry_points.eval {
            out.push_str(&format!("EVAL_FUNCTION {eval}\n"));
        }
        if let Some(fini) = &filter.entry_points.fini {
            out.push_str(&format!("FINI_FUNCTION {fini}\n"));
        }
        for arg in &filter.args {
            out.push_str(&format!("ARG {arg}\n"));
        }
        for dep in &filter.requires {
            out.push_str(&format!("REQUIRES {dep}\n"));
        }
        if let Some(size) = filter.in_object_size {
            out.push_str(&format!("IN_OBJECT {size}\n"));
        }
        if let Some((kind, size)) = filter.out_object {
            let kind_str = match kind {
                OutputKind::Unmodified => "UNMODIFIED",
                OutputKind::New => "NEW",
                OutputKind::Clone => "CLONE",
                OutputKind::CopyAttr => "COPY_ATTR",
            };
            out.push_str(&format!("OUT_OBJECT {kind_str} {size}\n"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_spec_parses_one_filter() {
        let table = parse_spec("FILTER A\nTHRESHOLD 5\nEVAL_FUNCTION a_eval\n").unwrap();
        assert_eq!(table.len(), 1);
        let f = table.get(0);
        assert_eq!(f.name, "A");
        assert_eq!(f.threshold, 5);
        assert_eq!(f.entry_points.eval.as_deref(), Some("a_eval"));
        assert!(f.requires.is_empty());
    }

    #[test]
    fn threshhold_typo_is_fatal() {
        let err = parse_spec("FILTER A\nTHRESHHOLD 3\n").unwrap_err();
        match err {
            EngineError::InvalidSpec { message, .. } => {
                assert!(message.contains("THRESHOLD"));
            }
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn unknown_directive_is_fatal() {
        let err = parse_spec("FILTER A\nBOGUS_DIRECTIVE 1\n").unwrap_err();
        assert!(matches!(err, EngineError::InvalidSpec { .. }));
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let err = parse_spec("FILTER A\nREQUIRES B\n").unwrap_err();
        assert!(matches!(err, EngineError::MissingDependency { .. }));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let table = parse_spec("# a comment\n\nFILTER A\nTHRESHOLD 1 # inline comment\n\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).threshold, 1);
    }

    #[test]
    fn application_filter_is_recognized() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER APPLICATION\nTHRESHOLD 0\n").unwrap();
        assert_eq!(table.application(), Some(1));
    }

    #[test]
    fn out_object_parses_kind_and_size() {
        let table = parse_spec("FILTER A\nOUT_OBJECT CLONE 1024\n").unwrap();
        assert_eq!(table.get(0).out_object, Some((OutputKind::Clone, 1024)));
    }

    #[test]
    fn round_trip_pretty_print_reparses_equivalently() {
        let src = "FILTER A\nTHRESHOLD 5\nMERIT 2\nEVAL_FUNCTION a_eval\nARG foo\nFILTER B\nTHRESHOLD 1\nREQUIRES A\n";
        let table = parse_spec(src).unwrap();
        let printed = pretty_print(&table);
        let reparsed = parse_spec(&printed).unwrap();

        assert_eq!(table.len(), reparsed.len());
        for (a, b) in table.iter().zip(reparsed.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.threshold, b.threshold);
            assert_eq!(a.merit, b.merit);
            assert_eq!(a.requires, b.requires);
            assert_eq!(a.args, b.args);
        }
    }
}
