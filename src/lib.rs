//! Compiler core for a small Rust-like language: a hand-written scanner, a
//! canonical LR(1) parser generated from a declarative grammar, and a
//! reduction-time semantic analyzer that checks types and borrows while
//! emitting three-address code as quadruples.

use std::fmt;

pub mod attributes;
pub mod codegen;
pub mod firsts;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod semantics;
pub mod state;
pub mod symbol;
pub mod types;

pub use crate::grammar::RUST_LIKE_GRAMMAR;
pub use crate::state::RUST_LIKE_TABLE;

use crate::attributes::ParseNode;
use crate::codegen::Quadruple;
use crate::lexer::{LexError, Lexer, Token};
use crate::parser::{ParseError, Parser, TraceStep};
use crate::semantics::{SemanticAnalyzer, SemanticError};

/// A fatal front-end failure: scanning and parsing abort the run, unlike
/// semantic diagnostics, which are collected.
#[derive(Debug, Clone)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileError::Lex(error) => write!(f, "{}", error),
            CompileError::Parse(error) => write!(f, "{}", error),
        }
    }
}

impl From<LexError> for CompileError {
    fn from(error: LexError) -> Self {
        CompileError::Lex(error)
    }
}

impl From<ParseError> for CompileError {
    fn from(error: ParseError) -> Self {
        CompileError::Parse(error)
    }
}

/// Everything one run of the pipeline produces.
#[derive(Debug)]
pub struct Compilation {
    pub tokens: Vec<Token>,
    pub tree: ParseNode,
    pub trace: Vec<TraceStep>,
    pub quads: Vec<Quadruple>,
    pub errors: Vec<SemanticError>,
}

/// Run source text through the whole pipeline using the built-in grammar
/// and a supplied analyzer (so embedders control reset/reuse).
pub fn compile_with(
    source: &str,
    analyzer: &mut SemanticAnalyzer,
) -> Result<Compilation, CompileError> {
    let tokens = Lexer::tokenize(source)?;
    let parser = Parser::new(&RUST_LIKE_GRAMMAR, &RUST_LIKE_TABLE);
    let (tree, trace) = parser.parse(&tokens, analyzer)?;
    Ok(Compilation {
        tokens,
        tree,
        trace,
        quads: analyzer.quads().to_vec(),
        errors: analyzer.errors().to_vec(),
    })
}

/// Run source text through the whole pipeline with a fresh analyzer.
pub fn compile(source: &str) -> Result<Compilation, CompileError> {
    let mut analyzer = SemanticAnalyzer::new();
    compile_with(source, &mut analyzer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::SemanticErrorKind;

    fn quad_strings(compilation: &Compilation) -> Vec<String> {
        compilation
            .quads
            .iter()
            .map(|quad| quad.to_string())
            .collect()
    }

    #[test]
    fn empty_main_jumps_to_entry_and_returns() {
        let compilation = compile("fn main() {}").unwrap();
        assert!(compilation.errors.is_empty());
        let quads = quad_strings(&compilation);
        assert_eq!(quads, vec!["[j,None,None,1]", "[RETURN,None,None,$ret_reg]"]);
        assert_eq!(
            compilation.tokens.last().unwrap().terminal_name(),
            "$"
        );
    }

    #[test]
    fn arithmetic_initializer() {
        let compilation = compile("fn main() { let x: i32 = 1 + 2; }").unwrap();
        assert!(compilation.errors.is_empty());
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[+,1,2,t0]",
                "[=,t0,None,x]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn while_loop_backpatching() {
        let source = "fn main() { let mut a: i32 = 0; while a < 10 { a = a + 1; } }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty());
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[=,0,None,a]",
                "[<,a,10,t0]",
                "[jnz,t0,None,5]",
                "[j,None,None,8]",
                "[+,a,1,t1]",
                "[=,t1,None,a]",
                "[j,None,None,2]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
        // nothing is left dangling: every jump has a target
        for quad in &compilation.quads {
            if quad.op == "j" || quad.op == "jnz" {
                assert!(quad.result.is_some(), "dangling jump: {}", quad);
            }
        }
    }

    #[test]
    fn immutable_assignment_is_rejected() {
        let compilation = compile("fn main() { let x = 1; x = 2; }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].kind, SemanticErrorKind::NotMutable);
        assert_eq!(compilation.errors[0].line, 1);
    }

    #[test]
    fn constant_index_out_of_bounds() {
        let source = "fn main() { let a: [i32; 3] = [1,2,3]; let b = a[5]; }";
        let compilation = compile(source).unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::IndexOutOfBounds
        );
    }

    #[test]
    fn function_call_linkage() {
        let source = "fn f(x: i32) -> i32 { x + 1 } fn main() { let y = f(2); }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,3]",
                "[+,x,1,t0]",
                "[RETURN,t0,None,$ret_reg]",
                "[param,2,None,None]",
                "[call,f,1,None]",
                "[=,$ret_reg,None,t1]",
                "[=,t1,None,y]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn select_expression_copies_on_both_paths() {
        let source = "fn main() { let x = if 1 < 2 { 1 } else { 2 }; }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[<,1,2,t0]",
                "[jnz,t0,None,4]",
                "[j,None,None,6]",
                "[=,1,None,t1]",
                "[j,None,None,7]",
                "[=,2,None,t1]",
                "[=,t1,None,x]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn logical_and_lowers_through_jumps() {
        let source = "fn main() { let b = 1 < 2 && 2 < 3; }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[<,1,2,t0]",
                "[jnz,t0,None,4]",
                "[j,None,None,7]",
                "[<,2,3,t1]",
                "[=,t1,None,t2]",
                "[j,None,None,8]",
                "[=,0,None,t2]",
                "[=,t2,None,b]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn loop_break_value_flows_through_a_temp() {
        let source = "fn main() { let v = loop { break 7; }; }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[=,7,None,t0]",
                "[j,None,None,4]",
                "[j,None,None,1]",
                "[=,t0,None,v]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn disagreeing_break_values_are_a_type_error() {
        let source = "fn main() { let v = loop { break 7; break (1, 2); }; }";
        let compilation = compile(source).unwrap();
        assert!(compilation
            .errors
            .iter()
            .any(|error| error.kind == SemanticErrorKind::TypeMismatch));
    }

    #[test]
    fn for_loop_over_a_range() {
        let source = "fn main() { for i in 0..3 { let z = i; } }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let quads = quad_strings(&compilation);
        assert_eq!(
            quads,
            vec![
                "[j,None,None,1]",
                "[=,0,None,t0]",
                "[<,t0,3,4]",
                "[j,None,None,8]",
                "[=,t0,None,i]",
                "[=,i,None,z]",
                "[+,t0,1,t0]",
                "[j,None,None,2]",
                "[RETURN,None,None,$ret_reg]",
            ]
        );
    }

    #[test]
    fn borrow_rules_fire_across_statements() {
        let source = "fn main() { let mut x = 1; let r = &mut x; let s = &x; }";
        let compilation = compile(source).unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::BorrowConflict
        );
    }

    #[test]
    fn mutable_borrow_of_immutable_binding() {
        let compilation = compile("fn main() { let x = 1; let r = &mut x; }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].kind, SemanticErrorKind::NotMutable);
    }

    #[test]
    fn break_outside_loop() {
        let compilation = compile("fn main() { break; }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::BreakOutsideLoop
        );
    }

    #[test]
    fn missing_main_names_the_entry_point() {
        let compilation = compile("fn helper() {}").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].kind, SemanticErrorKind::Undeclared);
        assert!(compilation.errors[0].message.contains("main"));
    }

    #[test]
    fn non_unit_function_needs_a_trailing_return() {
        let source = "fn f() -> i32 { let x = 1; } fn main() {}";
        let compilation = compile(source).unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::MissingReturn
        );
        let source = "fn f() -> i32 { return 1; } fn main() { let a = f(); }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
    }

    #[test]
    fn continue_jumps_to_the_loop_head() {
        let source = "fn main() { let mut i = 0; while i < 3 { i = i + 1; continue; } }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
        let compilation = compile("fn main() { continue; }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::ContinueOutsideLoop
        );
    }

    #[test]
    fn non_bool_condition() {
        let compilation = compile("fn main() { while 1 { } }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::NonBoolCondition
        );
    }

    #[test]
    fn uninferred_binding_is_reported_at_wrap_up() {
        let compilation = compile("fn main() { let x; }").unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::UninferredType
        );
        assert!(compilation.errors[0].message.contains("x"));
    }

    #[test]
    fn first_assignment_fixes_an_inferred_type() {
        let source = "fn main() { let x; x = 1; let y: i32 = 2; }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
    }

    #[test]
    fn empty_literals_have_degenerate_types() {
        let source = "fn main() { let a: [i32; 2] = []; }";
        let compilation = compile(source).unwrap();
        // [] is [unit; 0], which cannot satisfy [i32; 2]
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].kind, SemanticErrorKind::TypeMismatch);
        assert!(compilation.errors[0].message.contains("[unit; 0]"));
    }

    #[test]
    fn empty_array_is_unit_typed_and_zero_sized() {
        let compilation = compile("fn main() { let e = []; let x = e[0]; }").unwrap();
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::IndexOutOfBounds
        );
        // the element type of [] is unit and its size is zero
        assert!(compilation.errors[0].message.contains("[unit; 0]"));
    }

    #[test]
    fn empty_tuple_annotation_matches_empty_tuple_literal() {
        let compilation = compile("fn main() { let u: () = (); }").unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
    }

    #[test]
    fn tuple_member_access_and_bounds() {
        let good = compile("fn main() { let t = (1, 2); let a = t.1; }").unwrap();
        assert!(good.errors.is_empty(), "{:?}", good.errors);
        let bad = compile("fn main() { let t = (1, 2); let a = t.5; }").unwrap();
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(bad.errors[0].kind, SemanticErrorKind::InvalidMemberIndex);
    }

    #[test]
    fn deref_requires_a_reference() {
        let good = compile("fn main() { let mut x = 1; let r = &mut x; *r = 2; }").unwrap();
        assert!(good.errors.is_empty(), "{:?}", good.errors);
        let bad = compile("fn main() { let x = 1; let y = *x; }").unwrap();
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(bad.errors[0].kind, SemanticErrorKind::InvalidDeref);
    }

    #[test]
    fn call_arity_and_argument_types() {
        let source = "fn f(x: i32) -> i32 { x } fn main() { let a = f(1, 2); }";
        let compilation = compile(source).unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(
            compilation.errors[0].kind,
            SemanticErrorKind::ArityMismatch
        );
        let source = "fn f(x: i32) -> i32 { x } fn main() { let a = f((1, 2)); }";
        let compilation = compile(source).unwrap();
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].kind, SemanticErrorKind::TypeMismatch);
    }

    #[test]
    fn dangling_else_binds_to_the_nearest_if() {
        let source = "fn main() {
            let mut x = 0;
            if 1 < 2 { x = 1; } else if 2 < 3 { x = 2; } else { x = 3; }
        }";
        let compilation = compile(source).unwrap();
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
    }

    #[test]
    fn parse_error_carries_expected_set() {
        match compile("fn main( {}") {
            Err(CompileError::Parse(ParseError::Unexpected {
                found, expected, ..
            })) => {
                assert_eq!(found.lexeme, "{");
                assert!(expected.contains(&")".to_string()));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lex_error_aborts_the_run() {
        match compile("fn main() { let x = @; }") {
            Err(CompileError::Lex(LexError::UnknownCharacter { character: '@', .. })) => (),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rerun_after_reset_is_identical() {
        let source = "fn main() { let mut a: i32 = 0; while a < 10 { a = a + 1; } }";
        let mut analyzer = SemanticAnalyzer::new();
        let first = compile_with(source, &mut analyzer).unwrap();
        analyzer.reset();
        assert!(analyzer.at_pristine_state());
        let second = compile_with(source, &mut analyzer).unwrap();
        assert_eq!(quad_strings(&first), quad_strings(&second));
        assert_eq!(first.errors.len(), second.errors.len());
        assert_eq!(
            first.tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            second.tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn trace_is_produced_for_every_step() {
        let compilation = compile("fn main() {}").unwrap();
        assert!(!compilation.trace.is_empty());
        assert_eq!(compilation.trace.last().unwrap().action, "accept");
        assert_eq!(compilation.trace[0].state_stack, vec![0]);
    }

    #[test]
    fn tree_root_is_the_program_node() {
        let compilation = compile("fn main() {}").unwrap();
        assert_eq!(compilation.tree.symbol, "Program");
        assert!(!compilation.tree.is_terminal());
    }
}
