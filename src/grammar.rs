// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lazy_static::lazy_static;

#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    UnknownSymbol {
        symbol: String,
    },
    Conflict {
        state: u32,
        symbol: String,
        existing: String,
        proposed: String,
    },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrammarError::UnknownSymbol { symbol } => {
                write!(f, "symbol \"{}\" is neither a terminal nor a non-terminal", symbol)
            }
            GrammarError::Conflict {
                state,
                symbol,
                existing,
                proposed,
            } => write!(
                f,
                "table conflict in state {} on \"{}\": {} vs {}",
                state, symbol, existing, proposed
            ),
        }
    }
}

/// Names the semantic handler attached to a production. The set is closed:
/// the analyzer matches on it exhaustively, so a production without a
/// handler cannot slip through compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionKind {
    NoOp,
    Passthrough,
    ProgramWrapUp,
    EntryJump,
    FnWithBlock,
    FnWithExprBlock,
    FnHeader,
    RetSome,
    RetUnit,
    ParamsList,
    ParamsEmpty,
    ParamListSingle,
    ParamListCons,
    Param,
    VarPattern,
    VarPatternMut,
    TypeI32,
    TypeArray,
    TypeTuple,
    TypeRef,
    TypeRefMut,
    TypeListEmpty,
    TypeListSingle,
    TypeListCons,
    Block,
    ExprBlock,
    StmtsEmpty,
    StmtsCons,
    BeginMarker,
    EndMarker,
    ControlFlowMarker,
    LoopMarker,
    ReDoMarker,
    StmtEmpty,
    StmtWrap,
    StmtLoop,
    StmtExpr,
    LetDeclTyped,
    LetDeclInfer,
    LetInitTyped,
    LetInitInfer,
    Assign,
    ReturnUnit,
    ReturnValue,
    If,
    IfElse,
    While,
    For,
    ForHead,
    RangeIterable,
    ExprIterable,
    Loop,
    Break,
    BreakValue,
    Continue,
    Select,
    LogicalOr,
    LogicalAnd,
    Relational,
    Arithmetic,
    Borrow,
    BorrowMut,
    Call,
    NumberLiteral,
    PlaceValue,
    Paren,
    TupleLiteral,
    ArrayLiteral,
    Deref,
    NamePlace,
    IndexPlace,
    MemberPlace,
    ExprListEmpty,
    ExprListSingle,
    ExprListCons,
    Operator,
}

/// One production: left-hand nonterminal, right-hand symbol names (empty
/// for ε), its unique index, and the handler it dispatches to.
#[derive(Debug, Clone)]
pub struct Production {
    pub lhs: String,
    pub rhs: Vec<String>,
    pub index: usize,
    pub kind: ReductionKind,
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} →", self.lhs)?;
        if self.rhs.is_empty() {
            write!(f, " ε")
        } else {
            for symbol in &self.rhs {
                write!(f, " {}", symbol)?;
            }
            Ok(())
        }
    }
}

/// A grammar is data: declared terminals, productions, and a start symbol.
/// Nonterminals are inferred from left-hand sides.
#[derive(Debug)]
pub struct Grammar {
    terminals: BTreeSet<String>,
    non_terminals: BTreeSet<String>,
    productions: Vec<Production>,
    by_lhs: BTreeMap<String, Vec<usize>>,
    start_symbol: String,
}

impl Grammar {
    pub fn new(
        terminals: &[&str],
        productions: &[(&str, &[&str], ReductionKind)],
        start_symbol: &str,
    ) -> Result<Self, GrammarError> {
        let terminals: BTreeSet<String> = terminals.iter().map(|s| s.to_string()).collect();
        let mut non_terminals = BTreeSet::new();
        let mut table = vec![];
        let mut by_lhs: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, (lhs, rhs, kind)) in productions.iter().enumerate() {
            non_terminals.insert(lhs.to_string());
            by_lhs.entry(lhs.to_string()).or_insert_with(Vec::new).push(index);
            table.push(Production {
                lhs: lhs.to_string(),
                rhs: rhs.iter().map(|s| s.to_string()).collect(),
                index,
                kind: *kind,
            });
        }
        let grammar = Self {
            terminals,
            non_terminals,
            productions: table,
            by_lhs,
            start_symbol: start_symbol.to_string(),
        };
        for production in &grammar.productions {
            for symbol in &production.rhs {
                if !grammar.is_terminal(symbol) && !grammar.is_non_terminal(symbol) {
                    return Err(GrammarError::UnknownSymbol {
                        symbol: symbol.clone(),
                    });
                }
            }
        }
        if !grammar.is_non_terminal(start_symbol) {
            return Err(GrammarError::UnknownSymbol {
                symbol: start_symbol.to_string(),
            });
        }
        Ok(grammar)
    }

    pub fn is_terminal(&self, symbol: &str) -> bool {
        self.terminals.contains(symbol)
    }

    pub fn is_non_terminal(&self, symbol: &str) -> bool {
        self.non_terminals.contains(symbol)
    }

    pub fn terminals(&self) -> &BTreeSet<String> {
        &self.terminals
    }

    pub fn non_terminals(&self) -> &BTreeSet<String> {
        &self.non_terminals
    }

    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, index: usize) -> &Production {
        &self.productions[index]
    }

    pub fn productions_for(&self, lhs: &str) -> &[usize] {
        self.by_lhs.get(lhs).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The start production is the first production whose left-hand side is
    /// the declared start symbol.
    pub fn start_production(&self) -> &Production {
        let index = self
            .productions_for(&self.start_symbol)
            .first()
            .expect("the start symbol has at least one production");
        &self.productions[*index]
    }

    pub fn production_index(&self, lhs: &str, rhs: &[String]) -> Option<usize> {
        self.productions_for(lhs)
            .iter()
            .copied()
            .find(|&index| self.productions[index].rhs == rhs)
    }
}

const TERMINALS: &[&str] = &[
    // reserved words
    "fn", "let", "mut", "if", "else", "while", "return", "for", "in", "loop", "break",
    "continue", "i32",
    // identifiers and literals
    "ID", "NUM",
    // operators
    "+", "-", "*", "/", "%", "&", "==", "!=", "<", "<=", ">", ">=", "||", "&&",
    // delimiters
    "(", ")", "[", "]", "{", "}", ";", ",", ":", "=", ".", "..", "->",
];

/// The canonical grammar of the language. Marker nonterminals are empty
/// productions whose reductions capture quadruple indices or emit jump
/// pairs; they are placed so the grammar stays canonical-LR(1)
/// conflict-free.
pub fn rust_like_grammar() -> Result<Grammar, GrammarError> {
    use ReductionKind::*;
    let productions: &[(&str, &[&str], ReductionKind)] = &[
        // program structure
        ("Begin", &["Program"], NoOp),
        ("Program", &["EntryMarker", "DeclList"], ProgramWrapUp),
        ("EntryMarker", &[], EntryJump),
        ("DeclList", &["Decl", "DeclList"], NoOp),
        ("DeclList", &[], NoOp),
        ("Decl", &["FnDecl"], NoOp),
        // function declarations
        ("FnDecl", &["FnHeader", "Block"], FnWithBlock),
        ("FnDecl", &["FnHeader", "ExprBlock"], FnWithExprBlock),
        ("FnHeader", &["fn", "ID", "(", "Params", ")", "RetType"], FnHeader),
        ("RetType", &["->", "Type"], RetSome),
        ("RetType", &[], RetUnit),
        ("Params", &["ParamList"], ParamsList),
        ("Params", &[], ParamsEmpty),
        ("ParamList", &["Param"], ParamListSingle),
        ("ParamList", &["Param", ",", "ParamList"], ParamListCons),
        ("Param", &["VarPattern", ":", "Type"], Param),
        ("VarPattern", &["mut", "ID"], VarPatternMut),
        ("VarPattern", &["ID"], VarPattern),
        // types
        ("Type", &["i32"], TypeI32),
        ("Type", &["[", "Type", ";", "NUM", "]"], TypeArray),
        ("Type", &["(", "TupleTypeInner", ")"], TypeTuple),
        ("Type", &["&", "mut", "Type"], TypeRefMut),
        ("Type", &["&", "Type"], TypeRef),
        ("TupleTypeInner", &[], TypeListEmpty),
        ("TupleTypeInner", &["Type", ",", "TupleTypeList"], TypeListCons),
        ("TupleTypeList", &[], TypeListEmpty),
        ("TupleTypeList", &["Type"], TypeListSingle),
        ("TupleTypeList", &["Type", ",", "TupleTypeList"], TypeListCons),
        // blocks
        ("Block", &["{", "Stmts", "}"], Block),
        ("ExprBlock", &["{", "Stmts", "BeginMarker", "Expr", "}"], ExprBlock),
        ("Stmts", &[], StmtsEmpty),
        ("Stmts", &["Stmts", "BeginMarker", "Stmt"], StmtsCons),
        // markers
        ("BeginMarker", &[], BeginMarker),
        ("EndMarker", &[], EndMarker),
        ("ControlFlowMarker", &[], ControlFlowMarker),
        ("LoopMarker", &[], LoopMarker),
        ("ReDoMarker", &[], ReDoMarker),
        // statements
        ("Stmt", &[";"], StmtEmpty),
        ("Stmt", &["LetStmt"], StmtWrap),
        ("Stmt", &["AssignStmt"], StmtWrap),
        ("Stmt", &["ReturnStmt"], StmtWrap),
        ("Stmt", &["IfStmt"], StmtWrap),
        ("Stmt", &["WhileStmt"], StmtWrap),
        ("Stmt", &["ForStmt"], StmtWrap),
        ("Stmt", &["LoopExpr"], StmtLoop),
        ("Stmt", &["BreakStmt"], StmtWrap),
        ("Stmt", &["ContinueStmt"], StmtWrap),
        ("Stmt", &["Expr", ";"], StmtExpr),
        ("LetStmt", &["let", "VarPattern", ":", "Type", ";"], LetDeclTyped),
        ("LetStmt", &["let", "VarPattern", ";"], LetDeclInfer),
        ("LetStmt", &["let", "VarPattern", ":", "Type", "=", "ValueExpr", ";"], LetInitTyped),
        ("LetStmt", &["let", "VarPattern", "=", "ValueExpr", ";"], LetInitInfer),
        ("AssignStmt", &["Place", "=", "ValueExpr", ";"], Assign),
        ("ReturnStmt", &["return", ";"], ReturnUnit),
        ("ReturnStmt", &["return", "ValueExpr", ";"], ReturnValue),
        (
            "IfStmt",
            &["if", "OrExpr", "ControlFlowMarker", "BeginMarker", "Block"],
            If,
        ),
        (
            "IfStmt",
            &[
                "if", "OrExpr", "ControlFlowMarker", "BeginMarker", "Block", "EndMarker",
                "else", "BeginMarker", "Block",
            ],
            IfElse,
        ),
        (
            "IfStmt",
            &[
                "if", "OrExpr", "ControlFlowMarker", "BeginMarker", "Block", "EndMarker",
                "else", "BeginMarker", "IfStmt",
            ],
            IfElse,
        ),
        (
            "WhileStmt",
            &[
                "while", "LoopMarker", "ReDoMarker", "OrExpr", "ControlFlowMarker",
                "BeginMarker", "Block",
            ],
            While,
        ),
        ("ForStmt", &["for", "LoopMarker", "ForHead", "BeginMarker", "Block"], For),
        ("ForHead", &["VarPattern", "in", "Iterable"], ForHead),
        ("Iterable", &["Expr", "..", "Expr"], RangeIterable),
        ("Iterable", &["Expr"], ExprIterable),
        ("LoopExpr", &["loop", "LoopMarker", "Block"], Loop),
        ("BreakStmt", &["break", ";"], Break),
        ("BreakStmt", &["break", "ValueExpr", ";"], BreakValue),
        ("ContinueStmt", &["continue", ";"], Continue),
        // expressions, stratified by precedence
        ("ValueExpr", &["Expr"], Passthrough),
        ("ValueExpr", &["LoopExpr"], Passthrough),
        ("Expr", &["OrExpr"], Passthrough),
        ("Expr", &["CondExpr"], Passthrough),
        (
            "CondExpr",
            &[
                "if", "OrExpr", "ControlFlowMarker", "BeginMarker", "ExprBlock", "else",
                "BeginMarker", "ExprBlock",
            ],
            Select,
        ),
        ("OrExpr", &["OrExpr", "||", "ControlFlowMarker", "AndExpr"], LogicalOr),
        ("OrExpr", &["AndExpr"], Passthrough),
        ("AndExpr", &["AndExpr", "&&", "ControlFlowMarker", "RelExpr"], LogicalAnd),
        ("AndExpr", &["RelExpr"], Passthrough),
        ("RelExpr", &["RelExpr", "RelOp", "AddExpr"], Relational),
        ("RelExpr", &["AddExpr"], Passthrough),
        ("AddExpr", &["AddExpr", "AddOp", "MulExpr"], Arithmetic),
        ("AddExpr", &["MulExpr"], Passthrough),
        ("MulExpr", &["MulExpr", "MulOp", "Unary"], Arithmetic),
        ("MulExpr", &["Unary"], Passthrough),
        ("Unary", &["&", "mut", "Unary"], BorrowMut),
        ("Unary", &["&", "Unary"], Borrow),
        ("Unary", &["Postfix"], Passthrough),
        ("Postfix", &["Postfix", "(", "Args", ")"], Call),
        ("Postfix", &["Element"], Passthrough),
        ("Element", &["NUM"], NumberLiteral),
        ("Element", &["Place"], PlaceValue),
        ("Element", &["(", "Expr", ")"], Paren),
        ("Element", &["(", "TupleInner", ")"], TupleLiteral),
        ("Element", &["[", "ArrayElems", "]"], ArrayLiteral),
        ("Element", &["ExprBlock"], Passthrough),
        // place expressions
        ("Place", &["*", "Place"], Deref),
        ("Place", &["PlaceInner"], Passthrough),
        ("PlaceInner", &["ID"], NamePlace),
        ("PlaceInner", &["PlaceInner", "[", "Expr", "]"], IndexPlace),
        ("PlaceInner", &["PlaceInner", ".", "NUM"], MemberPlace),
        // expression lists
        ("Args", &[], ExprListEmpty),
        ("Args", &["Expr"], ExprListSingle),
        ("Args", &["Expr", ",", "Args"], ExprListCons),
        ("ArrayElems", &[], ExprListEmpty),
        ("ArrayElems", &["Expr"], ExprListSingle),
        ("ArrayElems", &["Expr", ",", "ArrayElems"], ExprListCons),
        ("TupleInner", &[], ExprListEmpty),
        ("TupleInner", &["Expr", ",", "TupleElems"], ExprListCons),
        ("TupleElems", &[], ExprListEmpty),
        ("TupleElems", &["Expr"], ExprListSingle),
        ("TupleElems", &["Expr", ",", "TupleElems"], ExprListCons),
        // operator classes
        ("RelOp", &["=="], Operator),
        ("RelOp", &["!="], Operator),
        ("RelOp", &["<"], Operator),
        ("RelOp", &["<="], Operator),
        ("RelOp", &[">"], Operator),
        ("RelOp", &[">="], Operator),
        ("AddOp", &["+"], Operator),
        ("AddOp", &["-"], Operator),
        ("MulOp", &["*"], Operator),
        ("MulOp", &["/"], Operator),
        ("MulOp", &["%"], Operator),
    ];
    Grammar::new(TERMINALS, productions, "Begin")
}

lazy_static! {
    pub static ref RUST_LIKE_GRAMMAR: Grammar =
        rust_like_grammar().expect("the built-in grammar is well formed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_grammar_is_well_formed() {
        let grammar = rust_like_grammar().unwrap();
        assert_eq!(grammar.start_symbol(), "Begin");
        assert_eq!(grammar.start_production().lhs, "Begin");
        assert!(grammar.is_terminal("ID"));
        assert!(grammar.is_non_terminal("Stmt"));
        assert!(!grammar.is_terminal("Stmt"));
        for (index, production) in grammar.productions().iter().enumerate() {
            assert_eq!(production.index, index);
        }
    }

    #[test]
    fn unknown_rhs_symbol_is_rejected() {
        use ReductionKind::*;
        let result = Grammar::new(&["a"], &[("S", &["a", "Mystery"], NoOp)], "S");
        match result {
            Err(GrammarError::UnknownSymbol { symbol }) => assert_eq!(symbol, "Mystery"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn production_index_matches_lhs_and_rhs() {
        let grammar = rust_like_grammar().unwrap();
        let rhs: Vec<String> = vec!["ID".to_string()];
        let index = grammar.production_index("PlaceInner", &rhs).unwrap();
        assert_eq!(grammar.production(index).kind, ReductionKind::NamePlace);
        assert!(grammar.production_index("PlaceInner", &[]).is_none());
    }

    #[test]
    fn empty_production_displays_epsilon() {
        let grammar = rust_like_grammar().unwrap();
        let index = grammar.production_index("Stmts", &[]).unwrap();
        assert_eq!(grammar.production(index).to_string(), "Stmts → ε");
    }
}
