// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

use crate::lexer::Token;
use crate::symbol::Parameter;
use crate::types::Type;

/// What an expression node knows about itself: its type, the place holding
/// its value (a variable, temporary or literal spelling), a compile-time
/// value for literal integers, the variable it names (for borrow tracking
/// and call resolution), and pending jump indices for value-producing
/// loops.
#[derive(Debug, Clone)]
pub struct ExprAttr {
    pub ty: Type,
    pub place: Option<String>,
    pub value: Option<i64>,
    pub var_name: Option<String>,
    pub next_list: Vec<usize>,
}

impl Default for ExprAttr {
    fn default() -> Self {
        Self {
            ty: Type::Unit,
            place: None,
            value: None,
            var_name: None,
            next_list: vec![],
        }
    }
}

impl ExprAttr {
    pub fn typed(ty: Type) -> Self {
        Self {
            ty,
            ..Self::default()
        }
    }

    pub fn with_place(ty: Type, place: String) -> Self {
        Self {
            ty,
            place: Some(place),
            ..Self::default()
        }
    }
}

/// Statement-level synthesis: the dangling jumps awaiting the next
/// statement's address and whether the statement is a return.
#[derive(Debug, Clone, Default)]
pub struct StmtAttr {
    pub next_list: Vec<usize>,
    pub last_return: bool,
}

/// Marker synthesis: a captured quadruple index and the jump lists emitted
/// at the marker's position.
#[derive(Debug, Clone, Default)]
pub struct FlowAttr {
    pub quad_index: usize,
    pub true_list: Vec<usize>,
    pub false_list: Vec<usize>,
    pub next_list: Vec<usize>,
}

/// Function-header synthesis.
#[derive(Debug, Clone)]
pub struct HeaderAttr {
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<Parameter>,
}

/// For-loop header synthesis: where the test lives, the pending false edge,
/// and the iterator temporary the step instruction advances.
#[derive(Debug, Clone, Default)]
pub struct ForHeadAttr {
    pub test_quad: usize,
    pub false_list: Vec<usize>,
    pub iter_temp: String,
    pub valid: bool,
}

/// The synthesized attribute of a parse node, keyed by what the node is.
/// Reduction handlers only ever read the attributes of their children and
/// write their own, so evaluation is strictly bottom-up.
#[derive(Debug, Clone)]
pub enum Attr {
    None,
    Expr(ExprAttr),
    Stmt(StmtAttr),
    Flow(FlowAttr),
    Type(Type),
    Types(Vec<Type>),
    VarPattern { name: String, mutable: bool },
    Params(Vec<Parameter>),
    Exprs(Vec<ExprAttr>),
    Header(HeaderAttr),
    ForHead(ForHeadAttr),
    Op(String),
}

impl Attr {
    pub fn as_expr(&self) -> ExprAttr {
        match self {
            Attr::Expr(attr) => attr.clone(),
            _ => ExprAttr::default(),
        }
    }

    pub fn as_stmt(&self) -> StmtAttr {
        match self {
            Attr::Stmt(attr) => attr.clone(),
            _ => StmtAttr::default(),
        }
    }

    pub fn as_flow(&self) -> FlowAttr {
        match self {
            Attr::Flow(attr) => attr.clone(),
            _ => FlowAttr::default(),
        }
    }

    pub fn as_type(&self) -> Type {
        match self {
            Attr::Type(ty) => ty.clone(),
            _ => Type::Unit,
        }
    }

    pub fn as_types(&self) -> Vec<Type> {
        match self {
            Attr::Types(types) => types.clone(),
            _ => vec![],
        }
    }

    pub fn as_params(&self) -> Vec<Parameter> {
        match self {
            Attr::Params(parameters) => parameters.clone(),
            _ => vec![],
        }
    }

    pub fn as_exprs(&self) -> Vec<ExprAttr> {
        match self {
            Attr::Exprs(exprs) => exprs.clone(),
            _ => vec![],
        }
    }

    pub fn as_op(&self) -> String {
        match self {
            Attr::Op(op) => op.clone(),
            _ => String::new(),
        }
    }
}

/// One parse tree node. A node is terminal iff it carries a token and has
/// no children; internal nodes own their children left to right. The
/// position is the position of the node's first token, when there is one.
#[derive(Debug)]
pub struct ParseNode {
    pub symbol: String,
    pub children: Vec<ParseNode>,
    pub token: Option<Token>,
    pub line: usize,
    pub column: usize,
    pub attr: Attr,
}

impl ParseNode {
    pub fn leaf(token: Token) -> Self {
        let symbol = token.terminal_name().to_string();
        let (line, column) = (token.line, token.column);
        Self {
            symbol,
            children: vec![],
            token: Some(token),
            line,
            column,
            attr: Attr::None,
        }
    }

    pub fn internal(symbol: &str, children: Vec<ParseNode>) -> Self {
        let (line, column) = children
            .first()
            .map(|child| (child.line, child.column))
            .unwrap_or((0, 0));
        Self {
            symbol: symbol.to_string(),
            children,
            token: None,
            line,
            column,
            attr: Attr::None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.token.is_some()
    }

    /// The lexeme of a terminal node; empty for internal nodes.
    pub fn lexeme(&self) -> &str {
        self.token.as_ref().map(|t| t.lexeme.as_str()).unwrap_or("")
    }

    pub fn int_value(&self) -> Option<i64> {
        self.token.as_ref().and_then(Token::int_value)
    }
}

impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "{}({})", self.symbol, token.lexeme),
            None => write!(f, "{}[{}]", self.symbol, self.children.len()),
        }
    }
}
