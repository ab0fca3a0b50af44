// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeMap;
use std::fmt;

use crate::attributes::{
    Attr, ExprAttr, FlowAttr, ForHeadAttr, HeaderAttr, ParseNode, StmtAttr,
};
use crate::codegen::{merge_lists, QuadEmitter, Quadruple};
use crate::grammar::{Production, ReductionKind};
use crate::parser::Reductions;
use crate::symbol::{Parameter, Symbol, SymbolTable};
use crate::types::{is_binop_compatible, is_type_compatible, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticErrorKind {
    Undeclared,
    Redeclared,
    TypeMismatch,
    NotMutable,
    BorrowConflict,
    ArityMismatch,
    IndexOutOfBounds,
    UninitializedUse,
    NotCallable,
    MissingReturn,
    UninferredType,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    NonIterable,
    NonBoolCondition,
    InvalidArraySize,
    InvalidMemberIndex,
    InvalidDeref,
}

/// A collected, non-fatal diagnostic. Analysis continues after every one of
/// these, degrading to `Unit` or best-guess types.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line > 0 {
            write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Per-variable borrow state: many shared borrows or one unique borrow.
#[derive(Debug, Clone, Default)]
pub struct BorrowState {
    pub is_mutable: bool,
    pub immutable_refs: u32,
    pub mutable_ref: bool,
}

/// One active loop: where `continue` jumps, the `break` jumps awaiting the
/// loop exit, and the value slot valued breaks agree on.
#[derive(Debug, Default)]
struct LoopFrame {
    begin_quad: usize,
    break_list: Vec<usize>,
    break_value: Option<(Type, String)>,
}

#[derive(Debug, Clone)]
struct CurrentFunction {
    name: String,
    return_type: Type,
    parameters: Vec<Parameter>,
    entry_quad: usize,
}

/// The semantic analyzer. All state is mutated exclusively by reduction
/// handlers in reduction order; `reset` restores a pristine instance
/// between runs.
pub struct SemanticAnalyzer {
    symbols: SymbolTable,
    emitter: QuadEmitter,
    errors: Vec<SemanticError>,
    pending_inference: BTreeMap<String, (usize, usize)>,
    current_function: Option<CurrentFunction>,
    loop_stack: Vec<LoopFrame>,
    borrows: BTreeMap<String, BorrowState>,
    last_place: Option<String>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reductions for SemanticAnalyzer {
    fn on_reduce(&mut self, node: &mut ParseNode, production: &Production) {
        self.dispatch(node, production);
        if let Attr::Expr(expr) = &node.attr {
            if let Some(place) = &expr.place {
                self.last_place = Some(place.clone());
            }
        }
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            emitter: QuadEmitter::new(),
            errors: vec![],
            pending_inference: BTreeMap::new(),
            current_function: None,
            loop_stack: vec![],
            borrows: BTreeMap::new(),
            last_place: None,
        }
    }

    /// Restore the analyzer to its initial state between runs.
    pub fn reset(&mut self) {
        self.symbols = SymbolTable::new();
        self.emitter.reset();
        self.errors.clear();
        self.pending_inference.clear();
        self.current_function = None;
        self.loop_stack.clear();
        self.borrows.clear();
        self.last_place = None;
    }

    pub fn errors(&self) -> &[SemanticError] {
        &self.errors
    }

    pub fn quads(&self) -> &[Quadruple] {
        &self.emitter.quads
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn at_pristine_state(&self) -> bool {
        self.errors.is_empty()
            && self.emitter.quads.is_empty()
            && self.emitter.temp_count() == 0
            && self.pending_inference.is_empty()
            && self.loop_stack.is_empty()
            && self.symbols.at_global_scope()
    }

    /// The line of the first collected error, for embedders that highlight
    /// one place.
    pub fn first_error_line(&self) -> Option<usize> {
        self.errors.first().map(|error| error.line)
    }

    fn error(&mut self, kind: SemanticErrorKind, message: String, line: usize, column: usize) {
        self.errors.push(SemanticError {
            kind,
            message,
            line,
            column,
        });
    }

    fn dispatch(&mut self, node: &mut ParseNode, production: &Production) {
        use ReductionKind::*;
        match production.kind {
            NoOp => node.attr = Attr::None,
            Passthrough => node.attr = node.children[0].attr.clone(),
            Paren => node.attr = node.children[1].attr.clone(),
            ProgramWrapUp => self.program_wrap_up(node),
            EntryJump => self.entry_jump(node),
            FnWithBlock => self.fn_with_block(node),
            FnWithExprBlock => self.fn_with_expr_block(node),
            FnHeader => self.fn_header(node),
            RetSome => node.attr = Attr::Type(node.children[1].attr.as_type()),
            RetUnit => node.attr = Attr::Type(Type::Unit),
            ParamsList => self.params_list(node),
            ParamsEmpty => node.attr = Attr::Params(vec![]),
            ParamListSingle => node.attr = Attr::Params(node.children[0].attr.as_params()),
            ParamListCons => {
                let mut parameters = node.children[0].attr.as_params();
                parameters.extend(node.children[2].attr.as_params());
                node.attr = Attr::Params(parameters);
            }
            Param => self.param(node),
            VarPattern => {
                node.attr = Attr::VarPattern {
                    name: node.children[0].lexeme().to_string(),
                    mutable: false,
                }
            }
            VarPatternMut => {
                node.attr = Attr::VarPattern {
                    name: node.children[1].lexeme().to_string(),
                    mutable: true,
                }
            }
            TypeI32 => {
                let ty = self
                    .symbols
                    .lookup_type("i32")
                    .cloned()
                    .unwrap_or_else(Type::i32);
                node.attr = Attr::Type(ty);
            }
            TypeArray => self.type_array(node),
            TypeTuple => {
                node.attr = Attr::Type(Type::Tuple {
                    members: node.children[1].attr.as_types(),
                    mutable: false,
                })
            }
            TypeRef => {
                node.attr = Attr::Type(Type::Reference {
                    target: Box::new(node.children[1].attr.as_type()),
                    mutable: false,
                })
            }
            TypeRefMut => {
                node.attr = Attr::Type(Type::Reference {
                    target: Box::new(node.children[2].attr.as_type()),
                    mutable: true,
                })
            }
            TypeListEmpty => node.attr = Attr::Types(vec![]),
            TypeListSingle => node.attr = Attr::Types(vec![node.children[0].attr.as_type()]),
            TypeListCons => {
                let mut types = vec![node.children[0].attr.as_type()];
                types.extend(node.children[2].attr.as_types());
                node.attr = Attr::Types(types);
            }
            Block => node.attr = Attr::Stmt(node.children[1].attr.as_stmt()),
            ExprBlock => self.expr_block(node),
            StmtsEmpty => node.attr = Attr::Stmt(StmtAttr::default()),
            StmtsCons => self.stmts_cons(node),
            BeginMarker | ReDoMarker => {
                node.attr = Attr::Flow(FlowAttr {
                    quad_index: self.emitter.next_quad(),
                    ..FlowAttr::default()
                })
            }
            EndMarker => self.end_marker(node),
            ControlFlowMarker => self.control_flow_marker(node),
            LoopMarker => self.loop_marker(node),
            StmtEmpty => node.attr = Attr::Stmt(StmtAttr::default()),
            StmtWrap => {
                let mut stmt = node.children[0].attr.as_stmt();
                if node.children[0].symbol == "ReturnStmt" {
                    stmt.last_return = true;
                }
                node.attr = Attr::Stmt(stmt);
            }
            StmtLoop | StmtExpr => {
                let value = node.children[0].attr.as_expr();
                node.attr = Attr::Stmt(StmtAttr {
                    next_list: value.next_list,
                    last_return: false,
                });
            }
            LetDeclTyped => self.let_decl(node, true),
            LetDeclInfer => self.let_decl(node, false),
            LetInitTyped => self.let_init(node, true),
            LetInitInfer => self.let_init(node, false),
            Assign => self.assign(node),
            ReturnUnit => self.return_unit(node),
            ReturnValue => self.return_value(node),
            If => self.if_stmt(node),
            IfElse => self.if_else(node),
            While => self.while_stmt(node),
            For => self.for_stmt(node),
            ForHead => self.for_head(node),
            RangeIterable => self.range_iterable(node),
            ExprIterable => self.expr_iterable(node),
            Loop => self.loop_expr(node),
            Break => self.break_stmt(node),
            BreakValue => self.break_value(node),
            Continue => self.continue_stmt(node),
            Select => self.select(node),
            LogicalOr => self.logical(node, true),
            LogicalAnd => self.logical(node, false),
            Relational => self.relational(node),
            Arithmetic => self.arithmetic(node),
            Borrow => self.borrow(node, false),
            BorrowMut => self.borrow(node, true),
            Call => self.call(node),
            NumberLiteral => {
                node.attr = Attr::Expr(ExprAttr {
                    ty: Type::i32(),
                    place: Some(node.children[0].lexeme().to_string()),
                    value: node.children[0].int_value(),
                    var_name: None,
                    next_list: vec![],
                })
            }
            PlaceValue => node.attr = node.children[0].attr.clone(),
            TupleLiteral => {
                let members: Vec<Type> = node.children[1]
                    .attr
                    .as_exprs()
                    .iter()
                    .map(|member| member.ty.clone())
                    .collect();
                node.attr = Attr::Expr(ExprAttr::typed(Type::Tuple {
                    members,
                    mutable: false,
                }));
            }
            ArrayLiteral => self.array_literal(node),
            Deref => self.deref(node),
            NamePlace => self.name_place(node),
            IndexPlace => self.index_place(node),
            MemberPlace => self.member_place(node),
            ExprListEmpty => node.attr = Attr::Exprs(vec![]),
            ExprListSingle => node.attr = Attr::Exprs(vec![node.children[0].attr.as_expr()]),
            ExprListCons => {
                let mut exprs = vec![node.children[0].attr.as_expr()];
                exprs.extend(node.children[2].attr.as_exprs());
                node.attr = Attr::Exprs(exprs);
            }
            Operator => node.attr = Attr::Op(node.children[0].lexeme().to_string()),
        }
    }

    // ---------- program structure ----------

    fn entry_jump(&mut self, node: &mut ParseNode) {
        let mut flow = FlowAttr::default();
        flow.next_list = vec![self.emitter.next_quad()];
        self.emitter.emit("j", None, None, None);
        node.attr = Attr::Flow(flow);
    }

    fn program_wrap_up(&mut self, node: &mut ParseNode) {
        let unresolved: Vec<(String, (usize, usize))> = self
            .pending_inference
            .iter()
            .map(|(name, position)| (name.clone(), *position))
            .collect();
        for (name, (line, column)) in unresolved {
            self.error(
                SemanticErrorKind::UninferredType,
                format!("cannot infer the type of `{}`: give it a type or an initial value", name),
                line,
                column,
            );
        }
        self.pending_inference.clear();
        match self.symbols.get_function("main") {
            Some(Symbol::Function { entry_quad, .. }) => {
                let entry = *entry_quad;
                let jumps = node.children[0].attr.as_flow().next_list;
                self.emitter.backpatch(&jumps, entry);
            }
            _ => self.error(
                SemanticErrorKind::Undeclared,
                "the program needs a `main` function as its entry point".to_string(),
                node.line,
                node.column,
            ),
        }
        node.attr = Attr::None;
    }

    // ---------- functions ----------

    fn fn_header(&mut self, node: &mut ParseNode) {
        let name = node.children[1].lexeme().to_string();
        let return_type = node.children[5].attr.as_type();
        let parameters = node.children[3].attr.as_params();
        self.symbols.enter_scope(&name);
        for parameter in &parameters {
            self.symbols.insert(Symbol::Parameter {
                name: parameter.name.clone(),
                ty: parameter.ty.clone(),
                position: parameter.position,
            });
        }
        // the borrow tracker is scoped to one function at a time
        self.borrows.clear();
        self.current_function = Some(CurrentFunction {
            name: name.clone(),
            return_type: return_type.clone(),
            parameters: parameters.clone(),
            entry_quad: self.emitter.next_quad(),
        });
        node.attr = Attr::Header(HeaderAttr {
            name,
            return_type,
            parameters,
        });
    }

    fn current_function_parts(&mut self, node: &ParseNode) -> (String, Type, Vec<Parameter>, usize) {
        match self.current_function.take() {
            Some(function) => (
                function.name,
                function.return_type,
                function.parameters,
                function.entry_quad,
            ),
            None => {
                // degraded path after an earlier failure
                let header = match &node.children[0].attr {
                    Attr::Header(header) => header.clone(),
                    _ => HeaderAttr {
                        name: String::new(),
                        return_type: Type::Unit,
                        parameters: vec![],
                    },
                };
                (header.name, header.return_type, header.parameters, 0)
            }
        }
    }

    fn fn_with_block(&mut self, node: &mut ParseNode) {
        let body = node.children[1].attr.as_stmt();
        let (name, return_type, parameters, entry_quad) = self.current_function_parts(node);
        if !body.last_return && !return_type.is_unit() {
            self.error(
                SemanticErrorKind::MissingReturn,
                format!(
                    "function `{}` returns {} but its body has no trailing return",
                    name, return_type
                ),
                node.children[0].line,
                node.children[0].column,
            );
        }
        let implicit = self
            .emitter
            .emit("RETURN", None, None, Some("$ret_reg".to_string()));
        self.emitter.backpatch(&body.next_list, implicit);
        self.symbols.exit_scope();
        self.symbols.insert_global(Symbol::Function {
            name,
            return_type,
            parameters,
            entry_quad,
        });
        node.attr = Attr::None;
    }

    fn fn_with_expr_block(&mut self, node: &mut ParseNode) {
        let value = node.children[1].attr.as_expr();
        let (name, return_type, parameters, entry_quad) = self.current_function_parts(node);
        if !is_type_compatible(&value.ty, &return_type) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "function `{}` declares {} but its body evaluates to {}",
                    name, return_type, value.ty
                ),
                node.children[0].line,
                node.children[0].column,
            );
        }
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&value.next_list, target);
        self.emitter
            .emit("RETURN", value.place.clone(), None, Some("$ret_reg".to_string()));
        self.symbols.exit_scope();
        self.symbols.insert_global(Symbol::Function {
            name,
            return_type,
            parameters,
            entry_quad,
        });
        node.attr = Attr::None;
    }

    fn params_list(&mut self, node: &mut ParseNode) {
        let collected = node.children[0].attr.as_params();
        let mut parameters: Vec<Parameter> = vec![];
        for mut parameter in collected {
            if parameters.iter().any(|seen| seen.name == parameter.name) {
                self.error(
                    SemanticErrorKind::Redeclared,
                    format!("duplicate parameter name `{}`", parameter.name),
                    node.line,
                    node.column,
                );
                continue;
            }
            parameter.position = parameters.len();
            parameters.push(parameter);
        }
        node.attr = Attr::Params(parameters);
    }

    fn param(&mut self, node: &mut ParseNode) {
        let (name, mutable) = var_pattern(&node.children[0]);
        let ty = node.children[2].attr.as_type().with_mutability(mutable);
        node.attr = Attr::Params(vec![Parameter {
            name,
            ty,
            position: 0,
        }]);
    }

    // ---------- types ----------

    fn type_array(&mut self, node: &mut ParseNode) {
        let element = node.children[1].attr.as_type();
        let size_node_position = (node.children[3].line, node.children[3].column);
        let size = match node.children[3].int_value() {
            Some(value) if value > 0 => value as usize,
            Some(value) => {
                self.error(
                    SemanticErrorKind::InvalidArraySize,
                    format!("array sizes must be positive, got {}", value),
                    size_node_position.0,
                    size_node_position.1,
                );
                1
            }
            None => {
                self.error(
                    SemanticErrorKind::InvalidArraySize,
                    format!("invalid array size `{}`", node.children[3].lexeme()),
                    size_node_position.0,
                    size_node_position.1,
                );
                1
            }
        };
        node.attr = Attr::Type(Type::Array {
            element: Box::new(element),
            size,
            mutable: false,
        });
    }

    // ---------- blocks and statement lists ----------

    fn expr_block(&mut self, node: &mut ParseNode) {
        let stmts = node.children[1].attr.as_stmt();
        let marker = node.children[2].attr.as_flow();
        self.emitter.backpatch(&stmts.next_list, marker.quad_index);
        node.attr = Attr::Expr(node.children[3].attr.as_expr());
    }

    fn stmts_cons(&mut self, node: &mut ParseNode) {
        let earlier = node.children[0].attr.as_stmt();
        let marker = node.children[1].attr.as_flow();
        let latest = node.children[2].attr.as_stmt();
        self.emitter.backpatch(&earlier.next_list, marker.quad_index);
        node.attr = Attr::Stmt(latest);
    }

    // ---------- markers ----------

    fn end_marker(&mut self, node: &mut ParseNode) {
        let mut flow = FlowAttr::default();
        flow.next_list = vec![self.emitter.next_quad()];
        self.emitter.emit("j", None, None, None);
        node.attr = Attr::Flow(flow);
    }

    fn control_flow_marker(&mut self, node: &mut ParseNode) {
        let place = self.last_place.clone();
        let mut flow = FlowAttr::default();
        flow.true_list = vec![self.emitter.next_quad()];
        self.emitter.emit("jnz", place, None, None);
        flow.false_list = vec![self.emitter.next_quad()];
        self.emitter.emit("j", None, None, None);
        flow.quad_index = self.emitter.next_quad();
        node.attr = Attr::Flow(flow);
    }

    fn loop_marker(&mut self, node: &mut ParseNode) {
        self.loop_stack.push(LoopFrame {
            begin_quad: self.emitter.next_quad(),
            break_list: vec![],
            break_value: None,
        });
        let name = format!("loop{}", self.loop_stack.len());
        self.symbols.enter_scope(&name);
        node.attr = Attr::None;
    }

    // ---------- declarations and assignment ----------

    fn let_decl(&mut self, node: &mut ParseNode, typed: bool) {
        let (name, mutable) = var_pattern(&node.children[1]);
        let inner = if typed {
            Some(Box::new(node.children[3].attr.as_type()))
        } else {
            None
        };
        if typed {
            // an explicit type supersedes any pending inference it shadows
            self.pending_inference.remove(&name);
        } else {
            self.pending_inference
                .insert(name.clone(), (node.line, node.column));
        }
        self.symbols.insert(Symbol::Variable {
            name,
            ty: Type::Uninitialized { inner, mutable },
        });
        node.attr = Attr::Stmt(StmtAttr::default());
    }

    fn initializer_ok(&mut self, value: &ExprAttr, line: usize, column: usize) -> bool {
        if value.ty.is_uninitialized() {
            self.error(
                SemanticErrorKind::UninitializedUse,
                "use of a possibly-uninitialized value".to_string(),
                line,
                column,
            );
            false
        } else if value.ty.is_unit() {
            self.error(
                SemanticErrorKind::TypeMismatch,
                "the expression has no value (unit type)".to_string(),
                line,
                column,
            );
            false
        } else {
            true
        }
    }

    fn let_init(&mut self, node: &mut ParseNode, typed: bool) {
        let (name, mutable) = var_pattern(&node.children[1]);
        let value_index = if typed { 5 } else { 3 };
        let value = node.children[value_index].attr.as_expr();
        let value_position = (node.children[value_index].line, node.children[value_index].column);
        node.attr = Attr::Stmt(StmtAttr::default());
        if !self.initializer_ok(&value, value_position.0, value_position.1) {
            return;
        }
        let mut var_type = if typed {
            let declared = node.children[3].attr.as_type();
            if is_type_compatible(&value.ty, &declared) {
                value.ty.clone()
            } else {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("mismatched types: expected {}, found {}", declared, value.ty),
                    value_position.0,
                    value_position.1,
                );
                declared
            }
        } else {
            value.ty.clone()
        };
        var_type.set_mutable(mutable);
        self.pending_inference.remove(&name);
        self.symbols.insert(Symbol::Variable {
            name: name.clone(),
            ty: var_type,
        });
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&value.next_list, target);
        self.emitter.emit("=", value.place.clone(), None, Some(name));
    }

    fn assign(&mut self, node: &mut ParseNode) {
        let place = node.children[0].attr.as_expr();
        let value = node.children[2].attr.as_expr();
        let place_position = (node.children[0].line, node.children[0].column);
        let value_position = (node.children[2].line, node.children[2].column);
        node.attr = Attr::Stmt(StmtAttr::default());
        if place.ty.is_unit() {
            // the place already failed to resolve; stay quiet
            return;
        }
        let pending = place
            .var_name
            .as_ref()
            .map_or(false, |name| self.pending_inference.contains_key(name));
        if pending {
            if !self.initializer_ok(&value, value_position.0, value_position.1) {
                return;
            }
            // first assignment of an inferred binding fixes its type
            let name = place
                .var_name
                .clone()
                .expect("pending implies a named place");
            let declared_mutability = place.ty.is_mutable();
            if let Some(symbol) = self.symbols.lookup_mut(&name) {
                symbol.set_value_type(value.ty.clone().with_mutability(declared_mutability));
            }
            self.pending_inference.remove(&name);
        } else {
            if !place.ty.is_mutable() {
                let message = match &place.var_name {
                    Some(name) => format!("cannot assign twice to immutable variable `{}`", name),
                    None => "cannot assign to an immutable place".to_string(),
                };
                self.error(
                    SemanticErrorKind::NotMutable,
                    message,
                    place_position.0,
                    place_position.1,
                );
                return;
            }
            if !self.initializer_ok(&value, value_position.0, value_position.1) {
                return;
            }
            if !is_type_compatible(&value.ty, &place.ty) {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("mismatched types: expected {}, found {}", place.ty, value.ty),
                    value_position.0,
                    value_position.1,
                );
                return;
            }
        }
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&value.next_list, target);
        self.emitter
            .emit("=", value.place.clone(), None, place.place.clone());
    }

    // ---------- return ----------

    fn declared_return_type(&self) -> Type {
        self.current_function
            .as_ref()
            .map(|function| function.return_type.clone())
            .unwrap_or(Type::Unit)
    }

    fn return_unit(&mut self, node: &mut ParseNode) {
        let declared = self.declared_return_type();
        if !is_type_compatible(&Type::Unit, &declared) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!("mismatched return type: declared {}, returning unit", declared),
                node.line,
                node.column,
            );
        }
        self.emitter
            .emit("RETURN", None, None, Some("$ret_reg".to_string()));
        node.attr = Attr::Stmt(StmtAttr::default());
    }

    fn return_value(&mut self, node: &mut ParseNode) {
        let declared = self.declared_return_type();
        let value = node.children[1].attr.as_expr();
        if !is_type_compatible(&value.ty, &declared) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "mismatched return type: declared {}, returning {}",
                    declared, value.ty
                ),
                node.line,
                node.column,
            );
        }
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&value.next_list, target);
        self.emitter
            .emit("RETURN", value.place.clone(), None, Some("$ret_reg".to_string()));
        node.attr = Attr::Stmt(StmtAttr::default());
    }

    // ---------- control flow ----------

    fn condition_ok(&mut self, condition: &ExprAttr, line: usize, column: usize) -> bool {
        let is_bool = condition
            .ty
            .effective()
            .map_or(false, |ty| ty.is_base_named("bool"));
        if !is_bool {
            self.error(
                SemanticErrorKind::NonBoolCondition,
                format!("the condition must be bool, found {}", condition.ty),
                line,
                column,
            );
        }
        is_bool
    }

    fn if_stmt(&mut self, node: &mut ParseNode) {
        let condition = node.children[1].attr.as_expr();
        let flow = node.children[2].attr.as_flow();
        let begin = node.children[3].attr.as_flow();
        let body = node.children[4].attr.as_stmt();
        if !self.condition_ok(&condition, node.children[1].line, node.children[1].column) {
            node.attr = Attr::Stmt(StmtAttr {
                next_list: merge_lists(&[&flow.true_list, &flow.false_list, &body.next_list]),
                last_return: false,
            });
            return;
        }
        self.emitter.backpatch(&flow.true_list, begin.quad_index);
        node.attr = Attr::Stmt(StmtAttr {
            next_list: merge_lists(&[&flow.false_list, &body.next_list]),
            last_return: false,
        });
    }

    fn if_else(&mut self, node: &mut ParseNode) {
        let condition = node.children[1].attr.as_expr();
        let flow = node.children[2].attr.as_flow();
        let then_begin = node.children[3].attr.as_flow();
        let then_body = node.children[4].attr.as_stmt();
        let end = node.children[5].attr.as_flow();
        let else_begin = node.children[7].attr.as_flow();
        let else_body = node.children[8].attr.as_stmt();
        if !self.condition_ok(&condition, node.children[1].line, node.children[1].column) {
            node.attr = Attr::Stmt(StmtAttr {
                next_list: merge_lists(&[
                    &flow.true_list,
                    &flow.false_list,
                    &then_body.next_list,
                    &end.next_list,
                    &else_body.next_list,
                ]),
                last_return: false,
            });
            return;
        }
        self.emitter.backpatch(&flow.true_list, then_begin.quad_index);
        self.emitter.backpatch(&flow.false_list, else_begin.quad_index);
        node.attr = Attr::Stmt(StmtAttr {
            next_list: merge_lists(&[
                &then_body.next_list,
                &end.next_list,
                &else_body.next_list,
            ]),
            last_return: false,
        });
    }

    fn while_stmt(&mut self, node: &mut ParseNode) {
        let frame = self.loop_stack.pop().unwrap_or_default();
        self.symbols.exit_scope();
        let redo = node.children[2].attr.as_flow();
        let condition = node.children[3].attr.as_expr();
        let flow = node.children[4].attr.as_flow();
        let begin = node.children[5].attr.as_flow();
        let body = node.children[6].attr.as_stmt();
        if !self.condition_ok(&condition, node.children[3].line, node.children[3].column) {
            node.attr = Attr::Stmt(StmtAttr {
                next_list: merge_lists(&[
                    &flow.true_list,
                    &flow.false_list,
                    &body.next_list,
                    &frame.break_list,
                ]),
                last_return: false,
            });
            return;
        }
        self.emitter.backpatch(&body.next_list, redo.quad_index);
        self.emitter.backpatch(&flow.true_list, begin.quad_index);
        self.emitter
            .emit("j", None, None, Some(redo.quad_index.to_string()));
        node.attr = Attr::Stmt(StmtAttr {
            next_list: merge_lists(&[&flow.false_list, &frame.break_list]),
            last_return: false,
        });
    }

    fn range_iterable(&mut self, node: &mut ParseNode) {
        let start = node.children[0].attr.as_expr();
        let end = node.children[2].attr.as_expr();
        let both_i32 = [&start, &end].iter().all(|bound| {
            bound
                .ty
                .effective()
                .map_or(false, |ty| ty.is_base_named("i32"))
        });
        if !both_i32 {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!("range bounds must be i32, found {} and {}", start.ty, end.ty),
                node.line,
                node.column,
            );
        }
        node.attr = Attr::Expr(ExprAttr::typed(Type::Range {
            element: Box::new(Type::i32()),
            start: start.place.clone(),
            end: end.place.clone(),
            step: 1,
        }));
    }

    fn expr_iterable(&mut self, node: &mut ParseNode) {
        let value = node.children[0].attr.as_expr();
        let is_array = match value.ty.effective() {
            Some(Type::Array { .. }) => true,
            _ => false,
        };
        if !is_array {
            self.error(
                SemanticErrorKind::NonIterable,
                format!("the type {} is not iterable", value.ty),
                node.line,
                node.column,
            );
        }
        node.attr = Attr::Expr(value);
    }

    fn for_head(&mut self, node: &mut ParseNode) {
        let (var_name, var_mutable) = var_pattern(&node.children[0]);
        let iterable = node.children[2].attr.as_expr();
        let normalized = iterable.ty.effective().cloned().unwrap_or(Type::Unit);
        match normalized {
            Type::Range { element, start, end, .. } => {
                self.symbols.insert(Symbol::Variable {
                    name: var_name.clone(),
                    ty: element.as_ref().clone().with_mutability(var_mutable),
                });
                node.attr =
                    Attr::ForHead(self.emit_for_prologue(&var_name, start, end));
            }
            Type::Array { element, size, .. } => {
                self.symbols.insert(Symbol::Variable {
                    name: var_name.clone(),
                    ty: element.as_ref().clone().with_mutability(var_mutable),
                });
                node.attr = Attr::ForHead(self.emit_for_prologue(
                    &var_name,
                    Some("0".to_string()),
                    Some(size.to_string()),
                ));
            }
            other => {
                self.error(
                    SemanticErrorKind::NonIterable,
                    format!("`for` iterates ranges or arrays, not {}", other),
                    node.children[2].line,
                    node.children[2].column,
                );
                self.symbols.insert(Symbol::Variable {
                    name: var_name,
                    ty: Type::Unit,
                });
                node.attr = Attr::ForHead(ForHeadAttr {
                    test_quad: self.emitter.next_quad(),
                    false_list: vec![],
                    iter_temp: String::new(),
                    valid: false,
                });
            }
        }
    }

    /// iterator := start; test: `<` true-jumps to the per-iteration
    /// assignment, a `j` false-jumps out; the step and the jump back are
    /// the loop statement's job.
    fn emit_for_prologue(
        &mut self,
        var_name: &str,
        start: Option<String>,
        end: Option<String>,
    ) -> ForHeadAttr {
        let temp = self.emitter.new_temp();
        self.emitter.emit("=", start, None, Some(temp.clone()));
        let test = self.emitter.next_quad();
        let true_jump = self.emitter.emit("<", Some(temp.clone()), end, None);
        let false_jump = self.emitter.emit("j", None, None, None);
        let assign = self.emitter.next_quad();
        self.emitter
            .emit("=", Some(temp.clone()), None, Some(var_name.to_string()));
        self.emitter.backpatch(&[true_jump], assign);
        ForHeadAttr {
            test_quad: test,
            false_list: vec![false_jump],
            iter_temp: temp,
            valid: true,
        }
    }

    fn for_stmt(&mut self, node: &mut ParseNode) {
        let frame = self.loop_stack.pop().unwrap_or_default();
        self.symbols.exit_scope();
        let head = match &node.children[2].attr {
            Attr::ForHead(head) => head.clone(),
            _ => ForHeadAttr::default(),
        };
        let body = node.children[4].attr.as_stmt();
        if head.valid {
            self.emitter.emit(
                "+",
                Some(head.iter_temp.clone()),
                Some("1".to_string()),
                Some(head.iter_temp.clone()),
            );
            self.emitter
                .emit("j", None, None, Some(head.test_quad.to_string()));
        }
        node.attr = Attr::Stmt(StmtAttr {
            next_list: merge_lists(&[&head.false_list, &body.next_list, &frame.break_list]),
            last_return: false,
        });
    }

    fn loop_expr(&mut self, node: &mut ParseNode) {
        let frame = self.loop_stack.pop().unwrap_or_default();
        self.symbols.exit_scope();
        let body = node.children[2].attr.as_stmt();
        self.emitter.backpatch(&body.next_list, frame.begin_quad);
        self.emitter
            .emit("j", None, None, Some(frame.begin_quad.to_string()));
        let (ty, place) = match frame.break_value {
            Some((ty, temp)) => (ty, Some(temp)),
            None => (Type::Unit, None),
        };
        node.attr = Attr::Expr(ExprAttr {
            ty,
            place,
            value: None,
            var_name: None,
            next_list: frame.break_list,
        });
    }

    fn break_stmt(&mut self, node: &mut ParseNode) {
        node.attr = Attr::Stmt(StmtAttr::default());
        if self.loop_stack.is_empty() {
            self.error(
                SemanticErrorKind::BreakOutsideLoop,
                "`break` outside of a loop".to_string(),
                node.line,
                node.column,
            );
            return;
        }
        let index = self.emitter.emit("j", None, None, None);
        self.loop_stack
            .last_mut()
            .expect("emptiness checked above")
            .break_list
            .push(index);
    }

    fn break_value(&mut self, node: &mut ParseNode) {
        node.attr = Attr::Stmt(StmtAttr::default());
        if self.loop_stack.is_empty() {
            self.error(
                SemanticErrorKind::BreakOutsideLoop,
                "`break` outside of a loop".to_string(),
                node.line,
                node.column,
            );
            return;
        }
        let value = node.children[1].attr.as_expr();
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&value.next_list, target);
        let existing = self
            .loop_stack
            .last()
            .expect("emptiness checked above")
            .break_value
            .clone();
        let temp = match existing {
            Some((ty, temp)) => {
                if !is_type_compatible(&value.ty, &ty) {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!(
                            "`break` values of one loop must agree: {} vs {}",
                            ty, value.ty
                        ),
                        node.children[1].line,
                        node.children[1].column,
                    );
                }
                temp
            }
            None => self.emitter.new_temp(),
        };
        self.emitter
            .emit("=", value.place.clone(), None, Some(temp.clone()));
        let index = self.emitter.emit("j", None, None, None);
        let frame = self
            .loop_stack
            .last_mut()
            .expect("emptiness checked above");
        frame.break_list.push(index);
        if frame.break_value.is_none() {
            frame.break_value = Some((value.ty, temp));
        }
    }

    fn continue_stmt(&mut self, node: &mut ParseNode) {
        node.attr = Attr::Stmt(StmtAttr::default());
        let begin = self.loop_stack.last().map(|frame| frame.begin_quad);
        match begin {
            Some(begin) => {
                self.emitter
                    .emit("j", None, None, Some(begin.to_string()));
            }
            None => self.error(
                SemanticErrorKind::ContinueOutsideLoop,
                "`continue` outside of a loop".to_string(),
                node.line,
                node.column,
            ),
        }
    }

    // ---------- expressions ----------

    fn select(&mut self, node: &mut ParseNode) {
        let condition = node.children[1].attr.as_expr();
        let flow = node.children[2].attr.as_flow();
        let first = node.children[4].attr.as_expr();
        let second = node.children[7].attr.as_expr();
        if !self.condition_ok(&condition, node.children[1].line, node.children[1].column) {
            node.attr = Attr::Expr(ExprAttr::default());
            return;
        }
        if !is_type_compatible(&first.ty, &second.ty) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "`if` and `else` arms have incompatible types: {} vs {}",
                    first.ty, second.ty
                ),
                node.line,
                node.column,
            );
            node.attr = Attr::Expr(ExprAttr::default());
            return;
        }
        let temp = self.emitter.new_temp();
        let target = self.emitter.next_quad();
        self.emitter.backpatch(&flow.true_list, target);
        self.emitter.backpatch(&flow.false_list, target + 2);
        self.emitter
            .emit("=", first.place.clone(), None, Some(temp.clone()));
        self.emitter
            .emit("j", None, None, Some((target + 3).to_string()));
        self.emitter
            .emit("=", second.place.clone(), None, Some(temp.clone()));
        node.attr = Attr::Expr(ExprAttr::with_place(first.ty.clone(), temp));
    }

    /// `&&` and `||` lower through the marker scheme rather than computing
    /// boolean values directly: the marker's jump pair routes around the
    /// right operand and a fresh temporary materializes 1 or 0.
    fn logical(&mut self, node: &mut ParseNode, is_or: bool) {
        let left = node.children[0].attr.as_expr();
        let flow = node.children[2].attr.as_flow();
        let right = node.children[3].attr.as_expr();
        let op = node.children[1].lexeme().to_string();
        if !is_binop_compatible(&op, &left.ty, &right.ty) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "operator `{}` cannot combine {} and {}",
                    op, left.ty, right.ty
                ),
                node.children[1].line,
                node.children[1].column,
            );
            node.attr = Attr::Expr(ExprAttr::typed(Type::Unit));
            return;
        }
        let temp = self.emitter.new_temp();
        if is_or {
            // a true left operand short-circuits, a false one falls into
            // the right operand
            self.emitter.backpatch(&flow.false_list, flow.quad_index);
        } else {
            self.emitter.backpatch(&flow.true_list, flow.quad_index);
        }
        let base = self.emitter.next_quad();
        self.emitter
            .emit("=", right.place.clone(), None, Some(temp.clone()));
        self.emitter
            .emit("j", None, None, Some((base + 3).to_string()));
        let short_circuit = if is_or { "1" } else { "0" };
        self.emitter
            .emit("=", Some(short_circuit.to_string()), None, Some(temp.clone()));
        if is_or {
            self.emitter.backpatch(&flow.true_list, base + 2);
        } else {
            self.emitter.backpatch(&flow.false_list, base + 2);
        }
        node.attr = Attr::Expr(ExprAttr::with_place(Type::bool(), temp));
    }

    fn relational(&mut self, node: &mut ParseNode) {
        let left = node.children[0].attr.as_expr();
        let op = node.children[1].attr.as_op();
        let right = node.children[2].attr.as_expr();
        if !is_binop_compatible(&op, &left.ty, &right.ty) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "operator `{}` cannot compare {} and {}",
                    op, left.ty, right.ty
                ),
                node.children[1].line,
                node.children[1].column,
            );
            node.attr = Attr::Expr(ExprAttr::typed(Type::Unit));
            return;
        }
        let temp = self.emitter.new_temp();
        self.emitter
            .emit(&op, left.place.clone(), right.place.clone(), Some(temp.clone()));
        node.attr = Attr::Expr(ExprAttr::with_place(Type::bool(), temp));
    }

    fn arithmetic(&mut self, node: &mut ParseNode) {
        let left = node.children[0].attr.as_expr();
        let op = node.children[1].attr.as_op();
        let right = node.children[2].attr.as_expr();
        if !is_binop_compatible(&op, &left.ty, &right.ty) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!(
                    "operator `{}` cannot combine {} and {}",
                    op, left.ty, right.ty
                ),
                node.children[1].line,
                node.children[1].column,
            );
            node.attr = Attr::Expr(ExprAttr::typed(Type::Unit));
            return;
        }
        let ty = left.ty.effective().cloned().unwrap_or(Type::Unit);
        let temp = self.emitter.new_temp();
        self.emitter
            .emit(&op, left.place.clone(), right.place.clone(), Some(temp.clone()));
        node.attr = Attr::Expr(ExprAttr::with_place(ty, temp));
    }

    fn borrow(&mut self, node: &mut ParseNode, mutable: bool) {
        let operand = node
            .children
            .last()
            .map(|child| child.attr.as_expr())
            .unwrap_or_default();
        if let Some(name) = operand.var_name.clone() {
            self.track_borrow(&name, mutable, node.line, node.column);
        }
        let place = operand.place.as_ref().map(|place| {
            if mutable {
                format!("&mut {}", place)
            } else {
                format!("&{}", place)
            }
        });
        // a violation still synthesizes the reference type
        node.attr = Attr::Expr(ExprAttr {
            ty: Type::Reference {
                target: Box::new(operand.ty.effective().cloned().unwrap_or(Type::Unit)),
                mutable,
            },
            place,
            value: None,
            var_name: None,
            next_list: vec![],
        });
    }

    fn track_borrow(&mut self, name: &str, mutable: bool, line: usize, column: usize) {
        if let Some(state) = self.borrows.get(name).cloned() {
            if mutable && !state.is_mutable {
                self.error(
                    SemanticErrorKind::NotMutable,
                    format!("cannot borrow immutable variable `{}` as mutable", name),
                    line,
                    column,
                );
                return;
            }
            if mutable && (state.immutable_refs > 0 || state.mutable_ref) {
                self.error(
                    SemanticErrorKind::BorrowConflict,
                    format!(
                        "cannot borrow `{}` as mutable while other borrows exist",
                        name
                    ),
                    line,
                    column,
                );
                return;
            }
            if !mutable && state.mutable_ref {
                self.error(
                    SemanticErrorKind::BorrowConflict,
                    format!(
                        "cannot borrow `{}` as shared while a mutable borrow exists",
                        name
                    ),
                    line,
                    column,
                );
                return;
            }
            let entry = self
                .borrows
                .get_mut(name)
                .expect("the entry was just found");
            if mutable {
                entry.mutable_ref = true;
            } else {
                entry.immutable_refs += 1;
            }
        } else {
            let symbol_mutability = match self.symbols.lookup(name) {
                Some(symbol) => symbol
                    .value_type()
                    .map(Type::is_mutable)
                    .unwrap_or(false),
                None => return,
            };
            if mutable && !symbol_mutability {
                self.error(
                    SemanticErrorKind::NotMutable,
                    format!("cannot borrow immutable variable `{}` as mutable", name),
                    line,
                    column,
                );
                return;
            }
            self.borrows.insert(
                name.to_string(),
                BorrowState {
                    is_mutable: symbol_mutability,
                    immutable_refs: if mutable { 0 } else { 1 },
                    mutable_ref: mutable,
                },
            );
        }
    }

    fn call(&mut self, node: &mut ParseNode) {
        let callee = node.children[0].attr.as_expr();
        let args = node.children[2].attr.as_exprs();
        let position = (node.line, node.column);
        let name = match callee.var_name.clone() {
            Some(name) => name,
            None => {
                self.error(
                    SemanticErrorKind::NotCallable,
                    "this expression is not callable".to_string(),
                    position.0,
                    position.1,
                );
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        };
        let (return_type, parameters) = match self.symbols.get_function(&name) {
            Some(Symbol::Function {
                return_type,
                parameters,
                ..
            }) => (return_type.clone(), parameters.clone()),
            _ => {
                if self.symbols.lookup(&name).is_some() {
                    self.error(
                        SemanticErrorKind::NotCallable,
                        format!("`{}` is not a function", name),
                        position.0,
                        position.1,
                    );
                }
                // a fully unknown name was already reported at its use
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        };
        if args.len() != parameters.len() {
            self.error(
                SemanticErrorKind::ArityMismatch,
                format!(
                    "`{}` takes {} argument(s) but {} were supplied",
                    name,
                    parameters.len(),
                    args.len()
                ),
                position.0,
                position.1,
            );
            node.attr = Attr::Expr(ExprAttr::default());
            return;
        }
        for (arg, parameter) in args.iter().zip(parameters.iter()) {
            if !is_type_compatible(&arg.ty, &parameter.ty) {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!(
                        "argument `{}` of `{}` expects {}, found {}",
                        parameter.name, name, parameter.ty, arg.ty
                    ),
                    position.0,
                    position.1,
                );
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        }
        for arg in &args {
            self.emitter.emit("param", arg.place.clone(), None, None);
        }
        self.emitter
            .emit("call", Some(name), Some(args.len().to_string()), None);
        let temp = self.emitter.new_temp();
        self.emitter
            .emit("=", Some("$ret_reg".to_string()), None, Some(temp.clone()));
        node.attr = Attr::Expr(ExprAttr::with_place(return_type, temp));
    }

    fn array_literal(&mut self, node: &mut ParseNode) {
        let elements = node.children[1].attr.as_exprs();
        if elements.is_empty() {
            node.attr = Attr::Expr(ExprAttr::typed(Type::Array {
                element: Box::new(Type::Unit),
                size: 0,
                mutable: false,
            }));
            return;
        }
        let first = elements[0].ty.clone();
        for element in &elements[1..] {
            if element.ty != first {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!(
                        "array elements must share one type: {} vs {}",
                        first, element.ty
                    ),
                    node.line,
                    node.column,
                );
                break;
            }
        }
        node.attr = Attr::Expr(ExprAttr::typed(Type::Array {
            element: Box::new(first),
            size: elements.len(),
            mutable: false,
        }));
    }

    fn deref(&mut self, node: &mut ParseNode) {
        let inner = node.children[1].attr.as_expr();
        match inner.ty.effective().cloned() {
            Some(Type::Reference { target, mutable }) => {
                let mut ty = *target;
                ty.set_mutable(mutable);
                node.attr = Attr::Expr(ExprAttr {
                    ty,
                    place: inner.place.as_ref().map(|place| format!("*{}", place)),
                    value: None,
                    var_name: inner.var_name.clone(),
                    next_list: vec![],
                });
            }
            _ => {
                self.error(
                    SemanticErrorKind::InvalidDeref,
                    format!("the type {} cannot be dereferenced", inner.ty),
                    node.line,
                    node.column,
                );
                node.attr = Attr::Expr(ExprAttr::default());
            }
        }
    }

    fn name_place(&mut self, node: &mut ParseNode) {
        let name = node.children[0].lexeme().to_string();
        let ty = match self.symbols.lookup(&name) {
            Some(symbol) => symbol.value_type().cloned().unwrap_or(Type::Unit),
            None => {
                self.error(
                    SemanticErrorKind::Undeclared,
                    format!("undeclared identifier `{}`", name),
                    node.line,
                    node.column,
                );
                Type::Unit
            }
        };
        node.attr = Attr::Expr(ExprAttr {
            ty,
            place: Some(name.clone()),
            value: None,
            var_name: Some(name),
            next_list: vec![],
        });
    }

    fn index_place(&mut self, node: &mut ParseNode) {
        let base = node.children[0].attr.as_expr();
        let index = node.children[2].attr.as_expr();
        let (element, size, mutable) = match base.ty.effective().cloned() {
            Some(Type::Array {
                element,
                size,
                mutable,
            }) => (element, size, mutable),
            _ => {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("the type {} cannot be indexed", base.ty),
                    node.children[1].line,
                    node.children[1].column,
                );
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        };
        let index_is_i32 = index
            .ty
            .effective()
            .map_or(false, |ty| ty.is_base_named("i32"));
        if !index_is_i32 {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!("array indices must be i32, found {}", index.ty),
                node.children[2].line,
                node.children[2].column,
            );
            node.attr = Attr::Expr(ExprAttr::default());
            return;
        }
        if let Some(value) = index.value {
            if value < 0 || value as usize >= size {
                self.error(
                    SemanticErrorKind::IndexOutOfBounds,
                    format!(
                        "index {} is out of range for [{}; {}]",
                        value, element, size
                    ),
                    node.children[2].line,
                    node.children[2].column,
                );
            }
        }
        let mut ty = *element;
        ty.set_mutable(mutable);
        let place = Some(format!(
            "{}[{}]",
            base.place.clone().unwrap_or_default(),
            index.place.clone().unwrap_or_default()
        ));
        node.attr = Attr::Expr(ExprAttr {
            ty,
            place,
            value: None,
            var_name: None,
            next_list: vec![],
        });
    }

    fn member_place(&mut self, node: &mut ParseNode) {
        let base = node.children[0].attr.as_expr();
        let (members, mutable) = match base.ty.effective().cloned() {
            Some(Type::Tuple { members, mutable }) => (members, mutable),
            _ => {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("the type {} has no numbered members", base.ty),
                    node.line,
                    node.column,
                );
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        };
        let member_index = match node.children[2].int_value() {
            Some(value) if value >= 0 => value as usize,
            _ => {
                self.error(
                    SemanticErrorKind::InvalidMemberIndex,
                    format!("invalid member index `{}`", node.children[2].lexeme()),
                    node.children[2].line,
                    node.children[2].column,
                );
                node.attr = Attr::Expr(ExprAttr::default());
                return;
            }
        };
        if member_index >= members.len() {
            self.error(
                SemanticErrorKind::InvalidMemberIndex,
                format!(
                    "member index {} is out of range for a tuple of {} member(s)",
                    member_index,
                    members.len()
                ),
                node.children[2].line,
                node.children[2].column,
            );
            node.attr = Attr::Expr(ExprAttr::default());
            return;
        }
        let mut ty = members[member_index].clone();
        ty.set_mutable(mutable);
        let place = base
            .place
            .as_ref()
            .map(|place| format!("{}.{}", place, member_index));
        let var_name = base
            .var_name
            .as_ref()
            .map(|name| format!("{}.{}", name, member_index));
        node.attr = Attr::Expr(ExprAttr {
            ty,
            place,
            value: None,
            var_name,
            next_list: vec![],
        });
    }
}

fn var_pattern(node: &ParseNode) -> (String, bool) {
    match &node.attr {
        Attr::VarPattern { name, mutable } => (name.clone(), *mutable),
        _ => (String::new(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_analyzer_is_pristine() {
        let analyzer = SemanticAnalyzer::new();
        assert!(analyzer.at_pristine_state());
        assert!(analyzer.first_error_line().is_none());
    }

    #[test]
    fn reset_restores_pristine_state() {
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.emitter.emit("j", None, None, None);
        analyzer.emitter.new_temp();
        analyzer.symbols.enter_scope("f");
        analyzer.loop_stack.push(LoopFrame::default());
        analyzer.error(SemanticErrorKind::Undeclared, "x".to_string(), 1, 1);
        assert!(!analyzer.at_pristine_state());
        analyzer.reset();
        assert!(analyzer.at_pristine_state());
    }

    #[test]
    fn borrow_tracker_enforces_exclusive_mutable_borrows() {
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.symbols.insert(Symbol::Variable {
            name: "x".to_string(),
            ty: Type::i32().with_mutability(true),
        });
        analyzer.track_borrow("x", false, 1, 1);
        analyzer.track_borrow("x", false, 1, 5);
        assert!(analyzer.errors().is_empty());
        analyzer.track_borrow("x", true, 1, 9);
        assert_eq!(analyzer.errors().len(), 1);
        assert_eq!(
            analyzer.errors()[0].kind,
            SemanticErrorKind::BorrowConflict
        );
        // the invariant: a recorded unique borrow excludes shared ones
        let state = analyzer.borrows.get("x").unwrap();
        assert!(!(state.mutable_ref && state.immutable_refs > 0));
    }

    #[test]
    fn borrow_tracker_requires_mutable_binding_for_unique_borrows() {
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.symbols.insert(Symbol::Variable {
            name: "x".to_string(),
            ty: Type::i32(),
        });
        analyzer.track_borrow("x", true, 2, 3);
        assert_eq!(analyzer.errors().len(), 1);
        assert_eq!(analyzer.errors()[0].kind, SemanticErrorKind::NotMutable);
        assert_eq!(analyzer.first_error_line(), Some(2));
    }

    #[test]
    fn shared_borrow_after_unique_borrow_conflicts() {
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.symbols.insert(Symbol::Variable {
            name: "x".to_string(),
            ty: Type::i32().with_mutability(true),
        });
        analyzer.track_borrow("x", true, 1, 1);
        analyzer.track_borrow("x", false, 1, 5);
        assert_eq!(analyzer.errors().len(), 1);
        assert_eq!(
            analyzer.errors()[0].kind,
            SemanticErrorKind::BorrowConflict
        );
    }
}
