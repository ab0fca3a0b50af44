// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeMap;
use std::fmt;

use crate::types::Type;

/// A function parameter with its zero-based position in the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable {
        name: String,
        ty: Type,
    },
    Parameter {
        name: String,
        ty: Type,
        position: usize,
    },
    Function {
        name: String,
        return_type: Type,
        parameters: Vec<Parameter>,
        entry_quad: usize,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable { name, .. }
            | Symbol::Parameter { name, .. }
            | Symbol::Function { name, .. } => name,
        }
    }

    /// The type a use of this symbol as a value denotes. Functions are not
    /// values in this language.
    pub fn value_type(&self) -> Option<&Type> {
        match self {
            Symbol::Variable { ty, .. } | Symbol::Parameter { ty, .. } => Some(ty),
            Symbol::Function { .. } => None,
        }
    }

    pub fn set_value_type(&mut self, new_type: Type) {
        match self {
            Symbol::Variable { ty, .. } | Symbol::Parameter { ty, .. } => *ty = new_type,
            Symbol::Function { .. } => (),
        }
    }

    pub fn is_function(&self) -> bool {
        match self {
            Symbol::Function { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Symbol::Variable { name, ty } => write!(f, "<Var {}: {}>", name, ty),
            Symbol::Parameter { name, ty, position } => {
                write!(f, "<Param {}: {} @{}>", name, ty, position)
            }
            Symbol::Function {
                name,
                return_type,
                parameters,
                ..
            } => {
                write!(f, "<Fn {}(", name)?;
                for (index, parameter) in parameters.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", parameter.name, parameter.ty)?;
                }
                write!(f, ") -> {}>", return_type)
            }
        }
    }
}

/// One lexical scope: a name and its bindings. The parent link is implicit
/// in the symbol table's scope stack.
#[derive(Debug)]
pub struct Scope {
    pub name: String,
    symbols: BTreeMap<String, Symbol>,
}

impl Scope {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            symbols: BTreeMap::new(),
        }
    }
}

/// Stack of scopes rooted in a global frame, plus the preloaded type
/// registry. Inserting always overwrites in the current scope (shadowing is
/// allowed); lookup walks from the current scope out to the global one.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    type_registry: BTreeMap<String, Type>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut type_registry = BTreeMap::new();
        type_registry.insert("i32".to_string(), Type::i32());
        type_registry.insert("bool".to_string(), Type::bool());
        Self {
            scopes: vec![Scope::new("global")],
            type_registry,
        }
    }

    pub fn enter_scope(&mut self, name: &str) {
        self.scopes.push(Scope::new(name));
    }

    /// Pops the current scope. The global frame is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn current_scope_name(&self) -> &str {
        &self.scopes.last().expect("a global scope always exists").name
    }

    pub fn at_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn insert(&mut self, symbol: Symbol) {
        let scope = self.scopes.last_mut().expect("a global scope always exists");
        scope.symbols.insert(symbol.name().to_string(), symbol);
    }

    pub fn insert_global(&mut self, symbol: Symbol) {
        self.scopes[0]
            .symbols
            .insert(symbol.name().to_string(), symbol);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(symbol) = scope.symbols.get(name) {
                return Some(symbol);
            }
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(symbol) = scope.symbols.get_mut(name) {
                return Some(symbol);
            }
        }
        None
    }

    pub fn lookup_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .last()
            .expect("a global scope always exists")
            .symbols
            .get(name)
    }

    /// Functions live in the global scope only.
    pub fn get_function(&self, name: &str) -> Option<&Symbol> {
        self.scopes[0]
            .symbols
            .get(name)
            .filter(|symbol| symbol.is_function())
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        self.type_registry.get(name)
    }

    pub fn register_type(&mut self, name: &str, ty: Type) -> bool {
        if self.type_registry.contains_key(name) {
            return false;
        }
        self.type_registry.insert(name.to_string(), ty);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, ty: Type) -> Symbol {
        Symbol::Variable {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn lookup_walks_outward() {
        let mut table = SymbolTable::new();
        table.insert(variable("x", Type::i32()));
        table.enter_scope("f");
        table.insert(variable("y", Type::bool()));
        assert!(table.lookup("x").is_some());
        assert!(table.lookup("y").is_some());
        assert!(table.lookup_current_scope("x").is_none());
        table.exit_scope();
        assert!(table.lookup("y").is_none());
    }

    #[test]
    fn shadowing_overwrites_in_current_scope() {
        let mut table = SymbolTable::new();
        table.insert(variable("x", Type::i32()));
        table.insert(variable("x", Type::bool()));
        match table.lookup("x") {
            Some(Symbol::Variable { ty, .. }) => assert!(ty.is_base_named("bool")),
            other => panic!("unexpected symbol: {:?}", other),
        }
    }

    #[test]
    fn global_scope_is_never_popped() {
        let mut table = SymbolTable::new();
        table.exit_scope();
        table.exit_scope();
        assert!(table.at_global_scope());
        assert_eq!(table.current_scope_name(), "global");
    }

    #[test]
    fn get_function_ignores_variables_and_inner_scopes() {
        let mut table = SymbolTable::new();
        table.insert(variable("f", Type::i32()));
        assert!(table.get_function("f").is_none());
        table.insert_global(Symbol::Function {
            name: "g".to_string(),
            return_type: Type::Unit,
            parameters: vec![],
            entry_quad: 0,
        });
        table.enter_scope("h");
        assert!(table.get_function("g").is_some());
    }

    #[test]
    fn type_registry_is_preloaded() {
        let mut table = SymbolTable::new();
        assert!(table.lookup_type("i32").is_some());
        assert!(table.lookup_type("bool").is_some());
        assert!(!table.register_type("i32", Type::i32()));
        assert!(table.register_type("unit", Type::Unit));
    }
}
