// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use lazy_static::lazy_static;

use crate::firsts::{FirstSets, EPSILON};
use crate::grammar::{Grammar, GrammarError, RUST_LIKE_GRAMMAR};

/// An LR(1) item: a production with a dot position and one lookahead
/// terminal. Items are value-equal and ordered, so a `BTreeSet` of them is
/// a canonical item set and state equality is plain set equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LrItem {
    pub lhs: String,
    pub rhs: Vec<String>,
    pub dot: usize,
    pub lookahead: String,
}

impl LrItem {
    pub fn is_complete(&self) -> bool {
        self.dot >= self.rhs.len()
    }

    pub fn next_symbol(&self) -> Option<&String> {
        self.rhs.get(self.dot)
    }

    pub fn shifted(&self) -> Self {
        debug_assert!(!self.is_complete());
        Self {
            lhs: self.lhs.clone(),
            rhs: self.rhs.clone(),
            dot: self.dot + 1,
            lookahead: self.lookahead.clone(),
        }
    }

    fn rhs_tail(&self) -> &[String] {
        &self.rhs[self.dot + 1..]
    }
}

impl fmt::Display for LrItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} →", self.lhs)?;
        for (index, symbol) in self.rhs.iter().enumerate() {
            if index == self.dot {
                write!(f, " ·")?;
            }
            write!(f, " {}", symbol)?;
        }
        if self.dot >= self.rhs.len() {
            write!(f, " ·")?;
        }
        write!(f, " , {}", self.lookahead)
    }
}

pub type ItemSet = BTreeSet<LrItem>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(u32),
    Reduce(usize),
    Accept,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Shift(state) => write!(f, "s{}", state),
            Action::Reduce(production) => write!(f, "r{}", production),
            Action::Accept => write!(f, "acc"),
        }
    }
}

/// The ACTION and GOTO tables plus the item sets they were generated from.
/// Built once per grammar, immutable during parsing, shareable by read-only
/// reference across parses.
#[derive(Debug)]
pub struct ParseTable {
    pub actions: Vec<BTreeMap<String, Action>>,
    pub gotos: Vec<BTreeMap<String, u32>>,
    pub states: Vec<ItemSet>,
}

impl ParseTable {
    pub fn build(grammar: &Grammar) -> Result<Self, GrammarError> {
        TableBuilder {
            grammar,
            firsts: FirstSets::new(),
        }
        .build()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn action(&self, state: u32, terminal: &str) -> Option<Action> {
        self.actions[state as usize].get(terminal).copied()
    }

    pub fn goto(&self, state: u32, non_terminal: &str) -> Option<u32> {
        self.gotos[state as usize].get(non_terminal).copied()
    }

    /// Serialized ACTION cell: `s<N>`, `r<N>`, `acc`, or empty.
    pub fn action_cell(&self, state: u32, terminal: &str) -> String {
        match self.action(state, terminal) {
            Some(action) => action.to_string(),
            None => String::new(),
        }
    }

    /// Serialized GOTO cell: the target state id, or empty.
    pub fn goto_cell(&self, state: u32, non_terminal: &str) -> String {
        match self.goto(state, non_terminal) {
            Some(target) => target.to_string(),
            None => String::new(),
        }
    }
}

struct TableBuilder<'a> {
    grammar: &'a Grammar,
    firsts: FirstSets,
}

impl<'a> TableBuilder<'a> {
    /// Least fixpoint of the expand-nonterminal-after-dot rule: for every
    /// `[A → α·Bβ, a]` and every `b ∈ FIRST(βa)`, every production of `B`
    /// joins as `[B → ·γ, b]`.
    fn closure(&mut self, mut set: ItemSet) -> Result<ItemSet, GrammarError> {
        let mut changed = true;
        while changed {
            changed = false;
            let mut additions = vec![];
            for item in &set {
                let next = match item.next_symbol() {
                    Some(symbol) => symbol.clone(),
                    None => continue,
                };
                if !self.grammar.is_non_terminal(&next) {
                    continue;
                }
                let mut sequence: Vec<String> = item.rhs_tail().to_vec();
                sequence.push(item.lookahead.clone());
                let lookaheads = self.firsts.of(self.grammar, &sequence)?;
                for &index in self.grammar.productions_for(&next) {
                    let production = self.grammar.production(index);
                    for lookahead in &lookaheads {
                        if lookahead == EPSILON {
                            continue;
                        }
                        let candidate = LrItem {
                            lhs: next.clone(),
                            rhs: production.rhs.clone(),
                            dot: 0,
                            lookahead: lookahead.clone(),
                        };
                        if !set.contains(&candidate) {
                            additions.push(candidate);
                        }
                    }
                }
            }
            for item in additions {
                changed = set.insert(item) || changed;
            }
        }
        Ok(set)
    }

    /// The state reached from `set` on `symbol`: advance every dot that
    /// fronts the symbol and close.
    fn goto(&mut self, set: &ItemSet, symbol: &str) -> Result<Option<ItemSet>, GrammarError> {
        let mut kernel = ItemSet::new();
        for item in set {
            if item.next_symbol().map(String::as_str) == Some(symbol) {
                kernel.insert(item.shifted());
            }
        }
        if kernel.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.closure(kernel)?))
        }
    }

    fn build(mut self) -> Result<ParseTable, GrammarError> {
        let start = self.grammar.start_production();
        let mut initial = ItemSet::new();
        initial.insert(LrItem {
            lhs: start.lhs.clone(),
            rhs: start.rhs.clone(),
            dot: 0,
            lookahead: "$".to_string(),
        });
        let initial = self.closure(initial)?;

        let mut states: Vec<ItemSet> = vec![initial.clone()];
        let mut ids: BTreeMap<ItemSet, u32> = BTreeMap::new();
        ids.insert(initial, 0);
        let mut queue: VecDeque<u32> = VecDeque::new();
        queue.push_back(0);

        let mut actions: Vec<BTreeMap<String, Action>> = vec![BTreeMap::new()];
        let mut gotos: Vec<BTreeMap<String, u32>> = vec![BTreeMap::new()];

        let symbols: Vec<String> = self
            .grammar
            .terminals()
            .iter()
            .chain(self.grammar.non_terminals().iter())
            .cloned()
            .collect();

        while let Some(current) = queue.pop_front() {
            let current_set = states[current as usize].clone();
            for symbol in &symbols {
                let target_set = match self.goto(&current_set, symbol)? {
                    Some(set) => set,
                    None => continue,
                };
                let target = match ids.get(&target_set) {
                    Some(&id) => id,
                    None => {
                        let id = states.len() as u32;
                        ids.insert(target_set.clone(), id);
                        states.push(target_set);
                        actions.push(BTreeMap::new());
                        gotos.push(BTreeMap::new());
                        queue.push_back(id);
                        id
                    }
                };
                if self.grammar.is_terminal(symbol) {
                    set_action(&mut actions, current, symbol, Action::Shift(target))?;
                } else {
                    gotos[current as usize].insert(symbol.clone(), target);
                }
            }
            for item in &current_set {
                if !item.is_complete() {
                    continue;
                }
                if item.lhs == self.grammar.start_symbol() && item.lookahead == "$" {
                    set_action(&mut actions, current, "$", Action::Accept)?;
                } else {
                    let index = self
                        .grammar
                        .production_index(&item.lhs, &item.rhs)
                        .expect("every item derives from a grammar production");
                    set_action(
                        &mut actions,
                        current,
                        &item.lookahead,
                        Action::Reduce(index),
                    )?;
                }
            }
        }

        Ok(ParseTable {
            actions,
            gotos,
            states,
        })
    }
}

/// Writes a cell, failing on any attempt to overwrite it with a different
/// value. Conflicts are never resolved silently.
fn set_action(
    actions: &mut Vec<BTreeMap<String, Action>>,
    state: u32,
    symbol: &str,
    action: Action,
) -> Result<(), GrammarError> {
    match actions[state as usize].get(symbol) {
        Some(existing) if *existing != action => Err(GrammarError::Conflict {
            state,
            symbol: symbol.to_string(),
            existing: existing.to_string(),
            proposed: action.to_string(),
        }),
        _ => {
            actions[state as usize].insert(symbol.to_string(), action);
            Ok(())
        }
    }
}

lazy_static! {
    pub static ref RUST_LIKE_TABLE: ParseTable = ParseTable::build(&RUST_LIKE_GRAMMAR)
        .expect("the built-in grammar builds a conflict-free canonical LR(1) table");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ReductionKind::NoOp;

    /// The classic grammar that is LR(1) but not SLR(1):
    /// S' → S ; S → L = R | R ; L → * R | id ; R → L
    fn lr1_not_slr_grammar() -> Grammar {
        Grammar::new(
            &["=", "*", "id"],
            &[
                ("S'", &["S"], NoOp),
                ("S", &["L", "=", "R"], NoOp),
                ("S", &["R"], NoOp),
                ("L", &["*", "R"], NoOp),
                ("L", &["id"], NoOp),
                ("R", &["L"], NoOp),
            ],
            "S'",
        )
        .unwrap()
    }

    #[test]
    fn builds_canonical_tables_for_lr1_grammar() {
        let grammar = lr1_not_slr_grammar();
        let table = ParseTable::build(&grammar).unwrap();
        assert!(table.state_count() > 1);
        // state 0 shifts the two possible leading terminals
        match table.action(0, "id") {
            Some(Action::Shift(_)) => (),
            other => panic!("unexpected action: {:?}", other),
        }
        match table.action(0, "*") {
            Some(Action::Shift(_)) => (),
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(table.action(0, "=").is_none());
    }

    #[test]
    fn ambiguous_grammar_is_a_conflict() {
        // E → E + E | id is ambiguous: canonical LR(1) must refuse it
        let grammar = Grammar::new(
            &["+", "id"],
            &[
                ("S", &["E"], NoOp),
                ("E", &["E", "+", "E"], NoOp),
                ("E", &["id"], NoOp),
            ],
            "S",
        )
        .unwrap();
        match ParseTable::build(&grammar) {
            Err(GrammarError::Conflict { .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn item_sets_are_canonically_ordered() {
        let a = LrItem {
            lhs: "A".to_string(),
            rhs: vec!["x".to_string()],
            dot: 0,
            lookahead: "$".to_string(),
        };
        let b = LrItem {
            lhs: "A".to_string(),
            rhs: vec!["x".to_string()],
            dot: 1,
            lookahead: "$".to_string(),
        };
        let mut one = ItemSet::new();
        one.insert(a.clone());
        one.insert(b.clone());
        let mut other = ItemSet::new();
        other.insert(b);
        other.insert(a);
        assert_eq!(one, other);
    }

    #[test]
    fn action_cells_serialize() {
        let grammar = lr1_not_slr_grammar();
        let table = ParseTable::build(&grammar).unwrap();
        let cell = table.action_cell(0, "id");
        assert!(cell.starts_with('s'));
        assert_eq!(table.action_cell(0, "="), "");
    }

    #[test]
    fn builtin_grammar_is_conflict_free() {
        assert!(RUST_LIKE_TABLE.state_count() > 100);
        match RUST_LIKE_TABLE.action(0, "$") {
            Some(Action::Reduce(_)) => (), // empty program reduces the entry marker
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
