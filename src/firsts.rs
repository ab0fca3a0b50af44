// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeMap, BTreeSet};

use crate::grammar::{Grammar, GrammarError};

/// ε inside FIRST sets is the empty string.
pub const EPSILON: &str = "";

/// Memoized FIRST sets over symbol strings. Results are keyed by the exact
/// symbol tuple; recursion through ε-cycles is cut by a per-call visited
/// set, so left recursion in the grammar terminates.
#[derive(Debug, Default)]
pub struct FirstSets {
    cache: BTreeMap<Vec<String>, BTreeSet<String>>,
}

impl FirstSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// FIRST of a symbol string. `FIRST(ε) = {ε}`; a terminal (or `$`) maps
    /// to itself; a nonterminal unions over its productions; ε survives only
    /// when every symbol in the string can derive it.
    pub fn of(
        &mut self,
        grammar: &Grammar,
        symbols: &[String],
    ) -> Result<BTreeSet<String>, GrammarError> {
        let visited = BTreeSet::new();
        self.of_guarded(grammar, symbols, &visited)
    }

    fn of_guarded(
        &mut self,
        grammar: &Grammar,
        symbols: &[String],
        visited: &BTreeSet<Vec<String>>,
    ) -> Result<BTreeSet<String>, GrammarError> {
        let key: Vec<String> = symbols.to_vec();
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        if visited.contains(&key) {
            // cycle: contributes nothing new to the enclosing fixpoint
            return Ok(BTreeSet::new());
        }
        let mut visited = visited.clone();
        visited.insert(key.clone());

        let mut first = BTreeSet::new();
        let mut all_nullable = true;
        for symbol in symbols {
            if grammar.is_terminal(symbol) || symbol == "$" {
                first.insert(symbol.clone());
                all_nullable = false;
                break;
            } else if grammar.is_non_terminal(symbol) {
                let mut nullable = false;
                for &index in grammar.productions_for(symbol) {
                    let production = grammar.production(index);
                    if production.rhs.is_empty() {
                        nullable = true;
                        continue;
                    }
                    let sub = self.of_guarded(grammar, &production.rhs, &visited)?;
                    if sub.contains(EPSILON) {
                        nullable = true;
                    }
                    first.extend(sub.into_iter().filter(|s| s != EPSILON));
                }
                if !nullable {
                    all_nullable = false;
                    break;
                }
            } else {
                return Err(GrammarError::UnknownSymbol {
                    symbol: symbol.clone(),
                });
            }
        }
        if all_nullable {
            first.insert(EPSILON.to_string());
        }
        self.cache.insert(key, first.clone());
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ReductionKind::NoOp;

    fn strings(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    fn sample_grammar() -> Grammar {
        // A → B a | c ; B → A b | ε
        Grammar::new(
            &["a", "b", "c"],
            &[
                ("A", &["B", "a"], NoOp),
                ("A", &["c"], NoOp),
                ("B", &["A", "b"], NoOp),
                ("B", &[], NoOp),
            ],
            "A",
        )
        .unwrap()
    }

    #[test]
    fn first_of_empty_string_is_epsilon() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        let set = firsts.of(&grammar, &[]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(EPSILON));
    }

    #[test]
    fn first_of_terminal_is_itself() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        let set = firsts.of(&grammar, &strings(&["a"])).unwrap();
        let expected: BTreeSet<String> = strings(&["a"]).into_iter().collect();
        assert_eq!(set, expected);
        let set = firsts.of(&grammar, &strings(&["$"])).unwrap();
        assert!(set.contains("$"));
    }

    #[test]
    fn first_walks_through_nullable_prefixes() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        // B is nullable, so FIRST(B a) = FIRST(B)\{ε} ∪ {a}
        let set = firsts.of(&grammar, &strings(&["B", "a"])).unwrap();
        assert!(set.contains("a"));
        assert!(set.contains("c"));
        assert!(!set.contains(EPSILON));
    }

    #[test]
    fn left_recursion_terminates() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        let set = firsts.of(&grammar, &strings(&["A"])).unwrap();
        assert!(set.contains("a"));
        assert!(set.contains("c"));
    }

    #[test]
    fn memoization_is_idempotent() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        let once = firsts.of(&grammar, &strings(&["A", "b"])).unwrap();
        let twice = firsts.of(&grammar, &strings(&["A", "b"])).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let grammar = sample_grammar();
        let mut firsts = FirstSets::new();
        match firsts.of(&grammar, &strings(&["zz"])) {
            Err(GrammarError::UnknownSymbol { symbol }) => assert_eq!(symbol, "zz"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn marker_heavy_sequences_in_the_builtin_grammar() {
        let grammar = crate::grammar::rust_like_grammar().unwrap();
        let mut firsts = FirstSets::new();
        // BeginMarker is ε-only, so FIRST(BeginMarker Stmt) = FIRST(Stmt)
        let set = firsts
            .of(&grammar, &strings(&["BeginMarker", "Stmt"]))
            .unwrap();
        assert!(set.contains("let"));
        assert!(set.contains(";"));
        assert!(set.contains("ID"));
        assert!(!set.contains(EPSILON));
    }
}
