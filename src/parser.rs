// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

use crate::attributes::ParseNode;
use crate::grammar::{Grammar, Production};
use crate::lexer::Token;
use crate::state::{Action, ParseTable};

#[derive(Debug, Clone)]
pub enum ParseError {
    Unexpected {
        found: Token,
        expected: Vec<String>,
        context: Vec<Token>,
    },
    InvalidGoto {
        state: u32,
        non_terminal: String,
    },
}

fn format_list(items: &[String]) -> String {
    let mut string = String::new();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            string += if index == items.len() - 1 { " or " } else { ", " };
        }
        string += item;
    }
    string
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Unexpected {
                found, expected, ..
            } => write!(
                f,
                "syntax error at {}:{}: found {} expected {}",
                found.line,
                found.column,
                found,
                format_list(expected)
            ),
            ParseError::InvalidGoto {
                state,
                non_terminal,
            } => write!(f, "no goto from state {} on {}", state, non_terminal),
        }
    }
}

/// One record per driver step, for external consumers (table dumps, trace
/// views).
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub state_stack: Vec<u32>,
    pub node_stack: Vec<String>,
    pub remaining: Vec<String>,
    pub action: String,
    pub production: String,
}

/// The reduction hook the driver feeds. The semantic analyzer is the real
/// implementor; `NullReductions` parses without attribution.
pub trait Reductions {
    fn on_reduce(&mut self, node: &mut ParseNode, production: &Production);
}

pub struct NullReductions;

impl Reductions for NullReductions {
    fn on_reduce(&mut self, _node: &mut ParseNode, _production: &Production) {}
}

/// The shift/reduce driver: a deterministic pushdown machine over the
/// ACTION/GOTO tables. The analyzer's hook fires exactly once per internal
/// node, at reduction time.
pub struct Parser<'a> {
    grammar: &'a Grammar,
    table: &'a ParseTable,
}

impl<'a> Parser<'a> {
    pub fn new(grammar: &'a Grammar, table: &'a ParseTable) -> Self {
        Self { grammar, table }
    }

    pub fn parse<R: Reductions>(
        &self,
        tokens: &[Token],
        reductions: &mut R,
    ) -> Result<(ParseNode, Vec<TraceStep>), ParseError> {
        let mut state_stack: Vec<u32> = vec![0];
        let mut node_stack: Vec<ParseNode> = vec![];
        let mut index = 0usize;
        let mut trace = vec![];

        loop {
            let state = *state_stack.last().expect("the state stack never drains");
            let token = match tokens.get(index) {
                Some(token) => token,
                None => {
                    // a malformed stream without EOF runs dry
                    return Err(self.unexpected(tokens, tokens.len().saturating_sub(1)));
                }
            };

            let mut step = TraceStep {
                state_stack: state_stack.clone(),
                node_stack: node_stack.iter().map(|node| node.to_string()).collect(),
                remaining: tokens[index..].iter().map(|t| t.to_string()).collect(),
                action: String::new(),
                production: String::new(),
            };

            let action = match self.table.action(state, token.terminal_name()) {
                Some(action) => action,
                None => return Err(self.unexpected(tokens, index)),
            };

            match action {
                Action::Shift(next_state) => {
                    step.action = format!("shift {} → state {}", token, next_state);
                    node_stack.push(ParseNode::leaf(token.clone()));
                    index += 1;
                    state_stack.push(next_state);
                }
                Action::Reduce(production_index) => {
                    let production = self.grammar.production(production_index);
                    step.action = format!("reduce by production {}", production_index);
                    step.production = production.to_string();
                    let count = production.rhs.len();
                    state_stack.truncate(state_stack.len() - count);
                    let children = node_stack.split_off(node_stack.len() - count);
                    let mut node = ParseNode::internal(&production.lhs, children);
                    reductions.on_reduce(&mut node, production);
                    node_stack.push(node);
                    let top = *state_stack.last().expect("the state stack never drains");
                    match self.table.goto(top, &production.lhs) {
                        Some(next_state) => state_stack.push(next_state),
                        None => {
                            return Err(ParseError::InvalidGoto {
                                state: top,
                                non_terminal: production.lhs.clone(),
                            })
                        }
                    }
                }
                Action::Accept => {
                    step.action = "accept".to_string();
                    trace.push(step);
                    let root = node_stack
                        .pop()
                        .expect("acceptance leaves the tree root on the node stack");
                    return Ok((root, trace));
                }
            }
            trace.push(step);
        }
    }

    fn unexpected(&self, tokens: &[Token], index: usize) -> ParseError {
        let found = tokens
            .get(index)
            .cloned()
            .unwrap_or_else(|| Token::new(crate::lexer::TokenKind::Eof, "", 0, 0));
        ParseError::Unexpected {
            expected: self.expected_at(tokens, index),
            context: tokens[index.saturating_sub(2)..(index + 1).min(tokens.len())].to_vec(),
            found,
        }
    }

    /// The sorted set of terminals the failing state would have accepted.
    fn expected_at(&self, tokens: &[Token], index: usize) -> Vec<String> {
        // replay the prefix to recover the failing state
        let mut state_stack: Vec<u32> = vec![0];
        let mut i = 0usize;
        while i < index {
            let state = *state_stack.last().expect("the state stack never drains");
            let name = tokens[i].terminal_name();
            match self.table.action(state, name) {
                Some(Action::Shift(next)) => {
                    state_stack.push(next);
                    i += 1;
                }
                Some(Action::Reduce(production_index)) => {
                    let production = self.grammar.production(production_index);
                    state_stack.truncate(state_stack.len() - production.rhs.len());
                    let top = *state_stack.last().expect("the state stack never drains");
                    match self.table.goto(top, &production.lhs) {
                        Some(next) => state_stack.push(next),
                        None => break,
                    }
                }
                _ => break,
            }
        }
        let state = *state_stack.last().expect("the state stack never drains");
        self.table.actions[state as usize]
            .keys()
            .cloned()
            .collect()
    }
}
