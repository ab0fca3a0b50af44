// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

/// One three-address instruction. The `result` of a jump starts out empty
/// and is filled in by backpatching with the index of its target quadruple.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadruple {
    pub op: String,
    pub arg1: Option<String>,
    pub arg2: Option<String>,
    pub result: Option<String>,
}

fn hole(field: &Option<String>) -> &str {
    field.as_ref().map(String::as_str).unwrap_or("None")
}

impl fmt::Display for Quadruple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.op,
            hole(&self.arg1),
            hole(&self.arg2),
            hole(&self.result)
        )
    }
}

/// The quadruple emitter: an append-only instruction list plus temporary and
/// label counters. Indices are stable and double as jump labels.
#[derive(Debug, Default)]
pub struct QuadEmitter {
    pub quads: Vec<Quadruple>,
    temp_counter: usize,
    label_counter: usize,
}

impl QuadEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.quads.clear();
        self.temp_counter = 0;
        self.label_counter = 0;
    }

    /// Index of the next quadruple to be emitted.
    pub fn next_quad(&self) -> usize {
        self.quads.len()
    }

    /// Appends a quadruple and returns the index just written.
    pub fn emit(
        &mut self,
        op: &str,
        arg1: Option<String>,
        arg2: Option<String>,
        result: Option<String>,
    ) -> usize {
        self.quads.push(Quadruple {
            op: op.to_string(),
            arg1,
            arg2,
            result,
        });
        self.quads.len() - 1
    }

    pub fn new_temp(&mut self) -> String {
        let temp = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        temp
    }

    pub fn new_label(&mut self) -> String {
        let label = format!("L{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Writes `target` into the result slot of every listed quadruple.
    pub fn backpatch(&mut self, indices: &[usize], target: usize) {
        for &index in indices {
            self.quads[index].result = Some(target.to_string());
        }
    }

    pub fn temp_count(&self) -> usize {
        self.temp_counter
    }
}

/// Concatenates index lists preserving order.
pub fn merge_lists(lists: &[&[usize]]) -> Vec<usize> {
    let mut merged = vec![];
    for list in lists {
        merged.extend_from_slice(list);
    }
    merged
}
