// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use clap::crate_authors;
use structopt::StructOpt;

use std::{fs, path::PathBuf, process};

use ferroc::grammar::RUST_LIKE_GRAMMAR;
use ferroc::lexer::Lexer;
use ferroc::parser::Parser;
use ferroc::semantics::SemanticAnalyzer;
use ferroc::state::RUST_LIKE_TABLE;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ferroc",
    about = "Compile a small Rust-like language to quadruples",
    author = crate_authors!(),
)]
struct CLOptions {
    /// Print the token stream before parsing
    #[structopt(short, long)]
    tokens: bool,
    /// Print the parse trace (stacks, remaining input, action) per step
    #[structopt(long)]
    trace: bool,
    /// Print the ACTION/GOTO tables of the built-in grammar
    #[structopt(long)]
    tables: bool,
    /// Suppress the quadruple listing
    #[structopt(short, long)]
    quiet: bool,
    /// The path of the source file to compile
    #[structopt(parse(from_os_str))]
    source: PathBuf,
}

fn print_tables() {
    let end_marker = "$".to_string();
    for state in 0..RUST_LIKE_TABLE.state_count() as u32 {
        let mut cells = vec![];
        for terminal in RUST_LIKE_GRAMMAR
            .terminals()
            .iter()
            .chain(std::iter::once(&end_marker))
        {
            let cell = RUST_LIKE_TABLE.action_cell(state, terminal);
            if !cell.is_empty() {
                cells.push(format!("{}:{}", terminal, cell));
            }
        }
        let mut gotos = vec![];
        for non_terminal in RUST_LIKE_GRAMMAR.non_terminals() {
            let cell = RUST_LIKE_TABLE.goto_cell(state, non_terminal);
            if !cell.is_empty() {
                gotos.push(format!("{}:{}", non_terminal, cell));
            }
        }
        println!("state {}", state);
        println!("  action: {}", cells.join(" "));
        if !gotos.is_empty() {
            println!("  goto:   {}", gotos.join(" "));
        }
    }
}

fn main() {
    let options = CLOptions::from_args();
    if options.tables {
        print_tables();
    }
    let text = match fs::read_to_string(&options.source) {
        Ok(text) => text,
        Err(error) => {
            eprintln!(
                "{}: error reading source file: {}",
                options.source.to_string_lossy(),
                error
            );
            process::exit(2);
        }
    };
    let tokens = match Lexer::tokenize(&text) {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("Lexical error: {}.", error);
            process::exit(3);
        }
    };
    if options.tokens {
        for token in &tokens {
            println!("{}:{}: {}", token.line, token.column, token);
        }
    }
    let mut analyzer = SemanticAnalyzer::new();
    let parser = Parser::new(&RUST_LIKE_GRAMMAR, &RUST_LIKE_TABLE);
    let (_tree, trace) = match parser.parse(&tokens, &mut analyzer) {
        Ok(outcome) => outcome,
        Err(error) => {
            eprintln!("{}.", error);
            process::exit(4);
        }
    };
    if options.trace {
        for (index, step) in trace.iter().enumerate() {
            println!(
                "{:4} states={:?} nodes={:?} {} {}",
                index, step.state_stack, step.node_stack, step.action, step.production
            );
        }
    }
    if !options.quiet {
        for (index, quad) in analyzer.quads().iter().enumerate() {
            println!("{:4}: {}", index, quad);
        }
    }
    for error in analyzer.errors() {
        eprintln!("Error: {}.", error);
    }
    if !analyzer.errors().is_empty() {
        process::exit(5);
    }
}
