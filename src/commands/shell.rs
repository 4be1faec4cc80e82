//! `kubewright shell` — interactive operation loop.
//!
//! One resolved topology would go stale across operations, so every menu
//! action resolves a fresh snapshot through the shared execute path. Errors
//! are printed and the loop keeps going.

use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::Result;
use colored::Colorize;

use crate::commands::{run, status, CommandContext};
use crate::ops::{CancelFlag, Operation, Target};

pub fn run(ctx: &CommandContext) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!("{}", "kubewright shell".bold());
    loop {
        print_menu();
        print!("{} ", ">".blue().bold());
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let choice = line.trim();
        if choice.is_empty() {
            continue;
        }
        if choice == "q" {
            break;
        }

        let started = Instant::now();
        let outcome = dispatch(ctx, choice, &mut lines);
        match outcome {
            Ok(true) => {
                println!(
                    "{} done in {:.1}s",
                    "::".blue().bold(),
                    started.elapsed().as_secs_f64()
                );
            }
            Ok(false) => {}
            Err(e) => {
                println!("{} {e:#}", "!!".red().bold());
            }
        }
    }
    Ok(())
}

fn print_menu() {
    println!();
    println!("  ak  install keys on all nodes      k  install keys on one node");
    println!("  ar  reset all nodes                r  reset one node");
    println!("  n   install runtime on one node    i  init control plane");
    println!("  j   join one node                  c  apply a bundle");
    println!("  g   show status                    q  quit");
}

/// Run one menu action. Returns whether an operation actually executed
/// (so the caller knows to print a duration).
fn dispatch(
    ctx: &CommandContext,
    choice: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<bool> {
    let (target, op) = match choice {
        "ak" => (Target::All, Operation::InstallKeys),
        "ar" => (Target::All, Operation::Reset),
        "k" => (prompt_node(lines)?, Operation::InstallKeys),
        "r" => (prompt_node(lines)?, Operation::Reset),
        "n" => (prompt_node(lines)?, Operation::InstallRuntime),
        "i" => (Target::ControlPlane, Operation::Init),
        "j" => (prompt_node(lines)?, Operation::Join),
        "c" => {
            let bundle = prompt_bundle(ctx, lines)?;
            (Target::ControlPlane, Operation::Apply { bundle })
        }
        "g" => {
            status::run(ctx, "table")?;
            return Ok(false);
        }
        other => {
            println!("{} unknown choice '{other}'", "!!".yellow().bold());
            return Ok(false);
        }
    };

    run::execute(ctx, target, &op, CancelFlag::new())?;
    Ok(true)
}

fn prompt_node(lines: &mut impl Iterator<Item = io::Result<String>>) -> Result<Target> {
    print!("node index{} ", ":".blue().bold());
    io::stdout().flush()?;
    let line = lines
        .next()
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("stdin closed"))?;
    let index: usize = line.trim().parse()?;
    Ok(Target::Node(index))
}

fn prompt_bundle(
    ctx: &CommandContext,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<String> {
    let names: Vec<&String> = ctx.settings.bundles.keys().collect();
    for (i, name) in names.iter().enumerate() {
        println!("  {i}  {name}");
    }
    print!("bundle{} ", ":".blue().bold());
    io::stdout().flush()?;
    let line = lines
        .next()
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("stdin closed"))?;
    let pick = line.trim();
    // Accept either the index from the listing or a literal name.
    if let Ok(index) = pick.parse::<usize>() {
        if let Some(name) = names.get(index) {
            return Ok((*name).clone());
        }
    }
    Ok(pick.to_string())
}
