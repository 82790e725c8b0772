//! A plain-text stand-in for a block program: one instruction per line.
//!
//! ```text
//! # deliver the package
//! move 1
//! pick
//! right
//! right
//! move 5
//! drop
//! ```

use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use futures_util::{FutureExt, future::BoxFuture};
use pairstudio_core::{Direction, GameError, GameSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Forward(u32),
    Backward(u32),
    Left,
    Right,
    Face(Direction),
    Pick,
    Drop,
    Goto { row: usize, col: usize },
    Survey,
    Check(String),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Forward(n) => write!(f, "move {n}"),
            Instruction::Backward(n) => write!(f, "back {n}"),
            Instruction::Left => f.write_str("left"),
            Instruction::Right => f.write_str("right"),
            Instruction::Face(d) => write!(f, "face {d}"),
            Instruction::Pick => f.write_str("pick"),
            Instruction::Drop => f.write_str("drop"),
            Instruction::Goto { row, col } => write!(f, "goto {row} {col}"),
            Instruction::Survey => f.write_str("survey"),
            Instruction::Check(name) => write!(f, "check {name}"),
        }
    }
}

fn yes_no(result: Result<bool, GameError>) -> Result<String, GameError> {
    result.map(|ok| if ok { "ok" } else { "refused" }.to_string())
}

impl Instruction {
    /// Queues the instruction on `game` and returns a future for a one-line result.
    pub fn issue(&self, game: &GameSession) -> BoxFuture<'static, Result<String, GameError>> {
        match self {
            Instruction::Forward(n) => game.move_forward(*n).map(yes_no).boxed(),
            Instruction::Backward(n) => game.move_backward(*n).map(yes_no).boxed(),
            Instruction::Left => game.rotate_left().map(yes_no).boxed(),
            Instruction::Right => game.rotate_right().map(yes_no).boxed(),
            Instruction::Face(direction) => game.face(*direction).map(yes_no).boxed(),
            Instruction::Pick => game.pickup_item().map(yes_no).boxed(),
            Instruction::Drop => game.drop_item().map(yes_no).boxed(),
            Instruction::Goto { row, col } => game.set_position(*row, *col).map(yes_no).boxed(),
            Instruction::Survey => game
                .survey_front()
                .map(|view| view.map(|v| v.type_name().to_string()))
                .boxed(),
            Instruction::Check(name) => game
                .check_attribute(name)
                .map(|set| set.map(|set| set.to_string()))
                .boxed(),
        }
    }
}

fn count(arg: Option<&str>) -> Result<u32> {
    match arg {
        None => Ok(1),
        Some(n) => n.parse().with_context(|| format!("bad step count {n:?}")),
    }
}

fn parse_line(line: &str) -> Result<Option<Instruction>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut words = line.split_whitespace();
    let Some(op) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let instruction = match op.to_ascii_lowercase().as_str() {
        "move" | "forward" => Instruction::Forward(count(arg)?),
        "back" | "backward" => Instruction::Backward(count(arg)?),
        "left" | "ccw" => Instruction::Left,
        "right" | "cw" => Instruction::Right,
        "face" => {
            let name = arg.ok_or_else(|| anyhow!("face needs a direction"))?;
            Instruction::Face(name.parse()?)
        }
        "pick" => Instruction::Pick,
        "drop" => Instruction::Drop,
        "goto" => {
            let row = arg.ok_or_else(|| anyhow!("goto needs a row"))?;
            let col = words.next().ok_or_else(|| anyhow!("goto needs a column"))?;
            Instruction::Goto {
                row: row.parse().context("bad row")?,
                col: col.parse().context("bad column")?,
            }
        }
        "survey" => Instruction::Survey,
        "check" => {
            let name = arg.ok_or_else(|| anyhow!("check needs an attribute name"))?;
            Instruction::Check(name.to_string())
        }
        other => bail!("unknown instruction {other:?}"),
    };
    Ok(Some(instruction))
}

pub fn parse(text: &str) -> Result<Vec<Instruction>> {
    let mut program = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(instruction) = parse_line(line).with_context(|| format!("line {}", i + 1))? {
            program.push(instruction);
        }
    }
    Ok(program)
}
