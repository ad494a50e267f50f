//! Boolean expression trees over conditions.
//!
//! Leaves hold a [`ConditionRef`], an index into the owning prediction's
//! condition arena. Several leaves may point at the same condition, so a tick
//! fed to it is observed by every clause that mentions it.

use crate::domain::condition::Condition;
use crate::domain::trilean::Trilean;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionRef(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoolExpr {
    Literal(ConditionRef),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
    Not(Box<BoolExpr>),
}

impl BoolExpr {
    pub fn literal(index: usize) -> Self {
        BoolExpr::Literal(ConditionRef(index))
    }

    /// Full (non short-circuiting) Kleene evaluation.
    ///
    /// A literal whose reference does not resolve evaluates to TRUE.
    pub fn evaluate(&self, conditions: &[Condition]) -> Trilean {
        match self {
            BoolExpr::Literal(r) => conditions
                .get(r.0)
                .map(Condition::evaluate)
                .unwrap_or(Trilean::True),
            BoolExpr::And(children) => {
                Trilean::all(children.iter().map(|c| c.evaluate(conditions)))
            }
            BoolExpr::Or(children) => {
                Trilean::any(children.iter().map(|c| c.evaluate(conditions)))
            }
            BoolExpr::Not(child) => !child.evaluate(conditions),
        }
    }

    /// Undecided leaves in left-to-right traversal order.
    pub fn undecided_conditions(&self, conditions: &[Condition]) -> Vec<ConditionRef> {
        let mut out = Vec::new();
        self.collect_undecided(conditions, &mut out);
        out
    }

    fn collect_undecided(&self, conditions: &[Condition], out: &mut Vec<ConditionRef>) {
        match self {
            BoolExpr::Literal(r) => {
                if let Some(c) = conditions.get(r.0) {
                    if c.evaluate() == Trilean::Undecided {
                        out.push(*r);
                    }
                }
            }
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                for child in children {
                    child.collect_undecided(conditions, out);
                }
            }
            BoolExpr::Not(child) => child.collect_undecided(conditions, out),
        }
    }

    /// Clears every condition reachable from this tree.
    pub fn clear_state(&self, conditions: &mut [Condition]) {
        match self {
            BoolExpr::Literal(r) => {
                if let Some(c) = conditions.get_mut(r.0) {
                    c.clear_state();
                }
            }
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                for child in children {
                    child.clear_state(conditions);
                }
            }
            BoolExpr::Not(child) => child.clear_state(conditions),
        }
    }

    /// Every referenced condition, in traversal order, duplicates included.
    pub fn references(&self) -> Vec<ConditionRef> {
        match self {
            BoolExpr::Literal(r) => vec![*r],
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                children.iter().flat_map(BoolExpr::references).collect()
            }
            BoolExpr::Not(child) => child.references(),
        }
    }

    /// Renders the tree using condition names.
    pub fn render(&self, conditions: &[Condition]) -> String {
        match self {
            BoolExpr::Literal(r) => conditions
                .get(r.0)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("#{}", r.0)),
            BoolExpr::And(children) => render_chain(children, " and ", conditions),
            BoolExpr::Or(children) => render_chain(children, " or ", conditions),
            BoolExpr::Not(child) => match child.as_ref() {
                BoolExpr::Literal(_) | BoolExpr::Not(_) => {
                    format!("not {}", child.render(conditions))
                }
                _ => format!("not ({})", child.render(conditions)),
            },
        }
    }
}

fn render_chain(children: &[BoolExpr], sep: &str, conditions: &[Condition]) -> String {
    let parts: Vec<String> = children
        .iter()
        .map(|c| match c {
            BoolExpr::And(_) | BoolExpr::Or(_) => format!("({})", c.render(conditions)),
            _ => c.render(conditions),
        })
        .collect();
    parts.join(sep)
}

/// Evaluates an optional clause; an absent clause places no constraint.
pub fn evaluate_opt(expr: Option<&BoolExpr>, conditions: &[Condition]) -> Trilean {
    expr.map(|e| e.evaluate(conditions)).unwrap_or(Trilean::True)
}
