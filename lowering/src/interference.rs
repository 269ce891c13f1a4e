//! The interference graph and the move candidates for coalescing.

use crate::{
    amd64::{Arg, Instruction, Reg},
    live_variable_analysis::{is_tracked, Liveness},
};
use std::collections::{BTreeMap, BTreeSet};

/// A register to register move, identified by its instruction index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Move {
    pub index: usize,
    pub dest: Reg,
    pub src: Reg,
}

/// Pre-colored nodes have no adjacency list and an infinite degree.
#[derive(Debug, Default, Clone)]
pub struct InterferenceGraph {
    adjacency_set: BTreeSet<(Reg, Reg)>,
    adjacency_list: BTreeMap<Reg, BTreeSet<Reg>>,
    degree: BTreeMap<Reg, usize>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, u: &Reg, v: &Reg) -> bool {
        self.adjacency_set.contains(&(u.clone(), v.clone()))
    }

    pub fn add_edge(&mut self, u: &Reg, v: &Reg) {
        if u == v || self.contains(u, v) {
            return;
        }
        self.adjacency_set.insert((u.clone(), v.clone()));
        self.adjacency_set.insert((v.clone(), u.clone()));
        for (node, neighbor) in &[(u, v), (v, u)] {
            if !node.is_pre_colored() {
                self.adjacency_list
                    .entry((*node).clone())
                    .or_default()
                    .insert((*neighbor).clone());
                *self.degree.entry((*node).clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn degree(&self, node: &Reg) -> usize {
        if node.is_pre_colored() {
            return usize::max_value();
        }
        self.degree.get(node).cloned().unwrap_or(0)
    }

    /// Returns the degree before the decrement.
    pub fn decrement_degree(&mut self, node: &Reg) -> usize {
        if node.is_pre_colored() {
            return usize::max_value();
        }
        let degree = self.degree.entry(node.clone()).or_insert(0);
        let old = *degree;
        *degree = old.saturating_sub(1);
        old
    }

    /// All neighbors of a node that is not pre-colored.
    pub fn neighbors<'g>(&'g self, node: &Reg) -> impl Iterator<Item = &'g Reg> + 'g {
        self.adjacency_list
            .get(node)
            .into_iter()
            .flat_map(|neighbors| neighbors.iter())
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency_set.len() / 2
    }
}

/// The register to register move `instr` performs, if any.
pub fn as_move(instr: &Instruction) -> Option<(&Reg, &Reg)> {
    match instr {
        Instruction::MoveToReg {
            dest,
            src: Arg::Reg(src),
        } if is_tracked(dest) && is_tracked(src) && dest != src => Some((dest, src)),
        _ => None,
    }
}

/// Build the interference graph from the liveness result. The source of a
/// move does not interfere with its destination, which makes the move a
/// candidate for coalescing.
pub fn build(instructions: &[Instruction], liveness: &Liveness) -> (InterferenceGraph, Vec<Move>) {
    let mut graph = InterferenceGraph::new();
    let mut moves = vec![];
    for (index, instr) in instructions.iter().enumerate() {
        let mut live = liveness.live_out[index].clone();
        let ud = &liveness.uses_and_defs[index];
        if let Some((dest, src)) = as_move(instr) {
            for used in &ud.uses {
                live.remove(used);
            }
            if !dest.is_pre_colored() || !src.is_pre_colored() {
                moves.push(Move {
                    index,
                    dest: dest.clone(),
                    src: src.clone(),
                });
            }
        }
        live.extend(ud.defs.iter().cloned());
        for def in &ud.defs {
            for other in &live {
                graph.add_edge(def, other);
            }
        }
    }
    log::trace!(
        "interference graph with {} edges and {} moves",
        graph.edge_count(),
        moves.len()
    );
    (graph, moves)
}
