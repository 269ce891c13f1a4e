//! Register allocation by iterated register coalescing (George and Appel).
//!
//! Each round runs liveness analysis, builds the interference graph and
//! works through the simplify, coalesce, freeze and spill worklists until
//! every node is on the select stack. Colors are then assigned in reverse;
//! nodes without a free color are spilled, the program is rewritten to keep
//! them on the stack and the next round starts. Coalescing is conservative,
//! so it never turns a colorable graph into an uncolorable one.
//!
//! All sets are ordered so that allocation is deterministic.
//!
//! With [`Options::naive_allocation`] every abstract register is spilled up
//! front, so the rounds only have to color the reload registers.

pub mod callee_saved;
pub mod coloring;
pub mod spilling;

use crate::{
    abstract_register::AbstractRegisterSource,
    amd64::{Amd64Reg, Instruction, Reg},
    interference::{self, InterferenceGraph, Move},
    live_variable_analysis::{live_variable_analysis, Liveness},
    BackendError, Options,
};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_ALLOCATION_ROUNDS: usize = 64;

#[derive(Debug, Clone)]
pub struct Allocation {
    /// The rewritten function body without abstract registers.
    pub instructions: Vec<Instruction>,
    pub colors: BTreeMap<Reg, Amd64Reg>,
    /// Slot indices before compaction.
    pub spill_slots: BTreeMap<Reg, usize>,
    pub unused_callee_saved: BTreeSet<Amd64Reg>,
    /// Number of stack slots the frame needs after compaction.
    pub stack_slots: usize,
    pub rounds: usize,
}

/// Allocate the registers of one function body that has already been
/// wrapped with the callee-saved saves and restores.
pub fn allocate(
    function_name: &str,
    instructions: Vec<Instruction>,
    has_return: bool,
    source: &mut AbstractRegisterSource,
    options: &Options,
) -> Result<Allocation, BackendError> {
    let mut instructions = instructions;
    let mut spill_slots = BTreeMap::new();
    let mut spill_temps = BTreeSet::new();
    let mut rounds = 0;
    if options.naive_allocation {
        let everything = abstract_registers(&instructions);
        log::debug!(
            "{}: naive allocation keeps {} registers on the stack",
            function_name,
            everything.len()
        );
        let rewrite = spilling::rewrite_spilled(&instructions, &everything, 0, source)?;
        instructions = rewrite.instructions;
        spill_slots.extend(rewrite.mappings);
        spill_temps.extend(rewrite.new_temps);
    }
    let colors = loop {
        rounds += 1;
        if rounds > MAX_ALLOCATION_ROUNDS {
            return Err(BackendError::NonConvergence {
                function: function_name.to_string(),
                rounds: MAX_ALLOCATION_ROUNDS,
            });
        }

        let liveness = live_variable_analysis(&instructions, has_return);
        let mut round = Round::new(&instructions, &liveness, &spill_temps, options);
        round.run()?;
        log::debug!(
            "{}: allocation round {} spilled {} nodes and coalesced {} moves",
            function_name,
            rounds,
            round.spilled_nodes.len(),
            round.coalesced_moves.len()
        );
        if round.spilled_nodes.is_empty() {
            break round.final_colors();
        }

        let rewrite = spilling::rewrite_spilled(
            &instructions,
            &round.spilled_nodes,
            spill_slots.len(),
            source,
        )?;
        instructions = rewrite.instructions;
        spill_slots.extend(rewrite.mappings);
        spill_temps.extend(rewrite.new_temps);
    };

    let unused_callee_saved = callee_saved::unused_callee_saved(&colors);
    let relocation = callee_saved::compact_slots(&spill_slots, &unused_callee_saved);
    let instructions =
        coloring::rewrite_colored(instructions, &colors, &relocation, &unused_callee_saved)?;
    check_fully_allocated(&instructions)?;

    Ok(Allocation {
        instructions,
        colors,
        spill_slots,
        unused_callee_saved,
        stack_slots: relocation.len(),
        rounds,
    })
}

fn abstract_registers(instructions: &[Instruction]) -> BTreeSet<Reg> {
    let mut registers = BTreeSet::new();
    for instr in instructions {
        instr.clone().map_registers(&mut |reg| {
            if reg.is_abstract() {
                registers.insert(reg.clone());
            }
            reg
        });
    }
    registers
}

fn check_fully_allocated(instructions: &[Instruction]) -> Result<(), BackendError> {
    for instr in instructions {
        let mut abstract_reg = None;
        instr.clone().map_registers(&mut |reg| {
            if reg.is_abstract() {
                abstract_reg = Some(reg.clone());
            }
            reg
        });
        if let Some(reg) = abstract_reg {
            return Err(BackendError::InvariantViolation {
                reason: format!("{} survived register allocation in `{}`", reg, instr),
            });
        }
    }
    Ok(())
}

/// The state of one allocation round, named as in Appel's "Modern Compiler
/// Implementation". Moves are identified by their instruction index.
struct Round<'a> {
    k: usize,
    available: &'a [Amd64Reg],
    check_invariants: bool,
    spill_temps: &'a BTreeSet<Reg>,

    graph: InterferenceGraph,
    moves: BTreeMap<usize, Move>,
    use_counts: BTreeMap<Reg, usize>,

    initial: BTreeSet<Reg>,
    simplify_worklist: BTreeSet<Reg>,
    freeze_worklist: BTreeSet<Reg>,
    spill_worklist: BTreeSet<Reg>,
    spilled_nodes: BTreeSet<Reg>,
    coalesced_nodes: BTreeSet<Reg>,
    colored_nodes: BTreeSet<Reg>,
    select_stack: Vec<Reg>,
    on_stack: BTreeSet<Reg>,
    /// Nodes moved to the simplify worklist despite their high degree.
    potential_spills: BTreeSet<Reg>,

    coalesced_moves: BTreeSet<usize>,
    constrained_moves: BTreeSet<usize>,
    frozen_moves: BTreeSet<usize>,
    worklist_moves: BTreeSet<usize>,
    active_moves: BTreeSet<usize>,

    move_list: BTreeMap<Reg, BTreeSet<usize>>,
    alias: BTreeMap<Reg, Reg>,
    color: BTreeMap<Reg, Amd64Reg>,
}

impl<'a> Round<'a> {
    fn new(
        instructions: &[Instruction],
        liveness: &Liveness,
        spill_temps: &'a BTreeSet<Reg>,
        options: &'a Options,
    ) -> Self {
        let (graph, moves) = interference::build(instructions, liveness);

        let mut use_counts = BTreeMap::new();
        let mut initial = BTreeSet::new();
        for ud in &liveness.uses_and_defs {
            for reg in ud.uses.union(&ud.defs) {
                if !reg.is_pre_colored() {
                    initial.insert(reg.clone());
                    *use_counts.entry(reg.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut move_list: BTreeMap<Reg, BTreeSet<usize>> = BTreeMap::new();
        for mv in &moves {
            move_list
                .entry(mv.src.clone())
                .or_default()
                .insert(mv.index);
            move_list
                .entry(mv.dest.clone())
                .or_default()
                .insert(mv.index);
        }

        Round {
            k: options.available_registers.len(),
            available: &options.available_registers,
            check_invariants: options.check_invariants,
            spill_temps,
            graph,
            worklist_moves: moves.iter().map(|mv| mv.index).collect(),
            moves: moves.into_iter().map(|mv| (mv.index, mv)).collect(),
            use_counts,
            initial,
            simplify_worklist: BTreeSet::new(),
            freeze_worklist: BTreeSet::new(),
            spill_worklist: BTreeSet::new(),
            spilled_nodes: BTreeSet::new(),
            coalesced_nodes: BTreeSet::new(),
            colored_nodes: BTreeSet::new(),
            select_stack: vec![],
            on_stack: BTreeSet::new(),
            potential_spills: BTreeSet::new(),
            coalesced_moves: BTreeSet::new(),
            constrained_moves: BTreeSet::new(),
            frozen_moves: BTreeSet::new(),
            active_moves: BTreeSet::new(),
            move_list,
            alias: BTreeMap::new(),
            color: BTreeMap::new(),
        }
    }

    fn run(&mut self) -> Result<(), BackendError> {
        self.make_worklist();
        self.check()?;
        loop {
            if let Some(node) = first(&self.simplify_worklist) {
                self.simplify(node);
            } else if let Some(mv) = first(&self.worklist_moves) {
                self.coalesce(mv);
            } else if let Some(node) = first(&self.freeze_worklist) {
                self.freeze(node);
            } else if !self.spill_worklist.is_empty() {
                self.select_spill();
            } else {
                break;
            }
            self.check()?;
        }
        self.assign_colors();
        Ok(())
    }

    /// Colors of every abstract register after a round without spills.
    fn final_colors(&self) -> BTreeMap<Reg, Amd64Reg> {
        self.color
            .iter()
            .filter(|(reg, _)| !reg.is_pre_colored())
            .map(|(reg, color)| (reg.clone(), *color))
            .collect()
    }

    fn make_worklist(&mut self) {
        let initial = std::mem::replace(&mut self.initial, BTreeSet::new());
        for node in initial {
            if self.graph.degree(&node) >= self.k {
                self.spill_worklist.insert(node);
            } else if self.move_related(&node) {
                self.freeze_worklist.insert(node);
            } else {
                self.simplify_worklist.insert(node);
            }
        }
    }

    fn adjacent(&self, node: &Reg) -> Vec<Reg> {
        self.graph
            .neighbors(node)
            .filter(|n| !self.on_stack.contains(*n) && !self.coalesced_nodes.contains(*n))
            .cloned()
            .collect()
    }

    fn node_moves(&self, node: &Reg) -> Vec<usize> {
        self.move_list
            .get(node)
            .into_iter()
            .flat_map(|moves| moves.iter())
            .filter(|mv| self.active_moves.contains(*mv) || self.worklist_moves.contains(*mv))
            .cloned()
            .collect()
    }

    fn move_related(&self, node: &Reg) -> bool {
        !self.node_moves(node).is_empty()
    }

    fn simplify(&mut self, node: Reg) {
        log::trace!("simplify {}", node);
        self.simplify_worklist.remove(&node);
        self.select_stack.push(node.clone());
        self.on_stack.insert(node.clone());
        for neighbor in self.adjacent(&node) {
            self.decrement_degree(&neighbor);
        }
    }

    fn decrement_degree(&mut self, node: &Reg) {
        let degree = self.graph.decrement_degree(node);
        if degree != self.k {
            return;
        }
        let mut nodes = self.adjacent(node);
        nodes.push(node.clone());
        self.enable_moves(&nodes);
        if self.spill_worklist.remove(node) {
            if self.move_related(node) {
                self.freeze_worklist.insert(node.clone());
            } else {
                self.simplify_worklist.insert(node.clone());
            }
        }
    }

    fn enable_moves(&mut self, nodes: &[Reg]) {
        for node in nodes {
            for mv in self.node_moves(node) {
                if self.active_moves.remove(&mv) {
                    self.worklist_moves.insert(mv);
                }
            }
        }
    }

    fn get_alias(&self, node: &Reg) -> Reg {
        let mut node = node;
        while self.coalesced_nodes.contains(node) {
            match self.alias.get(node) {
                Some(alias) => node = alias,
                None => break,
            }
        }
        node.clone()
    }

    fn add_work_list(&mut self, node: &Reg) {
        if !node.is_pre_colored() && !self.move_related(node) && self.graph.degree(node) < self.k
        {
            self.freeze_worklist.remove(node);
            self.simplify_worklist.insert(node.clone());
        }
    }

    /// George: every neighbor of `v` is harmless to `u`.
    fn george(&self, u: &Reg, v: &Reg) -> bool {
        self.adjacent(v).iter().all(|t| {
            self.graph.degree(t) < self.k || t.is_pre_colored() || self.graph.contains(t, u)
        })
    }

    /// Briggs: the merged node has fewer than `k` neighbors of significant
    /// degree.
    fn briggs(&self, u: &Reg, v: &Reg) -> bool {
        let nodes = self
            .adjacent(u)
            .into_iter()
            .chain(self.adjacent(v))
            .collect::<BTreeSet<_>>();
        let significant = nodes
            .iter()
            .filter(|n| self.graph.degree(n) >= self.k)
            .count();
        significant < self.k
    }

    fn coalesce(&mut self, mv: usize) {
        self.worklist_moves.remove(&mv);
        let (dest, src) = match self.moves.get(&mv) {
            Some(Move { dest, src, .. }) => (self.get_alias(dest), self.get_alias(src)),
            None => return,
        };
        let (u, v) = if src.is_pre_colored() {
            (src, dest)
        } else {
            (dest, src)
        };
        log::trace!("coalesce {} and {}", u, v);

        if u == v {
            self.coalesced_moves.insert(mv);
            self.add_work_list(&u);
        } else if v.is_pre_colored() || self.graph.contains(&u, &v) {
            self.constrained_moves.insert(mv);
            self.add_work_list(&u);
            self.add_work_list(&v);
        } else if (u.is_pre_colored() && self.george(&u, &v))
            || (!u.is_pre_colored() && self.briggs(&u, &v))
        {
            self.coalesced_moves.insert(mv);
            self.combine(&u, &v);
            self.add_work_list(&u);
        } else {
            self.active_moves.insert(mv);
        }
    }

    fn combine(&mut self, u: &Reg, v: &Reg) {
        if !self.freeze_worklist.remove(v) {
            self.spill_worklist.remove(v);
        }
        self.coalesced_nodes.insert(v.clone());
        self.alias.insert(v.clone(), u.clone());
        let v_moves = self.move_list.get(v).cloned().unwrap_or_default();
        self.move_list
            .entry(u.clone())
            .or_default()
            .extend(v_moves);
        self.enable_moves(&[v.clone()]);
        for t in self.adjacent(v) {
            self.graph.add_edge(&t, u);
            self.decrement_degree(&t);
        }
        if self.graph.degree(u) >= self.k && self.freeze_worklist.remove(u) {
            self.spill_worklist.insert(u.clone());
        }
    }

    fn freeze(&mut self, node: Reg) {
        log::trace!("freeze {}", node);
        self.freeze_worklist.remove(&node);
        self.simplify_worklist.insert(node.clone());
        self.freeze_moves(&node);
    }

    fn freeze_moves(&mut self, node: &Reg) {
        let node_alias = self.get_alias(node);
        for mv in self.node_moves(node) {
            let (dest, src) = match self.moves.get(&mv) {
                Some(Move { dest, src, .. }) => (dest.clone(), src.clone()),
                None => continue,
            };
            let other = if self.get_alias(&src) == node_alias {
                self.get_alias(&dest)
            } else {
                self.get_alias(&src)
            };
            self.active_moves.remove(&mv);
            self.frozen_moves.insert(mv);
            if !other.is_pre_colored()
                && !self.move_related(&other)
                && self.graph.degree(&other) < self.k
                && self.freeze_worklist.remove(&other)
            {
                self.simplify_worklist.insert(other);
            }
        }
    }

    /// Picks the node with the lowest `uses / degree`. Registers created by
    /// earlier spills are only picked when nothing else is left.
    fn select_spill(&mut self) {
        let mut best: Option<(f64, Reg)> = None;
        for node in &self.spill_worklist {
            let score = if self.spill_temps.contains(node) {
                std::f64::INFINITY
            } else {
                let uses = self.use_counts.get(node).cloned().unwrap_or(0) as f64;
                uses / self.graph.degree(node).max(1) as f64
            };
            best = match best {
                Some((best_score, best_node)) => {
                    if score < best_score {
                        Some((score, node.clone()))
                    } else {
                        Some((best_score, best_node))
                    }
                }
                None => Some((score, node.clone())),
            };
        }
        if let Some((_, node)) = best {
            log::trace!("potential spill {}", node);
            self.spill_worklist.remove(&node);
            self.simplify_worklist.insert(node.clone());
            self.potential_spills.insert(node.clone());
            self.freeze_moves(&node);
        }
    }

    fn color_of(&self, node: &Reg) -> Option<Amd64Reg> {
        match node.machine_reg() {
            Some(reg) => Some(reg),
            None if self.colored_nodes.contains(node) => self.color.get(node).cloned(),
            None => None,
        }
    }

    fn assign_colors(&mut self) {
        while let Some(node) = self.select_stack.pop() {
            self.on_stack.remove(&node);
            let mut ok_colors = self.available.to_vec();
            let neighbors = self.graph.neighbors(&node).cloned().collect::<Vec<_>>();
            for neighbor in neighbors {
                if let Some(color) = self.color_of(&self.get_alias(&neighbor)) {
                    ok_colors.retain(|c| *c != color);
                }
            }
            match ok_colors.first() {
                Some(color) => {
                    self.colored_nodes.insert(node.clone());
                    self.color.insert(node, *color);
                }
                None => {
                    log::trace!("actual spill {}", node);
                    self.spilled_nodes.insert(node);
                }
            }
        }
        for node in &self.coalesced_nodes {
            if let Some(color) = self.color_of(&self.get_alias(node)) {
                self.color.insert(node.clone(), color);
            }
        }
    }

    /// The worklist invariants of the algorithm, checked after every step.
    fn check(&self) -> Result<(), BackendError> {
        if !self.check_invariants {
            return Ok(());
        }
        let violation = |reason: String| {
            Err(BackendError::InvariantViolation {
                reason: format!("register allocation: {}", reason),
            })
        };

        let worklists = [
            &self.simplify_worklist,
            &self.freeze_worklist,
            &self.spill_worklist,
            &self.spilled_nodes,
            &self.coalesced_nodes,
            &self.colored_nodes,
            &self.on_stack,
        ];
        let mut seen = BTreeSet::new();
        for list in worklists.iter() {
            for node in list.iter() {
                if !seen.insert(node) {
                    return violation(format!("{} is on two worklists", node));
                }
            }
        }

        let in_worklists = |n: &Reg| {
            n.is_pre_colored()
                || self.simplify_worklist.contains(n)
                || self.freeze_worklist.contains(n)
                || self.spill_worklist.contains(n)
        };
        for list in worklists.iter().take(3) {
            for node in list.iter() {
                let degree = self
                    .graph
                    .neighbors(node)
                    .filter(|n| in_worklists(*n))
                    .count();
                if degree != self.graph.degree(node) {
                    return violation(format!(
                        "degree of {} is {} but it has {} neighbors",
                        node,
                        self.graph.degree(node),
                        degree
                    ));
                }
            }
        }

        for node in &self.simplify_worklist {
            let low_degree =
                self.graph.degree(node) < self.k || self.potential_spills.contains(node);
            if !low_degree || (self.move_related(node) && !self.potential_spills.contains(node)) {
                return violation(format!("{} must not be simplified", node));
            }
        }
        for node in &self.freeze_worklist {
            if self.graph.degree(node) >= self.k || !self.move_related(node) {
                return violation(format!("{} must not be frozen", node));
            }
        }
        for node in &self.spill_worklist {
            if self.graph.degree(node) < self.k {
                return violation(format!("{} must not be spilled", node));
            }
        }
        Ok(())
    }
}

fn first<T: Ord + Clone>(set: &BTreeSet<T>) -> Option<T> {
    set.iter().next().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abstract_register::ABSTRACT_REG_PREFIX,
        amd64::{AlBinaryOpType, Const, Mem},
    };

    fn reg(id: &str) -> Reg {
        Reg::new(id)
    }

    fn options(registers: usize) -> Options {
        Options {
            check_invariants: true,
            ..Options::default().with_register_count(registers)
        }
    }

    fn lines(allocation: &Allocation) -> Vec<String> {
        allocation
            .instructions
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Defines `count` values and sums them up afterwards, so all of them
    /// are live at the same time.
    fn pressure(count: usize) -> Vec<Instruction> {
        let mut instructions = callee_saved::wrap(vec![]);
        let restores = instructions.split_off(5);
        for i in 0..count {
            instructions.push(Instruction::mov(reg(&format!("v{}", i)), Const::Int(i as i32)));
        }
        instructions.push(Instruction::mov(reg("sum"), Const::Int(0)));
        for i in 0..count {
            instructions.push(Instruction::binop(
                AlBinaryOpType::Add,
                reg("sum"),
                reg(&format!("v{}", i)),
            ));
        }
        instructions.push(Instruction::mov(Reg::machine(Amd64Reg::A), reg("sum")));
        instructions.push(Instruction::label("epilogue"));
        instructions.extend(restores);
        instructions
    }

    #[test]
    fn simple_function_needs_one_round() {
        let instructions = callee_saved::wrap(vec![
            Instruction::mov(reg("a"), Reg::machine(Amd64Reg::Di)),
            Instruction::binop(AlBinaryOpType::Add, reg("a"), Const::Int(1)),
            Instruction::mov(Reg::machine(Amd64Reg::A), reg("a")),
        ]);
        let mut source = AbstractRegisterSource::new();
        let allocation = allocate("f", instructions, true, &mut source, &options(14)).unwrap();
        assert_eq!(1, allocation.rounds);
        assert_eq!(0, allocation.stack_slots);
        assert_eq!(
            vec![
                Amd64Reg::B,
                Amd64Reg::R12,
                Amd64Reg::R13,
                Amd64Reg::R14,
                Amd64Reg::R15
            ],
            allocation.unused_callee_saved.iter().cloned().collect::<Vec<_>>()
        );
        let body = lines(&allocation)
            .into_iter()
            .filter(|line| !line.starts_with("##"))
            .collect::<Vec<_>>();
        assert_eq!(vec!["add rdi, 1", "mov rax, rdi"], body);
    }

    #[test]
    fn coalesced_moves_become_comments() {
        let instructions = vec![
            Instruction::mov(reg("a"), Reg::machine(Amd64Reg::Di)),
            Instruction::mov(Reg::machine(Amd64Reg::A), reg("a")),
        ];
        let mut source = AbstractRegisterSource::new();
        let allocation = allocate("f", instructions, true, &mut source, &options(14)).unwrap();
        let lines = lines(&allocation);
        assert_eq!(2, lines.len());
        assert!(lines
            .iter()
            .any(|line| line == "## 'mov rdi, rdi' is optimized away."
                || line == "## 'mov rax, rax' is optimized away."));
    }

    #[test]
    fn high_pressure_spills() {
        let mut source = AbstractRegisterSource::new();
        let allocation =
            allocate("f", pressure(12), true, &mut source, &options(4)).unwrap();
        assert!(allocation.rounds > 1);
        assert!(allocation.stack_slots > 0);
        assert!(allocation.spill_slots.len() >= allocation.stack_slots);
        for line in lines(&allocation) {
            assert!(!line.contains("_ABSTRACT_REG_"), "{}", line);
            assert!(!line.contains("_CALLEE_SAVED_STORAGE_"), "{}", line);
        }
        // every spilled register has its own slot
        let slots = allocation.spill_slots.values().collect::<BTreeSet<_>>();
        assert_eq!(allocation.spill_slots.len(), slots.len());
        // only the first four colors are used
        for color in allocation.colors.values() {
            assert!(options(4).available_registers.contains(color));
        }
    }

    #[test]
    fn slots_are_strictly_increasing_across_rounds() {
        let mut source = AbstractRegisterSource::new();
        let allocation =
            allocate("f", pressure(20), true, &mut source, &options(3)).unwrap();
        let mut slots = allocation.spill_slots.values().cloned().collect::<Vec<_>>();
        slots.sort();
        assert_eq!((1..=slots.len()).collect::<Vec<_>>(), slots);
        assert!(allocation.instructions.iter().all(|instr| {
            let mut ok = true;
            instr.clone().map_memory(&mut |mem: Mem| {
                if let Some(slot) = mem.slot_index() {
                    ok &= slot >= 1 && slot <= allocation.stack_slots;
                }
                mem
            });
            ok
        }));
    }

    #[test]
    fn naive_allocation_spills_every_temporary() {
        let naive = Options {
            naive_allocation: true,
            ..options(14)
        };
        let mut source = AbstractRegisterSource::new();
        let allocation = allocate("f", pressure(4), true, &mut source, &naive).unwrap();
        let mut spilled = allocation
            .spill_slots
            .keys()
            .map(|reg| reg.id().to_string())
            .collect::<Vec<_>>();
        spilled.retain(|id| !id.starts_with(callee_saved::STORAGE_PREFIX));
        spilled.sort();
        assert_eq!(vec!["sum", "v0", "v1", "v2", "v3"], spilled);
        // only reload registers get colors
        assert!(allocation
            .colors
            .keys()
            .all(|reg| reg.id().starts_with(ABSTRACT_REG_PREFIX)));
        for line in lines(&allocation) {
            assert!(!line.contains("_ABSTRACT_REG_"), "{}", line);
        }
    }

    #[test]
    fn without_colors_allocation_does_not_converge() {
        let mut source = AbstractRegisterSource::new();
        let result = allocate("f", pressure(2), true, &mut source, &options(0));
        utils::assert_matches!(
            result,
            Err(BackendError::NonConvergence { rounds: MAX_ALLOCATION_ROUNDS, .. })
        );
    }
}
