use crate::code::{Insn, Label};
use crate::tree::{InsnNode, MethodNode};
use crate::Error;
use std::collections::HashMap;

/// Maximal straight-line run of instructions
///
/// Instruction positions are indices into [`ControlFlowGraph::insns`] (labels and frames don't
/// count).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Position of the first instruction
    pub start: usize,

    /// Position just past the last instruction
    pub end: usize,

    /// Labels placed right at the start of the block
    pub labels: Vec<Label>,

    /// Distinct blocks control can flow to when the last instruction completes normally
    ///
    /// Jump targets come first, then the next block if execution falls through to it.
    pub successors: Vec<usize>,

    /// Handler blocks of the exception ranges covering this block, in exception table order
    pub handlers: Vec<HandlerEdge>,

    /// Number of incoming edges (method entry counts as one for the first block)
    pub predecessors: usize,

    pub is_jump_target: bool,
    pub is_handler: bool,
}

/// Implicit edge from a block to the handler of an exception range covering it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerEdge {
    pub handler: usize,

    /// Internal name of the exception class caught, `None` for everything
    pub catch_type: Option<String>,
}

impl BasicBlock {
    fn new(start: usize, end: usize, labels: Vec<Label>) -> BasicBlock {
        BasicBlock {
            start,
            end,
            labels,
            successors: vec![],
            handlers: vec![],
            predecessors: 0,
            is_jump_target: false,
            is_handler: false,
        }
    }

    /// Does the block need a stack map frame?
    pub fn needs_frame(&self) -> bool {
        self.is_jump_target || self.is_handler || self.predecessors > 1
    }
}

/// Basic block partition of a method body, with the edges between blocks
#[derive(Debug)]
pub struct ControlFlowGraph<'a> {
    /// Instructions in order
    pub insns: Vec<&'a Insn>,
    pub blocks: Vec<BasicBlock>,

    /// Position of the instruction following each label
    label_positions: HashMap<Label, usize>,

    /// Block starting at each label
    label_blocks: HashMap<Label, usize>,

    /// First label at each instruction position
    position_labels: HashMap<usize, Label>,
}

impl<'a> ControlFlowGraph<'a> {
    /// Partition the method body and link up the blocks
    ///
    /// A block starts at a label (unless the current block is still empty) and right after any
    /// instruction that branches, switches, returns, or throws.
    pub fn build(method: &'a MethodNode) -> Result<ControlFlowGraph<'a>, Error> {
        let mut insns: Vec<&Insn> = vec![];
        let mut blocks: Vec<BasicBlock> = vec![];
        let mut label_positions = HashMap::new();
        let mut position_labels = HashMap::new();
        let mut current_start = 0;
        let mut current_labels: Vec<Label> = vec![];

        for (_, node) in &method.instructions {
            match node {
                InsnNode::Label(label) => {
                    if insns.len() > current_start {
                        blocks.push(BasicBlock::new(
                            current_start,
                            insns.len(),
                            std::mem::take(&mut current_labels),
                        ));
                        current_start = insns.len();
                    }
                    current_labels.push(*label);
                    label_positions.insert(*label, insns.len());
                    position_labels.entry(insns.len()).or_insert(*label);
                }
                InsnNode::Insn(insn) => {
                    insns.push(insn);
                    if insn.ends_block() {
                        blocks.push(BasicBlock::new(
                            current_start,
                            insns.len(),
                            std::mem::take(&mut current_labels),
                        ));
                        current_start = insns.len();
                    }
                }
                InsnNode::Frame(_) => (),
            }
        }
        if insns.len() > current_start {
            blocks.push(BasicBlock::new(current_start, insns.len(), current_labels));
        }

        let label_blocks = blocks
            .iter()
            .enumerate()
            .flat_map(|(idx, block)| block.labels.iter().map(move |label| (*label, idx)))
            .collect();

        let mut graph = ControlFlowGraph {
            insns,
            blocks,
            label_positions,
            label_blocks,
            position_labels,
        };
        graph.link(method)?;
        Ok(graph)
    }

    fn link(&mut self, method: &MethodNode) -> Result<(), Error> {
        if let Some(entry) = self.blocks.first_mut() {
            entry.predecessors += 1;
        }

        for idx in 0..self.blocks.len() {
            let last = self.insns[self.blocks[idx].end - 1];
            let mut successors = vec![];
            for target in last.targets() {
                let target_block = self.block_of(target)?;
                self.blocks[target_block].is_jump_target = true;
                successors.push(target_block);
            }
            let next = idx + 1;
            if last.falls_through() && next < self.blocks.len() && !successors.contains(&next) {
                successors.push(next);
            }
            for successor in &successors {
                self.blocks[*successor].predecessors += 1;
            }
            self.blocks[idx].successors = successors;
        }

        for try_catch in &method.try_catch_blocks {
            let start = self.position_of(try_catch.start)?;
            let end = self.position_of(try_catch.end)?;
            let handler = self.block_of(try_catch.handler)?;
            let mut covered = 0;
            for block in &mut self.blocks {
                if block.start >= start && block.start < end {
                    block.handlers.push(HandlerEdge {
                        handler,
                        catch_type: try_catch.catch_type.clone(),
                    });
                    covered += 1;
                }
            }
            self.blocks[handler].is_handler = true;
            self.blocks[handler].predecessors += covered;
        }
        Ok(())
    }

    /// Instruction position a label marks
    pub fn position_of(&self, label: Label) -> Result<usize, Error> {
        self.label_positions
            .get(&label)
            .copied()
            .ok_or(Error::DanglingLabelReference(label))
    }

    /// Block a label marks the start of
    pub fn block_of(&self, label: Label) -> Result<usize, Error> {
        self.label_blocks
            .get(&label)
            .copied()
            .ok_or(Error::DanglingLabelReference(label))
    }

    /// First label marking an instruction position, if any
    pub fn label_at(&self, position: usize) -> Option<Label> {
        self.position_labels.get(&position).copied()
    }
}
