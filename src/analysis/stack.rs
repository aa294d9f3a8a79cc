use super::basic_block::ControlFlowGraph;
use crate::code::opcodes::*;
use crate::code::Insn;
use crate::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::tree::MethodNode;
use crate::util::Width;
use crate::Error;
use std::collections::VecDeque;

/// Change in stack height (in slots) caused by executing an instruction
pub fn stack_effect(insn: &Insn, position: usize) -> Result<i32, Error> {
    Ok(match insn {
        Insn::Field {
            opcode, descriptor, ..
        } => {
            let width = FieldType::parse(descriptor)?.width() as i32;
            match *opcode {
                GETSTATIC => width,
                PUTSTATIC => -width,
                GETFIELD => width - 1,
                _ => -width - 1,
            }
        }
        Insn::Method {
            opcode, descriptor, ..
        } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            let has_this = *opcode != INVOKESTATIC;
            descriptor.return_width() as i32 - descriptor.parameter_length(has_this) as i32
        }
        Insn::InvokeDynamic { descriptor, .. } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            descriptor.return_width() as i32 - descriptor.parameter_length(false) as i32
        }
        Insn::Ldc { value, .. } if value.is_wide() => 2,
        Insn::Ldc { .. } => 1,
        Insn::MultiANewArray { dimensions, .. } => 1 - *dimensions as i32,
        other => fixed_stack_effect(other.opcode()).ok_or(Error::InvalidOpcode {
            opcode: other.opcode(),
            offset: position,
        })?,
    })
}

/// Result of propagating stack heights through the blocks
pub struct StackHeights {
    pub max_stack: usize,

    /// Stack height on entry to each block, `None` for unreachable blocks
    pub entry_heights: Vec<Option<usize>>,
}

/// Find the stack height on entry to every reachable block, and the maximum height overall
pub fn compute_stack_heights(graph: &ControlFlowGraph<'_>) -> Result<StackHeights, Error> {
    let mut entry_heights: Vec<Option<usize>> = vec![None; graph.blocks.len()];
    let mut max_stack = 0;
    let mut worklist = VecDeque::new();

    if !graph.blocks.is_empty() {
        entry_heights[0] = Some(0);
        worklist.push_back(0);
    }

    while let Some(idx) = worklist.pop_front() {
        let block = &graph.blocks[idx];
        let mut height = entry_heights[idx].unwrap_or(0) as i64;

        for position in block.start..block.end {
            height += stack_effect(graph.insns[position], position)? as i64;
            if height < 0 {
                return Err(Error::MalformedAttribute {
                    name: "Code",
                    reason: format!("operand stack underflow at instruction {}", position),
                });
            }
            max_stack = max_stack.max(height as usize);
        }

        let last = graph.insns[block.end - 1];
        let mut edges: Vec<(usize, usize)> = block
            .successors
            .iter()
            .map(|successor| (*successor, height as usize))
            .collect();

        // The return address pushed by `jsr` is only on the stack of the subroutine
        if let Insn::Jump {
            opcode: JSR | JSR_W,
            ..
        } = last
        {
            if let Some((successor, height)) = edges.last_mut() {
                if *successor == idx + 1 && block.successors.len() > 1 {
                    *height -= 1;
                }
            }
        }
        for edge in &block.handlers {
            edges.push((edge.handler, 1));
            max_stack = max_stack.max(1);
        }

        for (successor, height) in edges {
            match entry_heights[successor] {
                None => {
                    entry_heights[successor] = Some(height);
                    worklist.push_back(successor);
                }
                Some(existing) if existing != height => {
                    return Err(Error::StackDepthMismatch {
                        block_start: graph.blocks[successor].start,
                        first: existing,
                        second: height,
                    })
                }
                Some(_) => (),
            }
        }
    }

    Ok(StackHeights {
        max_stack,
        entry_heights,
    })
}

/// Local variable slots used by the method: arguments, local variable instructions, and
/// declared local variables
pub fn compute_max_locals(method: &MethodNode) -> Result<usize, Error> {
    let descriptor = MethodDescriptor::parse(&method.descriptor)?;
    let mut max_locals = descriptor.parameter_length(!method.is_static());

    for (_, node) in &method.instructions {
        let used = match node.as_insn() {
            Some(Insn::Var { opcode, var, .. }) => {
                let width = match *opcode {
                    LLOAD | DLOAD | LSTORE | DSTORE => 2,
                    _ => 1,
                };
                *var as usize + width
            }
            Some(Insn::Iinc { var, .. }) => *var as usize + 1,
            _ => continue,
        };
        max_locals = max_locals.max(used);
    }

    for local in &method.local_variables {
        let width = match local.descriptor.as_str() {
            "J" | "D" => 2,
            _ => 1,
        };
        max_locals = max_locals.max(local.index as usize + width);
    }

    Ok(max_locals)
}
