//! Control flow and frame analysis of method bodies
//!
//! The analysis partitions the code into basic blocks, then propagates stack heights (for
//! `max_stack`) and optionally full verification types (for stack map frames) along the edges
//! between blocks until nothing changes.
//!
//! Unreachable blocks and merges of incompatible types are not errors: they are reported as
//! [`Diagnostic`]s and the analysis carries on with the conservative choice (no frame for dead
//! code, `Top` for the conflicting slot).

mod basic_block;
mod frames;
mod stack;
mod types;

pub use basic_block::*;
pub use types::{ClassHierarchy, ObjectHierarchy, TypeHierarchy};

use crate::code::{Frame, Label};
use crate::errors::Diagnostic;
use crate::tree::MethodNode;
use crate::Error;

/// Computed metadata for one method body
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub max_stack: u16,
    pub max_locals: u16,

    /// Frame on entry to the method, implied by its descriptor
    pub initial_frame: Frame,

    /// Frames at the start of blocks that need them, in code order, keyed by the first label of
    /// the block (empty unless frames were requested)
    pub frames: Vec<(Label, Frame)>,
    pub blocks: Vec<BasicBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Analyzer<'a> {
    owner: &'a str,
    method: &'a MethodNode,
    hierarchy: &'a dyn TypeHierarchy,
}

impl<'a> Analyzer<'a> {
    /// Analyzer for a method of the class `owner` (internal name)
    pub fn new(owner: &'a str, method: &'a MethodNode) -> Analyzer<'a> {
        Analyzer {
            owner,
            method,
            hierarchy: &ObjectHierarchy,
        }
    }

    /// Use a hierarchy for finding common superclasses when merging frames
    pub fn with_hierarchy(mut self, hierarchy: &'a dyn TypeHierarchy) -> Analyzer<'a> {
        self.hierarchy = hierarchy;
        self
    }

    pub fn analyze(&self, compute_frames: bool) -> Result<Analysis, Error> {
        let graph = ControlFlowGraph::build(self.method)?;
        let heights = stack::compute_stack_heights(&graph)?;
        let max_locals = stack::compute_max_locals(self.method)?;
        let mut diagnostics = vec![];

        for (block, height) in graph.blocks.iter().zip(&heights.entry_heights) {
            if height.is_none() {
                let diagnostic = Diagnostic::UnreachableCodeIgnored {
                    block_start: block.start,
                };
                log::warn!(
                    "{}.{}{}: {:?}",
                    self.owner,
                    self.method.name,
                    self.method.descriptor,
                    diagnostic
                );
                diagnostics.push(diagnostic);
            }
        }

        let initial_state = frames::State::initial(self.owner, self.method, max_locals)?;
        let initial_frame = frames::initial_frame(&initial_state);

        let mut computed_frames = vec![];
        if compute_frames {
            let computed = frames::compute_frames(
                &graph,
                self.owner,
                initial_state,
                self.hierarchy,
                &mut diagnostics,
            )?;
            for (idx, block) in graph.blocks.iter().enumerate() {
                if !block.needs_frame() {
                    continue;
                }
                if let (Some(label), Some(frame)) =
                    (block.labels.first(), computed.frame(&graph, idx))
                {
                    computed_frames.push((*label, frame));
                }
            }
        }

        let max_stack = to_u16(heights.max_stack, "max_stack")?;
        let max_locals = to_u16(max_locals, "max_locals")?;
        log::debug!(
            "{}.{}{}: {} blocks, max stack {}, max locals {}, {} frames",
            self.owner,
            self.method.name,
            self.method.descriptor,
            graph.blocks.len(),
            max_stack,
            max_locals,
            computed_frames.len()
        );

        Ok(Analysis {
            max_stack,
            max_locals,
            initial_frame,
            frames: computed_frames,
            blocks: graph.blocks,
            diagnostics,
        })
    }
}

fn to_u16(value: usize, what: &str) -> Result<u16, Error> {
    u16::try_from(value).map_err(|_| Error::MalformedAttribute {
        name: "Code",
        reason: format!("{} of {} does not fit in 16 bits", what, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::MethodAccessFlags;
    use crate::class_file::VerificationType;
    use crate::code::opcodes::*;
    use crate::code::{Insn, LabelGenerator};
    use crate::tree::InsnNode;
    use crate::visitor::MethodVisitor;

    fn method(access_flags: MethodAccessFlags, descriptor: &str) -> MethodNode {
        MethodNode::new(access_flags, "m", descriptor, vec![])
    }

    #[test]
    fn straight_line() {
        let mut method = method(MethodAccessFlags::empty(), "()V");
        method.visit_var_insn(ALOAD, 0).unwrap();
        method
            .visit_method_insn(INVOKEVIRTUAL, "Owner", "run", "()V", false)
            .unwrap();
        method.visit_insn(RETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(analysis.max_stack, 1);
        assert_eq!(analysis.max_locals, 1);
        assert_eq!(analysis.blocks.len(), 1);
        assert!(analysis.frames.is_empty());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn loop_has_frame_at_header() {
        let mut method = method(MethodAccessFlags::STATIC, "(I)V");
        let top = method.fresh_label();
        method.visit_label(top).unwrap();
        method.visit_iinc_insn(0, -1).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFNE, top).unwrap();
        method.visit_insn(RETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(analysis.blocks.len(), 2);
        assert_eq!(analysis.blocks[0].predecessors, 2);
        assert_eq!(analysis.max_stack, 1);
        assert_eq!(analysis.frames.len(), 1);

        let (label, frame) = &analysis.frames[0];
        assert_eq!(*label, top);
        assert_eq!(
            frame.locals.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VerificationType::Integer]
        );
        assert!(frame.stack.is_empty());
    }

    #[test]
    fn merge_of_branches() {
        // static Object m(boolean b) { return b ? "s" : null; }
        let mut method = method(MethodAccessFlags::STATIC, "(Z)Ljava/lang/Object;");
        let else_branch = method.fresh_label();
        let join = method.fresh_label();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFEQ, else_branch).unwrap();
        method
            .visit_ldc_insn(&crate::code::LdcValue::String("s".to_owned()))
            .unwrap();
        method.visit_jump_insn(GOTO, join).unwrap();
        method.visit_label(else_branch).unwrap();
        method.visit_insn(ACONST_NULL).unwrap();
        method.visit_label(join).unwrap();
        method.visit_insn(ARETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(analysis.blocks.len(), 4);
        let labels: Vec<Label> = analysis.frames.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec![else_branch, join]);

        let join_frame = &analysis.frames[1].1;
        assert_eq!(
            join_frame.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![VerificationType::Object("java/lang/String".to_owned())]
        );
    }

    #[test]
    fn conflicting_depths() {
        let mut method = method(MethodAccessFlags::STATIC, "(I)V");
        let join = method.fresh_label();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFEQ, join).unwrap();
        method.visit_insn(ICONST_0).unwrap();
        method.visit_label(join).unwrap();
        method.visit_insn(RETURN).unwrap();

        assert!(matches!(
            Analyzer::new("Owner", &method).analyze(false),
            Err(Error::StackDepthMismatch {
                first: 0,
                second: 1,
                ..
            })
        ));
    }

    #[test]
    fn dead_code_is_reported() {
        let mut method = method(MethodAccessFlags::STATIC, "()V");
        method.visit_insn(RETURN).unwrap();
        method.visit_insn(NOP).unwrap();
        method.visit_insn(RETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(
            analysis.diagnostics,
            vec![Diagnostic::UnreachableCodeIgnored { block_start: 1 }]
        );
    }

    #[test]
    fn constructor_initializes_new_objects() {
        let mut method = method(MethodAccessFlags::STATIC, "()Ljava/lang/Object;");
        let alloc = method.fresh_label();
        let join = method.fresh_label();
        method.visit_label(alloc).unwrap();
        method.visit_type_insn(NEW, "java/lang/Object").unwrap();
        method.visit_insn(DUP).unwrap();
        method.visit_insn(ICONST_0).unwrap();
        method.visit_jump_insn(IFEQ, join).unwrap();
        method.visit_label(join).unwrap();
        method
            .visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)
            .unwrap();
        method.visit_insn(ARETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(analysis.max_stack, 3);
        let (label, frame) = &analysis.frames[0];
        assert_eq!(*label, join);
        assert_eq!(
            frame.stack.iter().map(|(_, _, t)| t.clone()).collect::<Vec<_>>(),
            vec![
                VerificationType::Uninitialized(alloc),
                VerificationType::Uninitialized(alloc)
            ]
        );
    }

    #[test]
    fn analysis_is_idempotent() {
        let mut method = method(MethodAccessFlags::STATIC, "(J)J");
        let handler = method.fresh_label();
        let start = method.fresh_label();
        let end = method.fresh_label();
        method.visit_label(start).unwrap();
        method.visit_var_insn(LLOAD, 0).unwrap();
        method.visit_label(end).unwrap();
        method.visit_insn(LRETURN).unwrap();
        method.visit_label(handler).unwrap();
        method.visit_insn(POP).unwrap();
        method.visit_insn(LCONST_0).unwrap();
        method.visit_insn(LRETURN).unwrap();
        method
            .visit_try_catch_block(start, end, handler, Some("java/lang/Exception"))
            .unwrap();

        let analyzer = Analyzer::new("Owner", &method);
        let first = analyzer.analyze(true).unwrap();
        let second = analyzer.analyze(true).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.max_locals, 2);
        assert_eq!(first.max_stack, 2);
        assert!(first.blocks.iter().any(|block| block.is_handler));
        assert_eq!(first.frames.len(), 1);
        assert!(matches!(
            method.instructions.iter().last(),
            Some((_, InsnNode::Insn(Insn::Simple(LRETURN))))
        ));
    }

    #[test]
    fn jsr_to_the_next_instruction() {
        // jsr L; L: astore_0; ret 0
        let mut method = method(MethodAccessFlags::STATIC, "()V");
        let subroutine = method.fresh_label();
        method.visit_jump_insn(JSR, subroutine).unwrap();
        method.visit_label(subroutine).unwrap();
        method.visit_var_insn(ASTORE, 0).unwrap();
        method.visit_var_insn(RET, 0).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(false).unwrap();
        assert_eq!(analysis.blocks.len(), 2);
        assert_eq!(analysis.blocks[0].successors, vec![1]);
        assert_eq!(analysis.max_stack, 1);
        assert_eq!(analysis.max_locals, 1);
    }

    #[test]
    fn wide_jumps_behave_like_narrow_ones() {
        let mut method = method(MethodAccessFlags::STATIC, "(I)I");
        let top = method.fresh_label();
        let exit = method.fresh_label();
        method.visit_label(top).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFEQ, exit).unwrap();
        method.visit_iinc_insn(0, -1).unwrap();
        method.visit_jump_insn(GOTO_W, top).unwrap();
        method.visit_label(exit).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_insn(IRETURN).unwrap();

        let analysis = Analyzer::new("Owner", &method).analyze(true).unwrap();
        assert_eq!(analysis.blocks.len(), 3);
        assert_eq!(analysis.blocks[1].successors, vec![0]);
        let labels: Vec<Label> = analysis.frames.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec![top, exit]);
        assert!(analysis.diagnostics.is_empty());
    }
}
