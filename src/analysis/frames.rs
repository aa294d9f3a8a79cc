use super::basic_block::ControlFlowGraph;
use super::types::*;
use crate::class_file::VerificationType;
use crate::code::opcodes::*;
use crate::code::{Frame, FrameType, Insn, LdcValue};
use crate::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::errors::{Diagnostic, FrameSlot};
use crate::tree::MethodNode;
use crate::Error;
use std::collections::VecDeque;

/// Types of the locals and stack at one point of the method
///
/// Locals are stored per slot (the slot after a `long` or `double` holds `Top`), the stack per
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
}

impl State {
    /// State on entry to a method
    pub fn initial(owner: &str, method: &MethodNode, max_locals: usize) -> Result<State, Error> {
        let descriptor = MethodDescriptor::parse(&method.descriptor)?;
        let mut locals = vec![];
        if !method.is_static() {
            if method.name == "<init>" && owner != OBJECT_NAME {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(owner.to_owned()));
            }
        }
        for parameter in &descriptor.parameters {
            push_local(&mut locals, value_of(parameter));
        }
        if locals.len() < max_locals {
            locals.resize(max_locals, VerificationType::Top);
        }
        Ok(State {
            locals,
            stack: vec![],
        })
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self, position: usize) -> Result<Value, Error> {
        self.stack.pop().ok_or_else(|| underflow(position))
    }

    fn pop_n(&mut self, count: usize, position: usize) -> Result<(), Error> {
        for _ in 0..count {
            self.pop(position)?;
        }
        Ok(())
    }

    /// Pop entries covering (at least) `slots` stack slots, returned bottom first
    fn pop_slots(&mut self, slots: usize, position: usize) -> Result<Vec<Value>, Error> {
        let mut popped = vec![];
        let mut covered = 0;
        while covered < slots {
            let value = self.pop(position)?;
            covered += slot_width(&value);
            popped.push(value);
        }
        popped.reverse();
        Ok(popped)
    }

    /// Duplicate the top `top_slots` slots, inserting the copy `under_slots` further down
    fn dup(&mut self, top_slots: usize, under_slots: usize, position: usize) -> Result<(), Error> {
        let top = self.pop_slots(top_slots, position)?;
        let under = self.pop_slots(under_slots, position)?;
        self.stack.extend(top.iter().cloned());
        self.stack.extend(under);
        self.stack.extend(top);
        Ok(())
    }

    fn load(&self, var: u16) -> Value {
        self.locals
            .get(var as usize)
            .cloned()
            .unwrap_or(VerificationType::Top)
    }

    fn store(&mut self, var: u16, value: Value) {
        let var = var as usize;
        let width = slot_width(&value);
        if self.locals.len() < var + width {
            self.locals.resize(var + width, VerificationType::Top);
        }

        // Overwriting the second half of a wide value invalidates the first half
        if var > 0 && slot_width(&self.locals[var - 1]) == 2 {
            self.locals[var - 1] = VerificationType::Top;
        }
        self.locals[var] = value;
        if width == 2 {
            self.locals[var + 1] = VerificationType::Top;
        }
    }

    /// Replace an uninitialized value everywhere once its constructor has run
    fn initialize(&mut self, uninitialized: &Value, initialized: Value) {
        for value in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if value == uninitialized {
                *value = initialized.clone();
            }
        }
    }

    /// State on entry to an exception handler for instructions covered with this state
    fn for_handler(&self, catch_type: Option<&str>) -> State {
        State {
            locals: self.locals.clone(),
            stack: vec![VerificationType::Object(
                catch_type.unwrap_or(THROWABLE_NAME).to_owned(),
            )],
        }
    }

    /// Merge another incoming state into this one, returning whether anything changed
    fn merge_from(
        &mut self,
        other: &State,
        block_start: usize,
        hierarchy: &dyn TypeHierarchy,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<bool, Error> {
        if self.stack.len() != other.stack.len() {
            return Err(Error::StackDepthMismatch {
                block_start,
                first: self.stack.iter().map(slot_width).sum(),
                second: other.stack.iter().map(slot_width).sum(),
            });
        }

        let mut changed = false;
        if self.locals.len() < other.locals.len() {
            self.locals.resize(other.locals.len(), VerificationType::Top);
            changed = true;
        }
        for (idx, local) in self.locals.iter_mut().enumerate() {
            let incoming = other.locals.get(idx).unwrap_or(&VerificationType::Top);
            let merged = merge_or_report(
                local,
                incoming,
                hierarchy,
                diagnostics,
                block_start,
                FrameSlot::Local(idx),
            );
            if merged != *local {
                *local = merged;
                changed = true;
            }
        }

        for (idx, entry) in self.stack.iter_mut().enumerate() {
            let merged = merge_or_report(
                entry,
                &other.stack[idx],
                hierarchy,
                diagnostics,
                block_start,
                FrameSlot::Stack(idx),
            );
            if merged != *entry {
                *entry = merged;
                changed = true;
            }
        }

        Ok(changed)
    }

    /// Render as a frame, with wide locals as one entry and trailing unusable locals dropped
    fn to_frame(&self, mut label_of: impl FnMut(usize) -> FrameType) -> Frame {
        let mut locals: Vec<&Value> = vec![];
        let mut idx = 0;
        while idx < self.locals.len() {
            let local = &self.locals[idx];
            locals.push(local);
            idx += slot_width(local);
        }
        while let Some(VerificationType::Top) = locals.last() {
            locals.pop();
        }

        let mut convert = |value: &Value| match value {
            VerificationType::Uninitialized(position) => label_of(*position),
            other => other
                .try_map::<_, _, ()>(|class| Ok(class.clone()), |_| Err(()))
                .unwrap_or(VerificationType::Top),
        };
        Frame {
            locals: locals.into_iter().map(&mut convert).collect(),
            stack: self.stack.iter().map(&mut convert).collect(),
        }
    }
}

/// Merge two values, widening conflicts to `Top` and recording them
fn merge_or_report(
    value1: &Value,
    value2: &Value,
    hierarchy: &dyn TypeHierarchy,
    diagnostics: &mut Vec<Diagnostic>,
    block_start: usize,
    slot: FrameSlot,
) -> Value {
    merge_values(value1, value2, hierarchy).unwrap_or_else(|| {
        let diagnostic = Diagnostic::InconsistentFrameMerge { block_start, slot };
        if !diagnostics.contains(&diagnostic) {
            log::warn!("{:?}", diagnostic);
            diagnostics.push(diagnostic);
        }
        VerificationType::Top
    })
}

fn push_local(locals: &mut Vec<Value>, value: Value) {
    let wide = slot_width(&value) == 2;
    locals.push(value);
    if wide {
        locals.push(VerificationType::Top);
    }
}

fn slot_width(value: &Value) -> usize {
    match value {
        VerificationType::Long | VerificationType::Double => 2,
        _ => 1,
    }
}

fn underflow(position: usize) -> Error {
    Error::MalformedAttribute {
        name: "Code",
        reason: format!("operand stack underflow at instruction {}", position),
    }
}

fn ldc_value(value: &LdcValue) -> Result<Value, Error> {
    Ok(match value {
        LdcValue::Integer(_) => VerificationType::Integer,
        LdcValue::Float(_) => VerificationType::Float,
        LdcValue::Long(_) => VerificationType::Long,
        LdcValue::Double(_) => VerificationType::Double,
        LdcValue::String(_) => VerificationType::Object(STRING_NAME.to_owned()),
        LdcValue::Class(_) => VerificationType::Object(CLASS_NAME.to_owned()),
        LdcValue::MethodType(_) => VerificationType::Object(METHOD_TYPE_NAME.to_owned()),
        LdcValue::MethodHandle(_) => VerificationType::Object(METHOD_HANDLE_NAME.to_owned()),
        LdcValue::Dynamic(dynamic) => value_of(&FieldType::parse(&dynamic.descriptor)?),
    })
}

/// Array type created by `newarray` with the given type code
fn primitive_array(type_code: i32) -> Value {
    let descriptor = match type_code {
        4 => "[Z",
        5 => "[C",
        6 => "[F",
        7 => "[D",
        8 => "[B",
        9 => "[S",
        10 => "[I",
        11 => "[J",
        _ => return VerificationType::Top,
    };
    VerificationType::Object(descriptor.to_owned())
}

/// Symbolically execute one instruction
fn execute(
    state: &mut State,
    insns: &[&Insn],
    position: usize,
    owner: &str,
) -> Result<(), Error> {
    use VerificationType::*;

    match insns[position] {
        Insn::Simple(opcode) => match *opcode {
            NOP | RETURN => (),
            ACONST_NULL => state.push(Null),
            ICONST_M1..=ICONST_5 => state.push(Integer),
            LCONST_0 | LCONST_1 => state.push(Long),
            FCONST_0..=FCONST_2 => state.push(Float),
            DCONST_0 | DCONST_1 => state.push(Double),
            IALOAD | BALOAD | CALOAD | SALOAD => {
                state.pop_n(2, position)?;
                state.push(Integer);
            }
            LALOAD => {
                state.pop_n(2, position)?;
                state.push(Long);
            }
            FALOAD => {
                state.pop_n(2, position)?;
                state.push(Float);
            }
            DALOAD => {
                state.pop_n(2, position)?;
                state.push(Double);
            }
            AALOAD => {
                state.pop(position)?;
                let array = state.pop(position)?;
                state.push(array_element(&array));
            }
            IASTORE..=SASTORE => state.pop_n(3, position)?,
            POP => {
                state.pop_slots(1, position)?;
            }
            POP2 => {
                state.pop_slots(2, position)?;
            }
            DUP => state.dup(1, 0, position)?,
            DUP_X1 => state.dup(1, 1, position)?,
            DUP_X2 => state.dup(1, 2, position)?,
            DUP2 => state.dup(2, 0, position)?,
            DUP2_X1 => state.dup(2, 1, position)?,
            DUP2_X2 => state.dup(2, 2, position)?,
            SWAP => {
                let top = state.pop(position)?;
                let under = state.pop(position)?;
                state.push(top);
                state.push(under);
            }
            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR
            | LCMP | FCMPL | FCMPG | DCMPL | DCMPG => {
                state.pop_n(2, position)?;
                state.push(Integer);
            }
            LADD | LSUB | LMUL | LDIV | LREM | LSHL | LSHR | LUSHR | LAND | LOR | LXOR => {
                state.pop_n(2, position)?;
                state.push(Long);
            }
            FADD | FSUB | FMUL | FDIV | FREM => {
                state.pop_n(2, position)?;
                state.push(Float);
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                state.pop_n(2, position)?;
                state.push(Double);
            }
            INEG | LNEG | FNEG | DNEG => {
                let value = state.pop(position)?;
                state.push(value);
            }
            L2I | F2I | D2I | I2B | I2C | I2S | ARRAYLENGTH => {
                state.pop(position)?;
                state.push(Integer);
            }
            I2L | F2L | D2L => {
                state.pop(position)?;
                state.push(Long);
            }
            I2F | L2F | D2F => {
                state.pop(position)?;
                state.push(Float);
            }
            I2D | L2D | F2D => {
                state.pop(position)?;
                state.push(Double);
            }
            IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | ATHROW | MONITORENTER
            | MONITOREXIT => {
                state.pop(position)?;
            }
            opcode => return Err(Error::InvalidOpcode { opcode, offset: position }),
        },

        Insn::Int { opcode, operand } => match *opcode {
            NEWARRAY => {
                state.pop(position)?;
                state.push(primitive_array(*operand));
            }
            _ => state.push(Integer),
        },

        Insn::Var { opcode, var, .. } => match *opcode {
            ILOAD => state.push(Integer),
            LLOAD => state.push(Long),
            FLOAD => state.push(Float),
            DLOAD => state.push(Double),
            ALOAD => state.push(state.load(*var)),
            ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                let value = state.pop(position)?;
                state.store(*var, value);
            }
            _ => (),
        },

        Insn::Iinc { var, .. } => state.store(*var, Integer),

        Insn::Type { opcode, class } => match *opcode {
            NEW => state.push(Uninitialized(position)),
            ANEWARRAY => {
                state.pop(position)?;
                state.push(Object(array_of(class)));
            }
            CHECKCAST => {
                state.pop(position)?;
                state.push(Object(class.clone()));
            }
            _ => {
                state.pop(position)?;
                state.push(Integer);
            }
        },

        Insn::Field {
            opcode, descriptor, ..
        } => {
            let value = value_of(&FieldType::parse(descriptor)?);
            match *opcode {
                GETSTATIC => state.push(value),
                PUTSTATIC => {
                    state.pop(position)?;
                }
                GETFIELD => {
                    state.pop(position)?;
                    state.push(value);
                }
                _ => state.pop_n(2, position)?,
            }
        }

        Insn::Method {
            opcode,
            name,
            descriptor,
            ..
        } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            state.pop_n(descriptor.parameters.len(), position)?;
            if *opcode != INVOKESTATIC {
                let receiver = state.pop(position)?;
                if name == "<init>" {
                    let initialized = match &receiver {
                        UninitializedThis => Some(owner.to_owned()),
                        Uninitialized(new_position) => match insns.get(*new_position) {
                            Some(Insn::Type { class, .. }) => Some(class.clone()),
                            _ => None,
                        },
                        _ => None,
                    };
                    if let Some(class) = initialized {
                        state.initialize(&receiver, Object(class));
                    }
                }
            }
            if let Some(return_type) = &descriptor.return_type {
                state.push(value_of(return_type));
            }
        }

        Insn::InvokeDynamic { descriptor, .. } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            state.pop_n(descriptor.parameters.len(), position)?;
            if let Some(return_type) = &descriptor.return_type {
                state.push(value_of(return_type));
            }
        }

        Insn::Jump { opcode, .. } => match *opcode {
            IF_ICMPEQ..=IF_ACMPNE => state.pop_n(2, position)?,
            GOTO | GOTO_W => (),

            // Return addresses have no verification type of their own
            JSR | JSR_W => state.push(Top),
            _ => {
                state.pop(position)?;
            }
        },

        Insn::Ldc { value, .. } => state.push(ldc_value(value)?),

        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
            state.pop(position)?;
        }

        Insn::MultiANewArray {
            descriptor,
            dimensions,
        } => {
            state.pop_n(*dimensions as usize, position)?;
            state.push(Object(descriptor.clone()));
        }
    }
    Ok(())
}

/// Frames at the start of blocks, found by propagating states to a fixed point
pub struct ComputedFrames {
    /// State on entry to each block, `None` for unreachable blocks
    pub entry_states: Vec<Option<State>>,
}

pub fn compute_frames(
    graph: &ControlFlowGraph<'_>,
    owner: &str,
    initial: State,
    hierarchy: &dyn TypeHierarchy,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ComputedFrames, Error> {
    let mut entry_states: Vec<Option<State>> = vec![None; graph.blocks.len()];
    let mut queued = vec![false; graph.blocks.len()];
    let mut worklist = VecDeque::new();

    if !graph.blocks.is_empty() {
        entry_states[0] = Some(initial);
        queued[0] = true;
        worklist.push_back(0);
    }

    while let Some(idx) = worklist.pop_front() {
        queued[idx] = false;
        let block = &graph.blocks[idx];
        let mut state = match &entry_states[idx] {
            Some(state) => state.clone(),
            None => continue,
        };

        let mut outgoing: Vec<(usize, State)> = vec![];
        for position in block.start..block.end {
            for edge in &block.handlers {
                outgoing.push((edge.handler, state.for_handler(edge.catch_type.as_deref())));
            }
            execute(&mut state, &graph.insns, position, owner)?;
        }

        let last = graph.insns[block.end - 1];
        for (successor_idx, successor) in block.successors.iter().enumerate() {
            let mut successor_state = state.clone();
            let is_jsr_fall_through = matches!(last, Insn::Jump { opcode: JSR | JSR_W, .. })
                && successor_idx + 1 == block.successors.len()
                && block.successors.len() > 1;
            if is_jsr_fall_through {
                successor_state.stack.pop();
            }
            outgoing.push((*successor, successor_state));
        }

        for (successor, incoming) in outgoing {
            let changed = match &mut entry_states[successor] {
                None => {
                    entry_states[successor] = Some(incoming);
                    true
                }
                Some(existing) => existing.merge_from(
                    &incoming,
                    graph.blocks[successor].start,
                    hierarchy,
                    diagnostics,
                )?,
            };
            if changed && !queued[successor] {
                queued[successor] = true;
                worklist.push_back(successor);
            }
        }
    }

    Ok(ComputedFrames { entry_states })
}

impl ComputedFrames {
    /// Frame on entry to a block, with uninitialized values pointing at the labels of their `new`
    pub fn frame(&self, graph: &ControlFlowGraph<'_>, block: usize) -> Option<Frame> {
        let state = self.entry_states.get(block)?.as_ref()?;
        Some(state.to_frame(|position| match graph.label_at(position) {
            Some(label) => VerificationType::Uninitialized(label),
            None => {
                log::warn!("`new` at instruction {} has no label", position);
                VerificationType::Top
            }
        }))
    }
}

/// Render a method entry state as a frame (it never has uninitialized values from `new`)
pub fn initial_frame(state: &State) -> Frame {
    state.to_frame(|_| VerificationType::Top)
}
