use super::{
    arrange_attributes, table_count, ClassWriter, CodeBuffer, JumpWidth, SymbolTable, WriterFlags,
};
use crate::access_flags::MethodAccessFlags;
use crate::analysis::Analyzer;
use crate::class_file::{
    Attribute, AttributeLayout, AttributeLike, ClassConstantIndex, ExceptionHandler, Exceptions,
    LineNumber, LineNumberTable, LocalVariable, LocalVariableTable, PoolEntry,
    RawVerificationType, Serialize, StackMapFrame, StackMapTable, Utf8ConstantIndex,
    VerificationType,
};
use crate::code::opcodes::*;
use crate::code::{
    Encoding, Frame, FrameKind, FrameType, Handle, Insn, Label, LabelGenerator, LdcValue,
};
use crate::descriptors::{MethodDescriptor, ParseDescriptor};
use crate::tree::{InsnNode, MethodNode};
use crate::visitor::MethodVisitor;
use crate::Error;
use std::collections::HashMap;

/// Frame type with the class interned but the `new` offset still a label
type PendingType = VerificationType<ClassConstantIndex, Label>;

/// Frame waiting for the end of the method, when every label has an offset
#[derive(Debug)]
struct PendingFrame {
    offset: usize,
    kind: FrameKind,
    locals: Vec<PendingType>,
    stack: Vec<PendingType>,
}

#[derive(Debug)]
struct PendingLocal {
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    start: Label,
    end: Label,
    index: u16,
}

#[derive(Debug)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

/// Contents of the `Code` attribute, as it gets encoded
#[derive(Debug, Default)]
struct Code {
    buffer: CodeBuffer,
    frames: Vec<PendingFrame>,
    exception_table: Vec<PendingHandler>,
    local_variables: Vec<PendingLocal>,
    line_numbers: Vec<(u16, Label)>,
    attributes: Vec<Attribute>,
    max_stack: u16,
    max_locals: u16,
}

/// Results of analyzing a recorded method, used while replaying it
#[derive(Debug)]
struct Computed {
    frames: HashMap<Label, Frame>,
    previous_frame: Frame,
    replaces_visited_frames: bool,
    max_stack: u16,
    max_locals: u16,
}

/// Method visitor which encodes the method into its class writer when it ends
///
/// Without any compute flags, instructions are encoded as they arrive. Otherwise the method is
/// first recorded into a [`MethodNode`], analyzed once it ends, then replayed into the encoder
/// along with the computed frames and maximums.
pub struct MethodWriter<'w> {
    class: &'w mut ClassWriter,
    flags: WriterFlags,
    access_flags: MethodAccessFlags,
    name: String,
    descriptor: String,
    exceptions: Vec<String>,
    attributes: Vec<Attribute>,
    code: Option<Code>,
    recorded: Option<MethodNode>,
    computed: Option<Computed>,

    /// Encoding requested for the next local variable or constant instruction
    encoding: Encoding,
}

impl<'w> MethodWriter<'w> {
    pub(super) fn new(
        class: &'w mut ClassWriter,
        flags: WriterFlags,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        exceptions: &[String],
    ) -> MethodWriter<'w> {
        let recorded = if flags.analyzes_code() {
            Some(MethodNode::new(
                access_flags,
                name,
                descriptor,
                exceptions.to_vec(),
            ))
        } else {
            None
        };
        MethodWriter {
            class,
            flags,
            access_flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            exceptions: exceptions.to_vec(),
            attributes: vec![],
            code: None,
            recorded,
            computed: None,
            encoding: Encoding::Compact,
        }
    }

    /// Code being encoded along with the symbols it refers to
    fn code(&mut self) -> Result<(&mut Code, &mut SymbolTable), Error> {
        match &mut self.code {
            Some(code) => Ok((code, &mut self.class.symbols)),
            None => Err(missing_code(&self.name, &self.descriptor)),
        }
    }

    /// Analyze the recorded method, then replay it into this writer
    fn replay(&mut self, mut method: MethodNode) -> Result<(), Error> {
        if method.has_code || !method.instructions.is_empty() {
            label_new_instructions(&mut method)?;

            let compute_frames = self.flags.contains(WriterFlags::COMPUTE_FRAMES)
                && self
                    .class
                    .version()
                    .map_or(true, |version| version.uses_stack_map_frames());
            let owner = self.class.class_name().unwrap_or_default().to_owned();
            let analysis = Analyzer::new(&owner, &method)
                .with_hierarchy(&*self.class.hierarchy)
                .analyze(compute_frames)?;
            self.class.diagnostics.extend(analysis.diagnostics);
            self.computed = Some(Computed {
                frames: analysis.frames.into_iter().collect(),
                previous_frame: analysis.initial_frame,
                replaces_visited_frames: self.flags.contains(WriterFlags::COMPUTE_FRAMES),
                max_stack: analysis.max_stack,
                max_locals: analysis.max_locals,
            });
        }
        method.accept(self)
    }

    /// Encode `method_info` into the class
    fn write_method(&mut self) -> Result<(), Error> {
        let symbols = &mut self.class.symbols;
        let name = symbols.pool.get_utf8(&self.name)?;
        let descriptor = symbols.pool.get_utf8(&self.descriptor)?;

        let code = match self.code.take() {
            Some(code) => Some(encode_code(code, symbols)?),
            None => None,
        };

        let mut generated = vec![];
        if let Some(code) = code {
            generated.push(("Code", code));
        }
        if !self.exceptions.is_empty() {
            let mut exceptions: Vec<u16> = vec![];
            for exception in &self.exceptions {
                exceptions.push(symbols.pool.get_class(exception)?.0 .0);
            }
            generated.push((Exceptions::NAME, Exceptions(exceptions).to_info()));
        }
        let attributes = arrange_attributes(
            AttributeLayout::METHOD,
            &mut symbols.pool,
            generated,
            &self.attributes,
        )?;

        let methods = &mut self.class.methods;
        methods.push(self.access_flags)?;
        methods.push(name)?;
        methods.push(descriptor)?;
        methods.push(table_count("method attributes", attributes.len())?)?;
        for (attribute_name, info) in attributes {
            methods.push(attribute_name)?;
            methods.begin_length();
            methods.extend_from_slice(&info);
            methods.end_length();
        }
        self.class.method_count += 1;
        log::trace!("wrote method {}{}", self.name, self.descriptor);
        Ok(())
    }
}

/// Make sure every `new` has a label right before it, so uninitialized types can point there
fn label_new_instructions(method: &mut MethodNode) -> Result<(), Error> {
    let news: Vec<_> = method
        .instructions
        .iter()
        .filter(|(_, node)| matches!(node, InsnNode::Insn(Insn::Type { opcode: NEW, .. })))
        .map(|(id, _)| id)
        .collect();
    for id in news {
        let mut has_label = false;
        let mut cursor = method.instructions.prev(id)?;
        while let Some(prev) = cursor {
            match method.instructions.get(prev)? {
                InsnNode::Label(_) => {
                    has_label = true;
                    break;
                }
                InsnNode::Frame(_) => cursor = method.instructions.prev(prev)?,
                InsnNode::Insn(_) => break,
            }
        }
        if !has_label {
            let label = method.fresh_label();
            method.instructions.insert_before(id, InsnNode::Label(label))?;
        }
    }
    Ok(())
}

fn missing_code(name: &str, descriptor: &str) -> Error {
    code_error(format!(
        "instruction in {}{} before `visit_code`",
        name, descriptor
    ))
}

fn code_error(reason: String) -> Error {
    Error::MalformedAttribute {
        name: "Code",
        reason,
    }
}

/// Short form of a load or store (eg. `iload_2`), if there is one
fn short_var_opcode(opcode: u8, var: u16, encoding: Encoding) -> Option<u8> {
    if var > 3 || encoding != Encoding::Compact {
        return None;
    }
    match opcode {
        ILOAD..=ALOAD => Some(ILOAD_0 + (opcode - ILOAD) * 4 + var as u8),
        ISTORE..=ASTORE => Some(ISTORE_0 + (opcode - ISTORE) * 4 + var as u8),
        _ => None,
    }
}

/// Serialize the `Code` attribute contents, now that all labels are placed
fn encode_code(mut code: Code, symbols: &mut SymbolTable) -> Result<Vec<u8>, Error> {
    let bytes = code.buffer.resolve()?.to_vec();
    let offset = |label: Label| -> Result<u16, Error> { Ok(code.buffer.offset_of(label)? as u16) };

    let mut exception_table = vec![];
    for handler in &code.exception_table {
        exception_table.push(ExceptionHandler {
            start_pc: offset(handler.start)?,
            end_pc: offset(handler.end)?,
            handler_pc: offset(handler.handler)?,
            catch_type: handler.catch_type,
        });
    }

    let mut generated = vec![];
    if !code.line_numbers.is_empty() {
        let mut table = vec![];
        for (line_number, start) in &code.line_numbers {
            table.push(LineNumber {
                start_pc: offset(*start)?,
                line_number: *line_number,
            });
        }
        generated.push((LineNumberTable::NAME, LineNumberTable(table).to_info()));
    }
    if !code.local_variables.is_empty() {
        let mut table = vec![];
        for local in &code.local_variables {
            let start_pc = offset(local.start)?;
            let end_pc = offset(local.end)?;
            let length = end_pc.checked_sub(start_pc).ok_or_else(|| {
                code_error(format!(
                    "local variable {} ends at {} before it starts at {}",
                    local.index, end_pc, start_pc
                ))
            })?;
            table.push(LocalVariable {
                start_pc,
                length,
                name: local.name,
                descriptor: local.descriptor,
                index: local.index,
            });
        }
        generated.push((LocalVariableTable::NAME, LocalVariableTable(table).to_info()));
    }
    if !code.frames.is_empty() {
        let table = stack_map_table(&code.frames, &code.buffer)?;
        generated.push((StackMapTable::NAME, table.to_info()));
    }
    let attributes = arrange_attributes(
        AttributeLayout::CODE,
        &mut symbols.pool,
        generated,
        &code.attributes,
    )?;

    let mut info: Vec<u8> = Vec::with_capacity(bytes.len() + 32);
    code.max_stack.serialize(&mut info)?;
    code.max_locals.serialize(&mut info)?;
    (bytes.len() as u32).serialize(&mut info)?;
    info.extend_from_slice(&bytes);
    exception_table.serialize(&mut info)?;
    table_count("code attributes", attributes.len())?.serialize(&mut info)?;
    for (name, data) in attributes {
        name.serialize(&mut info)?;
        (data.len() as u32).serialize(&mut info)?;
        info.extend_from_slice(&data);
    }
    Ok(info)
}

/// Turn frames at absolute offsets into the delta encoded table
fn stack_map_table(frames: &[PendingFrame], buffer: &CodeBuffer) -> Result<StackMapTable, Error> {
    let frame_error = |reason: String| Error::MalformedAttribute {
        name: StackMapTable::NAME,
        reason,
    };
    let raw = |typ: &PendingType| -> Result<RawVerificationType, Error> {
        typ.try_map::<_, _, Error>(
            |class| Ok(*class),
            |label| Ok(buffer.offset_of(*label)? as u16),
        )
    };
    let raw_all = |types: &[PendingType]| -> Result<Vec<RawVerificationType>, Error> {
        types.iter().map(raw).collect()
    };

    let mut table = vec![];
    let mut previous: Option<usize> = None;
    for frame in frames {
        let offset_delta = match previous {
            None => frame.offset,
            Some(previous) if frame.offset > previous => frame.offset - previous - 1,
            Some(_) => {
                return Err(frame_error(format!(
                    "two frames at offset {}",
                    frame.offset
                )))
            }
        };
        previous = Some(frame.offset);
        let offset_delta = offset_delta as u16;

        let counts = (frame.locals.len(), frame.stack.len());
        table.push(match (frame.kind, counts) {
            (FrameKind::Same, (0, 0)) => StackMapFrame::SameLocalsNoStack { offset_delta },
            (FrameKind::SameLocals1StackItem, (0, 1)) => StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack: raw(&frame.stack[0])?,
            },
            (FrameKind::Chop(chopped_k @ 1..=3), (0, 0)) => StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            },
            (FrameKind::Append, (1..=3, 0)) => StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals: raw_all(&frame.locals)?,
            },
            (FrameKind::Full, _) => StackMapFrame::Full {
                offset_delta,
                locals: raw_all(&frame.locals)?,
                stack: raw_all(&frame.stack)?,
            },
            (kind, (locals, stack)) => {
                return Err(frame_error(format!(
                    "{:?} frame at offset {} with {} locals and {} stack entries",
                    kind, frame.offset, locals, stack
                )))
            }
        });
    }
    Ok(StackMapTable(table))
}

impl<'w> MethodVisitor for MethodWriter<'w> {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_attribute(attribute);
        }
        match &mut self.code {
            Some(code) => code.attributes.push(attribute.clone()),
            None => self.attributes.push(attribute.clone()),
        }
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_code();
        }
        self.code = Some(Code::default());
        Ok(())
    }

    fn visit_frame(
        &mut self,
        kind: FrameKind,
        locals: &[FrameType],
        stack: &[FrameType],
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_frame(kind, locals, stack);
        }
        if matches!(&self.computed, Some(computed) if computed.replaces_visited_frames) {
            return Ok(());
        }
        let (code, symbols) = self.code()?;
        let mut intern = |types: &[FrameType]| -> Result<Vec<PendingType>, Error> {
            types
                .iter()
                .map(|typ| {
                    typ.try_map::<_, _, Error>(
                        |class| symbols.pool.get_class(class),
                        |label| Ok(*label),
                    )
                })
                .collect()
        };
        let frame = PendingFrame {
            offset: code.buffer.offset(),
            kind,
            locals: intern(locals)?,
            stack: intern(stack)?,
        };
        code.frames.push(frame);
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_insn(opcode);
        }
        let (code, _) = self.code()?;
        code.buffer.push(opcode)
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_int_insn(opcode, operand);
        }
        let (code, _) = self.code()?;
        let out_of_range =
            || code_error(format!("operand {} out of range for 0x{:02x}", operand, opcode));
        code.buffer.push(opcode)?;
        match opcode {
            BIPUSH => code
                .buffer
                .push(i8::try_from(operand).map_err(|_| out_of_range())?),
            SIPUSH => code
                .buffer
                .push(i16::try_from(operand).map_err(|_| out_of_range())?),
            NEWARRAY => code
                .buffer
                .push(u8::try_from(operand).map_err(|_| out_of_range())?),
            _ => Err(code_error(format!("0x{:02x} takes no int operand", opcode))),
        }
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_var_insn(opcode, var);
        }
        let encoding = std::mem::take(&mut self.encoding);
        let (code, _) = self.code()?;
        if let Some(short) = short_var_opcode(opcode, var, encoding) {
            code.buffer.push(short)
        } else if var <= u8::MAX as u16 && encoding != Encoding::Wide {
            code.buffer.push(opcode)?;
            code.buffer.push(var as u8)
        } else {
            code.buffer.push(WIDE)?;
            code.buffer.push(opcode)?;
            code.buffer.push(var)
        }
    }

    fn visit_insn_encoding(&mut self, encoding: Encoding) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_insn_encoding(encoding);
        }
        self.encoding = encoding;
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_type_insn(opcode, class);
        }
        let (code, symbols) = self.code()?;
        let class = symbols.pool.get_class(class)?;
        code.buffer.push(opcode)?;
        code.buffer.push(class)
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_field_insn(opcode, owner, name, descriptor);
        }
        let (code, symbols) = self.code()?;
        let field = symbols.pool.intern(&PoolEntry::FieldRef {
            owner,
            name,
            descriptor,
        })?;
        code.buffer.push(opcode)?;
        code.buffer.push(field)
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_method_insn(opcode, owner, name, descriptor, is_interface);
        }
        let (code, symbols) = self.code()?;
        let method = symbols.pool.intern(&PoolEntry::MethodRef {
            owner,
            name,
            descriptor,
            is_interface,
        })?;
        code.buffer.push(opcode)?;
        code.buffer.push(method)?;
        if opcode == INVOKEINTERFACE {
            let count = MethodDescriptor::parse(descriptor)?.parameter_length(true);
            code.buffer.push(count as u8)?;
            code.buffer.push(0u8)?;
        }
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[LdcValue],
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_invoke_dynamic_insn(name, descriptor, bootstrap, arguments);
        }
        let (code, symbols) = self.code()?;
        let call_site = symbols.invoke_dynamic(name, descriptor, bootstrap, arguments)?;
        code.buffer.push(INVOKEDYNAMIC)?;
        code.buffer.push(call_site)?;
        code.buffer.push(0u16)
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_jump_insn(opcode, target);
        }
        let (code, _) = self.code()?;
        let base = code.buffer.offset();
        code.buffer.push(opcode)?;
        let width = match opcode {
            GOTO_W | JSR_W => JumpWidth::Wide,
            _ => JumpWidth::Narrow,
        };
        code.buffer.push_jump_offset(base, target, width);
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_label(label);
        }
        let code = match &mut self.code {
            Some(code) => code,
            None => return Err(missing_code(&self.name, &self.descriptor)),
        };
        code.buffer.place_label(label)?;

        if let Some(computed) = &mut self.computed {
            if let Some(frame) = computed.frames.remove(&label) {
                let (kind, locals, stack) = frame.compress(&computed.previous_frame);
                computed.previous_frame = frame;
                let symbols = &mut self.class.symbols;
                let mut intern = |types: Vec<FrameType>| -> Result<Vec<PendingType>, Error> {
                    types
                        .iter()
                        .map(|typ| {
                            typ.try_map::<_, _, Error>(
                                |class| symbols.pool.get_class(class),
                                |label| Ok(*label),
                            )
                        })
                        .collect()
                };
                let frame = PendingFrame {
                    offset: code.buffer.offset(),
                    kind,
                    locals: intern(locals)?,
                    stack: intern(stack)?,
                };
                code.frames.push(frame);
            }
        }
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &LdcValue) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_ldc_insn(value);
        }
        let encoding = std::mem::take(&mut self.encoding);
        let (code, symbols) = self.code()?;
        let constant = symbols.loadable(value)?;
        if value.is_wide() {
            code.buffer.push(LDC2_W)?;
            code.buffer.push(constant)
        } else if constant.0 <= u8::MAX as u16 && encoding == Encoding::Compact {
            code.buffer.push(LDC)?;
            code.buffer.push(constant.0 as u8)
        } else {
            code.buffer.push(LDC_W)?;
            code.buffer.push(constant)
        }
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_iinc_insn(var, increment);
        }
        let encoding = std::mem::take(&mut self.encoding);
        let (code, _) = self.code()?;
        match (u8::try_from(var), i8::try_from(increment)) {
            (Ok(var), Ok(increment)) if encoding != Encoding::Wide => {
                code.buffer.push(IINC)?;
                code.buffer.push(var)?;
                code.buffer.push(increment)
            }
            _ => {
                code.buffer.push(WIDE)?;
                code.buffer.push(IINC)?;
                code.buffer.push(var)?;
                code.buffer.push(increment)
            }
        }
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_table_switch_insn(low, high, default, targets);
        }
        let (code, _) = self.code()?;
        if high < low || (high as i64 - low as i64 + 1) != targets.len() as i64 {
            return Err(code_error(format!(
                "tableswitch from {} to {} with {} targets",
                low,
                high,
                targets.len()
            )));
        }
        let base = code.buffer.offset();
        code.buffer.push(TABLESWITCH)?;
        code.buffer.pad_to_4();
        code.buffer.push_jump_offset(base, default, JumpWidth::Wide);
        code.buffer.push(low)?;
        code.buffer.push(high)?;
        for target in targets {
            code.buffer.push_jump_offset(base, *target, JumpWidth::Wide);
        }
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        pairs: &[(i32, Label)],
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_lookup_switch_insn(default, pairs);
        }
        let (code, _) = self.code()?;
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(code_error(format!(
                "lookupswitch has key {} twice",
                pair[0].0
            )));
        }

        let base = code.buffer.offset();
        code.buffer.push(LOOKUPSWITCH)?;
        code.buffer.pad_to_4();
        code.buffer.push_jump_offset(base, default, JumpWidth::Wide);
        code.buffer.push(sorted.len() as i32)?;
        for (key, target) in sorted {
            code.buffer.push(key)?;
            code.buffer.push_jump_offset(base, target, JumpWidth::Wide);
        }
        Ok(())
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_multi_anewarray_insn(descriptor, dimensions);
        }
        let (code, symbols) = self.code()?;
        let class = symbols.pool.get_class(descriptor)?;
        code.buffer.push(MULTIANEWARRAY)?;
        code.buffer.push(class)?;
        code.buffer.push(dimensions)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_try_catch_block(start, end, handler, catch_type);
        }
        let (code, symbols) = self.code()?;
        let catch_type = match catch_type {
            Some(class) => symbols.pool.get_class(class)?.0 .0,
            None => 0,
        };
        code.exception_table.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_local_variable(name, descriptor, start, end, index);
        }
        let (code, symbols) = self.code()?;
        let local = PendingLocal {
            name: symbols.pool.get_utf8(name)?,
            descriptor: symbols.pool.get_utf8(descriptor)?,
            start,
            end,
            index,
        };
        code.local_variables.push(local);
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_line_number(line, start);
        }
        let (code, _) = self.code()?;
        code.line_numbers.push((line, start));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        if let Some(method) = &mut self.recorded {
            return method.visit_maxs(max_stack, max_locals);
        }
        let (max_stack, max_locals) = match &self.computed {
            Some(computed) => (computed.max_stack, computed.max_locals),
            None => (max_stack, max_locals),
        };
        let (code, _) = self.code()?;
        code.max_stack = max_stack;
        code.max_locals = max_locals;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.class.check_not_finished()?;
        if let Some(method) = self.recorded.take() {
            return self.replay(method);
        }
        self.write_method()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::ClassAccessFlags;
    use crate::class_file::Version;
    use crate::visitor::ClassVisitor;

    fn class_writer(flags: WriterFlags) -> ClassWriter {
        let mut writer = ClassWriter::new(flags);
        writer
            .visit(
                Version::JAVA8,
                ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                "Sample",
                Some("java/lang/Object"),
                &[],
            )
            .unwrap();
        writer
    }

    /// Contents of the `Code` attribute of the only method of a class with no fields or interfaces
    fn code_bytes(writer: &ClassWriter, class: &[u8]) -> Vec<u8> {
        let mut pool = vec![];
        writer.symbols().pool.serialize(&mut pool).unwrap();
        let mut at = 8 + pool.len();
        at += 2 + 2 + 2 + 2; // access, this, super, interfaces count
        at += 2 + 2; // fields count, methods count
        at += 2 + 2 + 2 + 2; // access, name, descriptor, attributes count
        at += 2; // attribute name
        let length = u32::from_be_bytes([class[at], class[at + 1], class[at + 2], class[at + 3]]);
        class[at + 4..at + 4 + length as usize].to_vec()
    }

    #[test]
    fn canonical_encodings() {
        let mut writer = class_writer(WriterFlags::empty());
        {
            let mut method = writer
                .visit_method(MethodAccessFlags::STATIC, "m", "(I)V", &[])
                .unwrap()
                .unwrap();
            method.visit_code().unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_var_insn(ISTORE, 300).unwrap();
            method.visit_var_insn(ILOAD, 7).unwrap();
            method.visit_insn(POP).unwrap();
            method.visit_iinc_insn(0, 200).unwrap();
            method.visit_int_insn(BIPUSH, -2).unwrap();
            method.visit_insn(POP).unwrap();
            method.visit_insn(RETURN).unwrap();
            method.visit_maxs(1, 301).unwrap();
            method.visit_end().unwrap();
        }
        writer.visit_end().unwrap();
        let class = writer.finish().unwrap();
        let code = code_bytes(&writer, &class);

        assert_eq!(&code[0..4], &[0, 1, 1, 45]);
        let length = u32::from_be_bytes([code[4], code[5], code[6], code[7]]) as usize;
        assert_eq!(
            &code[8..8 + length],
            &[
                ILOAD_0,
                WIDE, ISTORE, 1, 44,
                ILOAD, 7,
                POP,
                WIDE, IINC, 0, 0, 0, 200,
                BIPUSH, 0xfe,
                POP,
                RETURN
            ]
        );
    }

    #[test]
    fn requested_encodings() {
        let mut writer = class_writer(WriterFlags::empty());
        {
            let mut method = writer
                .visit_method(MethodAccessFlags::STATIC, "m", "(I)V", &[])
                .unwrap()
                .unwrap();
            method.visit_code().unwrap();
            method.visit_insn_encoding(Encoding::Explicit).unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_insn_encoding(Encoding::Wide).unwrap();
            method.visit_var_insn(ISTORE, 0).unwrap();
            method.visit_insn_encoding(Encoding::Wide).unwrap();
            method.visit_iinc_insn(0, 1).unwrap();
            method.visit_insn_encoding(Encoding::Explicit).unwrap();
            method.visit_ldc_insn(&LdcValue::Integer(100_000)).unwrap();
            method.visit_insn(POP).unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_insn(POP).unwrap();
            method.visit_insn(RETURN).unwrap();
            method.visit_maxs(1, 1).unwrap();
            method.visit_end().unwrap();
        }
        writer.visit_end().unwrap();
        let class = writer.finish().unwrap();
        let code = code_bytes(&writer, &class);

        let length = u32::from_be_bytes([code[4], code[5], code[6], code[7]]) as usize;
        let body = &code[8..8 + length];
        assert_eq!(
            &body[..12],
            &[
                ILOAD, 0,
                WIDE, ISTORE, 0, 0,
                WIDE, IINC, 0, 0, 0, 1,
            ]
        );
        assert_eq!(body[12], LDC_W);
        assert_eq!(&body[15..], &[POP, ILOAD_0, POP, RETURN]);
    }

    #[test]
    fn bipush_operand_must_fit() {
        let mut writer = class_writer(WriterFlags::empty());
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "m", "()V", &[])
            .unwrap()
            .unwrap();
        method.visit_code().unwrap();
        assert!(matches!(
            method.visit_int_insn(BIPUSH, 128),
            Err(Error::MalformedAttribute { name: "Code", .. })
        ));
    }

    #[test]
    fn instructions_need_code() {
        let mut writer = class_writer(WriterFlags::empty());
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "m", "()V", &[])
            .unwrap()
            .unwrap();
        assert!(method.visit_insn(RETURN).is_err());
    }

    #[test]
    fn unplaced_label_fails_method() {
        let mut writer = class_writer(WriterFlags::empty());
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "m", "()V", &[])
            .unwrap()
            .unwrap();
        method.visit_code().unwrap();
        let nowhere = Label::from_raw(9);
        method.visit_jump_insn(GOTO, nowhere).unwrap();
        method.visit_maxs(0, 0).unwrap();
        assert!(matches!(
            method.visit_end(),
            Err(Error::UnresolvedLabel(label)) if label == nowhere
        ));
    }

    #[test]
    fn malformed_frame_kinds_are_rejected() {
        let frames = [PendingFrame {
            offset: 3,
            kind: FrameKind::Chop(4),
            locals: vec![],
            stack: vec![],
        }];
        assert!(matches!(
            stack_map_table(&frames, &CodeBuffer::new()),
            Err(Error::MalformedAttribute { name: "StackMapTable", .. })
        ));

        let frames = [
            PendingFrame {
                offset: 0,
                kind: FrameKind::Same,
                locals: vec![],
                stack: vec![],
            },
            PendingFrame {
                offset: 5,
                kind: FrameKind::SameLocals1StackItem,
                locals: vec![],
                stack: vec![VerificationType::Integer],
            },
        ];
        assert_eq!(
            stack_map_table(&frames, &CodeBuffer::new()).unwrap(),
            StackMapTable(vec![
                StackMapFrame::SameLocalsNoStack { offset_delta: 0 },
                StackMapFrame::SameLocalsOneStack {
                    offset_delta: 4,
                    stack: VerificationType::Integer
                },
            ])
        );
    }

    #[test]
    fn computes_maxs_and_frames() {
        let mut writer = class_writer(WriterFlags::COMPUTE_FRAMES);
        {
            let mut method = writer
                .visit_method(MethodAccessFlags::STATIC, "abs", "(I)I", &[])
                .unwrap()
                .unwrap();
            let positive = Label::from_raw(0);
            method.visit_code().unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_jump_insn(IFGE, positive).unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_insn(INEG).unwrap();
            method.visit_insn(IRETURN).unwrap();
            method.visit_label(positive).unwrap();
            method.visit_var_insn(ILOAD, 0).unwrap();
            method.visit_insn(IRETURN).unwrap();
            method.visit_maxs(0, 0).unwrap();
            method.visit_end().unwrap();
        }
        writer.visit_end().unwrap();
        let class = writer.finish().unwrap();
        let code = code_bytes(&writer, &class);

        // max_stack 1, max_locals 1
        assert_eq!(&code[0..4], &[0, 1, 0, 1]);
        assert_eq!(&code[4..8], &[0, 0, 0, 9]);
        assert_eq!(
            &code[8..17],
            &[ILOAD_0, IFGE, 0, 6, ILOAD_0, INEG, IRETURN, ILOAD_0, IRETURN]
        );
        // no exception table, one attribute which is a `StackMapTable` with one `same_frame`
        assert_eq!(&code[17..21], &[0, 0, 0, 1]);
        assert_eq!(&code[23..], &[0, 0, 0, 3, 0, 1, 7]);
    }
}
