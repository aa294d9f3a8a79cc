use super::class_reader::{read_attributes, visited_attributes, Resolver};
use super::ReaderFlags;
use crate::class_file::{
    Attribute, AttributeLayout, AttributeLike, ByteReader, Constant, ConstantIndex, Deserialize, ExceptionHandler,
    LineNumber, LineNumberTable, LocalVariable, LocalVariableTable, RawVerificationType,
    StackMapFrame, StackMapTable,
};
use crate::code::opcodes::*;
use crate::code::{Encoding, FrameKind, FrameType, Insn, Label};
use crate::visitor::MethodVisitor;
use crate::Error;
use std::collections::{BTreeMap, BTreeSet};

/// Frame from the `StackMapTable`, at its absolute offset but not yet resolved
struct RawFrame {
    offset: usize,
    kind: FrameKind,
    locals: Vec<RawVerificationType>,
    stack: Vec<RawVerificationType>,
}

/// Decoder for the contents of a `Code` attribute
pub(super) struct CodeReader<'r, 'p, 'a> {
    resolver: &'r Resolver<'p>,
    max_stack: u16,
    max_locals: u16,
    code: ByteReader<'a>,
    exception_table: Vec<ExceptionHandler>,
    line_numbers: Vec<LineNumber>,
    local_variables: Vec<LocalVariable>,
    frames: Vec<RawFrame>,
    attributes: Vec<Attribute>,
}

impl<'r, 'p, 'a> CodeReader<'r, 'p, 'a> {
    pub fn new(
        resolver: &'r Resolver<'p>,
        mut info: ByteReader<'a>,
        flags: ReaderFlags,
    ) -> Result<CodeReader<'r, 'p, 'a>, Error> {
        let max_stack = info.read_u16()?;
        let max_locals = info.read_u16()?;
        let code_length = info.read_u32()? as usize;
        if code_length > u16::MAX as usize {
            return Err(Error::CodeTooLarge(code_length));
        }
        let code = info.split(code_length)?;
        let exception_table = Vec::<ExceptionHandler>::deserialize(&mut info)?;

        let skip_debug = flags.contains(ReaderFlags::SKIP_DEBUG);
        let skip_frames = flags.contains(ReaderFlags::SKIP_FRAMES);
        let mut dropped = vec![];
        if skip_debug {
            dropped.extend([
                LineNumberTable::NAME,
                LocalVariableTable::NAME,
                "LocalVariableTypeTable",
            ]);
        }
        if skip_frames {
            dropped.push(StackMapTable::NAME);
        }

        let mut line_numbers = vec![];
        let mut local_variables = vec![];
        let mut frames = vec![];
        let all_attributes = read_attributes(resolver.pool, &mut info)?;
        for attribute in &all_attributes {
            match attribute.name {
                name if name == LineNumberTable::NAME && !skip_debug => {
                    line_numbers.extend(LineNumberTable::parse(attribute.info)?.0);
                }
                name if name == LocalVariableTable::NAME && !skip_debug => {
                    local_variables.extend(LocalVariableTable::parse(attribute.info)?.0);
                }
                name if name == StackMapTable::NAME && !skip_frames => {
                    frames = absolute_frames(StackMapTable::parse(attribute.info)?.0);
                }
                _ => (),
            }
        }
        let attributes = visited_attributes(AttributeLayout::CODE, &all_attributes, &dropped);
        if !info.is_empty() {
            return Err(Error::MalformedAttribute {
                name: "Code",
                reason: format!("{} trailing bytes", info.remaining()),
            });
        }

        Ok(CodeReader {
            resolver,
            max_stack,
            max_locals,
            code,
            exception_table,
            line_numbers,
            local_variables,
            frames,
            attributes,
        })
    }

    /// Emit `visit_code` through `visit_maxs`
    pub fn accept(self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        let labels = self.collect_labels()?;
        let label = |offset: usize| -> Result<Label, Error> {
            labels.get(&offset).copied().ok_or_else(|| Error::MalformedAttribute {
                name: "Code",
                reason: format!("no instruction at offset {}", offset),
            })
        };

        let pool = self.resolver.pool;
        let mut frames: BTreeMap<usize, (FrameKind, Vec<FrameType>, Vec<FrameType>)> =
            BTreeMap::new();
        for frame in &self.frames {
            let resolve = |raw: &RawVerificationType| -> Result<FrameType, Error> {
                raw.try_map(
                    |class| pool.class_at(class.0 .0).map(str::to_owned),
                    |offset| label(*offset as usize),
                )
            };
            let locals = frame.locals.iter().map(resolve).collect::<Result<_, _>>()?;
            let stack = frame.stack.iter().map(resolve).collect::<Result<_, _>>()?;
            frames.insert(frame.offset, (frame.kind, locals, stack));
        }

        visitor.visit_code()?;

        let mut code = self.code;
        while !code.is_empty() {
            let offset = code.position();
            if let Some(placed) = labels.get(&offset) {
                visitor.visit_label(*placed)?;
            }
            if let Some((kind, locals, stack)) = frames.get(&offset) {
                visitor.visit_frame(*kind, locals, stack)?;
            }
            self.read_insn(&mut code, &label)?.accept(visitor)?;
        }
        if let Some(end) = labels.get(&code.position()) {
            visitor.visit_label(*end)?;
        }

        for handler in &self.exception_table {
            visitor.visit_try_catch_block(
                label(handler.start_pc as usize)?,
                label(handler.end_pc as usize)?,
                label(handler.handler_pc as usize)?,
                pool.optional_class_at(handler.catch_type)?,
            )?;
        }
        for local in &self.local_variables {
            let start = local.start_pc as usize;
            visitor.visit_local_variable(
                pool.utf8_at(local.name.0 .0)?,
                pool.utf8_at(local.descriptor.0 .0)?,
                label(start)?,
                label(start + local.length as usize)?,
                local.index,
            )?;
        }
        for line in &self.line_numbers {
            visitor.visit_line_number(line.line_number, label(line.start_pc as usize)?)?;
        }
        for attribute in &self.attributes {
            visitor.visit_attribute(attribute)?;
        }

        visitor.visit_maxs(self.max_stack, self.max_locals)
    }

    /// Find every offset something refers to, and number them in code order
    ///
    /// Each of those offsets must be the start of an instruction, or the end of the code.
    fn collect_labels(&self) -> Result<BTreeMap<usize, Label>, Error> {
        let mut offsets = BTreeSet::new();
        let instruction_starts = scan(self.code, &mut offsets)?;

        for handler in &self.exception_table {
            offsets.insert(handler.start_pc as usize);
            offsets.insert(handler.end_pc as usize);
            offsets.insert(handler.handler_pc as usize);
        }
        for local in &self.local_variables {
            offsets.insert(local.start_pc as usize);
            offsets.insert(local.start_pc as usize + local.length as usize);
        }
        for line in &self.line_numbers {
            offsets.insert(line.start_pc as usize);
        }
        for frame in &self.frames {
            offsets.insert(frame.offset);
            for verification_type in frame.locals.iter().chain(&frame.stack) {
                if let RawVerificationType::Uninitialized(new_offset) = verification_type {
                    offsets.insert(*new_offset as usize);
                }
            }
        }

        let code_length = self.code.remaining();
        let mut labels = BTreeMap::new();
        for (idx, offset) in offsets.into_iter().enumerate() {
            if offset != code_length && !instruction_starts.contains(&offset) {
                return Err(Error::MalformedAttribute {
                    name: "Code",
                    reason: format!("offset {} is not the start of an instruction", offset),
                });
            }
            labels.insert(offset, Label::from_raw(idx as u32));
        }
        Ok(labels)
    }

    fn read_insn(
        &self,
        code: &mut ByteReader<'a>,
        label: &dyn Fn(usize) -> Result<Label, Error>,
    ) -> Result<Insn, Error> {
        let pool = self.resolver.pool;
        let offset = code.position();
        let opcode = code.read_u8()?;
        let target = |delta: i64| label(jump_target(offset, delta)?);

        Ok(match opcode {
            NOP..=DCONST_1
            | IALOAD..=SALOAD
            | IASTORE..=LXOR
            | I2L..=DCMPG
            | IRETURN..=RETURN
            | ARRAYLENGTH
            | ATHROW
            | MONITORENTER
            | MONITOREXIT => Insn::Simple(opcode),

            BIPUSH => Insn::Int {
                opcode,
                operand: code.read_i8()? as i32,
            },
            SIPUSH => Insn::Int {
                opcode,
                operand: code.read_i16()? as i32,
            },
            NEWARRAY => Insn::Int {
                opcode,
                operand: code.read_u8()? as i32,
            },

            LDC => Insn::Ldc {
                value: self.resolver.loadable(ConstantIndex(code.read_u8()? as u16))?,
                encoding: Encoding::Compact,
            },
            LDC_W | LDC2_W => {
                let index = code.read_u16()?;
                Insn::Ldc {
                    value: self.resolver.loadable(ConstantIndex(index))?,
                    encoding: if opcode == LDC_W && index <= u8::MAX as u16 {
                        Encoding::Explicit
                    } else {
                        Encoding::Compact
                    },
                }
            }

            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                let var = code.read_u8()? as u16;
                Insn::Var {
                    opcode,
                    var,
                    encoding: if var <= 3 && opcode != RET {
                        Encoding::Explicit
                    } else {
                        Encoding::Compact
                    },
                }
            }
            ILOAD_0..=ALOAD_3 => Insn::Var {
                opcode: ILOAD + (opcode - ILOAD_0) / 4,
                var: ((opcode - ILOAD_0) % 4) as u16,
                encoding: Encoding::Compact,
            },
            ISTORE_0..=ASTORE_3 => Insn::Var {
                opcode: ISTORE + (opcode - ISTORE_0) / 4,
                var: ((opcode - ISTORE_0) % 4) as u16,
                encoding: Encoding::Compact,
            },

            IINC => Insn::Iinc {
                var: code.read_u8()? as u16,
                increment: code.read_i8()? as i16,
                encoding: Encoding::Compact,
            },

            IFEQ..=JSR | IFNULL | IFNONNULL => {
                let delta = code.read_i16()? as i64;
                Insn::Jump {
                    opcode,
                    target: target(delta)?,
                }
            }
            GOTO_W | JSR_W => {
                let delta = code.read_i32()? as i64;
                Insn::Jump {
                    opcode,
                    target: target(delta)?,
                }
            }

            TABLESWITCH | LOOKUPSWITCH => match read_switch(code, offset, opcode)? {
                Switch::Table {
                    default,
                    low,
                    high,
                    targets,
                } => Insn::TableSwitch {
                    low,
                    high,
                    default: label(default)?,
                    targets: targets
                        .into_iter()
                        .map(label)
                        .collect::<Result<_, _>>()?,
                },
                Switch::Lookup { default, pairs } => Insn::LookupSwitch {
                    default: label(default)?,
                    pairs: pairs
                        .into_iter()
                        .map(|(key, target)| Ok((key, label(target)?)))
                        .collect::<Result<_, Error>>()?,
                },
            },

            GETSTATIC..=PUTFIELD => {
                let (owner, name, descriptor) = pool.field_ref_at(code.read_u16()?)?;
                Insn::Field {
                    opcode,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                }
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let (owner, name, descriptor, is_interface) =
                    pool.method_ref_at(code.read_u16()?)?;
                if opcode == INVOKEINTERFACE {
                    code.skip(2)?;
                }
                Insn::Method {
                    opcode,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    is_interface,
                }
            }
            INVOKEDYNAMIC => {
                let index = ConstantIndex(code.read_u16()?);
                code.skip(2)?;
                match pool.get(index)? {
                    Constant::InvokeDynamic {
                        bootstrap_method,
                        name_and_type,
                    } => {
                        let (name, descriptor) = pool.name_and_type_at(name_and_type.0 .0)?;
                        let (bootstrap, arguments) = self.resolver.bootstrap(*bootstrap_method)?;
                        Insn::InvokeDynamic {
                            name: name.to_owned(),
                            descriptor: descriptor.to_owned(),
                            bootstrap,
                            arguments,
                        }
                    }
                    _ => {
                        return Err(Error::InvalidConstantIndex {
                            index,
                            expected: "InvokeDynamic",
                        })
                    }
                }
            }

            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                opcode,
                class: pool.class_at(code.read_u16()?)?.to_owned(),
            },
            MULTIANEWARRAY => Insn::MultiANewArray {
                descriptor: pool.class_at(code.read_u16()?)?.to_owned(),
                dimensions: code.read_u8()?,
            },

            WIDE => match code.read_u8()? {
                IINC => {
                    let var = code.read_u16()?;
                    let increment = code.read_i16()?;
                    let needs_wide = var > u8::MAX as u16 || i8::try_from(increment).is_err();
                    Insn::Iinc {
                        var,
                        increment,
                        encoding: if needs_wide {
                            Encoding::Compact
                        } else {
                            Encoding::Wide
                        },
                    }
                }
                wide_opcode @ (ILOAD..=ALOAD | ISTORE..=ASTORE | RET) => {
                    let var = code.read_u16()?;
                    Insn::Var {
                        opcode: wide_opcode,
                        var,
                        encoding: if var > u8::MAX as u16 {
                            Encoding::Compact
                        } else {
                            Encoding::Wide
                        },
                    }
                }
                other => {
                    return Err(Error::InvalidOpcode {
                        opcode: other,
                        offset: offset + 1,
                    })
                }
            },

            _ => return Err(Error::InvalidOpcode { opcode, offset }),
        })
    }
}

/// Turn frame offset deltas into absolute offsets
fn absolute_frames(frames: Vec<StackMapFrame>) -> Vec<RawFrame> {
    let mut previous: Option<usize> = None;
    let mut absolute = Vec::with_capacity(frames.len());
    for frame in frames {
        let delta = frame.offset_delta() as usize;
        let offset = match previous {
            None => delta,
            Some(previous) => previous + delta + 1,
        };
        previous = Some(offset);

        let (kind, locals, stack) = match frame {
            StackMapFrame::SameLocalsNoStack { .. } => (FrameKind::Same, vec![], vec![]),
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                (FrameKind::SameLocals1StackItem, vec![], vec![stack])
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                (FrameKind::Chop(chopped_k), vec![], vec![])
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => (FrameKind::Append, locals, vec![]),
            StackMapFrame::Full { locals, stack, .. } => (FrameKind::Full, locals, stack),
        };
        absolute.push(RawFrame {
            offset,
            kind,
            locals,
            stack,
        });
    }
    absolute
}

/// Absolute offset of a jump, relative to the instruction at `offset`
fn jump_target(offset: usize, delta: i64) -> Result<usize, Error> {
    let target = offset as i64 + delta;
    if target < 0 {
        return Err(Error::MalformedAttribute {
            name: "Code",
            reason: format!("jump at {} before the start of the code", offset),
        });
    }
    Ok(target as usize)
}

/// Switch operands, with targets as absolute offsets
enum Switch {
    Table {
        default: usize,
        low: i32,
        high: i32,
        targets: Vec<usize>,
    },
    Lookup {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
}

/// Read the operands of a switch, positioned just after its opcode
///
/// Operands are aligned to 4 bytes from the start of the code.
fn read_switch(code: &mut ByteReader<'_>, offset: usize, opcode: u8) -> Result<Switch, Error> {
    let padding = (4 - code.position() % 4) % 4;
    code.skip(padding)?;
    let default = jump_target(offset, code.read_i32()? as i64)?;

    if opcode == TABLESWITCH {
        let low = code.read_i32()?;
        let high = code.read_i32()?;
        if high < low {
            return Err(Error::MalformedAttribute {
                name: "Code",
                reason: format!("tableswitch at {} has high {} < low {}", offset, high, low),
            });
        }
        let count = (high as i64 - low as i64 + 1) as usize;
        check_remaining(code, count.saturating_mul(4))?;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(jump_target(offset, code.read_i32()? as i64)?);
        }
        Ok(Switch::Table {
            default,
            low,
            high,
            targets,
        })
    } else {
        let npairs = code.read_i32()?;
        if npairs < 0 {
            return Err(Error::MalformedAttribute {
                name: "Code",
                reason: format!("lookupswitch at {} has {} pairs", offset, npairs),
            });
        }
        let count = npairs as usize;
        check_remaining(code, count.saturating_mul(8))?;
        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            let key = code.read_i32()?;
            pairs.push((key, jump_target(offset, code.read_i32()? as i64)?));
        }
        Ok(Switch::Lookup { default, pairs })
    }
}

/// Fail before allocating room for a switch table larger than the code left
fn check_remaining(code: &ByteReader<'_>, needed: usize) -> Result<(), Error> {
    if needed > code.remaining() {
        return Err(Error::TruncatedInput {
            offset: code.absolute_position(),
            needed,
            remaining: code.remaining(),
        });
    }
    Ok(())
}

/// Walk the code once, collecting the offsets instructions start at and adding every jump and
/// switch target to `targets`
fn scan(mut code: ByteReader<'_>, targets: &mut BTreeSet<usize>) -> Result<BTreeSet<usize>, Error> {
    let mut starts = BTreeSet::new();
    while !code.is_empty() {
        let offset = code.position();
        starts.insert(offset);
        let opcode = code.read_u8()?;
        match opcode {
            IFEQ..=JSR | IFNULL | IFNONNULL => {
                let delta = code.read_i16()? as i64;
                targets.insert(jump_target(offset, delta)?);
            }
            GOTO_W | JSR_W => {
                let delta = code.read_i32()? as i64;
                targets.insert(jump_target(offset, delta)?);
            }
            TABLESWITCH | LOOKUPSWITCH => match read_switch(&mut code, offset, opcode)? {
                Switch::Table {
                    default, targets: switch_targets, ..
                } => {
                    targets.insert(default);
                    targets.extend(switch_targets);
                }
                Switch::Lookup { default, pairs } => {
                    targets.insert(default);
                    targets.extend(pairs.into_iter().map(|(_, target)| target));
                }
            },
            WIDE => {
                let wide_opcode = code.read_u8()?;
                code.skip(if wide_opcode == IINC { 4 } else { 2 })?;
            }
            _ => code.skip(operand_length(opcode).ok_or(Error::InvalidOpcode { opcode, offset })?)?,
        }
    }
    Ok(starts)
}

/// Length of the operands of instructions with a fixed layout
fn operand_length(opcode: u8) -> Option<usize> {
    Some(match opcode {
        BIPUSH | LDC | ILOAD..=ALOAD | ISTORE..=ASTORE | RET | NEWARRAY => 1,
        SIPUSH | LDC_W | LDC2_W | IINC | GETSTATIC..=INVOKESTATIC => 2,
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => 2,
        MULTIANEWARRAY => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 4,
        NOP..=DCONST_1
        | ILOAD_0..=SALOAD
        | ISTORE_0..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => 0,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starts_and_targets(code: &[u8]) -> (Vec<usize>, Vec<usize>) {
        let mut targets = BTreeSet::new();
        let starts = scan(ByteReader::new(code), &mut targets).unwrap();
        (starts.into_iter().collect(), targets.into_iter().collect())
    }

    #[test]
    fn scan_finds_backward_jumps() {
        // L0: iinc 0 -1; iload_0; ifne L0; return
        let code = [IINC, 0, 0xff, ILOAD_0, IFNE, 0xff, 0xfc, RETURN];
        let (starts, targets) = starts_and_targets(&code);
        assert_eq!(starts, vec![0, 3, 4, 7]);
        assert_eq!(targets, vec![0]);
    }

    #[test]
    fn scan_handles_switch_padding() {
        // iload_0; tableswitch (2 bytes padding) default +23, 0..=1 -> +23, +24; 2x return
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&24i32.to_be_bytes());
        code.push(RETURN);
        code.push(RETURN);
        let (starts, targets) = starts_and_targets(&code);
        assert_eq!(starts, vec![0, 1, 24, 25]);
        assert_eq!(targets, vec![24, 25]);
    }

    #[test]
    fn scan_rejects_unknown_opcodes() {
        let mut targets = BTreeSet::new();
        assert!(matches!(
            scan(ByteReader::new(&[NOP, 0xcb]), &mut targets),
            Err(Error::InvalidOpcode {
                opcode: 0xcb,
                offset: 1
            })
        ));
    }

    #[test]
    fn wide_forms_are_skipped() {
        let code = [WIDE, ILOAD, 1, 0, WIDE, IINC, 1, 0, 0, 5, RETURN];
        let (starts, _) = starts_and_targets(&code);
        assert_eq!(starts, vec![0, 4, 10]);
    }
}
