//! Structural events
//!
//! Readers, writers, and trees all speak the same vocabulary: a [`ClassVisitor`] receives the
//! header of a class, then its members, then `visit_end`. Visiting a field or a method optionally
//! returns a nested visitor for the contents of that member, which must be driven to its own
//! `visit_end` before the next member is visited.
//!
//! Every event method has a default implementation which ignores the event, so consumers only
//! implement what they care about. Every event can fail, and the first error aborts whatever is
//! driving the visitor.
//!
//! ### Class event order
//!
//! `visit` comes first. Then `visit_source` and class-level `visit_attribute` in the order the
//! attributes are laid out, then fields and methods, and finally `visit_end`. The
//! `BootstrapMethods` attribute shows up as a regular attribute too: its entries are already
//! folded into `invokedynamic` and dynamic constant operands, so writers only use it to know where
//! to put the table they regenerate.
//!
//! ### Method event order
//!
//! Events for a method arrive in the following order:
//!
//!   1. method-level `visit_attribute` (unknown attributes of the method)
//!   2. `visit_code`, if the method has code
//!   3. instructions, with `visit_label` at each labelled position and `visit_frame` right after
//!      the label of the position the frame describes
//!   4. `visit_try_catch_block`, in exception table order
//!   5. `visit_local_variable`, in table order
//!   6. `visit_line_number`, in table order
//!   7. code-level `visit_attribute`
//!   8. `visit_maxs`
//!   9. `visit_end`
//!
//! ### Attribute placement
//!
//! Writers regenerate `ConstantValue` for fields, `Code` and `Exceptions` for methods, and the
//! `LineNumberTable`, `LocalVariableTable`, and `StackMapTable` of code from events. By default
//! those come before the copied attributes (`StackMapTable` after them). A visited attribute with
//! one of those names is a placeholder instead: the regenerated attribute goes where it was
//! visited, and its contents are ignored. Readers only send placeholders when the class file
//! doesn't follow the default layout. See [`AttributeLayout`](crate::class_file::AttributeLayout).

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::class_file::{Attribute, Version};
use crate::code::{Encoding, FrameKind, FrameType, Handle, Insn, Label, LdcValue};
use crate::Error;

pub trait ClassVisitor {
    fn visit(
        &mut self,
        _version: Version,
        _access_flags: ClassAccessFlags,
        _name: &str,
        _super_name: Option<&str>,
        _interfaces: &[String],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_source(&mut self, _source_file: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Visit a field, with its initial value if it has a `ConstantValue`
    fn visit_field(
        &mut self,
        _access_flags: FieldAccessFlags,
        _name: &str,
        _descriptor: &str,
        _value: Option<&LdcValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        Ok(None)
    }

    /// Visit a method, along with the checked exceptions it declares
    fn visit_method(
        &mut self,
        _access_flags: MethodAccessFlags,
        _name: &str,
        _descriptor: &str,
        _exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        Ok(None)
    }

    /// Class attribute which is not otherwise decoded
    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub trait FieldVisitor {
    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub trait MethodVisitor {
    /// Method or code attribute which is not otherwise decoded
    ///
    /// Attributes visited before `visit_code` belong to the method, the rest belong to the code.
    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_frame(
        &mut self,
        _kind: FrameKind,
        _locals: &[FrameType],
        _stack: &[FrameType],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_insn(&mut self, _opcode: u8) -> Result<(), Error> {
        Ok(())
    }

    fn visit_int_insn(&mut self, _opcode: u8, _operand: i32) -> Result<(), Error> {
        Ok(())
    }

    fn visit_var_insn(&mut self, _opcode: u8, _var: u16) -> Result<(), Error> {
        Ok(())
    }

    /// Encoding for the next `visit_var_insn`, `visit_iinc_insn`, or `visit_ldc_insn`
    ///
    /// Only sent for encodings other than [`Encoding::Compact`], which applies otherwise.
    fn visit_insn_encoding(&mut self, _encoding: Encoding) -> Result<(), Error> {
        Ok(())
    }

    fn visit_type_insn(&mut self, _opcode: u8, _class: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        _opcode: u8,
        _owner: &str,
        _name: &str,
        _descriptor: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        _opcode: u8,
        _owner: &str,
        _name: &str,
        _descriptor: &str,
        _is_interface: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        _name: &str,
        _descriptor: &str,
        _bootstrap: &Handle,
        _arguments: &[LdcValue],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_jump_insn(&mut self, _opcode: u8, _target: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Mark the position of the next instruction
    fn visit_label(&mut self, _label: Label) -> Result<(), Error> {
        Ok(())
    }

    fn visit_ldc_insn(&mut self, _value: &LdcValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_iinc_insn(&mut self, _var: u16, _increment: i16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        _low: i32,
        _high: i32,
        _default: Label,
        _targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        _default: Label,
        _pairs: &[(i32, Label)],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_multi_anewarray_insn(
        &mut self,
        _descriptor: &str,
        _dimensions: u8,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Exception handler covering `[start, end)`, catching `catch_type` (or everything if `None`)
    fn visit_try_catch_block(
        &mut self,
        _start: Label,
        _end: Label,
        _handler: Label,
        _catch_type: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Local variable in scope over `[start, end)`
    fn visit_local_variable(
        &mut self,
        _name: &str,
        _descriptor: &str,
        _start: Label,
        _end: Label,
        _index: u16,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_line_number(&mut self, _line: u16, _start: Label) -> Result<(), Error> {
        Ok(())
    }

    fn visit_maxs(&mut self, _max_stack: u16, _max_locals: u16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl<V: ClassVisitor + ?Sized> ClassVisitor for &mut V {
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        (**self).visit(version, access_flags, name, super_name, interfaces)
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        (**self).visit_source(source_file)
    }

    fn visit_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        value: Option<&LdcValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        (**self).visit_field(access_flags, name, descriptor, value)
    }

    fn visit_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        (**self).visit_method(access_flags, name, descriptor, exceptions)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        (**self).visit_attribute(attribute)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

impl<V: FieldVisitor + ?Sized> FieldVisitor for &mut V {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        (**self).visit_attribute(attribute)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

impl<V: MethodVisitor + ?Sized> MethodVisitor for &mut V {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        (**self).visit_attribute(attribute)
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        (**self).visit_code()
    }

    fn visit_frame(
        &mut self,
        kind: FrameKind,
        locals: &[FrameType],
        stack: &[FrameType],
    ) -> Result<(), Error> {
        (**self).visit_frame(kind, locals, stack)
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        (**self).visit_insn(opcode)
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        (**self).visit_int_insn(opcode, operand)
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        (**self).visit_var_insn(opcode, var)
    }

    fn visit_insn_encoding(&mut self, encoding: Encoding) -> Result<(), Error> {
        (**self).visit_insn_encoding(encoding)
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        (**self).visit_type_insn(opcode, class)
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        (**self).visit_field_insn(opcode, owner, name, descriptor)
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        (**self).visit_method_insn(opcode, owner, name, descriptor, is_interface)
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[LdcValue],
    ) -> Result<(), Error> {
        (**self).visit_invoke_dynamic_insn(name, descriptor, bootstrap, arguments)
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        (**self).visit_jump_insn(opcode, target)
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        (**self).visit_label(label)
    }

    fn visit_ldc_insn(&mut self, value: &LdcValue) -> Result<(), Error> {
        (**self).visit_ldc_insn(value)
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        (**self).visit_iinc_insn(var, increment)
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        (**self).visit_table_switch_insn(low, high, default, targets)
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        pairs: &[(i32, Label)],
    ) -> Result<(), Error> {
        (**self).visit_lookup_switch_insn(default, pairs)
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        (**self).visit_multi_anewarray_insn(descriptor, dimensions)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        (**self).visit_try_catch_block(start, end, handler, catch_type)
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        (**self).visit_local_variable(name, descriptor, start, end, index)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        (**self).visit_line_number(line, start)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        (**self).visit_maxs(max_stack, max_locals)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

impl Insn {
    /// Emit the event corresponding to this instruction, preceded by its encoding if that is not
    /// the compact one
    pub fn accept(&self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        match self.encoding() {
            Some(Encoding::Compact) | None => (),
            Some(encoding) => visitor.visit_insn_encoding(encoding)?,
        }
        match self {
            Insn::Simple(opcode) => visitor.visit_insn(*opcode),
            Insn::Int { opcode, operand } => visitor.visit_int_insn(*opcode, *operand),
            Insn::Var { opcode, var, .. } => visitor.visit_var_insn(*opcode, *var),
            Insn::Type { opcode, class } => visitor.visit_type_insn(*opcode, class),
            Insn::Field {
                opcode,
                owner,
                name,
                descriptor,
            } => visitor.visit_field_insn(*opcode, owner, name, descriptor),
            Insn::Method {
                opcode,
                owner,
                name,
                descriptor,
                is_interface,
            } => visitor.visit_method_insn(*opcode, owner, name, descriptor, *is_interface),
            Insn::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                arguments,
            } => visitor.visit_invoke_dynamic_insn(name, descriptor, bootstrap, arguments),
            Insn::Jump { opcode, target } => visitor.visit_jump_insn(*opcode, *target),
            Insn::Ldc { value, .. } => visitor.visit_ldc_insn(value),
            Insn::Iinc { var, increment, .. } => visitor.visit_iinc_insn(*var, *increment),
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => visitor.visit_table_switch_insn(*low, *high, *default, targets),
            Insn::LookupSwitch { default, pairs } => {
                visitor.visit_lookup_switch_insn(*default, pairs)
            }
            Insn::MultiANewArray {
                descriptor,
                dimensions,
            } => visitor.visit_multi_anewarray_insn(descriptor, *dimensions),
        }
    }
}
