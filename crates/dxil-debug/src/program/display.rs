//! Pretty-printing for the program model
//!
//! Display implementations used in diagnostics and trace output.

use std::fmt;

use super::function::Function;
use super::instr::{Callee, Instruction};
use super::types::{ScalarKind, Type};
use super::value::{Constant, Operand};

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Label => write!(f, "label"),
            Type::Scalar { kind: ScalarKind::Int, bits } => write!(f, "i{}", bits),
            Type::Scalar { kind: ScalarKind::Float, bits } => match bits {
                16 => write!(f, "half"),
                32 => write!(f, "float"),
                64 => write!(f, "double"),
                _ => write!(f, "f{}", bits),
            },
            Type::Vector { elem, count } => write!(f, "<{} x {}>", count, elem),
            Type::Array { elem, count } => write!(f, "[{} x {}]", count, elem),
            Type::Struct { name, .. } => write!(f, "%{}", name),
            Type::Pointer { pointee, .. } => write!(f, "{}*", pointee),
            Type::Handle => write!(f, "%dx.types.Handle"),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { bits: 1, value } => write!(f, "{}", *value != 0),
            Constant::Int { value, .. } => write!(f, "{}", value),
            Constant::Float { value, .. } => write!(f, "{:?}", value),
            Constant::Vector(elems) => {
                write!(f, "<")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ">")
            }
            Constant::Aggregate { members, .. } => {
                write!(f, "{{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, "}}")
            }
            Constant::Zero(_) => write!(f, "zeroinitializer"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Id(id) => write!(f, "{}", id),
            Operand::Const(c) => write!(f, "{}", c),
            Operand::Block(b) => write!(f, "label bb{}", b),
            Operand::Undef(_) => write!(f, "undef"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.result {
            write!(f, "{} = ", id)?;
        }
        match &self.callee {
            Some(Callee::DxOp(op)) => write!(f, "call {} @dx.op.{:?}(", self.ty, op)?,
            Some(Callee::DebugIntrinsic) => write!(f, "call void @llvm.dbg(")?,
            Some(Callee::LlvmIntrinsic(name)) => write!(f, "call {} @{}(", self.ty, name)?,
            Some(Callee::Function(idx)) => write!(f, "call {} @fn{}(", self.ty, idx)?,
            None => write!(f, "{:?} {} ", self.op, self.ty)?,
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        if self.callee.is_some() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "define @{} {{", self.name)?;
        let mut block = 0usize;
        let mut block_open = false;
        for inst in &self.instructions {
            if !block_open {
                writeln!(f, "bb{}:", block)?;
                if let Some(b) = self.blocks.get(block) {
                    if !b.preds.is_empty() {
                        write!(f, "    ; preds:")?;
                        for pred in &b.preds {
                            write!(f, " bb{}", pred)?;
                        }
                        writeln!(f)?;
                    }
                }
                block_open = true;
            }
            writeln!(f, "    {}", inst)?;
            if inst.op.is_terminator() {
                block += 1;
                block_open = false;
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::program::{DxOp, Operation, ProgramBuilder, ShaderStage};

    use super::*;

    #[test]
    fn test_function_display() {
        let mut pb = ProgramBuilder::new(ShaderStage::Compute);
        let mut fb = pb.function("main");
        let next = fb.create_block();
        let a = fb.binary(Operation::Add, Type::i32(), Constant::i32(1), Constant::i32(2));
        fb.dx_op(DxOp::FAbs, Type::f32(), vec![Constant::f32(-1.5).into()]);
        fb.br(next);
        fb.switch_to_block(next);
        fb.ret();
        fb.finish();
        let program = pb.build();

        let text = program.functions[0].to_string();
        assert!(text.starts_with("define @main {\nbb0:\n"));
        assert!(text.contains(&format!("{} = Add i32 1, 2", a)));
        assert!(text.contains("call float @dx.op.FAbs(-1.5)"));
        assert!(text.contains("bb1:\n    ; preds: bb0\n"));
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::vector(Type::f32(), 4).to_string(), "<4 x float>");
        assert_eq!(Type::pointer(Type::array(Type::i32(), 2)).to_string(), "[2 x i32]*");
    }
}
