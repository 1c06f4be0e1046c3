//! Functions, blocks and the program container

use serde::{Deserialize, Serialize};

use super::instr::Instruction;
use super::types::Type;
use super::value::{Constant, Id};
use crate::shader::{ComponentType, ResourceClass, ResourceKind, SamplerMode, VarType};

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

/// A basic block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Predecessor block indices
    pub preds: Vec<u32>,
}

/// A function with a flat instruction list split into blocks by terminators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<Block>,
    pub instructions: Vec<Instruction>,
    /// Declared only, no body
    pub external: bool,
}

impl Function {
    /// CFG edges as `(from, to)` pairs, built from predecessor lists
    pub fn block_links(&self) -> Vec<(u32, u32)> {
        let mut links = Vec::new();
        for (to, block) in self.blocks.iter().enumerate() {
            for &from in &block.preds {
                links.push((from, to as u32));
            }
        }
        links
    }
}

/// A module-scope variable, addressed through a pointer-typed id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub id: Id,
    pub name: String,
    /// Pointer type of the global
    pub ty: Type,
    pub initializer: Option<Constant>,
}

/// A declared resource range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    pub class: ResourceClass,
    /// Index within its class, referenced by `CreateHandle`
    pub range_id: u32,
    pub register_base: u32,
    /// `u32::MAX` for unbounded ranges
    pub register_count: u32,
    pub space: u32,
    pub kind: ResourceKind,
    pub component_type: ComponentType,
    pub sample_count: u32,
    pub sampler_mode: SamplerMode,
    /// Element stride for structured buffers
    pub struct_stride: u32,
}

impl ResourceDecl {
    pub fn contains_register(&self, register: u32) -> bool {
        register >= self.register_base
            && (self.register_count == u32::MAX
                || register - self.register_base < self.register_count)
    }
}

/// Entry point signature element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureElement {
    pub name: String,
    pub var_type: VarType,
    pub rows: u8,
    pub columns: u8,
}

/// A parsed shader program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub stage: ShaderStage,
    pub functions: Vec<Function>,
    pub entry_point: usize,
    pub globals: Vec<GlobalVariable>,
    pub resources: Vec<ResourceDecl>,
    pub inputs: Vec<SignatureElement>,
    pub outputs: Vec<SignatureElement>,
    /// One past the largest id used anywhere in the program
    pub id_count: u32,
}

impl Program {
    pub fn entry_function(&self) -> Option<&Function> {
        self.functions.get(self.entry_point)
    }

    pub fn resource(&self, class: ResourceClass, range_id: u32) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.class == class && r.range_id == range_id)
    }

    pub fn resource_by_binding(
        &self,
        class: ResourceClass,
        register: u32,
        space: u32,
    ) -> Option<&ResourceDecl> {
        self.resources
            .iter()
            .find(|r| r.class == class && r.space == space && r.contains_register(register))
    }

    pub fn global(&self, id: Id) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.id == id)
    }
}
