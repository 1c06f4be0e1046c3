//! Instructions, operations and dx.op intrinsics
//!
//! Instructions are stored flat per function. A block ends at its terminator
//! (`Br`, `Switch`, `Ret` or `Unreachable`) and the next block starts at the
//! following instruction.

use serde::{Deserialize, Serialize};

use super::types::Type;
use super::value::{Id, Operand};

/// Instruction opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    NoOp,
    Call,

    // ===== Terminators =====
    Ret,
    /// `[target]` or `[true_target, false_target, cond]`
    Br,
    /// `[value, default_target, (case_value, target)*]`
    Switch,
    Unreachable,

    // ===== SSA plumbing =====
    /// `[(value, block)*]`
    Phi,
    /// `[true_value, false_value, cond]`
    Select,
    ExtractVal,
    InsertValue,

    // ===== Memory =====
    Alloca,
    Load,
    LoadAtomic,
    Store,
    StoreAtomic,
    GetElementPtr,
    Fence,
    CompareExchange,
    AtomicExchange,
    AtomicAdd,
    AtomicSub,
    AtomicAnd,
    AtomicNand,
    AtomicOr,
    AtomicXor,
    AtomicMax,
    AtomicMin,
    AtomicUMax,
    AtomicUMin,
    AddrSpaceCast,

    // ===== Integer arithmetic =====
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    ShiftLeft,
    LogicalShiftRight,
    ArithShiftRight,

    // ===== Float arithmetic =====
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,

    // ===== Float comparison =====
    FOrdFalse,
    FOrdEqual,
    FOrdGreater,
    FOrdGreaterEqual,
    FOrdLess,
    FOrdLessEqual,
    FOrdNotEqual,
    FOrd,
    FUnord,
    FUnordEqual,
    FUnordGreater,
    FUnordGreaterEqual,
    FUnordLess,
    FUnordLessEqual,
    FUnordNotEqual,
    FOrdTrue,

    // ===== Integer comparison =====
    IEqual,
    INotEqual,
    UGreater,
    UGreaterEqual,
    ULess,
    ULessEqual,
    SGreater,
    SGreaterEqual,
    SLess,
    SLessEqual,

    // ===== Casts =====
    Trunc,
    ZExt,
    SExt,
    FToU,
    FToS,
    UToF,
    SToF,
    FPTrunc,
    FPExt,
    PtrToI,
    IToPtr,
    Bitcast,

    // ===== Vectors =====
    ExtractElement,
    InsertElement,
    ShuffleVector,
}

impl Operation {
    /// Ends a basic block
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Operation::Br | Operation::Switch | Operation::Ret | Operation::Unreachable
        )
    }

    pub fn is_atomic_rmw(self) -> bool {
        matches!(
            self,
            Operation::AtomicExchange
                | Operation::AtomicAdd
                | Operation::AtomicSub
                | Operation::AtomicAnd
                | Operation::AtomicNand
                | Operation::AtomicOr
                | Operation::AtomicXor
                | Operation::AtomicMax
                | Operation::AtomicMin
                | Operation::AtomicUMax
                | Operation::AtomicUMin
        )
    }
}

/// dx.op intrinsic
///
/// Operand layouts below exclude the opcode constant itself.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DxOp {
    // ===== Signature I/O =====
    /// `(input_id, row, col, vertex)`
    LoadInput,
    /// `(output_id, row, col, value)`
    StoreOutput,

    // ===== Unary float math =====
    FAbs,
    Saturate,
    IsNaN,
    IsInf,
    IsFinite,
    IsNormal,
    Cos,
    Sin,
    Tan,
    Acos,
    Asin,
    Atan,
    Hcos,
    Hsin,
    Htan,
    Exp,
    Frc,
    Log,
    Sqrt,
    Rsqrt,
    Round_ne,
    Round_ni,
    Round_pi,
    Round_z,

    // ===== Bit manipulation =====
    Bfrev,
    Countbits,
    FirstbitLo,
    FirstbitHi,
    FirstbitSHi,

    // ===== Binary / ternary math =====
    FMax,
    FMin,
    IMax,
    IMin,
    UMax,
    UMin,
    IMul,
    UMul,
    UDiv,
    UAddc,
    USubb,
    FMad,
    Fma,
    IMad,
    UMad,
    Msad,
    Ibfe,
    Ubfe,
    Bfi,
    Dot2,
    Dot3,
    Dot4,

    // ===== Resources =====
    /// `(class, range_id, index, non_uniform)`
    CreateHandle,
    /// `(class, range_lower_bound, space, index, non_uniform)`
    CreateHandleFromBinding,
    /// `(index, sampler_heap, non_uniform)`
    CreateHandleFromHeap,
    /// `(handle, props)`
    AnnotateHandle,
    CBufferLoad,
    /// `(handle, reg_index)`
    CBufferLoadLegacy,
    /// `(srv, sampler, c0, c1, c2, c3, o0, o1, o2, clamp)`
    Sample,
    SampleBias,
    SampleLevel,
    SampleGrad,
    SampleCmp,
    SampleCmpLevelZero,
    SampleCmpLevel,
    SampleCmpGrad,
    SampleCmpBias,
    /// `(handle, mip_or_sample, c0, c1, c2, o0, o1, o2)`
    TextureLoad,
    /// `(handle, c0, c1, c2, v0, v1, v2, v3, mask)`
    TextureStore,
    /// `(handle, index, offset)`
    BufferLoad,
    /// `(handle, index, offset, v0, v1, v2, v3, mask)`
    BufferStore,
    BufferUpdateCounter,
    CheckAccessFullyMapped,
    /// `(handle, mip)`
    GetDimensions,
    TextureGather,
    TextureGatherCmp,
    Texture2DMSGetSamplePosition,
    RenderTargetGetSamplePosition,
    RenderTargetGetSampleCount,
    /// `(handle, atomic_op, o0, o1, o2, value)`
    AtomicBinOp,
    /// `(handle, o0, o1, o2, compare, value)`
    AtomicCompareExchange,
    /// `(handle, index, offset, mask, alignment)`
    RawBufferLoad,
    /// `(handle, index, offset, v0, v1, v2, v3, mask, alignment)`
    RawBufferStore,

    // ===== Synchronisation / control =====
    /// `(barrier_mode)`
    Barrier,
    /// `(srv, sampler, c0, c1, c2, clamped)`
    CalculateLOD,
    /// `(cond)`
    Discard,
    DerivCoarseX,
    DerivCoarseY,
    DerivFineX,
    DerivFineY,
    EvalSnapped,
    EvalSampleIndex,
    EvalCentroid,
    SampleIndex,
    Coverage,
    InnerCoverage,

    // ===== Compute builtins =====
    ThreadId,
    GroupId,
    ThreadIdInGroup,
    FlattenedThreadIdInGroup,

    // ===== Geometry =====
    EmitStream,
    CutStream,
    EmitThenCutStream,
    GSInstanceID,

    // ===== Doubles / halves =====
    MakeDouble,
    SplitDouble,
    LegacyF32ToF16,
    LegacyF16ToF32,

    // ===== Wave / quad =====
    WaveIsFirstLane,
    WaveGetLaneIndex,
    WaveGetLaneCount,
    WaveAnyTrue,
    WaveAllTrue,
    WaveActiveAllEqual,
    WaveActiveBallot,
    WaveReadLaneAt,
    WaveReadLaneFirst,
    WaveActiveOp,
    WaveActiveBit,
    WavePrefixOp,
    QuadReadLaneAt,
    QuadOp,

    // ===== Misc =====
    PrimitiveID,
    ViewID,
    InstanceID,
    TraceRay,
}

impl DxOp {
    /// Result is flushed (and float32 inputs are read flushed)
    pub fn is_flushing(self) -> bool {
        matches!(
            self,
            DxOp::Sample
                | DxOp::SampleBias
                | DxOp::SampleLevel
                | DxOp::SampleGrad
                | DxOp::SampleCmp
                | DxOp::SampleCmpBias
                | DxOp::SampleCmpLevel
                | DxOp::SampleCmpGrad
                | DxOp::SampleCmpLevelZero
                | DxOp::TextureGather
                | DxOp::TextureGatherCmp
                | DxOp::CalculateLOD
                | DxOp::DerivCoarseX
                | DxOp::DerivCoarseY
                | DxOp::DerivFineX
                | DxOp::DerivFineY
                | DxOp::EvalSampleIndex
                | DxOp::FAbs
                | DxOp::Cos
                | DxOp::Sin
                | DxOp::Tan
                | DxOp::Acos
                | DxOp::Asin
                | DxOp::Atan
                | DxOp::Hcos
                | DxOp::Hsin
                | DxOp::Htan
                | DxOp::Exp
                | DxOp::Frc
                | DxOp::Log
                | DxOp::Sqrt
                | DxOp::Rsqrt
                | DxOp::Round_ne
                | DxOp::Round_ni
                | DxOp::Round_pi
                | DxOp::Round_z
                | DxOp::FMax
                | DxOp::FMin
                | DxOp::FMad
                | DxOp::Fma
                | DxOp::Dot2
                | DxOp::Dot3
                | DxOp::Dot4
        )
    }

    /// Transcendental ops evaluated by the host API
    pub fn is_math_intrinsic(self) -> bool {
        matches!(
            self,
            DxOp::Cos
                | DxOp::Sin
                | DxOp::Tan
                | DxOp::Acos
                | DxOp::Asin
                | DxOp::Atan
                | DxOp::Hcos
                | DxOp::Hsin
                | DxOp::Htan
                | DxOp::Exp
                | DxOp::Log
                | DxOp::Sqrt
                | DxOp::Rsqrt
        )
    }
}

/// Atomic operation selector for `DxOp::AtomicBinOp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicBinOpKind {
    Add = 0,
    And = 1,
    Or = 2,
    Xor = 3,
    IMin = 4,
    IMax = 5,
    UMin = 6,
    UMax = 7,
    Exchange = 8,
}

impl AtomicBinOpKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => AtomicBinOpKind::Add,
            1 => AtomicBinOpKind::And,
            2 => AtomicBinOpKind::Or,
            3 => AtomicBinOpKind::Xor,
            4 => AtomicBinOpKind::IMin,
            5 => AtomicBinOpKind::IMax,
            6 => AtomicBinOpKind::UMin,
            7 => AtomicBinOpKind::UMax,
            8 => AtomicBinOpKind::Exchange,
            _ => return None,
        })
    }
}

/// Barrier mode bits for `DxOp::Barrier`
pub mod barrier_mode {
    pub const SYNC_THREAD_GROUP: u32 = 1;
    pub const UAV_FENCE_GLOBAL: u32 = 2;
    pub const UAV_FENCE_THREAD_GROUP: u32 = 4;
    pub const TGSM_FENCE: u32 = 8;
}

/// Target of a `Call` instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    DxOp(DxOp),
    /// `llvm.dbg.*` declarations
    DebugIntrinsic,
    /// Other `llvm.*` intrinsics with no runtime effect
    LlvmIntrinsic(String),
    /// User function by index
    Function(usize),
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Operation,
    /// Result type, `Void` when there is none
    pub ty: Type,
    pub result: Option<Id>,
    /// Source-level name of the result, if known
    pub name: Option<String>,
    pub args: Vec<Operand>,
    pub callee: Option<Callee>,
}

impl Instruction {
    pub fn new(op: Operation, ty: Type, result: Option<Id>, args: Vec<Operand>) -> Self {
        Instruction { op, ty, result, name: None, args, callee: None }
    }

    pub fn dx_op(&self) -> Option<DxOp> {
        match (&self.op, &self.callee) {
            (Operation::Call, Some(Callee::DxOp(op))) => Some(*op),
            _ => None,
        }
    }

    /// Instructions that are stepped over without executing
    pub fn is_nop(&self) -> bool {
        match self.op {
            Operation::NoOp => true,
            Operation::Call => matches!(
                self.callee,
                Some(Callee::DebugIntrinsic) | Some(Callee::LlvmIntrinsic(_))
            ),
            _ => false,
        }
    }

    /// Whether the result of this instruction flushes float32 denormals
    pub fn is_flushing(&self) -> bool {
        match self.op {
            Operation::Call => self.dx_op().is_some_and(DxOp::is_flushing),
            Operation::FAdd
            | Operation::FSub
            | Operation::FMul
            | Operation::FDiv
            | Operation::FRem
            | Operation::FPTrunc
            | Operation::FPExt => true,
            _ => false,
        }
    }
}
