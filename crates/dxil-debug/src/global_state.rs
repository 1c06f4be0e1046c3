//! Session-wide state shared by every lane
//!
//! Constant buffers, resource and sampler variables, global variables and the
//! global memory arena. Buffer and texture contents are fetched from the API
//! wrapper the first time any lane touches a binding and cached here.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DebugApiWrapper;
use crate::format::ViewFormat;
use crate::memory::MemoryTracking;
use crate::program::Id;
use crate::shader::{BindingSlot, ShaderBuiltin, ShaderVariable, VarType};

/// View description of a buffer or texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// First element of the view, in format-sized units
    pub first_element: u32,
    pub num_elements: u32,
    /// Raw (byte address) buffer
    pub is_byte_buffer: bool,
    /// Bound as a root descriptor, typically with a typeless format
    pub is_root_descriptor: bool,
    /// Stride lives in `format.stride`
    pub format: ViewFormat,
}

/// Snapshot of a read-only resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SrvData {
    pub info: ResourceInfo,
    pub data: Vec<u8>,
}

/// Snapshot of a read-write resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UavData {
    pub info: ResourceInfo,
    pub data: Vec<u8>,
    /// Texture layout, addressed by coordinates
    pub tex: bool,
    pub row_pitch: u32,
    pub depth_pitch: u32,
}

/// A bound constant buffer and its contents
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantBlock {
    pub var: ShaderVariable,
    pub data: Vec<u8>,
}

/// A global variable and the id it is addressed by
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub id: Id,
    pub var: ShaderVariable,
}

/// Resource data resolved for one access
///
/// `data` is empty when the binding is unbound or the fetch failed.
#[derive(Debug, Clone, Copy)]
pub struct ResourceView<'a> {
    pub info: ResourceInfo,
    pub data: &'a [u8],
    pub tex: bool,
    pub row_pitch: u32,
    pub depth_pitch: u32,
}

impl ResourceView<'_> {
    pub fn is_bound(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Session-wide state
#[derive(Debug, Default)]
pub struct GlobalState {
    /// Builtins shared by the whole workgroup
    pub builtins: FxHashMap<ShaderBuiltin, ShaderVariable>,
    pub constant_blocks: Vec<ConstantBlock>,
    pub read_only_resources: Vec<ShaderVariable>,
    pub read_write_resources: Vec<ShaderVariable>,
    pub samplers: Vec<ShaderVariable>,
    pub globals: Vec<GlobalVariable>,
    /// Backing memory of global variables, shared by every lane
    pub memory: RwLock<MemoryTracking>,
    srvs: RwLock<FxHashMap<BindingSlot, SrvData>>,
    uavs: RwLock<FxHashMap<BindingSlot, UavData>>,
}

fn binding_var(name: &str, ty: VarType, binding: BindingSlot) -> ShaderVariable {
    let mut var = ShaderVariable::new(name, ty, 1, 1);
    var.binding = Some(binding);
    var
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constant buffer with its contents
    pub fn add_constant_block(&mut self, name: &str, binding: BindingSlot, data: Vec<u8>) {
        self.constant_blocks.push(ConstantBlock {
            var: binding_var(name, VarType::ConstantBlock, binding),
            data,
        });
    }

    pub fn add_read_only_resource(&mut self, name: &str, binding: BindingSlot) {
        self.read_only_resources.push(binding_var(name, VarType::ReadOnlyResource, binding));
    }

    pub fn add_read_write_resource(&mut self, name: &str, binding: BindingSlot) {
        self.read_write_resources.push(binding_var(name, VarType::ReadWriteResource, binding));
    }

    pub fn add_sampler(&mut self, name: &str, binding: BindingSlot) {
        self.samplers.push(binding_var(name, VarType::Sampler, binding));
    }

    pub fn set_builtin(&mut self, builtin: ShaderBuiltin, value: ShaderVariable) {
        self.builtins.insert(builtin, value);
    }

    /// Prefill a read-only resource instead of fetching it lazily
    pub fn set_srv(&self, slot: BindingSlot, srv: SrvData) {
        self.srvs.write().insert(slot, srv);
    }

    /// Prefill a read-write resource instead of fetching it lazily
    pub fn set_uav(&self, slot: BindingSlot, uav: UavData) {
        self.uavs.write().insert(slot, uav);
    }

    pub fn constant_block(&self, binding: &BindingSlot) -> Option<&ConstantBlock> {
        self.constant_blocks.iter().find(|c| c.var.binding.as_ref() == Some(binding))
    }

    pub fn global(&self, id: Id) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.id == id)
    }

    /// Resource variable registered under `name`, of any class
    pub fn resource_variable(&self, name: &str) -> Option<&ShaderVariable> {
        self.read_only_resources
            .iter()
            .chain(&self.read_write_resources)
            .chain(&self.samplers)
            .chain(self.constant_blocks.iter().map(|c| &c.var))
            .find(|v| v.name == name)
    }

    fn ensure_srv(&self, slot: BindingSlot, api: &mut dyn DebugApiWrapper) {
        if self.srvs.read().contains_key(&slot) {
            return;
        }
        let fetched = api.fetch_srv(slot);
        debug!(?slot, bound = fetched.is_some(), "fetched read-only resource");
        self.srvs.write().entry(slot).or_insert_with(|| fetched.unwrap_or_default());
    }

    fn ensure_uav(&self, slot: BindingSlot, api: &mut dyn DebugApiWrapper) {
        if self.uavs.read().contains_key(&slot) {
            return;
        }
        let fetched = api.fetch_uav(slot);
        debug!(?slot, bound = fetched.is_some(), "fetched read-write resource");
        self.uavs.write().entry(slot).or_insert_with(|| fetched.unwrap_or_default());
    }

    /// Run `f` over the cached contents of a read-only resource
    pub fn with_srv<R>(
        &self,
        slot: BindingSlot,
        api: &mut dyn DebugApiWrapper,
        f: impl FnOnce(ResourceView<'_>) -> R,
    ) -> R {
        self.ensure_srv(slot, api);
        let srvs = self.srvs.read();
        let empty = SrvData::default();
        let srv = srvs.get(&slot).unwrap_or(&empty);
        f(ResourceView {
            info: srv.info,
            data: &srv.data,
            tex: false,
            row_pitch: 0,
            depth_pitch: 0,
        })
    }

    /// Run `f` over the cached contents of a read-write resource, mutably
    pub fn with_uav_mut<R>(
        &self,
        slot: BindingSlot,
        api: &mut dyn DebugApiWrapper,
        f: impl FnOnce(&mut UavData) -> R,
    ) -> R {
        self.ensure_uav(slot, api);
        let mut uavs = self.uavs.write();
        let uav = uavs.entry(slot).or_default();
        f(uav)
    }

    /// Number of cached resource snapshots, read-only then read-write
    pub fn cached_resource_counts(&self) -> (usize, usize) {
        (self.srvs.read().len(), self.uavs.read().len())
    }
}
