//! Physarum simulation on the GPU.
//!
//! Two trail images take turns holding the read and write roles. Each frame
//! runs the update pass (agents sense the read image and deposit into the
//! write image), swaps roles, runs the blur pass, and swaps again. The display
//! pass then samples whatever image ends up in the read role.
//!
//! - [`roles`]: the read/write role assignment
//! - [`rebind`]: per-pass descriptor sets rewritten from the current roles
//! - [`pass`]: compute pass recording and dispatch sizing
//! - [`display`]: presentation into a swapchain image
//! - [`sim`]: the resources and passes wired together

pub mod agents;
pub mod camera;
pub mod display;
pub mod params;
pub mod pass;
pub mod push;
pub mod rebind;
pub mod roles;
pub mod sequence;
pub mod sim;
pub mod trail;
pub mod viewport;

pub use agents::{spawn_agents, Agent, AgentBuffer};
pub use camera::{CameraParams, FlyCamera};
pub use display::{DisplayPass, PresentTarget};
pub use params::SimParams;
pub use pass::{dispatch_groups, DispatchDomain, PassRunner, WorkgroupSize};
pub use push::{BlurPushConstants, DisplayPushConstants, PushConstantBlock, UpdatePushConstants};
pub use rebind::{BindingSlot, BoundResources, DescriptorRebinder, PassDescriptor, SlotKind};
pub use roles::RoleBuffer;
pub use sequence::{PassKind, COMPUTE_SEQUENCE, SWAPS_PER_FRAME};
pub use sim::{FrameParams, SimDesc, SimPipeline, BLUR_WORKGROUP, UPDATE_WORKGROUP};
pub use viewport::fit_viewport;
