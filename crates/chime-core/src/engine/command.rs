//! Lock-free command queue between the control and render contexts
//!
//! Structural changes - binding clips to samples and installing or removing
//! sample PCM - must not race the render loop, so they travel through a
//! lock-free SPSC queue and are applied by the render context at the start
//! of each callback, before any mixing. Scalar parameter changes bypass the
//! queue entirely (they go through `ClipAtomics`).
//!
//! The `rtrb` ringbuffer is wait-free on both ends and allocates only at
//! construction, which keeps the render side inside its budget.

use basedrop::Shared;

use super::sample::{SampleData, SampleRef};

/// Commands applied by the render context at callback boundaries
pub(crate) enum EngineCommand {
    /// Install decoded PCM into a sample slot
    ///
    /// The `Shared` keeps the buffer alive for the render context; when the
    /// slot is later cleared, dropping it only enqueues the buffer for
    /// background collection.
    InstallSample {
        slot: usize,
        generation: u32,
        data: Shared<SampleData>,
    },
    /// Clear a sample slot (the deferred half of destroy)
    RemoveSample { slot: usize },
    /// Bind a clip slot to a sample slot
    BindClip { slot: usize, sample: SampleRef },
    /// Detach a clip slot from its sample (the deferred half of reclaim)
    UnbindClip { slot: usize },
}

/// Capacity of the command queue
///
/// Every create/destroy/flush round trips at most a couple of commands per
/// slot, so 1024 gives ample headroom even for a full-pool reset burst.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel (producer/consumer pair)
///
/// The producer side belongs to the control context, the consumer side to
/// the render context.
pub(crate) fn command_channel() -> (
    rtrb::Producer<EngineCommand>,
    rtrb::Consumer<EngineCommand>,
) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
