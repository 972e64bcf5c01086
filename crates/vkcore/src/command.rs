//! Work pool and unit of work.
//!
//! A [`UnitOfWork`] is one primary command buffer and one fence, allocated
//! together and freed together, reused across many
//! record → finalize → submit → wait → reset cycles.
//!
//! ```text
//!            begin                end               submit + signaled
//!  Initial ────────▶ Recording ────────▶ Executable ──────────────────▶ Initial
//! ```

use ash::vk;
use std::rc::Rc;

use crate::context::LogicalDevice;
use crate::error::{Result, VkCoreError};

// Raw pool shared by a `WorkPool` and the units allocated from it. Destroyed
// with its last holder, so no unit ever outlives the pool its buffer came from.
struct SharedPool {
    device: Rc<LogicalDevice>,
    raw: vk::CommandPool,
}

impl Drop for SharedPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.raw);
        log::debug!("command pool {:?} destroyed", self.raw);
    }
}

/// Command pool bound to one queue family.
pub struct WorkPool {
    device: Rc<LogicalDevice>,
    pool: Option<Rc<SharedPool>>,
    queue_family_index: u32,
}

impl WorkPool {
    pub fn new(device: Rc<LogicalDevice>) -> Self {
        Self {
            device,
            pool: None,
            queue_family_index: 0,
        }
    }

    /// Create the pool. Buffers allocated from it can be reset individually.
    pub fn initialize(&mut self, queue_family_index: u32) -> Result<()> {
        if self.pool.is_some() {
            if self.queue_family_index == queue_family_index {
                return Ok(());
            }
            self.shutdown();
        }

        let raw = self
            .device
            .create_command_pool(queue_family_index, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .map_err(|result| VkCoreError::PoolCreationFailed { result })?;
        self.pool = Some(Rc::new(SharedPool {
            device: Rc::clone(&self.device),
            raw,
        }));
        self.queue_family_index = queue_family_index;
        log::debug!("command pool created for queue family {queue_family_index}");
        Ok(())
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool.as_ref().map_or(vk::CommandPool::null(), |pool| pool.raw)
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn device(&self) -> &Rc<LogicalDevice> {
        &self.device
    }

    /// Units still holding the current pool.
    pub fn outstanding_units(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| Rc::strong_count(pool) - 1)
    }

    /// Release the pool. It is destroyed once the last unit allocated from it
    /// is shut down.
    pub fn shutdown(&mut self) {
        let outstanding = self.outstanding_units();
        if self.pool.take().is_some() && outstanding > 0 {
            log::debug!("command pool kept alive by {outstanding} unit(s)");
        }
    }
}

impl std::fmt::Debug for WorkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkPool")
            .field("pool", &self.handle())
            .field("queue_family_index", &self.queue_family_index)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Initial,
    Recording,
    Executable,
}

/// Reusable recording buffer with its completion fence.
pub struct UnitOfWork {
    device: Rc<LogicalDevice>,
    pool: Option<Rc<SharedPool>>,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    state: UnitState,
    // A submission whose fence has not been observed signaled yet.
    in_flight: bool,
}

impl UnitOfWork {
    /// Unit bound to `pool` and `queue`. Nothing is allocated until
    /// [`UnitOfWork::initialize`].
    pub fn new(pool: &WorkPool, queue: vk::Queue) -> Self {
        Self {
            device: Rc::clone(pool.device()),
            pool: pool.pool.clone(),
            queue,
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
            state: UnitState::Initial,
            in_flight: false,
        }
    }

    pub fn initialize(&mut self) -> Result<()> {
        let Some(pool) = self.pool.as_ref().map(|pool| pool.raw) else {
            return Err(VkCoreError::NotInitialized { what: "work pool" });
        };
        if self.is_initialized() {
            return Ok(());
        }

        let command_buffer = self
            .device
            .allocate_command_buffer(pool)
            .map_err(|result| VkCoreError::AllocationFailed { result })?;

        let fence = match self.device.create_fence(false) {
            Ok(fence) => fence,
            Err(result) => {
                self.device.free_command_buffer(pool, command_buffer);
                return Err(VkCoreError::SignalCreationFailed { result });
            }
        };

        self.command_buffer = command_buffer;
        self.fence = fence;
        self.state = UnitState::Initial;
        self.in_flight = false;
        Ok(())
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    pub fn is_initialized(&self) -> bool {
        self.command_buffer != vk::CommandBuffer::null()
    }

    /// True after a timed-out wait, until the fence is seen signaled.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(VkCoreError::NotInitialized { what: "unit of work" })
        }
    }

    /// Start recording unless already recording.
    pub fn begin_if_not_in_recording(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        match self.state {
            UnitState::Recording => Ok(()),
            UnitState::Initial => {
                self.device
                    .begin_command_buffer(self.command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                    .map_err(|result| VkCoreError::BeginFailed { result })?;
                self.state = UnitState::Recording;
                log::trace!("unit {:?}: Initial -> Recording", self.command_buffer);
                Ok(())
            }
            state => Err(VkCoreError::InvalidStateForBegin { state }),
        }
    }

    pub fn end(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.state != UnitState::Recording {
            return Err(VkCoreError::InvalidStateForEnd { state: self.state });
        }
        self.device
            .end_command_buffer(self.command_buffer)
            .map_err(|result| VkCoreError::FinalizationFailed { result })?;
        self.state = UnitState::Executable;
        log::trace!("unit {:?}: Recording -> Executable", self.command_buffer);
        Ok(())
    }

    /// Submit the finalized buffer and wait up to `timeout_ms` for it.
    ///
    /// On success the buffer is reset and the unit is back in `Initial`.
    /// On [`VkCoreError::SubmissionTimeout`] the work is still in flight and
    /// the unit stays `Executable`; use [`UnitOfWork::wait_pending`].
    pub fn submit_and_reset(&mut self, timeout_ms: u32) -> Result<()> {
        self.ensure_initialized()?;
        if self.state != UnitState::Executable {
            return Err(VkCoreError::InvalidStateForSubmit { state: self.state });
        }
        if self.in_flight {
            return Err(VkCoreError::SubmissionPending);
        }

        self.device
            .reset_fence(self.fence)
            .map_err(|result| VkCoreError::SubmissionFailed {
                call: "vkResetFences",
                result,
            })?;
        self.device
            .queue_submit(self.queue, self.command_buffer, self.fence)
            .map_err(|result| VkCoreError::SubmissionFailed {
                call: "vkQueueSubmit",
                result,
            })?;
        self.in_flight = true;

        self.wait_pending(timeout_ms)
    }

    /// Wait again for an in-flight submission without resubmitting.
    ///
    /// Returns `Ok` immediately when nothing is in flight.
    pub fn wait_pending(&mut self, timeout_ms: u32) -> Result<()> {
        self.ensure_initialized()?;
        if !self.in_flight {
            return Ok(());
        }

        let timeout_ns = u64::from(timeout_ms) * 1_000_000;
        match self.device.wait_for_fence(self.fence, timeout_ns) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                log::debug!("unit {:?}: wait timed out after {timeout_ms} ms", self.command_buffer);
                return Err(VkCoreError::SubmissionTimeout { timeout_ms });
            }
            Err(result) => {
                return Err(VkCoreError::SubmissionFailed {
                    call: "vkWaitForFences",
                    result,
                })
            }
        }
        self.in_flight = false;

        self.device
            .reset_command_buffer(self.command_buffer)
            .map_err(|result| VkCoreError::SubmissionFailed {
                call: "vkResetCommandBuffer",
                result,
            })?;
        self.state = UnitState::Initial;
        log::trace!("unit {:?}: Executable -> Initial", self.command_buffer);
        Ok(())
    }

    /// Free the fence and buffer and release the pool. Safe to call
    /// repeatedly or before `initialize`.
    pub fn shutdown(&mut self) {
        if self.in_flight {
            log::warn!(
                "unit {:?} shut down with a submission in flight; waiting for device idle",
                self.command_buffer
            );
            if let Err(err) = self.device.wait_idle() {
                log::warn!("vkDeviceWaitIdle failed during shutdown: {err}");
            }
            self.in_flight = false;
        }

        if self.fence != vk::Fence::null() {
            self.device.destroy_fence(self.fence);
            self.fence = vk::Fence::null();
        }
        if let Some(pool) = self.pool.take() {
            if self.command_buffer != vk::CommandBuffer::null() {
                self.device.free_command_buffer(pool.raw, self.command_buffer);
            }
        }
        self.command_buffer = vk::CommandBuffer::null();
        self.state = UnitState::Initial;
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("command_buffer", &self.command_buffer)
            .field("fence", &self.fence)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.shutdown();
    }
}
