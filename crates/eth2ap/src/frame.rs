//! Frame Buffers
//!
//! A [`FrameBuffer`] holds one link-layer frame. It is owned by exactly one
//! stage of the bridge at a time: the receiving driver allocates it, a
//! [`ReceiveSink`] takes it, and it then either moves into the relay queue
//! or is released on the spot.
//!
//! Releasing hands the backing storage back to whoever allocated it,
//! through the [`Release`] hook the buffer was created with. This happens
//! when the buffer is dropped, so every path through the bridge ends in
//! exactly one release. Transmitting never releases: transmit primitives
//! only ever see a borrowed `&[u8]`.
//!
//! The two interfaces may use different allocators. Each driver attaches
//! its own hook, which keeps the wired and wireless receive lifecycles
//! separate.
//!
//! [`ReceiveSink`]: crate::forward::ReceiveSink

use core::fmt;
use std::sync::Arc;

/// Returns frame storage to the allocator that produced it.
pub trait Release: Send + Sync {
    fn release(&self, data: Vec<u8>);
}

impl<F> Release for F
where
    F: Fn(Vec<u8>) + Send + Sync,
{
    fn release(&self, data: Vec<u8>) {
        (self)(data)
    }
}

/// One owned link-layer frame
///
/// Not `Clone`: a frame can only be moved from stage to stage, never
/// duplicated.
pub struct FrameBuffer {
    data: Vec<u8>,
    hook: Option<Arc<dyn Release>>,
}

impl FrameBuffer {
    /// Wrap a heap allocated frame with no release hook.
    ///
    /// The storage is simply freed when the frame is released.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, hook: None }
    }

    /// Wrap a frame whose storage must be returned through `hook`.
    pub fn with_release(data: Vec<u8>, hook: Arc<dyn Release>) -> Self {
        Self {
            data,
            hook: Some(hook),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Release the frame now.
    ///
    /// Equivalent to dropping it, but reads better at the end of a
    /// forwarding path.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook.release(core::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}
