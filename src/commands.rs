// commands.rs - deferred render-thread work queued by the control side

use crate::panorama::ProjectionMode;
use std::collections::VecDeque;
use std::mem::discriminant;

/// Work that needs the GPU context and therefore runs on the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    /// Tear down the current mesh and build the one for this mode.
    SetProjectionMode(ProjectionMode),
    /// Drop the stereo program so the next stereo frame compiles it afresh.
    ResetStereoProgram,
    /// Re-query the window surface size.
    SurfaceChanged,
}

/// Ordered queue holding at most one command of each kind. Pushing a kind that
/// is already pending replaces it in place, so every kind behaves as a
/// single-slot mailbox and the newest request wins.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<FrameCommand>,
}

impl CommandQueue {
    pub fn push(&mut self, command: FrameCommand) {
        let kind = discriminant(&command);
        match self.pending.iter_mut().find(|c| discriminant(&**c) == kind) {
            Some(slot) => *slot = command,
            None => self.pending.push_back(command),
        }
    }

    pub fn drain(&mut self) -> Vec<FrameCommand> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
