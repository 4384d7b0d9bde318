// render_loop.rs - body of the render thread

use crate::config::PlayerConfig;
use crate::context::{GpuBackend, GpuContext};
use crate::player::Shared;
use crate::renderer::FrameRenderer;
use crate::throttle::LogThrottle;
use log::{error, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub(crate) struct RenderLoop {
    ctx: GpuContext,
    renderer: FrameRenderer,
    shared: Arc<Shared>,
    frame_interval: Duration,
    prepare_log: LogThrottle,
    frame_log: LogThrottle,
    swap_log: LogThrottle,
}

impl RenderLoop {
    pub fn new(config: &PlayerConfig, backend: Box<dyn GpuBackend>, shared: Arc<Shared>) -> Self {
        let every = config.error_log_every;
        Self {
            ctx: GpuContext::new(backend, shared.window_slot()),
            renderer: FrameRenderer::new(config),
            shared,
            frame_interval: config.frame_interval(),
            prepare_log: LogThrottle::new(every),
            frame_log: LogThrottle::new(every),
            swap_log: LogThrottle::new(every),
        }
    }

    /// Loops until the player is destroyed, then releases every GPU object
    /// before returning.
    pub fn run(mut self) {
        info!("render thread started");
        while !self.shared.is_destroyed() {
            self.iterate();
            thread::sleep(self.frame_interval);
        }
        self.shutdown();
        info!("render thread finished");
    }

    fn iterate(&mut self) {
        if let Err(e) = self.ctx.prepare() {
            if self.prepare_log.tick() {
                error!("context prepare failed (attempt {}): {e}", self.prepare_log.count());
            }
            return;
        }
        self.prepare_log.reset();

        if let Err(e) = self.ctx.make_current(true) {
            if self.frame_log.tick() {
                error!("make current failed: {e}");
            }
            return;
        }

        if !self.renderer.is_initialized() {
            let id = self.renderer.init_resources(&mut self.ctx);
            self.shared.set_video_surface_id(id);
        }

        if self.shared.is_paused() {
            let commands = self.shared.take_commands();
            self.renderer.apply_commands(&mut self.ctx, &commands);
        } else {
            let input = self.shared.take_frame_input();
            self.renderer.apply_commands(&mut self.ctx, &input.commands);

            let connected = self.renderer.update_video(self.ctx.device());
            self.shared.set_video_connected(connected);

            if let Err(e) = self.renderer.on_draw_frame(self.ctx.device(), &input) {
                if self.frame_log.tick() {
                    error!("frame failed ({} times): {e}", self.frame_log.count());
                }
            }
            if let Err(e) = self.ctx.swap_buffers() {
                if self.swap_log.tick() {
                    warn!("swap failed ({} times): {e}", self.swap_log.count());
                }
            }
        }

        if let Err(e) = self.ctx.make_current(false) {
            warn!("unbind failed: {e}");
        }
        self.shared.frame_done();
    }

    fn shutdown(&mut self) {
        if self.renderer.is_initialized() && self.ctx.has_context() {
            match self.ctx.make_current(true) {
                Ok(()) => self.renderer.release(self.ctx.device()),
                Err(e) => warn!("cannot bind context for release: {e}"),
            }
        }
        self.ctx.terminate();
        self.shared.set_video_surface_id(0);
        self.shared.set_video_connected(false);
    }
}
