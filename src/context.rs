// context.rs - graphics context and output surface lifecycle

use crate::device::RenderDevice;
use crate::error::{PlayerError, Result};
use crate::window::WindowRef;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Size of the off-screen surface that keeps the context usable without a window.
pub const OFFSCREEN_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Window,
    Offscreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceAttribute {
    Width,
    Height,
}

/// Display/context/surface primitives of a graphics API.
pub trait GraphicsDriver {
    fn create_context(&mut self) -> Result<()>;
    fn destroy_context(&mut self);
    fn terminate_display(&mut self);
    fn create_offscreen_surface(&mut self, width: u32, height: u32) -> Result<()>;
    fn destroy_offscreen_surface(&mut self);
    fn create_window_surface(&mut self, window: &WindowRef) -> Result<()>;
    fn destroy_window_surface(&mut self);
    /// Binds the context with `surface` as target, or unbinds it on `None`.
    fn make_current(&mut self, surface: Option<SurfaceKind>) -> Result<()>;
    fn swap_buffers(&mut self) -> Result<()>;
    fn query_surface(&self, surface: SurfaceKind, attribute: SurfaceAttribute) -> Option<i32>;
}

/// Everything the render thread needs from a graphics backend.
pub trait GpuBackend: GraphicsDriver + RenderDevice + Send + 'static {
    fn as_device(&mut self) -> &mut dyn RenderDevice;
}

impl<T: GraphicsDriver + RenderDevice + Send + 'static> GpuBackend for T {
    fn as_device(&mut self) -> &mut dyn RenderDevice {
        self
    }
}

/// Window the host wants rendered to. Written by the control thread, read by
/// [`GpuContext::prepare`].
#[derive(Debug, Default)]
pub struct WindowSlot(Mutex<Option<WindowRef>>);

impl WindowSlot {
    pub fn set(&self, window: Option<WindowRef>) {
        *self.0.lock() = window;
    }

    pub fn get(&self) -> Option<WindowRef> {
        self.0.lock().clone()
    }
}

pub struct GpuContext {
    backend: Box<dyn GpuBackend>,
    window_slot: Arc<WindowSlot>,
    context_valid: bool,
    offscreen_valid: bool,
    window_surface_valid: bool,
    window_used: Option<WindowRef>,
}

impl GpuContext {
    pub fn new(backend: Box<dyn GpuBackend>, window_slot: Arc<WindowSlot>) -> Self {
        Self {
            backend,
            window_slot,
            context_valid: false,
            offscreen_valid: false,
            window_surface_valid: false,
            window_used: None,
        }
    }

    /// Creates the context if needed and follows the window slot. The window
    /// surface is only rebuilt when the slot holds a different window.
    pub fn prepare(&mut self) -> Result<()> {
        self.init_context()?;
        self.init_window();
        Ok(())
    }

    fn init_context(&mut self) -> Result<()> {
        if self.context_valid {
            return Ok(());
        }
        self.backend
            .create_context()
            .map_err(|e| PlayerError::ContextInit(e.to_string()))?;
        if let Err(e) = self.backend.create_offscreen_surface(OFFSCREEN_SIZE, OFFSCREEN_SIZE) {
            self.backend.destroy_context();
            return Err(PlayerError::ContextInit(format!("offscreen surface: {e}")));
        }
        self.context_valid = true;
        self.offscreen_valid = true;
        info!("graphics context ready");
        Ok(())
    }

    fn init_window(&mut self) {
        let wanted = self.window_slot.get();
        if WindowRef::same(wanted.as_ref(), self.window_used.as_ref()) {
            return;
        }

        if self.window_surface_valid {
            self.backend.destroy_window_surface();
            self.window_surface_valid = false;
        }

        if let Some(window) = &wanted {
            match self.backend.create_window_surface(window) {
                Ok(()) => {
                    self.window_surface_valid = true;
                    info!("window surface bound to {window:?}");
                }
                // Remembered anyway so a broken window is not retried every frame.
                Err(e) => error!("window surface creation failed: {e}"),
            }
        } else {
            info!("window surface released");
        }
        self.window_used = wanted;
    }

    /// Binds to the window surface when there is one, else the off-screen one.
    pub fn make_current(&mut self, current: bool) -> Result<()> {
        if !self.context_valid {
            return Ok(());
        }
        if !current {
            return self.backend.make_current(None);
        }
        let target = if self.window_surface_valid {
            SurfaceKind::Window
        } else {
            SurfaceKind::Offscreen
        };
        self.backend.make_current(Some(target))
    }

    pub fn swap_buffers(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        self.backend.swap_buffers()
    }

    /// Window surface, then off-screen surface, context and display. Repeated
    /// calls do nothing.
    pub fn terminate(&mut self) {
        if self.window_surface_valid {
            self.backend.destroy_window_surface();
            self.window_surface_valid = false;
        }
        self.window_used = None;

        if self.context_valid {
            if let Err(e) = self.backend.make_current(None) {
                warn!("unbind before terminate failed: {e}");
            }
            if self.offscreen_valid {
                self.backend.destroy_offscreen_surface();
                self.offscreen_valid = false;
            }
            self.backend.destroy_context();
            self.backend.terminate_display();
            self.context_valid = false;
            info!("graphics context terminated");
        }
    }

    pub fn has_context(&self) -> bool {
        self.context_valid
    }

    /// Context and window surface both valid.
    pub fn is_valid(&self) -> bool {
        self.context_valid && self.window_surface_valid
    }

    /// Window surface attribute; `None` when there is no valid window surface.
    pub fn query_surface(&self, attribute: SurfaceAttribute) -> Option<i32> {
        if !self.is_valid() {
            return None;
        }
        self.backend.query_surface(SurfaceKind::Window, attribute)
    }

    /// Window surface size in pixels, if it can be queried.
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        let w = self.query_surface(SurfaceAttribute::Width)?;
        let h = self.query_surface(SurfaceAttribute::Height)?;
        (w > 0 && h > 0).then_some((w as u32, h as u32))
    }

    pub fn device(&mut self) -> &mut dyn RenderDevice {
        self.backend.as_device()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        self.terminate();
    }
}
