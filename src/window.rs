// window.rs - output window handles shared between host and render thread

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::fmt;
use std::sync::Arc;

/// A native window the render thread can build a surface for.
pub trait NativeWindow: Send + Sync + fmt::Debug {
    /// Current size in physical pixels.
    fn inner_size(&self) -> (u32, u32);
    fn window_handle(&self) -> RawWindowHandle;
    fn display_handle(&self) -> RawDisplayHandle;
}

impl NativeWindow for winit::window::Window {
    fn inner_size(&self) -> (u32, u32) {
        let size = winit::window::Window::inner_size(self);
        (size.width, size.height)
    }

    fn window_handle(&self) -> RawWindowHandle {
        self.raw_window_handle()
    }

    fn display_handle(&self) -> RawDisplayHandle {
        self.raw_display_handle()
    }
}

/// Shared window reference. Equality is identity of the underlying window.
#[derive(Clone)]
pub struct WindowRef(Arc<dyn NativeWindow>);

impl WindowRef {
    pub fn new<W: NativeWindow + 'static>(window: W) -> Self {
        Self(Arc::new(window))
    }

    pub fn from_arc(window: Arc<dyn NativeWindow>) -> Self {
        Self(window)
    }

    pub fn same(a: Option<&WindowRef>, b: Option<&WindowRef>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for WindowRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl Eq for WindowRef {}

impl std::ops::Deref for WindowRef {
    type Target = dyn NativeWindow;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowRef({:p})", Arc::as_ptr(&self.0))
    }
}

/// Raw handles captured from a window, for surface creation.
pub(crate) struct RawHandles {
    pub window: RawWindowHandle,
    pub display: RawDisplayHandle,
}

impl RawHandles {
    pub fn of(window: &dyn NativeWindow) -> Self {
        Self { window: window.window_handle(), display: window.display_handle() }
    }
}

unsafe impl HasRawWindowHandle for RawHandles {
    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window
    }
}

unsafe impl HasRawDisplayHandle for RawHandles {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWindow;

    #[test]
    fn identity_not_content() {
        let a = WindowRef::new(MockWindow::new(640, 480));
        let b = WindowRef::new(MockWindow::new(640, 480));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(WindowRef::same(None, None));
        assert!(!WindowRef::same(Some(&a), None));
        assert!(WindowRef::same(Some(&b), Some(&b.clone())));
    }
}
