//! 360° / VR panorama video player core.
//!
//! A [`VrLibrary`] owns one [`Player`] (render thread, GPU context, frame
//! composition) and one [`InteractiveStrategy`] (touch, fused rotation vector,
//! or raw-gyro head tracking) feeding it orientation.

pub mod commands;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod eye;
pub mod head_tracker;
pub mod integrator;
pub mod library;
pub mod mesh;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod motion;
pub mod panorama;
pub mod player;
pub mod registry;
pub mod remap;
pub mod render_state;
pub mod renderer;
pub mod throttle;
pub mod video;
pub mod wgpu_backend;
pub mod window;

mod render_loop;

pub use config::{ConfigError, PlayerConfig};
pub use context::{GpuBackend, GpuContext, GraphicsDriver};
pub use device::RenderDevice;
pub use error::{PlayerError, Result};
pub use head_tracker::{HeadTracker, SensorKind, SensorSample};
pub use library::{PlayerCmd, VrLibrary};
pub use motion::{
    AssumeSensors, CardboardStrategy, Director, InteractiveMode, InteractiveStrategy,
    MotionStrategy, SensorProbe,
};
pub use panorama::ProjectionMode;
pub use player::Player;
pub use remap::DisplayRotation;
pub use render_state::{RenderState, VrConfig};
pub use video::{VideoFrame, VideoProducer};
pub use wgpu_backend::WgpuBackend;
pub use window::{NativeWindow, WindowRef};
