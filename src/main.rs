// main.rs - desktop demo: one window, drag to look around, still images as video frames

use vr360_player::{registry, video, NativeWindow, VideoFrame, VrLibrary, WgpuBackend, WindowRef};

use image::io::Reader as ImageReader;
use image::GenericImageView;
use log::{error, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};

/// Degrees of view rotation per dragged pixel.
const DRAG_DEGREES_PER_PIXEL: f32 = 0.2;

const MODE_KEYS: [(VirtualKeyCode, i32); 6] = [
    (VirtualKeyCode::Key1, 201),
    (VirtualKeyCode::Key2, 202),
    (VirtualKeyCode::Key3, 203),
    (VirtualKeyCode::Key4, 204),
    (VirtualKeyCode::Key5, 205),
    (VirtualKeyCode::Key6, 214),
];

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("VR360 Player")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .expect("failed to create window"),
    );

    let window_id = registry::register_window(WindowRef::from_arc(
        window.clone() as Arc<dyn NativeWindow>
    ));

    let library = VrLibrary::from_env(WgpuBackend::new());
    library.init().expect("failed to start render thread");
    if let Err(e) = library.set_surface_id(&window_id.to_string()) {
        error!("binding window {window_id} failed: {e}");
    }
    library.on_resume();
    library.turn_on_in_gl();

    let mut mouse_pressed = false;
    let mut last_mouse_pos: Option<PhysicalPosition<f64>> = None;
    let mut is_fullscreen = false;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        let Event::WindowEvent { event, .. } = event else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                library.destroy();
                registry::unregister_window(window_id);
                *control_flow = ControlFlow::Exit;
            }

            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                library.notify_surface_changed();
            }

            WindowEvent::Focused(focused) => {
                if focused {
                    library.resume();
                    library.on_resume();
                } else {
                    library.on_pause();
                }
            }

            WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                match input.virtual_keycode {
                    Some(VirtualKeyCode::V) => {
                        library.set_vr_mode_enabled(!library.is_vr_mode_enabled());
                    }
                    Some(VirtualKeyCode::B) => {
                        let enabled = library.vr_config().barrel_distortion;
                        library.set_barrel_distortion_enabled(!enabled);
                    }
                    Some(VirtualKeyCode::O) => {
                        if let Some(path) = rfd::FileDialog::new()
                            .add_filter("Images", &["jpg", "jpeg", "png", "bmp"])
                            .pick_file()
                        {
                            start_load_image(path, library.get_video_surface_id());
                        }
                    }
                    Some(VirtualKeyCode::F11) => {
                        is_fullscreen = !is_fullscreen;
                        if is_fullscreen {
                            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                        } else {
                            window.set_fullscreen(None);
                        }
                    }
                    Some(key) => {
                        if let Some((_, code)) = MODE_KEYS.iter().find(|(k, _)| *k == key) {
                            library.set_projection_mode(*code);
                        }
                    }
                    None => {}
                }
            }

            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                mouse_pressed = state == ElementState::Pressed;
                if !mouse_pressed {
                    last_mouse_pos = None;
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if mouse_pressed {
                    if let Some(last_pos) = last_mouse_pos {
                        let dx = (position.x - last_pos.x) as f32 * DRAG_DEGREES_PER_PIXEL;
                        let dy = (position.y - last_pos.y) as f32 * DRAG_DEGREES_PER_PIXEL;
                        library.handle_drag(dx, dy);
                    }
                    last_mouse_pos = Some(position);
                }
            }

            WindowEvent::DroppedFile(path) => {
                start_load_image(path, library.get_video_surface_id());
            }

            _ => {}
        }
    });
}

/// Decodes an image off the UI thread and hands it to the video surface as a
/// single frame.
fn start_load_image(path: PathBuf, surface_id: String) {
    if surface_id.is_empty() {
        warn!("video surface not ready yet, try again");
        return;
    }
    thread::spawn(move || {
        info!("loading {}", path.display());

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                error!("cannot open {}: {e}", path.display());
                return;
            }
        };

        let img = match ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)
            .and_then(|mut r| {
                r.no_limits();
                r.decode()
            }) {
            Ok(img) => img,
            Err(e) => {
                error!("cannot decode {}: {e}", path.display());
                return;
            }
        };

        let (w, h) = img.dimensions();
        info!("image loaded {w}x{h}");
        let submitted = VideoFrame::rgba(w, h, img.to_rgba8().into_raw())
            .and_then(|frame| video::connect(&surface_id)?.submit(frame));
        match submitted {
            Ok(true) => {}
            Ok(false) => warn!("renderer busy, frame dropped"),
            Err(e) => error!("submitting frame failed: {e}"),
        }
    });
}
