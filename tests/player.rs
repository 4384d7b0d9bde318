// Drives the full player (render thread included) through the recording backend.

use std::thread;
use std::time::{Duration, Instant};
use vr360_player::mock::{GpuCall, GpuLog, MockControls, MockWindow, RecordingBackend};
use vr360_player::render_state::Rect;
use vr360_player::{registry, AssumeSensors, PlayerConfig, VrLibrary, WindowRef};

fn library() -> (VrLibrary, GpuLog, MockControls) {
    let (backend, log) = RecordingBackend::new();
    let controls = backend.controls();
    let config = PlayerConfig { frame_interval_ms: 1, ..PlayerConfig::default() };
    (VrLibrary::new(config, backend, std::sync::Arc::new(AssumeSensors)), log, controls)
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_frames(lib: &VrLibrary, n: u64) {
    let target = lib.player().frame_count() + n;
    wait_until("frames", || lib.player().frame_count() >= target);
}

/// Calls grouped per render-loop iteration, each starting at a bind.
fn frames(log: &GpuLog) -> Vec<Vec<GpuCall>> {
    let mut out: Vec<Vec<GpuCall>> = Vec::new();
    for call in log.calls() {
        if matches!(call, GpuCall::MakeCurrent(Some(_))) {
            out.push(Vec::new());
        }
        if let Some(frame) = out.last_mut() {
            frame.push(call);
        }
    }
    out
}

fn draw_viewports(frame: &[GpuCall]) -> Vec<Rect> {
    frame
        .iter()
        .filter_map(|c| match c {
            GpuCall::Draw(d) => d.viewport,
            _ => None,
        })
        .collect()
}

#[test]
fn destroy_before_init_is_a_noop() {
    let (lib, log, _) = library();
    lib.destroy();
    assert!(log.is_empty());
    assert!(!lib.player().is_destroyed());

    lib.init().unwrap();
    wait_frames(&lib, 1);
    lib.destroy();
    assert!(lib.player().is_destroyed());
}

#[test]
fn init_twice_starts_one_render_thread() {
    let (lib, log, _) = library();
    lib.init().unwrap();
    lib.init().unwrap();
    lib.run_cmd(1, &[]).unwrap();
    wait_frames(&lib, 5);
    assert_eq!(log.count(|c| *c == GpuCall::CreateContext), 1);
    lib.destroy();
}

#[test]
fn no_gpu_calls_after_destroy() {
    let (lib, log, _) = library();
    lib.init().unwrap();
    wait_frames(&lib, 3);
    lib.destroy();

    let calls = log.calls();
    assert_eq!(calls.last(), Some(&GpuCall::TerminateDisplay));
    assert!(calls.iter().any(|c| matches!(c, GpuCall::DeleteTexture(_))));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(log.len(), calls.len());

    // Terminal: a later init does nothing.
    lib.init().unwrap();
    thread::sleep(Duration::from_millis(10));
    assert_eq!(log.len(), calls.len());
    assert_eq!(lib.get_video_surface_id(), "");
}

#[test]
fn surface_id_binding_and_video_surface_id() {
    let (lib, log, _) = library();
    registry::register_window_with_id(123456, WindowRef::new(MockWindow::new(1280, 720)));

    lib.init().unwrap();
    lib.set_surface_id("123456").unwrap();
    wait_until("window surface", || {
        log.count(|c| *c == GpuCall::CreateWindowSurface(1280, 720)) == 1
    });
    wait_frames(&lib, 1);

    let id = lib.get_video_surface_id();
    assert!(!id.is_empty());
    assert!(id.parse::<u64>().is_ok());
    assert!(!lib.is_video_connected());

    lib.set_surface_id("").unwrap();
    wait_until("window release", || log.count(|c| *c == GpuCall::DestroyWindowSurface) == 1);
    lib.destroy();
    registry::unregister_window(123456);
}

#[test]
fn vr_frame_draws_two_eyes_across_the_width() {
    let (lib, log, _) = library();
    registry::register_window_with_id(223344, WindowRef::new(MockWindow::new(1001, 600)));
    lib.init().unwrap();
    lib.set_surface_id("223344").unwrap();
    lib.run_cmd(5, &[1.0]).unwrap();

    let right_eye = Rect::new(500, 0, 501, 600);
    wait_until("stereo frame", || {
        log.draws().iter().any(|d| d.viewport == Some(right_eye))
    });
    lib.destroy();

    let frame = frames(&log)
        .into_iter()
        .rev()
        .find(|f| draw_viewports(f).contains(&right_eye))
        .unwrap();
    let viewports = draw_viewports(&frame);
    assert_eq!(viewports, vec![Rect::new(0, 0, 500, 600), right_eye]);
    assert_eq!(viewports[0].width + viewports[1].width, 1001);
    assert!(frame.contains(&GpuCall::SwapBuffers));
    registry::unregister_window(223344);
}

#[test]
fn paused_player_skips_drawing() {
    let (lib, log, _) = library();
    lib.init().unwrap();
    wait_until("first draw", || !log.draws().is_empty());

    lib.pause();
    wait_frames(&lib, 2);
    log.clear();
    lib.set_projection_mode(214);
    wait_frames(&lib, 3);
    assert!(log.draws().is_empty());
    assert_eq!(log.count(|c| matches!(c, GpuCall::CreateMesh { indices: 36, .. })), 1);

    lib.resume();
    wait_until("draw after resume", || !log.draws().is_empty());
    lib.destroy();
}

#[test]
fn context_failure_is_retried() {
    let (lib, log, controls) = library();
    controls.fail_context(true);
    lib.init().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(lib.player().frame_count(), 0);
    assert!(log.is_empty());

    controls.fail_context(false);
    wait_frames(&lib, 1);
    assert_eq!(log.count(|c| *c == GpuCall::CreateContext), 1);
    lib.destroy();
}

#[test]
fn video_frames_reach_the_texture() {
    let (lib, log, _) = library();
    lib.init().unwrap();
    wait_until("video surface", || !lib.get_video_surface_id().is_empty());

    let producer = vr360_player::video::connect(&lib.get_video_surface_id()).unwrap();
    let frame = vr360_player::VideoFrame::rgba(4, 2, vec![128; 32]).unwrap();
    assert!(producer.submit(frame).unwrap());
    wait_until("upload", || {
        log.count(|c| matches!(c, GpuCall::UploadVideoFrame { width: 4, height: 2, .. })) == 1
    });
    lib.destroy();
}

#[test]
fn slow_video_source_stays_connected() {
    let (lib, _log, _) = library();
    lib.init().unwrap();
    wait_until("video surface", || !lib.get_video_surface_id().is_empty());

    let producer = vr360_player::video::connect(&lib.get_video_surface_id()).unwrap();
    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let feeder = {
        let stop = std::sync::Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Acquire) {
                let frame = vr360_player::VideoFrame::rgba(4, 2, vec![64; 32]).unwrap();
                producer.submit(frame).unwrap();
                thread::sleep(Duration::from_millis(66));
            }
        })
    };

    wait_until("connect", || lib.is_video_connected());
    let start = lib.player().frame_count();
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        assert!(lib.is_video_connected(), "status dropped between frames");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(lib.player().frame_count() > start + 10);

    stop.store(true, std::sync::atomic::Ordering::Release);
    feeder.join().unwrap();
    wait_frames(&lib, 5);
    assert!(!lib.is_video_connected());
    lib.destroy();
}
