// library.rs - host-facing facade: one player plus its interactive strategy

use crate::config::PlayerConfig;
use crate::context::GpuBackend;
use crate::error::{PlayerError, Result};
use crate::head_tracker::{SensorKind, SensorSample};
use crate::motion::{AssumeSensors, InteractiveMode, InteractiveStrategy, SensorProbe};
use crate::player::Player;
use crate::registry;
use crate::remap::DisplayRotation;
use crate::render_state::VrConfig;
use log::{debug, info, warn};
use std::sync::Arc;

/// Command codes accepted by [`VrLibrary::run_cmd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCmd {
    Unknown = 0,
    Init = 1,
    Destroy = 2,
    Resume = 3,
    Pause = 4,
    SetVrModeEnabled = 5,
    SetIpd = 6,
    SetBarrelDistortionEnabled = 7,
    SetBarrelDistortionParams = 8,
}

impl PlayerCmd {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => PlayerCmd::Unknown,
            1 => PlayerCmd::Init,
            2 => PlayerCmd::Destroy,
            3 => PlayerCmd::Resume,
            4 => PlayerCmd::Pause,
            5 => PlayerCmd::SetVrModeEnabled,
            6 => PlayerCmd::SetIpd,
            7 => PlayerCmd::SetBarrelDistortionEnabled,
            8 => PlayerCmd::SetBarrelDistortionParams,
            _ => return None,
        })
    }
}

fn arg(cmd: PlayerCmd, args: &[f32], index: usize) -> Result<f32> {
    args.get(index).copied().ok_or_else(|| {
        PlayerError::InvalidArgument(format!("{cmd:?} needs {} argument(s)", index + 1))
    })
}

pub struct VrLibrary {
    player: Player,
    strategy: InteractiveStrategy,
}

impl VrLibrary {
    pub fn new(config: PlayerConfig, backend: impl GpuBackend, probe: Arc<dyn SensorProbe>) -> Self {
        let strategy = InteractiveStrategy::new(config.interactive_mode, probe);
        let player = Player::new(config, backend);
        strategy.set_directors(vec![player.sensor_sink()]);
        info!("library ready with {:?} strategy", strategy.mode());
        Self { player, strategy }
    }

    /// Config from the environment, sensors assumed present.
    pub fn from_env(backend: impl GpuBackend) -> Self {
        Self::new(PlayerConfig::from_env(), backend, Arc::new(AssumeSensors))
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn interactive_mode(&self) -> InteractiveMode {
        self.strategy.mode()
    }

    // Lifecycle

    pub fn init(&self) -> Result<()> {
        self.player.init()
    }

    pub fn destroy(&self) {
        self.strategy.turn_off_in_gl();
        self.player.destroy();
    }

    pub fn pause(&self) {
        self.player.pause();
    }

    pub fn resume(&self) {
        self.player.resume();
    }

    /// Binds the registered window `id`; an empty id detaches the current one.
    pub fn set_surface_id(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            self.player.set_surface(None);
            return Ok(());
        }
        let numeric: u64 = id.parse().map_err(|_| {
            warn!("malformed surface id {id:?}");
            PlayerError::InvalidArgument(format!("surface id {id:?}"))
        })?;
        let window = registry::lookup_window(numeric).ok_or_else(|| {
            warn!("surface {numeric} is not registered");
            PlayerError::SurfaceNotFound(numeric)
        })?;
        self.player.set_surface(Some(window));
        Ok(())
    }

    pub fn notify_surface_changed(&self) {
        self.player.notify_surface_changed();
    }

    pub fn update_mvp_matrix(&self, values: &[f32]) -> Result<()> {
        self.player.update_mvp_matrix(values)
    }

    pub fn update_touch_delta(&self, dx: f32, dy: f32) {
        self.player.update_touch_delta(dx, dy);
    }

    pub fn update_sensor_matrix(&self, values: &[f32]) -> Result<()> {
        self.player.update_sensor_matrix(values)
    }

    pub fn get_video_surface_id(&self) -> String {
        self.player.get_video_surface_id()
    }

    pub fn is_video_connected(&self) -> bool {
        self.player.is_video_connected()
    }

    // Render state

    pub fn set_clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.player.set_clear_color(r, g, b, a);
    }

    pub fn set_cull_face_enabled(&self, enabled: bool) {
        self.player.set_cull_face_enabled(enabled);
    }

    pub fn set_depth_test_enabled(&self, enabled: bool) {
        self.player.set_depth_test_enabled(enabled);
    }

    pub fn set_viewport(&self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        self.player.set_viewport(x, y, width, height)
    }

    pub fn set_scissor(&self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        self.player.set_scissor(x, y, width, height)
    }

    pub fn set_scissor_enabled(&self, enabled: bool) {
        self.player.set_scissor_enabled(enabled);
    }

    pub fn set_blend_enabled(&self, enabled: bool) {
        self.player.set_blend_enabled(enabled);
    }

    pub fn set_blend_func(&self, src: u32, dst: u32) -> Result<()> {
        self.player.set_blend_func(src, dst)
    }

    pub fn set_projection_mode(&self, code: i32) {
        self.player.set_projection_mode(code);
    }

    // VR

    pub fn set_vr_mode_enabled(&self, enabled: bool) {
        self.player.set_vr_mode_enabled(enabled);
    }

    pub fn is_vr_mode_enabled(&self) -> bool {
        self.player.is_vr_mode_enabled()
    }

    pub fn vr_config(&self) -> VrConfig {
        self.player.vr_config()
    }

    pub fn set_ipd(&self, ipd: f32) {
        self.player.set_ipd(ipd);
    }

    pub fn set_eye_offset(&self, offset: f32) {
        self.player.set_eye_offset(offset);
    }

    pub fn set_barrel_distortion_enabled(&self, enabled: bool) {
        self.player.set_barrel_distortion_enabled(enabled);
    }

    pub fn set_barrel_distortion_params(&self, k1: f32, k2: f32, scale: f32) {
        self.player.set_barrel_distortion_params(k1, k2, scale);
    }

    // Sensors

    pub fn update_gyro_data(&self, x: f32, y: f32, z: f32, w: f32) -> Result<()> {
        self.strategy.update_gyro_data(x, y, z, w)
    }

    pub fn get_sensor_matrix(&self) -> [f32; 16] {
        self.strategy.sensor_matrix().to_cols_array()
    }

    pub fn on_resume(&self) {
        self.strategy.on_resume();
    }

    pub fn on_pause(&self) {
        self.strategy.on_pause();
    }

    pub fn is_support(&self) -> bool {
        self.strategy.is_support()
    }

    pub fn turn_on_gyro(&self) {
        self.strategy.turn_on();
    }

    pub fn turn_off_gyro(&self) {
        self.strategy.turn_off();
    }

    pub fn turn_on_in_gl(&self) {
        self.strategy.turn_on_in_gl();
    }

    pub fn turn_off_in_gl(&self) {
        self.strategy.turn_off_in_gl();
    }

    /// Offers a drag to the strategy. A consumed drag rotates the touch view.
    pub fn handle_drag(&self, dx: f32, dy: f32) -> bool {
        let consumed = self.strategy.handle_drag(dx, dy);
        if consumed {
            self.player.update_touch_delta(dx, dy);
        }
        consumed
    }

    /// Raw sensor sample; `kind` uses platform codes (1 accelerometer, 4 gyroscope).
    pub fn on_sensor_event(
        &self,
        kind: i32,
        values: &[f32],
        timestamp_ns: i64,
        accuracy: i32,
    ) -> Result<()> {
        let kind = SensorKind::from_code(kind)
            .ok_or_else(|| PlayerError::InvalidArgument(format!("sensor kind {kind}")))?;
        let [x, y, z] = match values {
            [x, y, z, ..] => [*x, *y, *z],
            _ => {
                return Err(PlayerError::InvalidArgument(format!(
                    "sensor sample needs 3 values, got {}",
                    values.len()
                )))
            }
        };
        self.strategy.on_sensor_event(&SensorSample {
            kind,
            values: [x, y, z],
            timestamp_ns,
            accuracy,
        });
        Ok(())
    }

    pub fn set_display_rotation(&self, degrees: i32) -> Result<()> {
        let rotation = DisplayRotation::from_degrees(degrees)
            .ok_or_else(|| PlayerError::InvalidArgument(format!("display rotation {degrees}")))?;
        self.strategy.set_display_rotation(rotation);
        Ok(())
    }

    /// Integer command entry point; `args` carries the float parameters.
    pub fn run_cmd(&self, code: i32, args: &[f32]) -> Result<()> {
        let cmd = PlayerCmd::from_code(code)
            .ok_or_else(|| PlayerError::InvalidArgument(format!("command {code}")))?;
        debug!("run_cmd {cmd:?} {args:?}");
        match cmd {
            PlayerCmd::Unknown => warn!("UNKNOWN command ignored"),
            PlayerCmd::Init => self.init()?,
            PlayerCmd::Destroy => self.destroy(),
            PlayerCmd::Resume => self.resume(),
            PlayerCmd::Pause => self.pause(),
            PlayerCmd::SetVrModeEnabled => self.set_vr_mode_enabled(arg(cmd, args, 0)? != 0.0),
            PlayerCmd::SetIpd => self.set_ipd(arg(cmd, args, 0)?),
            PlayerCmd::SetBarrelDistortionEnabled => {
                self.set_barrel_distortion_enabled(arg(cmd, args, 0)? != 0.0)
            }
            PlayerCmd::SetBarrelDistortionParams => self.set_barrel_distortion_params(
                arg(cmd, args, 0)?,
                arg(cmd, args, 1)?,
                arg(cmd, args, 2)?,
            ),
        }
        Ok(())
    }
}

impl Drop for VrLibrary {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingBackend;
    use glam::Mat4;

    struct NoSensors;

    impl SensorProbe for NoSensors {
        fn has_gyroscope(&self) -> bool {
            false
        }

        fn has_accelerometer(&self) -> bool {
            false
        }
    }

    fn library(mode: InteractiveMode) -> VrLibrary {
        let (backend, _log) = RecordingBackend::new();
        let config = PlayerConfig { interactive_mode: mode, ..PlayerConfig::default() };
        VrLibrary::new(config, backend, Arc::new(AssumeSensors))
    }

    #[test]
    fn command_codes() {
        let lib = library(InteractiveMode::Touch);
        lib.run_cmd(5, &[1.0]).unwrap();
        assert!(lib.is_vr_mode_enabled());
        lib.run_cmd(6, &[0.07]).unwrap();
        lib.run_cmd(8, &[3.0, 5.0, 10.0]).unwrap();
        let vr = lib.vr_config();
        assert_eq!((vr.ipd, vr.k1, vr.k2, vr.scale), (0.07, 2.0, 1.0, 2.0));
        lib.run_cmd(7, &[0.0]).unwrap();
        assert!(!lib.vr_config().barrel_distortion);

        assert!(lib.run_cmd(0, &[]).is_ok());
        assert!(matches!(lib.run_cmd(42, &[]), Err(PlayerError::InvalidArgument(_))));
        assert!(matches!(lib.run_cmd(8, &[1.0]), Err(PlayerError::InvalidArgument(_))));
        lib.run_cmd(2, &[]).unwrap();
    }

    #[test]
    fn surface_id_parsing() {
        let lib = library(InteractiveMode::Touch);
        assert!(lib.set_surface_id("").is_ok());
        assert!(matches!(lib.set_surface_id("abc"), Err(PlayerError::InvalidArgument(_))));
        assert_eq!(lib.set_surface_id("987654321"), Err(PlayerError::SurfaceNotFound(987654321)));
    }

    #[test]
    fn drag_goes_to_touch_only() {
        let touch = library(InteractiveMode::Touch);
        assert!(touch.handle_drag(1.0, 2.0));
        let motion = library(InteractiveMode::Motion);
        assert!(!motion.handle_drag(1.0, 2.0));
    }

    #[test]
    fn motion_gyro_reaches_player_sensor_slot() {
        let lib = library(InteractiveMode::Motion);
        lib.update_gyro_data(0.0, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(lib.get_sensor_matrix(), Mat4::IDENTITY.to_cols_array());

        lib.turn_on_in_gl();
        let half = std::f32::consts::FRAC_1_SQRT_2;
        lib.update_gyro_data(0.0, half, 0.0, half).unwrap();
        let m = Mat4::from_cols_array(&lib.get_sensor_matrix());
        assert!(m.abs_diff_eq(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2), 1e-5));
        assert!(matches!(
            lib.update_gyro_data(0.0, 0.0, 0.0, 0.0),
            Err(PlayerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn sensor_events_are_validated() {
        let lib = library(InteractiveMode::Cardboard);
        lib.on_resume();
        lib.turn_on_in_gl();
        assert!(lib.on_sensor_event(4, &[0.0, 90.0, 0.0], 1_000_000, 3).is_ok());
        assert!(lib.on_sensor_event(7, &[0.0; 3], 0, 3).is_err());
        assert!(lib.on_sensor_event(4, &[0.0; 2], 0, 3).is_err());
        assert!(lib.set_display_rotation(90).is_ok());
        assert!(lib.set_display_rotation(45).is_err());
        assert_ne!(lib.get_sensor_matrix(), Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn support_probe_depends_on_strategy() {
        let (backend, _log) = RecordingBackend::new();
        let config = PlayerConfig { interactive_mode: InteractiveMode::Motion, ..PlayerConfig::default() };
        let lib = VrLibrary::new(config, backend, Arc::new(NoSensors));
        assert!(!lib.is_support());
        assert!(library(InteractiveMode::Touch).is_support());
    }
}
