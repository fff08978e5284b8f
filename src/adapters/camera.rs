//! Camera adapter: esp32-camera frame buffers and sensor control.
//!
//! Two halves with separate owners:
//!
//! | Type            | Implements        | Owner          |
//! |-----------------|-------------------|----------------|
//! | `CameraAdapter` | CameraPort        | stream worker  |
//! | `CameraControl` | CameraControlPort | request loop   |
//!
//! Both talk to the driver singleton brought up by [`init_camera`].  The
//! driver serialises `esp_camera_fb_get` against sensor register writes
//! internally.
//!
//! On non-espidf targets a synthetic JPEG generator stands in for the
//! sensor.

use log::info;

use crate::app::ports::{CameraControlPort, CameraPort, FrameData, PixelFormat};
use crate::config::CameraParams;
use crate::drivers::hw_init::HwInitError;
use crate::error::ActuatorError;

#[cfg(target_os = "espidf")]
use crate::config::FrameSize;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::camera;

#[cfg(target_os = "espidf")]
use crate::pins;

/// Frame buffers in PSRAM; two lets capture overlap transmission.
pub const FRAME_BUFFER_COUNT: usize = 2;

// ───────────────────────────────────────────────────────────────
// Driver bring-up
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn framesize(fs: FrameSize) -> camera::framesize_t {
    match fs {
        FrameSize::Qvga => camera::framesize_t_FRAMESIZE_QVGA,
        FrameSize::Cif => camera::framesize_t_FRAMESIZE_CIF,
        FrameSize::Vga => camera::framesize_t_FRAMESIZE_VGA,
        FrameSize::Svga => camera::framesize_t_FRAMESIZE_SVGA,
        FrameSize::Xga => camera::framesize_t_FRAMESIZE_XGA,
        FrameSize::Hd => camera::framesize_t_FRAMESIZE_HD,
    }
}

/// Initialise the sensor in JPEG mode with the stored parameters.
#[cfg(target_os = "espidf")]
pub fn init_camera(params: &CameraParams) -> Result<(), HwInitError> {
    let config = camera::camera_config_t {
        pin_pwdn: pins::CAM_PWDN_GPIO,
        pin_reset: pins::CAM_RESET_GPIO,
        pin_xclk: pins::CAM_XCLK_GPIO,
        __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
            pin_sccb_sda: pins::CAM_SIOD_GPIO,
        },
        __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
            pin_sccb_scl: pins::CAM_SIOC_GPIO,
        },
        pin_d7: pins::CAM_D7_GPIO,
        pin_d6: pins::CAM_D6_GPIO,
        pin_d5: pins::CAM_D5_GPIO,
        pin_d4: pins::CAM_D4_GPIO,
        pin_d3: pins::CAM_D3_GPIO,
        pin_d2: pins::CAM_D2_GPIO,
        pin_d1: pins::CAM_D1_GPIO,
        pin_d0: pins::CAM_D0_GPIO,
        pin_vsync: pins::CAM_VSYNC_GPIO,
        pin_href: pins::CAM_HREF_GPIO,
        pin_pclk: pins::CAM_PCLK_GPIO,
        xclk_freq_hz: pins::CAM_XCLK_FREQ_HZ,
        ledc_timer: esp_idf_svc::sys::ledc_timer_t_LEDC_TIMER_0,
        ledc_channel: esp_idf_svc::sys::ledc_channel_t_LEDC_CHANNEL_0,
        pixel_format: camera::pixformat_t_PIXFORMAT_JPEG,
        frame_size: framesize(params.frame_size),
        jpeg_quality: i32::from(params.quality),
        fb_count: FRAME_BUFFER_COUNT,
        fb_location: camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,
        grab_mode: camera::camera_grab_mode_t_CAMERA_GRAB_LATEST,
        ..Default::default()
    };

    // SAFETY: called once from main before the stream worker starts.
    let ret = unsafe { camera::esp_camera_init(&config) };
    if ret != esp_idf_svc::sys::ESP_OK as i32 {
        return Err(HwInitError::CameraInitFailed(ret));
    }
    info!("camera: initialised ({:?}, q={})", params.frame_size, params.quality);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_camera(params: &CameraParams) -> Result<(), HwInitError> {
    info!("camera(sim): synthetic source ({:?})", params.frame_size);
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Frame acquisition (stream worker)
// ───────────────────────────────────────────────────────────────

/// A driver-owned frame buffer, returned through
/// [`CameraPort::release_frame`].
#[cfg(target_os = "espidf")]
pub struct EspFrame {
    fb: core::ptr::NonNull<camera::camera_fb_t>,
}

#[cfg(target_os = "espidf")]
impl FrameData for EspFrame {
    fn bytes(&self) -> &[u8] {
        // SAFETY: the driver keeps `buf`/`len` valid until fb_return.
        unsafe {
            let fb = self.fb.as_ref();
            core::slice::from_raw_parts(fb.buf, fb.len)
        }
    }

    fn format(&self) -> PixelFormat {
        // SAFETY: see bytes().
        let format = unsafe { self.fb.as_ref().format };
        match format {
            camera::pixformat_t_PIXFORMAT_JPEG => PixelFormat::Jpeg,
            camera::pixformat_t_PIXFORMAT_RGB565 => PixelFormat::Rgb565,
            camera::pixformat_t_PIXFORMAT_YUV422 => PixelFormat::Yuv422,
            _ => PixelFormat::Grayscale,
        }
    }
}

/// Synthetic JPEG-framed buffer for host runs.
#[cfg(not(target_os = "espidf"))]
pub struct SimFrame {
    bytes: Vec<u8>,
}

#[cfg(not(target_os = "espidf"))]
impl FrameData for SimFrame {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Jpeg
    }
}

#[derive(Debug, Default)]
pub struct CameraAdapter {
    outstanding: u8,
    #[cfg(not(target_os = "espidf"))]
    seq: u32,
}

impl CameraAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames acquired but not yet released.
    pub fn outstanding(&self) -> u8 {
        self.outstanding
    }
}

#[cfg(target_os = "espidf")]
impl CameraPort for CameraAdapter {
    type Frame = EspFrame;

    fn acquire_frame(&mut self) -> Option<EspFrame> {
        // SAFETY: driver initialised in init_camera(); only this adapter
        // takes frame buffers.
        let fb = core::ptr::NonNull::new(unsafe { camera::esp_camera_fb_get() })?;
        self.outstanding = self.outstanding.saturating_add(1);
        Some(EspFrame { fb })
    }

    fn release_frame(&mut self, frame: EspFrame) {
        // SAFETY: `fb` came from esp_camera_fb_get and is returned once.
        unsafe { camera::esp_camera_fb_return(frame.fb.as_ptr()) };
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

#[cfg(not(target_os = "espidf"))]
impl CameraPort for CameraAdapter {
    type Frame = SimFrame;

    fn acquire_frame(&mut self) -> Option<SimFrame> {
        self.seq = self.seq.wrapping_add(1);
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&[0xFF, 0xD8]);
        bytes.extend_from_slice(&self.seq.to_be_bytes());
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        self.outstanding = self.outstanding.saturating_add(1);
        Some(SimFrame { bytes })
    }

    fn release_frame(&mut self, _frame: SimFrame) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor control (request loop)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CameraControl {
    applied: Option<CameraParams>,
}

impl CameraControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last parameter set fully accepted by the sensor.
    pub fn applied(&self) -> Option<CameraParams> {
        self.applied
    }
}

#[cfg(target_os = "espidf")]
impl CameraControlPort for CameraControl {
    fn apply_camera(&mut self, params: &CameraParams) -> Result<(), ActuatorError> {
        // SAFETY: the sensor handle is owned by the driver and valid after
        // init; setters are plain register writes over SCCB.
        unsafe {
            let s = camera::esp_camera_sensor_get();
            if s.is_null() {
                return Err(ActuatorError::CameraUnavailable);
            }
            let sensor = &*s;

            let set = sensor.set_framesize.ok_or(ActuatorError::CameraUnavailable)?;
            if set(s, framesize(params.frame_size)) != 0 {
                return Err(ActuatorError::CameraRejected("frame_size"));
            }
            let set = sensor.set_quality.ok_or(ActuatorError::CameraUnavailable)?;
            if set(s, i32::from(params.quality)) != 0 {
                return Err(ActuatorError::CameraRejected("quality"));
            }
            let set = sensor.set_brightness.ok_or(ActuatorError::CameraUnavailable)?;
            if set(s, i32::from(params.brightness)) != 0 {
                return Err(ActuatorError::CameraRejected("brightness"));
            }
            let set = sensor.set_contrast.ok_or(ActuatorError::CameraUnavailable)?;
            if set(s, i32::from(params.contrast)) != 0 {
                return Err(ActuatorError::CameraRejected("contrast"));
            }
            let set = sensor.set_saturation.ok_or(ActuatorError::CameraUnavailable)?;
            if set(s, i32::from(params.saturation)) != 0 {
                return Err(ActuatorError::CameraRejected("saturation"));
            }
        }
        self.applied = Some(*params);
        info!("camera: params applied {:?}", params);
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl CameraControlPort for CameraControl {
    fn apply_camera(&mut self, params: &CameraParams) -> Result<(), ActuatorError> {
        self.applied = Some(*params);
        info!("camera(sim): params applied {:?}", params);
        Ok(())
    }
}
