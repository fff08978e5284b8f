//! Pinned FreeRTOS tasks for the RoverCam activities.
//!
//! ESP-IDF backs `std::thread` with pthreads; `esp_pthread_set_cfg()`
//! stores a thread-local template that the *next* `pthread_create()` from
//! the same thread picks up.  [`spawn`] therefore sets the template and
//! creates the thread back to back, and must only be called from the
//! main thread during boot.
//!
//! Layout: the stream worker owns core 1; the request loop and the sleep
//! monitor share core 0 with the Wi-Fi stack.

use core::ffi::CStr;
use std::io;
use std::thread::JoinHandle;

/// ESP32-S3 CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU: Wi-Fi, lwIP, request loop, sleep monitor.
    Pro = 0,
    /// APP_CPU: camera capture and MJPEG streaming.
    App = 1,
}

/// Placement and sizing of one long-lived activity.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static CStr,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    pub fn label(&self) -> &'static str {
        self.name.to_str().unwrap_or("task")
    }

    fn stack_bytes(&self) -> usize {
        self.stack_kb * 1024
    }
}

/// Camera capture and MJPEG writes; frame buffers live in PSRAM so the
/// stack only carries part headers.
pub const STREAM_TASK: TaskSpec = TaskSpec {
    name: c"stream",
    core: Core::App,
    priority: 5,
    stack_kb: 8,
};

/// Inactivity checks; below the stream worker so frames are never
/// delayed by a sleep evaluation.
pub const SLEEP_MONITOR_TASK: TaskSpec = TaskSpec {
    name: c"sleepmon",
    core: Core::Pro,
    priority: 3,
    stack_kb: 4,
};

/// Start `f` as the task described by `spec`.
#[cfg(target_os = "espidf")]
pub fn spawn(spec: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    // SAFETY: `spec.name` is a 'static C string; esp_pthread_set_cfg copies
    // the config struct before returning.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = spec.stack_bytes() as i32;
        cfg.thread_name = spec.name.as_ptr();
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        return Err(io::Error::other(format!(
            "esp_pthread_set_cfg({}) failed: {ret}",
            spec.label()
        )));
    }

    log::info!(
        "task '{}': core {:?}, pri {}, stack {} KB",
        spec.label(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );
    std::thread::Builder::new().name(spec.label().into()).spawn(f)
}

/// Host build: no affinity or priority, only the name and stack size.
#[cfg(not(target_os = "espidf"))]
pub fn spawn(spec: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    log::info!("task '{}' (sim): stack {} KB", spec.label(), spec.stack_kb);
    std::thread::Builder::new()
        .name(spec.label().into())
        .stack_size(spec.stack_bytes())
        .spawn(f)
}
