//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                  |
//! |-------------|---------------------|------------------------------|
//! | `camera`    | CameraPort          | esp32-camera frame buffers   |
//! |             | CameraControlPort   | OV2640 sensor registers      |
//! | `hardware`  | ActuatorPort        | LEDC servos + LED            |
//! |             | BatteryAdcPort      | ADC1 oneshot                 |
//! |             | CameraControlPort   | (delegates to `camera`)      |
//! | `log_sink`  | EventSink           | Serial log output            |
//! | `nvs`       | ConfigPort          | NVS / in-memory store        |
//! | `sleep`     | PowerPort           | ESP-IDF light sleep          |
//! | `time`      | TimePort, DelayNs   | ESP32 system timer           |
//! | `wifi`      | NetworkPort         | ESP-IDF Wi-Fi STA / AP       |

pub mod camera;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod sleep;
pub mod time;
pub mod wifi;
