//! Microchip RN2483/RN2903 LoRa module controller.
//!
//! Both modules are driven over a UART with an ASCII line protocol: one
//! command line out, one reply line back. This crate provides:
//!
//! - **Model definitions** ([`models`]) -- RN2483 (433/868 MHz) and RN2903
//!   (fixed 915 MHz).
//! - **Command builders** ([`commands`]) -- command text and parsers for
//!   each reply grammar (banner, hex EUI, decimal band, literal status
//!   words, hex bitmask).
//! - **Device controller** ([`device`]) -- the bring-up sequence (reset,
//!   banner, identification, band configuration, MAC status and
//!   pause/resume) and operations on the ready module.
//! - **Builder** ([`builder`]) -- fluent builder API for constructing
//!   [`Rn2xx3Device`] instances with the module's factory defaults.
//!
//! # Example
//!
//! ```
//! use rnlora_rn2xx3::commands::{parse_banner, parse_hweui};
//! use rnlora_rn2xx3::models::model_by_code;
//!
//! let banner = parse_banner("RN2483 1.0.3 Nov 23 2016 10:55:12").unwrap();
//! let model = model_by_code(banner.model_code).unwrap();
//! assert!(model.has_band_command());
//!
//! let eui = parse_hweui("0004A30B001A2B3C").unwrap();
//! assert_eq!(eui.to_string(), "0004A30B001A2B3C");
//! ```

pub mod builder;
pub mod commands;
pub mod device;
pub mod models;

pub use builder::Rn2xx3Builder;
pub use device::{BringUpStage, DeviceConfig, DeviceIdentity, DeviceState, Rn2xx3Device};
pub use models::Rn2xx3Model;
