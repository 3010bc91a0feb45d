//! # rnlora -- async driver for Microchip RN2483/RN2903 LoRa modules
//!
//! `rnlora` talks to RN2483 (433/868 MHz) and RN2903 (915 MHz) LoRa modules
//! over their UART. It resets the module, identifies it from its boot
//! banner, reads its hardware EUI, configures the band and then exposes
//! the module's MAC commands as async methods.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rnlora::Rn2xx3Builder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = Rn2xx3Builder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     println!("{} EUI {}", device.model().name, device.hweui());
//!     println!("MAC status {:08x}", device.get_status().await?);
//!     device.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate              | Purpose                                             |
//! |--------------------|-----------------------------------------------------|
//! | `rnlora-core`      | Error type, [`Transport`] and [`ResetLine`] traits, [`Eui64`] |
//! | `rnlora-line-io`   | CR-LF framer, single-slot mailbox, command channel  |
//! | `rnlora-transport` | Serial transport (57600 8N1, no flow control)       |
//! | `rnlora-rn2xx3`    | Models, command parsers, bring-up, device operations |
//! | **`rnlora`**       | This facade crate -- re-exports everything          |
//!
//! ## Supported Modules
//!
//! - **RN2483**: 433/868 MHz, band switchable with `mac reset <band>`
//! - **RN2903**: 915 MHz, fixed band

pub use rnlora_core::*;

/// Line IO engine: framing, mailbox and the command channel.
pub mod line_io {
    pub use rnlora_line_io::*;
}

/// Transport implementations.
pub mod transport {
    pub use rnlora_transport::*;
}

/// RN2483/RN2903 models, commands and device controller.
pub mod rn2xx3 {
    pub use rnlora_rn2xx3::*;
}

pub use rnlora_line_io::CommandChannel;
pub use rnlora_rn2xx3::{
    BringUpStage, DeviceIdentity, DeviceState, Rn2xx3Builder, Rn2xx3Device, Rn2xx3Model,
};
pub use rnlora_transport::SerialTransport;

/// Every module this library can bring up.
pub fn supported_models() -> Vec<Rn2xx3Model> {
    rnlora_rn2xx3::models::all_models()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_models_lists_both_modules() {
        let models = supported_models();
        let names: Vec<&str> = models.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["RN2483", "RN2903"]);
    }

    #[test]
    fn facade_reexports_core() {
        let eui: Eui64 = "0004A30B001A2B3C".parse().unwrap();
        assert_eq!(eui.as_u64(), 0x0004_A30B_001A_2B3C);
        let err: Error = Error::Timeout;
        assert!(!err.is_resource());
    }
}
