//! RN2xx3 model definitions.
//!
//! Both modules speak the same ASCII command set over a 57600 baud UART and
//! identify themselves with a boot banner whose characters 2..6 carry the
//! model code. They differ in radio coverage:
//!
//! | Model  | Code | Bands (MHz) | `mac get band` / `mac reset <band>` |
//! |--------|------|-------------|-------------------------------------|
//! | RN2483 | 2483 | 433, 868    | Yes                                 |
//! | RN2903 | 2903 | 915         | No (fixed)                          |

/// Static model definition for an RN2xx3 module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rn2xx3Model {
    /// Human-readable model name (e.g. "RN2483").
    pub name: &'static str,
    /// Numeric model code as reported in the boot banner.
    pub code: u16,
    /// Device-tree style compatible string.
    pub compatible: &'static str,
    /// Bands the radio can be configured for, in MHz.
    pub bands: &'static [u16],
    /// The band of a module without band commands.
    ///
    /// `None` means the module supports `mac get band` and `mac reset`.
    pub fixed_band: Option<u16>,
}

impl Rn2xx3Model {
    /// Whether the module implements `mac get band` and `mac reset <band>`.
    pub fn has_band_command(&self) -> bool {
        self.fixed_band.is_none()
    }

    /// Whether `band` (MHz) is one this model can operate in.
    pub fn supports_band(&self, band: u16) -> bool {
        self.bands.contains(&band)
    }
}

/// Microchip RN2483: 433/868 MHz EU module.
pub fn rn2483() -> Rn2xx3Model {
    Rn2xx3Model {
        name: "RN2483",
        code: 2483,
        compatible: "microchip,rn2483",
        bands: &[433, 868],
        fixed_band: None,
    }
}

/// Microchip RN2903: 915 MHz US module.
pub fn rn2903() -> Rn2xx3Model {
    Rn2xx3Model {
        name: "RN2903",
        code: 2903,
        compatible: "microchip,rn2903",
        bands: &[915],
        fixed_band: Some(915),
    }
}

/// Every supported model.
pub fn all_models() -> Vec<Rn2xx3Model> {
    vec![rn2483(), rn2903()]
}

/// Look up a model by the code from its boot banner.
pub fn model_by_code(code: u16) -> Option<Rn2xx3Model> {
    all_models().into_iter().find(|m| m.code == code)
}

/// Look up a model by its compatible string (e.g. `microchip,rn2903`).
pub fn model_by_compatible(compatible: &str) -> Option<Rn2xx3Model> {
    all_models()
        .into_iter()
        .find(|m| m.compatible.eq_ignore_ascii_case(compatible))
}
