//! Render configuration.

/// Pixel reconstruction filter applied before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionFilter {
    /// No splatting; per-pixel sums are used directly.
    Box,
    MitchellNetravali,
    Gaussian,
}

/// How next-event estimation picks a light triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSelection {
    /// Every light triangle with probability 1/N.
    Uniform,
    /// Probability proportional to triangle area.
    Area,
}

/// Render settings, constant for the lifetime of a frame.
#[derive(Debug, Clone)]
pub struct Settings {
    pub reconstruction_filter: ReconstructionFilter,
    pub enable_next_event_estimation: bool,
    pub enable_multiple_importance_sampling: bool,
    /// Demodulated buffers are produced for the denoiser; the core only
    /// writes the extra albedo channel.
    pub enable_svgf: bool,
    pub demodulate_albedo: bool,
    pub light_selection: LightSelection,
    /// Jitter rasterized primary hits for anti-aliasing.
    pub jitter_primary: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reconstruction_filter: ReconstructionFilter::Box,
            enable_next_event_estimation: true,
            enable_multiple_importance_sampling: true,
            enable_svgf: false,
            demodulate_albedo: false,
            light_selection: LightSelection::Uniform,
            jitter_primary: true,
        }
    }
}

impl Settings {
    /// True when the albedo frame buffer is written at bounce 0.
    pub fn wants_albedo(&self) -> bool {
        self.enable_svgf || self.demodulate_albedo
    }
}
