//! Common types shared across the rendering core.

/// Size of a frame buffer in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// RGBA clear color for color attachments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    /// Create a new clear color.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque black.
    pub fn black() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// What happens to attachment contents when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadAction {
    /// Existing contents are undefined, cheapest option.
    #[default]
    DontCare,
    /// Existing contents are preserved.
    Load,
    /// Contents are cleared to the attachment clear value.
    Clear,
}

/// What happens to attachment contents when a render pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreAction {
    /// Contents after the pass are undefined.
    #[default]
    DontCare,
    /// Contents are written out and available after the pass.
    Store,
}
