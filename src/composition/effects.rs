use rand::Rng;

use crate::config::EffectSettings;

/// Source-frame rectangle in pixels, fractional so zoom windows keep their
/// exact proportions until the surface rounds them for sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whole-frame rectangle
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True if `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &CropRect) -> bool {
        const EPS: f64 = 1e-9;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }
}

/// Centered crop of a `frame_w`x`frame_h` frame with the output aspect ratio.
///
/// Wider sources lose their sides, taller sources lose top and bottom, so the
/// crop always fills the output without letterboxing or distortion.
pub fn base_crop(frame_w: u32, frame_h: u32, out_w: u32, out_h: u32) -> CropRect {
    let (fw, fh) = (frame_w as f64, frame_h as f64);
    let out_aspect = out_w as f64 / out_h as f64;

    if fw / fh > out_aspect {
        let width = fh * out_aspect;
        CropRect::new((fw - width) / 2.0, 0.0, width, fh)
    } else {
        let height = fw / out_aspect;
        CropRect::new(0.0, (fh - height) / 2.0, fw, height)
    }
}

/// Pan-and-zoom window chosen inside the base crop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomWindow {
    /// Magnification; 1.0 is the base crop itself
    pub factor: f64,
    pub window: CropRect,
}

/// Per-clip geometric treatment, decided once before the clip starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectPlan {
    pub base: CropRect,
    pub zoom: Option<ZoomWindow>,
    pub flip: bool,
}

impl EffectPlan {
    /// Plan that draws the base crop unmirrored
    pub fn plain(base: CropRect) -> Self {
        Self { base, zoom: None, flip: false }
    }

    pub fn applies_zoom(&self) -> bool {
        self.zoom.is_some()
    }

    /// The region of the source frame that gets mapped onto the surface
    pub fn source_window(&self) -> CropRect {
        self.zoom.map(|z| z.window).unwrap_or(self.base)
    }
}

/// Rolls the zoom and flip dice for each clip
#[derive(Debug, Clone)]
pub struct EffectPlanner {
    settings: EffectSettings,
}

impl EffectPlanner {
    pub fn new(settings: EffectSettings) -> Self {
        Self { settings }
    }

    pub fn plan<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        frame: (u32, u32),
        output: (u32, u32),
    ) -> EffectPlan {
        let base = base_crop(frame.0, frame.1, output.0, output.1);
        let settings = &self.settings;

        let zoom = if rng.gen_bool(probability(settings.zoom_probability)) {
            let min = settings.zoom.min.min(settings.zoom.max);
            let factor = (rng.gen_range(min..=settings.zoom.max) / 100.0).max(1.0);

            let width = base.width / factor;
            let height = base.height / factor;
            let x = base.x + rng.gen::<f64>() * (base.width - width);
            let y = base.y + rng.gen::<f64>() * (base.height - height);

            Some(ZoomWindow {
                factor,
                window: CropRect::new(x, y, width, height),
            })
        } else {
            None
        };

        let flip = rng.gen_bool(probability(settings.flip_probability));

        EffectPlan { base, zoom, flip }
    }
}

fn probability(pct: f64) -> f64 {
    if pct.is_finite() {
        (pct / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
