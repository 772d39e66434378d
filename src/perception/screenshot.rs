// Screen capture backed by xcap. Only the primary (first) monitor is used;
// coordinates are physical pixels relative to its top-left corner.
use image::RgbaImage;

use crate::errors::{MarketError, MarketResult};
use crate::perception::traits::ScreenSource;
use crate::perception::types::Region;

pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    fn capture_primary(&self) -> MarketResult<RgbaImage> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| MarketError::Capture(format!("monitor enumeration: {e}")))?;
        let monitor = monitors
            .first()
            .ok_or_else(|| MarketError::Capture("no monitors found".into()))?;
        let frame = monitor
            .capture_image()
            .map_err(|e| MarketError::Capture(format!("capture: {e}")))?;
        let (w, h) = (frame.width(), frame.height());
        RgbaImage::from_raw(w, h, frame.into_raw())
            .ok_or_else(|| MarketError::Capture("capture buffer size mismatch".into()))
    }
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for XcapScreen {
    fn capture(&self, region: Option<Region>) -> MarketResult<RgbaImage> {
        let frame = self.capture_primary()?;
        match region {
            None => Ok(frame),
            Some(region) => crop_region(&frame, region),
        }
    }
}

/// Crop `region` out of `frame`, clamped to the frame bounds.
pub fn crop_region(frame: &RgbaImage, region: Region) -> MarketResult<RgbaImage> {
    let (fw, fh) = frame.dimensions();
    let x0 = region.x.clamp(0, fw as i32) as u32;
    let y0 = region.y.clamp(0, fh as i32) as u32;
    let x1 = (region.x as i64 + region.width as i64).clamp(0, fw as i64) as u32;
    let y1 = (region.y as i64 + region.height as i64).clamp(0, fh as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Err(MarketError::Capture(format!(
            "region {region:?} lies outside the {fw}x{fh} screen"
        )));
    }
    Ok(image::imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image())
}
