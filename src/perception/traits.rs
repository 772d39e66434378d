use image::RgbaImage;

use crate::errors::MarketResult;
use crate::perception::types::{Region, TextFragment};

/// Read-only access to the known reference images.
pub trait ImageLookup {
    fn lookup(&self, name: &str) -> Option<&RgbaImage>;

    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// Source of screen frames. `region` is clamped to the screen by implementors.
pub trait ScreenSource {
    fn capture(&self, region: Option<Region>) -> MarketResult<RgbaImage>;
}

/// Strategy trait for text recognition on a captured frame.
/// Fragment coordinates are relative to the given image.
pub trait TextRecognizer {
    fn recognize(&self, image: &RgbaImage) -> MarketResult<Vec<TextFragment>>;
}
