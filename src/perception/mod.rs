pub mod images;
pub mod locator;
pub mod matcher;
pub mod ocr;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod wait;
